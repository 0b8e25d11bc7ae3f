//! Tools advertised regardless of selection state.

use serde_json::json;

use crate::registry::{CapabilityDescriptor, Category, ParameterSchema};

pub const SELECT_TOOLS: &str = "select_tools";
pub const LIST_CATEGORIES: &str = "list_available_categories";
pub const SEARCH_TOOLS: &str = "search_tools";

/// Baseline tools answered by the hub itself rather than the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagementTool {
    SelectTools,
    ListCategories,
    SearchTools,
}

impl ManagementTool {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            SELECT_TOOLS => Some(ManagementTool::SelectTools),
            LIST_CATEGORIES => Some(ManagementTool::ListCategories),
            SEARCH_TOOLS => Some(ManagementTool::SearchTools),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ManagementTool::SelectTools => SELECT_TOOLS,
            ManagementTool::ListCategories => LIST_CATEGORIES,
            ManagementTool::SearchTools => SEARCH_TOOLS,
        }
    }
}

fn selectable_categories() -> Vec<&'static str> {
    Category::ALL
        .iter()
        .filter(|c| **c != Category::Other)
        .map(|c| c.as_str())
        .collect()
}

fn management_tools() -> Vec<CapabilityDescriptor> {
    let select = CapabilityDescriptor::new(
        SELECT_TOOLS,
        "Load Tools by Category",
        "Load additional tools dynamically. Call list_available_categories first to see \
         available categories, or use search_tools to find specific tools. Without calling \
         this, only the basic tools are available. Example: select_tools({categories: \
         [\"VFX\", \"Camera\"]}) loads visual effects and camera tools.",
        Category::Utility,
    )
    .with_schema(
        ParameterSchema::strict()
            .property(
                "categories",
                json!({
                    "type": "array",
                    "items": {"type": "string", "enum": selectable_categories()},
                    "description": "Tool categories to load (see list_available_categories for options)"
                }),
            )
            .property(
                "keywords",
                json!({
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Optional: filter by keywords (e.g. [\"camera\", \"color\"])"
                }),
            )
            .field(
                "maxTools",
                "number",
                Some("Max tools to load (default: 50, max: 100)"),
            ),
    );

    let list = CapabilityDescriptor::new(
        LIST_CATEGORIES,
        "List Available Tool Categories",
        "Show every tool category with counts and descriptions. Call this first to discover \
         available categories, then use select_tools to load the tools you need.",
        Category::Utility,
    )
    .with_schema(ParameterSchema::strict());

    let search = CapabilityDescriptor::new(
        SEARCH_TOOLS,
        "Search Tools by Keyword",
        "Find tools by keyword search. Supports single or multiple keywords (e.g. \"camera\", \
         \"particle effect\", \"material color\"). Returns tool names, descriptions, categories \
         and relevance scores.",
        Category::Utility,
    )
    .with_schema(
        ParameterSchema::strict()
            .required_field(
                "query",
                "string",
                Some("Search keyword(s) - single word or phrase"),
            )
            .field("limit", "number", Some("Max results (default: 20)")),
    );

    vec![select, list, search]
}

fn engine_tools() -> Vec<CapabilityDescriptor> {
    vec![
        CapabilityDescriptor::new(
            "unity_get_scene_summary",
            "Get Scene Summary",
            "Get a lightweight scene overview: scene name, GameObject count, cameras, lights, \
             root GameObjects list.",
            Category::Scene,
        )
        .with_schema(ParameterSchema::strict()),
        CapabilityDescriptor::new(
            "unity_get_gameobjects_list",
            "Get GameObjects List",
            "Get a filtered list of GameObjects. Supports filters: layer, tag, name, activeOnly. \
             Max 100 results.",
            Category::GameObject,
        )
        .with_schema(
            ParameterSchema::strict()
                .field("layerFilter", "string", None)
                .field("tagFilter", "string", None)
                .field("nameFilter", "string", None)
                .field("activeOnly", "boolean", None)
                .field("maxCount", "number", None),
        ),
        CapabilityDescriptor::new(
            "unity_get_gameobject_detail",
            "Get GameObject Detail",
            "Get detailed info for a specific GameObject by name or instanceId.",
            Category::GameObject,
        )
        .with_schema(ParameterSchema::strict().required_field("nameOrId", "string", None)),
        CapabilityDescriptor::new(
            "unity_undo",
            "Undo Operation",
            "Undo the last editor operation",
            Category::Utility,
        )
        .with_schema(ParameterSchema::strict()),
        CapabilityDescriptor::new(
            "unity_redo",
            "Redo Operation",
            "Redo the last undone editor operation",
            Category::Utility,
        )
        .with_schema(ParameterSchema::strict()),
    ]
}

/// Management tools followed by the always-on engine tools
pub fn essential_tools() -> Vec<CapabilityDescriptor> {
    let mut tools = management_tools();
    tools.extend(engine_tools());
    tools
}
