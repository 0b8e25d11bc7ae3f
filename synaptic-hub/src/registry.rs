//! Capability registry: the read-only set of tool descriptors the hub can forward.
//!
//! The registry is produced offline (one entry per engine tool, optionally with a
//! precomputed embedding) and loaded once at startup. Loading never fails hard:
//! a missing or unreadable registry yields `None` and the hub runs in degraded
//! mode with only its baseline tools.

use std::fmt;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{info, warn};

/// Registry contents keyed by tool name, in registry order
pub type RegistryMap = IndexMap<String, CapabilityDescriptor>;

/// Tool category tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    GameObject,
    Transform,
    Material,
    Lighting,
    Camera,
    Physics,
    UI,
    Animation,
    Cinemachine,
    Scene,
    GOAP,
    Audio,
    Input,
    VFX,
    Shader,
    Weather,
    TimeOfDay,
    Editor,
    Package,
    Build,
    Monitoring,
    AssetManagement,
    Optimization,
    Batch,
    GameSystems,
    AI,
    Debug,
    Timeline,
    Scripting,
    Screenshot,
    Utility,
    Other,
}

impl Category {
    pub const ALL: [Category; 32] = [
        Category::GameObject,
        Category::Transform,
        Category::Material,
        Category::Lighting,
        Category::Camera,
        Category::Physics,
        Category::UI,
        Category::Animation,
        Category::Cinemachine,
        Category::Scene,
        Category::GOAP,
        Category::Audio,
        Category::Input,
        Category::VFX,
        Category::Shader,
        Category::Weather,
        Category::TimeOfDay,
        Category::Editor,
        Category::Package,
        Category::Build,
        Category::Monitoring,
        Category::AssetManagement,
        Category::Optimization,
        Category::Batch,
        Category::GameSystems,
        Category::AI,
        Category::Debug,
        Category::Timeline,
        Category::Scripting,
        Category::Screenshot,
        Category::Utility,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::GameObject => "GameObject",
            Category::Transform => "Transform",
            Category::Material => "Material",
            Category::Lighting => "Lighting",
            Category::Camera => "Camera",
            Category::Physics => "Physics",
            Category::UI => "UI",
            Category::Animation => "Animation",
            Category::Cinemachine => "Cinemachine",
            Category::Scene => "Scene",
            Category::GOAP => "GOAP",
            Category::Audio => "Audio",
            Category::Input => "Input",
            Category::VFX => "VFX",
            Category::Shader => "Shader",
            Category::Weather => "Weather",
            Category::TimeOfDay => "TimeOfDay",
            Category::Editor => "Editor",
            Category::Package => "Package",
            Category::Build => "Build",
            Category::Monitoring => "Monitoring",
            Category::AssetManagement => "AssetManagement",
            Category::Optimization => "Optimization",
            Category::Batch => "Batch",
            Category::GameSystems => "GameSystems",
            Category::AI => "AI",
            Category::Debug => "Debug",
            Category::Timeline => "Timeline",
            Category::Scripting => "Scripting",
            Category::Screenshot => "Screenshot",
            Category::Utility => "Utility",
            Category::Other => "Other",
        }
    }

    /// Exact, case-sensitive lookup. Unknown tokens yield `None`.
    pub fn parse(token: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.as_str() == token)
    }

    pub fn description(&self) -> &'static str {
        match self {
            Category::GameObject => "Create, destroy, find, parent, tag, layer operations",
            Category::Transform => "Position, rotation, scale manipulation",
            Category::Material => "Create materials, set colors, shaders, textures, properties",
            Category::Lighting => "Lights, reflection probes, lightmaps, ambient lighting",
            Category::Camera => "Camera creation and configuration",
            Category::Physics => "Rigidbody, colliders, physics simulation, raycasts",
            Category::UI => "Canvas, UI elements, anchors, text, buttons, images",
            Category::Animation => "Animator, animation clips, state machines, curves",
            Category::Cinemachine => "Virtual cameras, follow, dolly, brain, blending",
            Category::Scene => "Scene management, loading, saving, building, info",
            Category::GOAP => "AI agents, goals, actions, planners, sensors",
            Category::Audio => "Audio sources, clips, mixers, spatial audio, music",
            Category::Input => "Touch, gesture, haptic, multitouch input handling",
            Category::VFX => "Visual effects, post-processing, bloom, particles",
            Category::Shader => "Shader creation, properties, textures, materials",
            Category::Weather => "Weather systems, rain, snow, fog, clouds",
            Category::TimeOfDay => "Day/night cycle, time events, sunrise/sunset",
            Category::Editor => "Editor operations, inspector, console",
            Category::Package => "Package management, installation, updates",
            Category::Build => "Build settings, player settings, quality settings",
            Category::Monitoring => "Performance monitoring, events, file changes",
            Category::AssetManagement => "Asset organization, folders, naming, cleanup",
            Category::Optimization => "Performance optimization, draw calls, profiling",
            Category::Batch => "Batch operations on multiple objects",
            Category::GameSystems => "Game controllers, state machines, inventory",
            Category::AI => "AI pathfinding, neural networks, ML agents",
            Category::Debug => "Debugging tools, profiling, testing",
            Category::Timeline => "Timeline and avatar setup",
            Category::Scripting => "Script editing, analysis, modification",
            Category::Screenshot => "Screenshot capture tools",
            Category::Utility => "Undo, redo, search, find, asset management",
            Category::Other => "Miscellaneous tools",
        }
    }

    /// Name fragments that place a tool in this category.
    pub fn patterns(&self) -> &'static [&'static str] {
        match self {
            Category::GameObject => &[
                "create_gameobject", "update_gameobject", "delete_gameobject",
                "destroy_gameobject", "get_gameobject", "find_gameobject", "set_active",
                "set_parent", "set_tag", "set_layer", "duplicate_gameobject", "get_children",
                "get_parent", "add_component", "update_component", "remove_component",
            ],
            Category::Transform => &[
                "set_position", "set_rotation", "set_scale", "get_position", "get_rotation",
                "get_scale", "move_", "rotate_", "look_at", "set_transform",
            ],
            Category::Material => &[
                "create_material", "setup_material", "set_material", "get_material",
                "set_color", "set_shader", "set_texture", "material_property",
                "assign_material", "advanced_material",
            ],
            Category::Lighting => &[
                "lighting", "setup_lighting", "create_light", "set_light", "get_light",
                "light_intensity", "light_color", "light_shadow", "reflection_probe",
                "lightmap", "ambient_", "skybox", "volumetric", "fog",
            ],
            Category::Camera => &[
                "camera", "setup_camera", "create_camera", "set_camera", "get_camera",
                "camera_fov", "camera_depth", "camera_target", "camera_viewport",
                "camera_priority", "camera_enabled", "active_camera",
            ],
            Category::Physics => &[
                "physics", "setup_physics", "add_rigidbody", "add_collider", "set_rigidbody",
                "set_collider", "raycast", "overlap_", "apply_force", "set_velocity",
                "navmesh", "navigation",
            ],
            Category::UI => &[
                "create_ui", "ui_", "canvas", "create_button", "create_text", "create_image",
                "set_anchor", "set_pivot", "rect_transform", "layout", "panel",
            ],
            Category::Animation => &[
                "animation", "create_animation", "create_animator", "add_animation",
                "play_animation", "animator_", "animation_clip", "animation_curve",
            ],
            Category::Cinemachine => &[
                "cinemachine", "vcam", "virtual_camera", "freelook", "dolly", "track",
                "brain", "blend", "state_driven", "clear_shot", "impulse", "confiner",
                "collider_extension", "target_group", "mixing_camera", "blend_list",
            ],
            Category::Scene => &[
                "scene", "get_scene", "scene_info", "scene_summary", "gameobjects_list",
                "gameobject_detail", "load_scene", "unload_scene", "save_scene", "new_scene",
                "set_active_scene", "list_all_scenes", "add_scene_to_build", "manage_scene",
            ],
            Category::GOAP => &[
                "goap_", "create_agent", "add_action", "add_goal", "planner", "sensor",
                "ai_agent", "behavior",
            ],
            Category::Audio => &[
                "audio", "create_audio", "setup_audio", "play_sound", "stop_sound",
                "audio_mixer", "audio_source", "audio_clip", "audio_effects", "reverb",
                "3d_audio", "music_", "adaptive_music", "sound_pool",
            ],
            Category::Input => &[
                "input", "gesture", "touch", "haptic", "multitouch", "swipe", "pinch",
                "drag_drop", "input_validation", "input_recording", "accessibility_input",
            ],
            Category::VFX => &[
                "vfx", "visual_effect", "post_processing", "bloom", "vignette", "chromatic",
                "lens_flare", "screen_shake", "screen_fade", "film_grain", "motion_blur",
                "depth_of_field", "lens_distortion", "color_grading", "urp_settings",
                "hdrp_settings", "vfx_graph", "decal",
            ],
            Category::Shader => &[
                "shader", "shader_property", "shader_graph", "shader_texture",
                "shader_gradient", "shader_animator", "water_material", "toon_material",
                "hair_material", "skin_material", "eye_material", "fabric_material",
            ],
            Category::Weather => &[
                "weather", "rain", "snow", "wind", "storm", "fog", "clouds", "weather_preset",
            ],
            Category::TimeOfDay => &["time_of_day", "day_night", "time_event", "sunrise", "sunset"],
            Category::Editor => &[
                "inspector", "selected_object", "component_details", "console",
                "analyze_console", "context_menu", "force_refresh", "editor_",
            ],
            Category::Package => &["package", "install_package", "list_packages", "check_package"],
            Category::Build => &[
                "build_settings", "player_settings", "quality_settings", "project_summary",
            ],
            Category::Monitoring => &[
                "monitor", "subscribe_events", "get_events", "monitoring_status", "play_state",
                "file_changes", "compile", "operation_history", "checkpoint",
            ],
            Category::AssetManagement => &[
                "folder", "rename_asset", "delete_asset", "organize_folder", "cleanup_empty",
                "project_snapshot", "dependencies", "export_project", "naming_conventions",
            ],
            Category::Optimization => &[
                "optimize", "analyze_draw", "performance_report", "estimate_build_size",
                "auto_atlas", "generate_lod", "best_practices",
            ],
            Category::Batch => &["batch_rename", "batch_prefab", "batch_material", "extract_all"],
            Category::GameSystems => &[
                "game_controller", "state_machine", "inventory", "game_template", "prototype",
            ],
            Category::AI => &["ml_agent", "neural_network", "pathfinding", "ai_"],
            Category::Debug => &[
                "debug", "profile", "run_tests", "breakpoint", "control_game_speed",
            ],
            Category::Timeline => &["timeline", "avatar"],
            Category::Scripting => &[
                "modify_script", "edit_script", "add_script", "update_script", "read_script",
                "grep_scripts", "list_script", "analyze_script",
            ],
            Category::Screenshot => &["capture", "screenshot", "get_screenshot"],
            Category::Utility => &[
                "undo", "redo", "search", "find_", "get_asset", "import_", "create_prefab",
                "create_script", "particle", "terrain", "modify_terrain", "create_terrain",
                "place_objects", "list_assets", "group_gameobjects", "add_target_to_group",
                "responsive_ui", "scroll_view", "safe_area", "auto_attach",
            ],
            Category::Other => &[],
        }
    }

    /// Infer a category from a tool name. First matching category wins,
    /// in declaration order.
    pub fn detect(tool_name: &str) -> Category {
        let lower = tool_name.to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|category| category.patterns().iter().any(|p| lower.contains(p)))
            .unwrap_or(Category::Other)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn object_type() -> String {
    "object".to_string()
}

fn allow_additional() -> bool {
    true
}

/// Structural parameter description, serialized as a JSON-Schema object.
///
/// Fields are kept as raw JSON so registry-declared schemas the hub does not
/// know about pass through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterSchema {
    #[serde(rename = "type", default = "object_type")]
    pub schema_type: String,
    #[serde(default)]
    pub properties: IndexMap<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
    #[serde(default = "allow_additional")]
    pub additional_properties: bool,
}

impl Default for ParameterSchema {
    fn default() -> Self {
        Self::passthrough()
    }
}

impl ParameterSchema {
    /// Accepts any arguments; they are forwarded to the engine as-is.
    pub fn passthrough() -> Self {
        Self {
            schema_type: object_type(),
            properties: IndexMap::new(),
            required: Vec::new(),
            additional_properties: true,
        }
    }

    /// Closed schema with no fields declared yet
    pub fn strict() -> Self {
        Self {
            additional_properties: false,
            ..Self::passthrough()
        }
    }

    pub fn field(mut self, name: &str, field_type: &str, description: Option<&str>) -> Self {
        let mut schema = Map::new();
        schema.insert("type".to_string(), Value::String(field_type.to_string()));
        if let Some(description) = description {
            schema.insert(
                "description".to_string(),
                Value::String(description.to_string()),
            );
        }
        self.properties.insert(name.to_string(), Value::Object(schema));
        self
    }

    /// Declare a field with an arbitrary JSON-Schema fragment
    pub fn property(mut self, name: &str, schema: Value) -> Self {
        self.properties.insert(name.to_string(), schema);
        self
    }

    pub fn required_field(self, name: &str, field_type: &str, description: Option<&str>) -> Self {
        let mut schema = self.field(name, field_type, description);
        schema.required.push(name.to_string());
        schema
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| json!({ "type": "object" }))
    }
}

/// A tool the hub can advertise and forward
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    pub name: String,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub parameter_schema: ParameterSchema,
    /// Precomputed relevance embedding, when the registry was generated with one
    #[serde(default, skip_serializing)]
    pub embedding: Option<Vec<f32>>,
}

impl CapabilityDescriptor {
    pub fn new(name: &str, title: &str, description: &str, category: Category) -> Self {
        Self {
            name: name.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            category,
            parameter_schema: ParameterSchema::passthrough(),
            embedding: None,
        }
    }

    pub fn with_schema(mut self, schema: ParameterSchema) -> Self {
        self.parameter_schema = schema;
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }
}

/// Source of capability descriptors. Implementations never error; they
/// return `None` when nothing could be loaded.
pub trait CapabilityRegistry: Send + Sync {
    fn load(&self) -> Option<RegistryMap>;
}

/// One entry of the generated `tool-registry.json`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegistryFileEntry {
    title: Option<String>,
    #[serde(default)]
    description: String,
    category: Option<String>,
    embedding: Option<Vec<f32>>,
    input_schema: Option<ParameterSchema>,
}

/// Registry backed by the generated JSON file
#[derive(Debug, Clone)]
pub struct JsonFileRegistry {
    path: PathBuf,
}

impl JsonFileRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse registry JSON. Entries without a known category get one inferred
    /// from their name.
    pub fn parse(content: &str) -> Result<RegistryMap, serde_json::Error> {
        let raw: IndexMap<String, RegistryFileEntry> = serde_json::from_str(content)?;
        let mut map = RegistryMap::with_capacity(raw.len());
        for (name, entry) in raw {
            let category = entry
                .category
                .as_deref()
                .and_then(Category::parse)
                .unwrap_or_else(|| Category::detect(&name));
            let descriptor = CapabilityDescriptor {
                title: entry.title.unwrap_or_else(|| name.clone()),
                description: entry.description,
                category,
                parameter_schema: entry.input_schema.unwrap_or_default(),
                embedding: entry.embedding.filter(|e| !e.is_empty()),
                name: name.clone(),
            };
            map.insert(name, descriptor);
        }
        Ok(map)
    }
}

impl CapabilityRegistry for JsonFileRegistry {
    fn load(&self) -> Option<RegistryMap> {
        if !self.path.exists() {
            warn!(
                "[Registry] {} not found; run the registry generator. Hub will work with limited functionality",
                self.path.display()
            );
            return None;
        }
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                warn!("[Registry] Failed to read {}: {}", self.path.display(), e);
                return None;
            }
        };
        match Self::parse(&content) {
            Ok(map) => {
                info!(
                    "[Registry] Loaded {} tools from {}",
                    map.len(),
                    self.path.display()
                );
                Some(map)
            }
            Err(e) => {
                warn!("[Registry] Invalid registry {}: {}", self.path.display(), e);
                None
            }
        }
    }
}

/// In-memory registry, used for embedding the hub and in tests
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    entries: Option<RegistryMap>,
}

impl StaticRegistry {
    pub fn new(descriptors: impl IntoIterator<Item = CapabilityDescriptor>) -> Self {
        let entries = descriptors
            .into_iter()
            .map(|d| (d.name.clone(), d))
            .collect::<RegistryMap>();
        Self {
            entries: Some(entries),
        }
    }

    /// A registry that is never available
    pub fn unavailable() -> Self {
        Self { entries: None }
    }
}

impl CapabilityRegistry for StaticRegistry {
    fn load(&self) -> Option<RegistryMap> {
        self.entries.clone()
    }
}
