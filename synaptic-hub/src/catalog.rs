//! Dynamic capability catalog.
//!
//! The advertised set is the fixed baseline followed by the current
//! expansion. Every selection replaces the expansion wholesale and broadcasts
//! a [`CatalogEvent::ToolsListChanged`].

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::HubConfig;
use crate::error::{HubError, HubResult};
use crate::registry::{CapabilityDescriptor, Category, RegistryMap};
use crate::search::{RelevanceScorer, ScoredName};

/// Candidates pulled from keyword search before intersecting and truncating
const KEYWORD_CANDIDATES: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogEvent {
    ToolsListChanged { total_active: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogLimits {
    pub default_selection_size: usize,
    pub max_selection_size: usize,
    pub search_default_limit: usize,
    pub default_categories: Vec<String>,
}

impl Default for CatalogLimits {
    fn default() -> Self {
        Self::from_config(&HubConfig::default())
    }
}

impl CatalogLimits {
    pub fn from_config(config: &HubConfig) -> Self {
        Self {
            default_selection_size: config.default_selection_size,
            max_selection_size: config.max_selection_size,
            search_default_limit: config.search_default_limit,
            default_categories: config.default_categories.clone(),
        }
    }
}

/// Split an argument that may be an array or a `,`/`|`-separated string.
/// Entries are trimmed and empty ones dropped.
pub fn normalize_input_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.trim().to_string(),
                other => other.to_string(),
            })
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) => s
            .split([',', '|'])
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn non_negative_count(value: &Value, field: &str) -> HubResult<usize> {
    let count = match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    count
        .map(|c| c as usize)
        .ok_or_else(|| HubError::InvalidArguments(format!("`{}` must be a non-negative number", field)))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionRequest {
    pub categories: Vec<String>,
    pub keywords: Vec<String>,
    pub max_count: Option<usize>,
}

impl SelectionRequest {
    pub fn from_arguments(arguments: &Value) -> HubResult<Self> {
        let max_count = ["maxTools", "maxCount", "max_count"]
            .iter()
            .find_map(|key| arguments.get(*key).filter(|v| !v.is_null()).map(|v| (*key, v)))
            .map(|(key, v)| non_negative_count(v, key))
            .transpose()?;
        Ok(Self {
            categories: normalize_input_list(arguments.get("categories")),
            keywords: normalize_input_list(arguments.get("keywords")),
            max_count,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub query: String,
    pub limit: Option<usize>,
}

impl SearchRequest {
    pub fn from_arguments(arguments: &Value) -> HubResult<Self> {
        let query = arguments
            .get("query")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| {
                HubError::InvalidArguments("search_tools requires a non-empty `query`".to_string())
            })?;
        let limit = arguments
            .get("limit")
            .filter(|v| !v.is_null())
            .map(|v| non_negative_count(v, "limit"))
            .transpose()?;
        Ok(Self {
            query: query.to_string(),
            limit,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectedTool {
    pub name: String,
    pub category: Category,
}

/// Result of `select_tools`, returned to the caller as JSON
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectionOutcome {
    pub success: bool,
    pub loaded_tools: usize,
    pub total_active: usize,
    pub categories: Vec<String>,
    pub keywords: Vec<String>,
    pub degraded: bool,
    pub message: String,
    pub tools: Vec<SelectedTool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub name: String,
    pub description: String,
    pub category: Category,
    pub relevance: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchOutcome {
    pub query: String,
    pub degraded: bool,
    pub results: Vec<SearchHit>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryInfo {
    pub count: usize,
    pub description: &'static str,
}

pub struct CapabilityCatalog {
    registry: Option<RegistryMap>,
    baseline: Vec<CapabilityDescriptor>,
    expansion: RwLock<Vec<CapabilityDescriptor>>,
    scorer: Arc<dyn RelevanceScorer>,
    limits: CatalogLimits,
    events: broadcast::Sender<CatalogEvent>,
}

impl CapabilityCatalog {
    pub fn new(
        registry: Option<RegistryMap>,
        baseline: Vec<CapabilityDescriptor>,
        scorer: Arc<dyn RelevanceScorer>,
        limits: CatalogLimits,
    ) -> Self {
        if registry.is_none() {
            warn!("[Hub] No tool registry; serving {} baseline tools only", baseline.len());
        }
        let (events, _) = broadcast::channel(16);
        Self {
            registry,
            baseline,
            expansion: RwLock::new(Vec::new()),
            scorer,
            limits,
            events,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.registry.is_none()
    }

    pub fn registry(&self) -> Option<&RegistryMap> {
        self.registry.as_ref()
    }

    pub fn limits(&self) -> &CatalogLimits {
        &self.limits
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CatalogEvent> {
        self.events.subscribe()
    }

    pub fn baseline(&self) -> &[CapabilityDescriptor] {
        &self.baseline
    }

    /// Baseline followed by the active expansion
    pub fn advertised(&self) -> Vec<CapabilityDescriptor> {
        let expansion = self.expansion.read().unwrap_or_else(PoisonError::into_inner);
        self.baseline.iter().chain(expansion.iter()).cloned().collect()
    }

    pub fn advertised_names(&self) -> Vec<String> {
        self.advertised().into_iter().map(|d| d.name).collect()
    }

    pub fn lookup(&self, name: &str) -> Option<CapabilityDescriptor> {
        if let Some(descriptor) = self.baseline.iter().find(|d| d.name == name) {
            return Some(descriptor.clone());
        }
        self.expansion
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|d| d.name == name)
            .cloned()
    }

    pub fn is_advertised(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    /// Registry names whose category is one of `categories`, in registry order.
    /// Unknown category tokens are ignored.
    pub fn filter_by_category<S: AsRef<str>>(&self, categories: &[S]) -> Vec<String> {
        let wanted: HashSet<Category> = categories
            .iter()
            .filter_map(|c| Category::parse(c.as_ref()))
            .collect();
        let Some(registry) = &self.registry else {
            return Vec::new();
        };
        registry
            .values()
            .filter(|d| wanted.contains(&d.category))
            .map(|d| d.name.clone())
            .collect()
    }

    pub async fn search_by_keyword(&self, query: &str, limit: usize) -> Vec<ScoredName> {
        let Some(registry) = &self.registry else {
            return Vec::new();
        };
        let mut ranked = self.scorer.score(query, registry).await;
        ranked.truncate(limit);
        ranked
    }

    pub async fn search(&self, request: &SearchRequest) -> SearchOutcome {
        let limit = request.limit.unwrap_or(self.limits.search_default_limit);
        let ranked = self.search_by_keyword(&request.query, limit).await;
        let results = match &self.registry {
            Some(registry) => ranked
                .into_iter()
                .filter_map(|hit| {
                    registry.get(&hit.name).map(|d| SearchHit {
                        name: hit.name,
                        description: d.description.clone(),
                        category: d.category,
                        relevance: format!("{:.3}", hit.score),
                    })
                })
                .collect(),
            None => Vec::new(),
        };
        SearchOutcome {
            query: request.query.clone(),
            degraded: self.is_degraded(),
            results,
        }
    }

    /// Replace the expansion with the capabilities matching `request`.
    ///
    /// Categories and keywords combine as an intersection; with neither, the
    /// default categories are used. The baseline is never affected.
    pub async fn select(&self, request: SelectionRequest) -> SelectionOutcome {
        let mut categories: Vec<String> = request
            .categories
            .iter()
            .filter(|c| Category::parse(c).is_some())
            .cloned()
            .collect();
        let keywords = request.keywords.clone();
        if categories.is_empty() && keywords.is_empty() {
            categories = self.limits.default_categories.clone();
            info!(
                "[Hub] select_tools called without parameters; using default categories: {}",
                categories.join(", ")
            );
        }

        let Some(registry) = &self.registry else {
            return SelectionOutcome {
                success: false,
                loaded_tools: 0,
                total_active: self.baseline.len(),
                categories,
                keywords,
                degraded: true,
                message: "Tool registry not available; only baseline tools are active".to_string(),
                tools: Vec::new(),
            };
        };

        let mut names = if categories.is_empty() {
            None
        } else {
            Some(self.filter_by_category(categories.as_slice()))
        };
        if !keywords.is_empty() {
            let ranked = self
                .search_by_keyword(&keywords.join(" "), KEYWORD_CANDIDATES)
                .await;
            names = Some(match names {
                Some(by_category) => {
                    let matched: HashSet<&str> = ranked.iter().map(|r| r.name.as_str()).collect();
                    by_category
                        .into_iter()
                        .filter(|name| matched.contains(name.as_str()))
                        .collect()
                }
                None => ranked.into_iter().map(|r| r.name).collect(),
            });
        }

        let cap = request
            .max_count
            .unwrap_or(self.limits.default_selection_size)
            .min(self.limits.max_selection_size);
        let baseline_names: HashSet<&str> = self.baseline.iter().map(|d| d.name.as_str()).collect();
        let selected: Vec<CapabilityDescriptor> = names
            .unwrap_or_default()
            .iter()
            .filter(|name| !baseline_names.contains(name.as_str()))
            .filter_map(|name| registry.get(name).cloned())
            .take(cap)
            .collect();

        let tools: Vec<SelectedTool> = selected
            .iter()
            .map(|d| SelectedTool {
                name: d.name.clone(),
                category: d.category,
            })
            .collect();
        let loaded_tools = selected.len();
        *self.expansion.write().unwrap_or_else(PoisonError::into_inner) = selected;
        let total_active = self.baseline.len() + loaded_tools;

        info!(
            "[Hub] Loaded {} tools. Total active: {}",
            loaded_tools, total_active
        );
        if self
            .events
            .send(CatalogEvent::ToolsListChanged { total_active })
            .is_err()
        {
            debug!("[Hub] No tools/list_changed subscribers");
        }

        SelectionOutcome {
            success: true,
            loaded_tools,
            total_active,
            categories,
            keywords,
            degraded: false,
            message: "Tools loaded. Client should refresh tool list automatically.".to_string(),
            tools,
        }
    }

    /// Tool count and description per category.
    ///
    /// Without a registry the counts come from the name pattern table.
    pub fn category_summary(&self) -> IndexMap<String, CategoryInfo> {
        match &self.registry {
            Some(registry) => {
                let mut counts: IndexMap<Category, usize> = IndexMap::new();
                for descriptor in registry.values() {
                    *counts.entry(descriptor.category).or_insert(0) += 1;
                }
                Category::ALL
                    .iter()
                    .filter_map(|c| {
                        counts.get(c).map(|count| {
                            (
                                c.as_str().to_string(),
                                CategoryInfo {
                                    count: *count,
                                    description: c.description(),
                                },
                            )
                        })
                    })
                    .collect()
            }
            None => Category::ALL
                .iter()
                .filter(|c| **c != Category::Other)
                .map(|c| {
                    (
                        c.as_str().to_string(),
                        CategoryInfo {
                            count: c.patterns().len(),
                            description: c.description(),
                        },
                    )
                })
                .collect(),
        }
    }
}
