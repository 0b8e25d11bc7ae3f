//! The hub instance: owns every component and routes calls and frames between them.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::baseline::{essential_tools, ManagementTool};
use crate::catalog::{CapabilityCatalog, CatalogEvent, CatalogLimits, SearchRequest, SelectionRequest};
use crate::config::HubConfig;
use crate::connection::{ConnectionManager, Role};
use crate::correlator::RequestCorrelator;
use crate::error::{HubError, HubResult};
use crate::mcp;
use crate::protocol::{InboundFrame, OperationResult, OPERATION_RESULT};
use crate::registry::{CapabilityDescriptor, CapabilityRegistry, JsonFileRegistry};
use crate::relay::{is_relayed_result, Relay};
use crate::retry::{CallOutcome, RetryExecutor};
use crate::search::{EmbeddingScorer, OpenAiEmbedder, RelevanceScorer, TextMatchScorer};

/// Result of a tool invocation
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    /// Answered by the hub itself
    Management { content: Value, is_error: bool },
    /// Answered by the engine
    Engine(CallOutcome),
}

pub struct Gateway {
    config: HubConfig,
    connections: Arc<ConnectionManager>,
    correlator: Arc<RequestCorrelator>,
    executor: RetryExecutor,
    catalog: Arc<CapabilityCatalog>,
    relay: Relay,
}

impl Gateway {
    pub fn new(
        config: HubConfig,
        registry: &dyn CapabilityRegistry,
        scorer: Arc<dyn RelevanceScorer>,
    ) -> Self {
        Self::with_baseline(config, registry, scorer, essential_tools())
    }

    pub fn with_baseline(
        config: HubConfig,
        registry: &dyn CapabilityRegistry,
        scorer: Arc<dyn RelevanceScorer>,
        baseline: Vec<CapabilityDescriptor>,
    ) -> Self {
        let connections = Arc::new(ConnectionManager::new());
        let correlator = Arc::new(RequestCorrelator::new());
        let executor = RetryExecutor::new(
            connections.clone(),
            correlator.clone(),
            config.retry_policy(),
        );
        let catalog = Arc::new(CapabilityCatalog::new(
            registry.load(),
            baseline,
            scorer,
            CatalogLimits::from_config(&config),
        ));
        Self {
            config,
            connections,
            correlator,
            executor,
            catalog,
            relay: Relay::new(),
        }
    }

    /// Build a hub from configuration alone: registry file plus the
    /// embedding scorer when an endpoint is configured.
    pub fn from_config(config: HubConfig) -> Self {
        let registry = JsonFileRegistry::new(config.registry_path.clone());
        let scorer: Arc<dyn RelevanceScorer> = match &config.embedding {
            Some(embedding) => Arc::new(EmbeddingScorer::new(Arc::new(
                OpenAiEmbedder::from_config(embedding.clone()),
            ))),
            None => Arc::new(TextMatchScorer),
        };
        Self::new(config, &registry, scorer)
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn connections(&self) -> &Arc<ConnectionManager> {
        &self.connections
    }

    pub fn correlator(&self) -> &Arc<RequestCorrelator> {
        &self.correlator
    }

    pub fn catalog(&self) -> &Arc<CapabilityCatalog> {
        &self.catalog
    }

    /// Engine command for a tool name (configured prefix stripped)
    pub fn engine_command<'a>(&self, tool_name: &'a str) -> &'a str {
        let prefix = self.config.engine_command_prefix.as_str();
        if prefix.is_empty() {
            return tool_name;
        }
        tool_name.strip_prefix(prefix).unwrap_or(tool_name)
    }

    /// Invoke an advertised tool.
    ///
    /// Management tools are answered locally; everything else goes to the
    /// engine through the retry executor.
    pub async fn invoke(&self, name: &str, arguments: Value) -> HubResult<ToolOutput> {
        if !self.catalog.is_advertised(name) {
            return Err(HubError::UnknownCapability(name.to_string()));
        }
        let arguments = if arguments.is_null() {
            json!({})
        } else {
            arguments
        };

        if let Some(tool) = ManagementTool::from_name(name) {
            return self.invoke_management(tool, &arguments).await;
        }

        let command = self.engine_command(name);
        debug!("[Hub] Tool call: {} -> {}", name, command);
        let outcome = self.executor.call(command, &arguments).await?;
        Ok(ToolOutput::Engine(outcome))
    }

    async fn invoke_management(&self, tool: ManagementTool, arguments: &Value) -> HubResult<ToolOutput> {
        let (content, is_error) = match tool {
            ManagementTool::SelectTools => {
                let request = SelectionRequest::from_arguments(arguments)?;
                let outcome = self.catalog.select(request).await;
                let is_error = !outcome.success;
                (serde_json::to_value(outcome)?, is_error)
            }
            ManagementTool::ListCategories => (
                json!({
                    "categories": self.catalog.category_summary(),
                    "degraded": self.catalog.is_degraded(),
                }),
                false,
            ),
            ManagementTool::SearchTools => {
                let request = SearchRequest::from_arguments(arguments)?;
                let outcome = self.catalog.search(&request).await;
                (serde_json::to_value(outcome)?, false)
            }
        };
        Ok(ToolOutput::Management { content, is_error })
    }

    /// Route one text frame received from the engine connection.
    /// Malformed frames are logged and dropped.
    pub fn handle_engine_frame(&self, text: &str) {
        let frame = match InboundFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("[Hub] Dropping engine frame: {}", e);
                return;
            }
        };
        if frame.kind == OPERATION_RESULT && !is_relayed_result(&frame) {
            match OperationResult::from_frame(&frame) {
                Ok(result) => {
                    self.correlator.resolve(result);
                }
                Err(e) => warn!("[Hub] Dropping engine frame: {}", e),
            }
            return;
        }
        if let Err(e) = self.relay.forward(&self.connections, Role::Engine, &frame) {
            warn!("[Relay] Failed to forward {}: {}", frame.kind, e);
        }
    }

    /// Route one text frame received from the side-channel client
    pub fn handle_side_channel_frame(&self, text: &str) {
        let frame = match InboundFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("[Hub] Dropping side-channel frame: {}", e);
                return;
            }
        };
        if let Err(e) = self
            .relay
            .forward(&self.connections, Role::SideChannel, &frame)
        {
            warn!("[Relay] Failed to forward {}: {}", frame.kind, e);
        }
    }

    /// Push `notifications/tools/list_changed` to the tool-invocation session
    /// after every selection. Ends when the hub is dropped.
    pub fn spawn_notifier(&self) -> JoinHandle<()> {
        let mut events = self.catalog.subscribe();
        let connections = self.connections.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(CatalogEvent::ToolsListChanged { total_active }) => {
                        match connections.send(Role::ToolInvocation, mcp::tools_list_changed()) {
                            Ok(()) => info!(
                                "[Hub] Sent tools/list_changed ({} tools active)",
                                total_active
                            ),
                            Err(e) => debug!("[Hub] tools/list_changed not delivered: {}", e),
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        debug!("[Hub] Notifier skipped {} catalog events", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}
