//! Fire-and-forget forwarding between the engine and the side-channel client.
//!
//! Only the message kinds listed in [`RelayKind`] are forwarded. Nothing here
//! is correlated or retried.

use serde_json::{json, Value};
use tracing::debug;

use crate::connection::{ConnectionManager, Role};
use crate::error::HubResult;
use crate::protocol::{InboundFrame, OPERATION_RESULT, TOOL_CALL};

const DEFAULT_PROJECT_NAME: &str = "Unity Project";

/// Marks ids of relayed commands so their results never reach the correlator,
/// whose ids are plain integers
pub const RELAYED_ID_PREFIX: &str = "relay-";

fn relayed_id(id: Option<&Value>) -> Value {
    let raw = match id {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };
    Value::String(format!("{}{}", RELAYED_ID_PREFIX, raw))
}

/// Undo [`relayed_id`]; numeric ids come back as numbers
fn original_id(id: &str) -> Value {
    let raw = id.strip_prefix(RELAYED_ID_PREFIX).unwrap_or(id);
    match raw.parse::<u64>() {
        Ok(n) => Value::from(n),
        Err(_) => Value::String(raw.to_string()),
    }
}

/// Whether an engine `operation_result` answers a relayed command
pub fn is_relayed_result(frame: &InboundFrame) -> bool {
    frame.kind == OPERATION_RESULT
        && frame
            .get_str("id")
            .map_or(false, |id| id.starts_with(RELAYED_ID_PREFIX))
}

/// Relayed message kinds, keyed by where they come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayKind {
    /// Engine chat input, delivered to the side channel as a user message
    ChatMessage,
    /// Engine progress report, delivered verbatim
    Progress,
    /// Side-channel reply, delivered to the engine as an assistant message
    AssistantReply,
    /// Side-channel command, delivered to the engine uncorrelated
    ExecuteTool,
    /// Engine answer to a relayed command, returned to the side channel
    RelayedResult,
}

impl RelayKind {
    pub fn lookup(source: Role, kind: &str) -> Option<RelayKind> {
        match (source, kind) {
            (Role::Engine, "chat_message") => Some(RelayKind::ChatMessage),
            (Role::Engine, "progress") => Some(RelayKind::Progress),
            (Role::SideChannel, "chat_response") | (Role::SideChannel, "assistant_response") => {
                Some(RelayKind::AssistantReply)
            }
            (Role::SideChannel, "execute_tool") => Some(RelayKind::ExecuteTool),
            (Role::Engine, OPERATION_RESULT) => Some(RelayKind::RelayedResult),
            _ => None,
        }
    }

    pub fn destination(&self) -> Role {
        match self {
            RelayKind::ChatMessage | RelayKind::Progress | RelayKind::RelayedResult => {
                Role::SideChannel
            }
            RelayKind::AssistantReply | RelayKind::ExecuteTool => Role::Engine,
        }
    }

    /// Rewrite the inbound frame into what the destination expects
    pub fn rewrite(&self, frame: &InboundFrame) -> Value {
        let field = |key: &str| frame.get(key).cloned().unwrap_or(Value::Null);
        match self {
            RelayKind::ChatMessage => json!({
                "type": "user_message",
                "content": field("message"),
                "context": {
                    "source": "unity",
                    "project": frame
                        .get_str("projectName")
                        .filter(|p| !p.is_empty())
                        .unwrap_or(DEFAULT_PROJECT_NAME),
                },
            }),
            RelayKind::Progress => Value::Object(frame.body.clone()),
            RelayKind::AssistantReply => json!({
                "type": "assistant_message",
                "content": field("content"),
            }),
            RelayKind::RelayedResult => {
                let mut body = frame.body.clone();
                if let Some(id) = frame.get_str("id") {
                    body.insert("id".to_string(), original_id(id));
                }
                Value::Object(body)
            }
            RelayKind::ExecuteTool => json!({
                "type": TOOL_CALL,
                "command": field("tool"),
                "parameters": frame.get("parameters").cloned().unwrap_or_else(|| json!({})),
                "id": relayed_id(frame.get("id")),
            }),
        }
    }
}

/// What happened to a relayed frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    Forwarded(Role),
    /// Destination has no live connection
    NoDestination(Role),
    /// Not a relayed kind for this source
    Ignored,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Relay;

impl Relay {
    pub fn new() -> Self {
        Self
    }

    pub fn forward(
        &self,
        connections: &ConnectionManager,
        source: Role,
        frame: &InboundFrame,
    ) -> HubResult<RelayOutcome> {
        let Some(kind) = RelayKind::lookup(source, &frame.kind) else {
            debug!("[Relay] Ignoring {} frame from {}", frame.kind, source);
            return Ok(RelayOutcome::Ignored);
        };
        let destination = kind.destination();
        let text = serde_json::to_string(&kind.rewrite(frame))?;
        match connections.send(destination, text) {
            Ok(()) => {
                debug!("[Relay] {} -> {} ({:?})", source, destination, kind);
                Ok(RelayOutcome::Forwarded(destination))
            }
            Err(_) => {
                debug!(
                    "[Relay] Dropping {} from {}: no {} connection",
                    frame.kind, source, destination
                );
                Ok(RelayOutcome::NoDestination(destination))
            }
        }
    }
}
