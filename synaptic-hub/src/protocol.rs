//! Wire frames exchanged with the engine and the side-channel client.
//!
//! Every frame is a JSON object carrying a `type` tag. The engine client
//! expects `tool_call` frames and answers with `operation_result`.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{HubError, HubResult};

pub const TOOL_CALL: &str = "tool_call";
pub const OPERATION_RESULT: &str = "operation_result";

/// Correlated command sent to the engine
#[derive(Debug, Serialize)]
pub struct InvokeFrame<'a> {
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub tool: &'a str,
    pub command: &'a str,
    pub parameters: &'a Value,
}

impl<'a> InvokeFrame<'a> {
    pub fn new(id: u64, command: &'a str, parameters: &'a Value) -> Self {
        Self {
            id,
            kind: TOOL_CALL,
            tool: command,
            command,
            parameters,
        }
    }
}

/// Any inbound frame, split into its `type` tag and the remaining fields
#[derive(Debug, Clone, PartialEq)]
pub struct InboundFrame {
    pub kind: String,
    pub body: Map<String, Value>,
}

impl InboundFrame {
    pub fn parse(text: &str) -> HubResult<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| HubError::Protocol(format!("unparseable frame: {}", e)))?;
        let Value::Object(body) = value else {
            return Err(HubError::Protocol("frame is not a JSON object".to_string()));
        };
        let kind = body
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| HubError::Protocol("frame has no `type`".to_string()))?
            .to_string();
        Ok(Self { kind, body })
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.body.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.body.get(key).and_then(Value::as_str)
    }
}

/// Engine answer to a correlated command
#[derive(Debug, Clone, PartialEq)]
pub struct OperationResult {
    pub id: u64,
    pub success: bool,
    pub content: Value,
}

impl OperationResult {
    /// Read an `operation_result` frame.
    ///
    /// The id may be a number or a numeric string. Success is taken from a
    /// top-level `success`, then from `data.success`; a frame with neither is
    /// a legacy frame and counts as successful unless it has an `error`.
    pub fn from_frame(frame: &InboundFrame) -> HubResult<Self> {
        if frame.kind != OPERATION_RESULT {
            return Err(HubError::Protocol(format!(
                "expected {}, got {}",
                OPERATION_RESULT, frame.kind
            )));
        }

        let id = match frame.get("id") {
            Some(Value::Number(n)) => n.as_u64(),
            Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
            _ => None,
        }
        .ok_or_else(|| HubError::Protocol("operation_result without a valid id".to_string()))?;

        let error = frame.get("error").filter(|e| !e.is_null());
        let success = frame
            .get("success")
            .and_then(Value::as_bool)
            .or_else(|| {
                frame
                    .get("data")
                    .and_then(|d| d.get("success"))
                    .and_then(Value::as_bool)
            })
            .unwrap_or(error.is_none());

        let content = frame
            .get("content")
            .filter(|c| !c.is_null())
            .or(error)
            .cloned()
            .unwrap_or(Value::Null);

        Ok(Self {
            id,
            success,
            content,
        })
    }

    /// Human-readable failure detail
    pub fn error_detail(&self) -> String {
        match &self.content {
            Value::String(s) if !s.is_empty() => s.clone(),
            Value::Null => "Engine command failed".to_string(),
            Value::String(_) => "Engine command failed".to_string(),
            other => other.to_string(),
        }
    }
}
