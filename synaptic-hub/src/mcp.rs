//! JSON-RPC 2.0 tool surface for the tool-invocation session.
//!
//! Implements `initialize`, `ping`, `tools/list` and `tools/call`. Tool
//! failures are reported as `isError` results rather than JSON-RPC errors so
//! callers always see the engine's message.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::HubError;
use crate::gateway::{Gateway, ToolOutput};

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "synaptic-hub";

const PARSE_ERROR: i32 = -32700;
const INVALID_PARAMS: i32 = -32602;
const METHOD_NOT_FOUND: i32 = -32601;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MCPRequest {
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MCPResponse {
    pub jsonrpc: String,
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<MCPError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MCPError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

fn jsonrpc_version() -> String {
    "2.0".to_string()
}

impl MCPResponse {
    fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            id,
            result: Some(result),
            error: None,
        }
    }

    fn failure(id: Option<Value>, code: i32, message: String) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            id,
            result: None,
            error: Some(MCPError {
                code,
                message,
                data: None,
            }),
        }
    }
}

/// Notification sent whenever the advertised tool set changes
pub fn tools_list_changed() -> String {
    json!({
        "jsonrpc": "2.0",
        "method": "notifications/tools/list_changed"
    })
    .to_string()
}

/// Render a tool result as MCP text content
fn text_content(value: &Value) -> Value {
    let text = match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    };
    json!([{ "type": "text", "text": text }])
}

fn error_result(message: String) -> Value {
    json!({
        "content": text_content(&json!({ "error": message })),
        "isError": true
    })
}

/// Handle one inbound JSON-RPC message. Returns the serialized reply, or
/// `None` for notifications.
pub async fn handle_message(gateway: &Gateway, text: &str) -> Option<String> {
    let response = match serde_json::from_str::<MCPRequest>(text) {
        Ok(request) => handle_request(gateway, request).await?,
        Err(e) => MCPResponse::failure(None, PARSE_ERROR, format!("Parse error: {}", e)),
    };
    match serde_json::to_string(&response) {
        Ok(json) => Some(json),
        Err(e) => {
            warn!("[Hub] Failed to serialize response: {}", e);
            None
        }
    }
}

pub async fn handle_request(gateway: &Gateway, request: MCPRequest) -> Option<MCPResponse> {
    let Some(id) = request.id.clone() else {
        debug!("[Hub] Notification {}", request.method);
        return None;
    };
    let response = match request.method.as_str() {
        "initialize" => MCPResponse::success(Some(id), initialize()),
        "ping" => MCPResponse::success(Some(id), json!({})),
        "tools/list" => MCPResponse::success(Some(id), tools_list(gateway)),
        "tools/call" => match tools_call(gateway, &request.params).await {
            Ok(result) => MCPResponse::success(Some(id), result),
            Err(message) => MCPResponse::failure(Some(id), INVALID_PARAMS, message),
        },
        other => MCPResponse::failure(
            Some(id),
            METHOD_NOT_FOUND,
            format!("Method not found: {}", other),
        ),
    };
    Some(response)
}

fn initialize() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {
            "tools": { "listChanged": true }
        },
        "serverInfo": {
            "name": SERVER_NAME,
            "version": env!("CARGO_PKG_VERSION")
        }
    })
}

fn tools_list(gateway: &Gateway) -> Value {
    let catalog = gateway.catalog();
    let tools: Vec<Value> = catalog
        .advertised()
        .into_iter()
        .map(|tool| {
            json!({
                "name": tool.name,
                "title": tool.title,
                "description": tool.description,
                "inputSchema": tool.parameter_schema.to_json(),
            })
        })
        .collect();
    debug!("[Hub] tools/list returning {} tools", tools.len());

    let mut result = json!({ "tools": tools });
    if catalog.is_degraded() {
        result["_meta"] = json!({ "degraded": true });
    }
    result
}

async fn tools_call(gateway: &Gateway, params: &Value) -> Result<Value, String> {
    let name = params
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| "Missing tool name".to_string())?;
    let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);

    let result = match gateway.invoke(name, arguments).await {
        Ok(ToolOutput::Management { content, is_error }) => {
            let mut result = json!({ "content": text_content(&content) });
            if is_error {
                result["isError"] = json!(true);
            }
            result
        }
        Ok(ToolOutput::Engine(outcome)) => {
            let mut result = json!({ "content": text_content(&outcome.content) });
            if outcome.retried() {
                result["_meta"] = json!({ "retryAttempts": outcome.attempts });
            }
            result
        }
        Err(e) => {
            if !matches!(e, HubError::Application(_)) {
                warn!("[Hub] {} failed: {}", name, e);
            }
            error_result(e.to_string())
        }
    };
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HubConfig;
    use crate::registry::StaticRegistry;
    use crate::search::TextMatchScorer;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn gateway() -> Gateway {
        Gateway::new(
            HubConfig::default(),
            &StaticRegistry::unavailable(),
            Arc::new(TextMatchScorer),
        )
    }

    async fn call(gateway: &Gateway, request: Value) -> Value {
        let reply = handle_message(gateway, &request.to_string()).await.unwrap();
        serde_json::from_str(&reply).unwrap()
    }

    #[tokio::test]
    async fn initialize_advertises_list_changed() {
        let reply = call(&gateway(), json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"})).await;
        assert_eq!(reply["result"]["protocolVersion"], json!(PROTOCOL_VERSION));
        assert_eq!(reply["result"]["capabilities"]["tools"]["listChanged"], json!(true));
    }

    #[tokio::test]
    async fn notifications_get_no_reply() {
        let gateway = gateway();
        let reply = handle_message(
            &gateway,
            r#"{"jsonrpc": "2.0", "method": "notifications/initialized"}"#,
        )
        .await;
        assert!(reply.is_none());
    }

    #[tokio::test]
    async fn degraded_list_is_flagged() {
        let reply = call(&gateway(), json!({"jsonrpc": "2.0", "id": "a", "method": "tools/list"})).await;
        assert_eq!(reply["id"], json!("a"));
        assert_eq!(reply["result"]["tools"].as_array().unwrap().len(), 8);
        assert_eq!(reply["result"]["_meta"]["degraded"], json!(true));
    }

    #[tokio::test]
    async fn engine_failures_are_tool_errors() {
        let reply = call(
            &gateway(),
            json!({
                "jsonrpc": "2.0",
                "id": 2,
                "method": "tools/call",
                "params": {"name": "nonexistent_tool", "arguments": {}}
            }),
        )
        .await;
        assert_eq!(reply["result"]["isError"], json!(true));
        let text = reply["result"]["content"][0]["text"].as_str().unwrap();
        assert!(text.contains("nonexistent_tool"));
    }

    #[tokio::test]
    async fn unknown_method_and_parse_errors() {
        let gateway = gateway();
        let reply = call(&gateway, json!({"jsonrpc": "2.0", "id": 3, "method": "resources/list"})).await;
        assert_eq!(reply["error"]["code"], json!(METHOD_NOT_FOUND));

        let reply: Value =
            serde_json::from_str(&handle_message(&gateway, "{oops").await.unwrap()).unwrap();
        assert_eq!(reply["error"]["code"], json!(PARSE_ERROR));
        assert_eq!(reply["id"], Value::Null);
    }
}
