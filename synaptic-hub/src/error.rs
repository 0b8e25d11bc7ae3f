//! Error taxonomy for the hub.
//!
//! Connection and timeout failures are transient and feed the retry policy.
//! Application failures carry the engine's own detail and are surfaced as-is.

use thiserror::Error;

pub type HubResult<T> = Result<T, HubError>;

#[derive(Debug, Error)]
pub enum HubError {
    #[error("Engine is not connected. Make sure the editor is open and connected to the hub.")]
    NotConnected,

    #[error("Engine command timeout: {operation} (id: {id})")]
    Timeout { operation: String, id: u64 },

    #[error("{0}")]
    Application(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Unknown or inactive tool: {0}. Call select_tools to load it first.")]
    UnknownCapability(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool registry error: {0}")]
    Registry(String),

    #[error(
        "Engine command failed after {attempts} attempts: {last}. \
         The engine may be restarting (e.g. recompiling scripts); try again shortly."
    )]
    RetriesExhausted { attempts: u32, last: Box<HubError> },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HubError {
    /// Whether another attempt may succeed without the caller changing anything.
    pub fn is_transient(&self) -> bool {
        matches!(self, HubError::NotConnected | HubError::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_connection_and_timeout_are_transient() {
        assert!(HubError::NotConnected.is_transient());
        assert!(HubError::Timeout {
            operation: "undo".to_string(),
            id: 1
        }
        .is_transient());
        assert!(!HubError::Application("boom".to_string()).is_transient());
        assert!(!HubError::Protocol("bad frame".to_string()).is_transient());
    }

    #[test]
    fn exhausted_error_names_last_cause_and_attempts() {
        let err = HubError::RetriesExhausted {
            attempts: 3,
            last: Box::new(HubError::NotConnected),
        };
        let text = err.to_string();
        assert!(text.contains("after 3 attempts"));
        assert!(text.contains("not connected"));
        assert!(text.contains("restarting"));
    }
}
