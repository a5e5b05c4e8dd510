/*
[INPUT]:  Error sources (transport, server replies, serialization, configuration)
[OUTPUT]: Structured error types with context and retry hints
[POS]:    Error handling layer - unified error types for entire crate
[UPDATE]: When adding new error sources or improving error messages
*/

use serde_json::Value;
use thiserror::Error;

use crate::types::codes;

/// Main error type for the OKX v5 WebSocket client
#[derive(Error, Debug)]
pub enum OkxWsError {
    /// Transport failed to establish a connection
    #[error("Connect failed: {0}")]
    Connect(String),

    /// Operation attempted while the connection is not live
    #[error("Connection not available")]
    NotConnected,

    /// Reconnect budget spent without a live connection
    #[error("Reconnect failed after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },

    /// Server answered with a non-zero status code
    #[error("Server rejected request (code {code}): {message}")]
    ServerRejection {
        code: String,
        message: String,
        frame: Value,
    },

    /// Inbound frame that matched no routing rule
    #[error("Unclassifiable frame (event {event:?})")]
    UnclassifiableFrame { event: Option<String> },

    /// Inbound payload was not valid JSON
    #[error("Malformed inbound frame: {0}")]
    Parse(String),

    /// Trade op outside the supported catalogue
    #[error("Unknown trade op: {0}")]
    UnknownTradeOp(String),

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// WebSocket write failed or the session is gone
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Login signature could not be computed
    #[error("Signature error: {0}")]
    Signature(String),

    /// Reply did not arrive within the configured request timeout
    #[error("Request timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },
}

impl OkxWsError {
    /// Build a rejection from a server reply frame
    pub fn rejection(frame: Value) -> Self {
        let code = match frame.get("code") {
            Some(Value::String(code)) => code.clone(),
            Some(Value::Number(code)) => code.to_string(),
            _ => String::new(),
        };
        let message = frame
            .get("msg")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        OkxWsError::ServerRejection {
            code,
            message,
            frame,
        }
    }

    /// Check if the error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OkxWsError::Connect(_)
                | OkxWsError::NotConnected
                | OkxWsError::WebSocket(_)
                | OkxWsError::Timeout { .. }
        )
    }

    /// Check if error indicates authentication failure
    pub fn is_auth_error(&self) -> bool {
        match self {
            OkxWsError::ServerRejection { code, .. } => codes::is_login_failure(code),
            OkxWsError::Signature(_) => true,
            _ => false,
        }
    }

    /// Original server frame for rejections
    pub fn frame(&self) -> Option<&Value> {
        match self {
            OkxWsError::ServerRejection { frame, .. } => Some(frame),
            _ => None,
        }
    }
}

/// Result type alias for OKX WebSocket operations
pub type Result<T> = std::result::Result<T, OkxWsError>;
