//! Error types for the MCP Everything server.

use thiserror::Error;

use crate::mcp::protocol::error_codes;

/// Result type alias for server operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the server.
#[derive(Error, Debug)]
pub enum Error {
    // ===== Registry Errors =====
    #[error("Unknown {kind}: {name}")]
    UnknownCapability { kind: String, name: String },

    #[error("Duplicate {kind} name: {name}")]
    DuplicateName { kind: String, name: String },

    // ===== Resource Errors =====
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Malformed cursor: {0}")]
    MalformedCursor(String),

    #[error("Invalid URI template: {0}")]
    InvalidTemplate(String),

    // ===== MCP Errors =====
    #[error("MCP protocol error: {0}")]
    McpProtocol(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Invalid tool arguments: {0}")]
    InvalidToolArguments(String),

    #[error("Sampling request failed: {0}")]
    Sampling(String),

    #[error("Server busy: {0} requests already queued")]
    Busy(usize),

    // ===== Transport Errors =====
    #[error("Transport closed")]
    TransportClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // ===== Internal Errors =====
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Timeout: operation timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("Cancelled: operation was cancelled")]
    Cancelled,
}

impl Error {
    /// Create an unknown-capability error.
    pub fn unknown(kind: impl ToString, name: impl Into<String>) -> Self {
        Self::UnknownCapability {
            kind: kind.to_string(),
            name: name.into(),
        }
    }

    /// Create a duplicate-name error.
    pub fn duplicate(kind: impl ToString, name: impl Into<String>) -> Self {
        Self::DuplicateName {
            kind: kind.to_string(),
            name: name.into(),
        }
    }

    /// JSON-RPC error code used when this error is surfaced to the peer.
    pub fn rpc_code(&self) -> i32 {
        match self {
            Self::UnknownCapability { .. } | Self::MethodNotFound(_) => {
                error_codes::METHOD_NOT_FOUND
            }
            Self::InvalidParams(_) | Self::InvalidToolArguments(_) | Self::InvalidTemplate(_) => {
                error_codes::INVALID_PARAMS
            }
            Self::ResourceNotFound(_) => error_codes::RESOURCE_NOT_FOUND,
            Self::McpProtocol(_) => error_codes::INVALID_REQUEST,
            _ => error_codes::INTERNAL_ERROR,
        }
    }

    /// Whether the session can keep serving after this error.
    ///
    /// Only transport loss ends a session; every other error is answered to
    /// the peer as a request-level error.
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, Self::TransportClosed)
    }
}
