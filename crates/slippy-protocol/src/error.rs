//! Error types for the slippy protocol.

use thiserror::Error;

/// Errors that can occur while decoding client requests or serial frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A client request was not a well-formed envelope, or its arguments
    /// had the wrong shape or type.
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// A client asked for a function the router does not implement.
    #[error("unknown function: {0}")]
    UnknownFunction(String),

    /// A `JSON:` line from the device could not be decoded into a mesh packet.
    #[error("malformed mesh frame: {0}")]
    MalformedFrame(String),

    /// A partial line grew past the codec limit before a newline arrived.
    #[error("buffer overflow: max {max} bytes, got {actual}")]
    BufferOverflow { max: usize, actual: usize },

    /// An outbound event could not be serialized.
    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ProtocolError {
    /// Create a malformed request error.
    pub fn malformed(message: impl Into<String>) -> Self {
        ProtocolError::MalformedRequest(message.into())
    }

    /// Short, stable label for the error kind (used as a metric label).
    pub fn kind(&self) -> &'static str {
        match self {
            ProtocolError::MalformedRequest(_) => "malformed_request",
            ProtocolError::UnknownFunction(_) => "unknown_function",
            ProtocolError::MalformedFrame(_) => "malformed_frame",
            ProtocolError::BufferOverflow { .. } => "buffer_overflow",
            ProtocolError::Encode(_) => "encode",
        }
    }
}

/// Result type alias for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
