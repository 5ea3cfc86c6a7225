use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("invalid signaling json: {0}")]
    Json(String),
}

impl From<serde_json::Error> for CodecError {
    fn from(e: serde_json::Error) -> Self {
        CodecError::Json(e.to_string())
    }
}

/// Outbound delivery failure. Never retried by the call core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("signaling transport disconnected")]
    Disconnected,
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("signaling send failed: {0}")]
    Io(String),
}
