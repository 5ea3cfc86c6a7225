use thiserror::Error;

use crate::peer::SignalingState;

/// Failures of the offer/answer machinery and of track operations on a link.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NegotiationError {
    #[error("{op} is not allowed in signaling state {state:?}")]
    InvalidState {
        op: &'static str,
        state: SignalingState,
    },
    #[error("malformed session description: {0}")]
    Malformed(String),
    #[error("remote description rejected: {0}")]
    Rejected(String),
    #[error("peer link is closed")]
    Closed,
    #[error("unknown sender {0}")]
    UnknownSender(u64),
    #[error("track binding conflict: {0}")]
    Binding(String),
    #[error("link backend error: {0}")]
    Backend(String),
}
