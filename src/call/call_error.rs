use thiserror::Error;

use crate::call::CallState;
use crate::media::{DeviceError, SwitchError};
use crate::peer::{ConnectionState, NegotiationError};
use crate::signaling::{PeerId, TransportError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    #[error("call already in progress with {0}")]
    AlreadyInProgress(PeerId),
    #[error("no call with {0}")]
    NoSession(PeerId),
    #[error("{op} is not valid while {state:?}")]
    InvalidState {
        op: &'static str,
        state: CallState,
    },
    #[error("call was hung up while it was being set up")]
    Cancelled,
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error(transparent)]
    Negotiation(#[from] NegotiationError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("peer link lost connectivity ({0:?})")]
    Connectivity(ConnectionState),
    #[error("call session task is gone")]
    SessionGone,
}

impl CallError {
    /// Errors that end the call when they happen inside a session.
    #[must_use]
    pub fn ends_call(&self) -> bool {
        matches!(
            self,
            CallError::Cancelled
                | CallError::Negotiation(_)
                | CallError::Transport(_)
                | CallError::Connectivity(_)
        )
    }
}

impl From<SwitchError> for CallError {
    fn from(e: SwitchError) -> Self {
        match e {
            SwitchError::Device(d) => CallError::Device(d),
            SwitchError::Replace(n) => CallError::Negotiation(n),
        }
    }
}
