use thiserror::Error;

use crate::peer::NegotiationError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("permission to capture {0} was denied")]
    PermissionDenied(String),
    #[error("no device matches {0}")]
    NotFound(String),
    #[error("device unavailable: {0}")]
    Unavailable(String),
}

/// Why an in-place device switch did not happen. The previous track stays bound.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SwitchError {
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("sender swap failed: {0}")]
    Replace(#[from] NegotiationError),
}
