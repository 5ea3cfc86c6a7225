use crate::call::CallError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndReason {
    LocalHangup,
    LocalReject,
    RemoteHangup,
    RemoteRejected,
    /// Ring timeout expired while dialing.
    NoAnswer,
    Failed(CallError),
}

impl EndReason {
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, EndReason::Failed(_))
    }
}
