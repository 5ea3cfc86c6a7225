/// Lifecycle of one call.
///
/// `Ringing` only occurs on the callee. `Ended` and `Failed` are terminal;
/// `Failed` is used when the call ended because of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallState {
    Idle,
    Dialing,
    Ringing,
    Connecting,
    Active,
    Ending,
    Ended,
    Failed,
}

impl CallState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, CallState::Ended | CallState::Failed)
    }

    #[must_use]
    pub fn is_live(self) -> bool {
        !self.is_terminal()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Outgoing,
    Incoming,
}
