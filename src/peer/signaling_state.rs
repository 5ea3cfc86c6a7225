/// Offer/answer state of a peer link.
///
/// Renegotiation offers may only be created from `Stable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalingState {
    Stable,
    HaveLocalOffer,
    HaveRemoteOffer,
    Closed,
}

impl SignalingState {
    #[must_use]
    pub fn is_stable(self) -> bool {
        self == SignalingState::Stable
    }
}
