use std::fmt;

use crate::media::MediaKind;
use crate::peer::{IceCandidate, SessionDescription};

/// Every message two endpoints exchange about a call.
#[derive(Debug, Clone, PartialEq)]
pub enum CallSignal {
    /// Proposes a call with the caller's initial offer.
    Request {
        media_kind: MediaKind,
        offer: SessionDescription,
    },
    Accept,
    Reject,
    /// Mid-call renegotiation offer.
    Offer { offer: SessionDescription },
    /// Answer to any offer, initial or renegotiation.
    Answer { answer: SessionDescription },
    IceCandidate { candidate: IceCandidate },
    /// Hangup for any reason. Safe to receive twice.
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    CallRequest,
    CallAccept,
    CallReject,
    CallOffer,
    CallAnswer,
    CallIceCandidate,
    CallEnd,
}

impl SignalKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SignalKind::CallRequest => "call_request",
            SignalKind::CallAccept => "call_accept",
            SignalKind::CallReject => "call_reject",
            SignalKind::CallOffer => "call_offer",
            SignalKind::CallAnswer => "call_answer",
            SignalKind::CallIceCandidate => "call_ice_candidate",
            SignalKind::CallEnd => "call_end",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl CallSignal {
    #[must_use]
    pub fn kind(&self) -> SignalKind {
        match self {
            CallSignal::Request { .. } => SignalKind::CallRequest,
            CallSignal::Accept => SignalKind::CallAccept,
            CallSignal::Reject => SignalKind::CallReject,
            CallSignal::Offer { .. } => SignalKind::CallOffer,
            CallSignal::Answer { .. } => SignalKind::CallAnswer,
            CallSignal::IceCandidate { .. } => SignalKind::CallIceCandidate,
            CallSignal::End => SignalKind::CallEnd,
        }
    }
}
