//! JSON wire form of call signals.
//!
//! Every frame is `{"event": <name>, "data": {...}}`. Clients address frames
//! with `to_user_id`; the relay rewrites them for the recipient with
//! `from_user_id` and renames the lifecycle events:
//!
//! | client → relay       | relay → client       |
//! |----------------------|----------------------|
//! | `call_request`       | `call_incoming`      |
//! | `call_accept`        | `call_accepted`      |
//! | `call_reject`        | `call_rejected`      |
//! | `call_end`           | `call_ended`         |
//! | `call_offer`, `call_answer`, `call_ice_candidate` | same name |

use serde::{Deserialize, Serialize};

use crate::media::MediaKind;
use crate::peer::{IceCandidate, SessionDescription};
use crate::signaling::{CallSignal, CodecError, InboundMsg, OutboundMsg, PeerId};

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
enum OutboundWire {
    CallRequest {
        to_user_id: PeerId,
        #[serde(rename = "type", default)]
        media_kind: MediaKind,
        offer: SessionDescription,
    },
    CallAccept {
        to_user_id: PeerId,
    },
    CallReject {
        to_user_id: PeerId,
    },
    CallOffer {
        to_user_id: PeerId,
        offer: SessionDescription,
    },
    CallAnswer {
        to_user_id: PeerId,
        answer: SessionDescription,
    },
    CallIceCandidate {
        to_user_id: PeerId,
        candidate: IceCandidate,
    },
    CallEnd {
        to_user_id: PeerId,
    },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
enum InboundWire {
    CallIncoming {
        from_user_id: PeerId,
        #[serde(rename = "type", default)]
        media_kind: MediaKind,
        offer: SessionDescription,
    },
    CallAccepted {
        from_user_id: PeerId,
    },
    CallRejected {
        from_user_id: PeerId,
    },
    CallOffer {
        from_user_id: PeerId,
        offer: SessionDescription,
    },
    CallAnswer {
        from_user_id: PeerId,
        answer: SessionDescription,
    },
    CallIceCandidate {
        from_user_id: PeerId,
        candidate: IceCandidate,
    },
    CallEnded {
        from_user_id: PeerId,
    },
}

impl From<OutboundMsg> for OutboundWire {
    fn from(msg: OutboundMsg) -> Self {
        let to_user_id = msg.to;
        match msg.signal {
            CallSignal::Request { media_kind, offer } => OutboundWire::CallRequest {
                to_user_id,
                media_kind,
                offer,
            },
            CallSignal::Accept => OutboundWire::CallAccept { to_user_id },
            CallSignal::Reject => OutboundWire::CallReject { to_user_id },
            CallSignal::Offer { offer } => OutboundWire::CallOffer { to_user_id, offer },
            CallSignal::Answer { answer } => OutboundWire::CallAnswer { to_user_id, answer },
            CallSignal::IceCandidate { candidate } => OutboundWire::CallIceCandidate {
                to_user_id,
                candidate,
            },
            CallSignal::End => OutboundWire::CallEnd { to_user_id },
        }
    }
}

impl From<OutboundWire> for OutboundMsg {
    fn from(wire: OutboundWire) -> Self {
        let (to, signal) = match wire {
            OutboundWire::CallRequest {
                to_user_id,
                media_kind,
                offer,
            } => (to_user_id, CallSignal::Request { media_kind, offer }),
            OutboundWire::CallAccept { to_user_id } => (to_user_id, CallSignal::Accept),
            OutboundWire::CallReject { to_user_id } => (to_user_id, CallSignal::Reject),
            OutboundWire::CallOffer { to_user_id, offer } => {
                (to_user_id, CallSignal::Offer { offer })
            }
            OutboundWire::CallAnswer { to_user_id, answer } => {
                (to_user_id, CallSignal::Answer { answer })
            }
            OutboundWire::CallIceCandidate {
                to_user_id,
                candidate,
            } => (to_user_id, CallSignal::IceCandidate { candidate }),
            OutboundWire::CallEnd { to_user_id } => (to_user_id, CallSignal::End),
        };
        OutboundMsg { to, signal }
    }
}

impl From<InboundMsg> for InboundWire {
    fn from(msg: InboundMsg) -> Self {
        let from_user_id = msg.from;
        match msg.signal {
            CallSignal::Request { media_kind, offer } => InboundWire::CallIncoming {
                from_user_id,
                media_kind,
                offer,
            },
            CallSignal::Accept => InboundWire::CallAccepted { from_user_id },
            CallSignal::Reject => InboundWire::CallRejected { from_user_id },
            CallSignal::Offer { offer } => InboundWire::CallOffer {
                from_user_id,
                offer,
            },
            CallSignal::Answer { answer } => InboundWire::CallAnswer {
                from_user_id,
                answer,
            },
            CallSignal::IceCandidate { candidate } => InboundWire::CallIceCandidate {
                from_user_id,
                candidate,
            },
            CallSignal::End => InboundWire::CallEnded { from_user_id },
        }
    }
}

impl From<InboundWire> for InboundMsg {
    fn from(wire: InboundWire) -> Self {
        let (from, signal) = match wire {
            InboundWire::CallIncoming {
                from_user_id,
                media_kind,
                offer,
            } => (from_user_id, CallSignal::Request { media_kind, offer }),
            InboundWire::CallAccepted { from_user_id } => (from_user_id, CallSignal::Accept),
            InboundWire::CallRejected { from_user_id } => (from_user_id, CallSignal::Reject),
            InboundWire::CallOffer {
                from_user_id,
                offer,
            } => (from_user_id, CallSignal::Offer { offer }),
            InboundWire::CallAnswer {
                from_user_id,
                answer,
            } => (from_user_id, CallSignal::Answer { answer }),
            InboundWire::CallIceCandidate {
                from_user_id,
                candidate,
            } => (from_user_id, CallSignal::IceCandidate { candidate }),
            InboundWire::CallEnded { from_user_id } => (from_user_id, CallSignal::End),
        };
        InboundMsg { from, signal }
    }
}

/// # Errors
/// [`CodecError::Json`] if serialization fails.
pub fn encode_outbound(msg: &OutboundMsg) -> Result<String, CodecError> {
    Ok(serde_json::to_string(&OutboundWire::from(msg.clone()))?)
}

/// # Errors
/// [`CodecError::Json`] for malformed JSON or an unknown event.
pub fn decode_outbound(text: &str) -> Result<OutboundMsg, CodecError> {
    Ok(serde_json::from_str::<OutboundWire>(text)?.into())
}

/// # Errors
/// [`CodecError::Json`] if serialization fails.
pub fn encode_inbound(msg: &InboundMsg) -> Result<String, CodecError> {
    Ok(serde_json::to_string(&InboundWire::from(msg.clone()))?)
}

/// # Errors
/// [`CodecError::Json`] for malformed JSON or an unknown event.
pub fn decode_inbound(text: &str) -> Result<InboundMsg, CodecError> {
    Ok(serde_json::from_str::<InboundWire>(text)?.into())
}
