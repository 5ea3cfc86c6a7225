use std::sync::Arc;

use crate::aggregator::CompositeStream;
use crate::call::{CallState, EndReason};
use crate::media::MediaKind;
use crate::signaling::PeerId;

/// Notifications for the consumer of a [`CallManager`](crate::call::CallManager).
#[derive(Debug, Clone)]
pub enum CallEvent {
    IncomingCall {
        peer: PeerId,
        label: String,
        media_kind: MediaKind,
    },
    StateChanged {
        peer: PeerId,
        state: CallState,
    },
    /// New composite of the peer's live tracks, ready to render.
    RemoteStream {
        peer: PeerId,
        stream: Arc<CompositeStream>,
    },
    Ended {
        peer: PeerId,
        reason: EndReason,
    },
}
