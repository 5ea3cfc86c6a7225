use std::sync::Arc;

use async_trait::async_trait;

use crate::aggregator::{RemoteStream, RemoteTrack};
use crate::media::MediaTrack;
use crate::peer::{
    ConnectionState, IceCandidate, NegotiationError, PeerLinkConfig, SessionDescription,
    SignalingState,
};

/// Handle to an outbound sender slot on a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SenderId(pub u64);

/// Events a link raises towards its owning session.
#[derive(Debug, Clone)]
pub enum PeerLinkEvent {
    /// A remote track arrived, grouped under the remote stream it belongs to.
    Track {
        track: RemoteTrack,
        stream: RemoteStream,
    },
    /// A remote track stopped producing media.
    TrackEnded { track_id: String },
    /// A local candidate to relay to the peer.
    IceCandidate(IceCandidate),
    ConnectionState(ConnectionState),
    SignalingState(SignalingState),
}

pub type PeerLinkEventHandler = Arc<dyn Fn(PeerLinkEvent) + Send + Sync>;

/// One peer-to-peer media link.
///
/// Methods mirror the offer/answer model: a description must be set locally
/// before it is sent, and candidates can only be applied once a remote
/// description is in place.
#[async_trait]
pub trait PeerLink: Send + Sync {
    async fn create_offer(&self) -> Result<SessionDescription, NegotiationError>;
    async fn create_answer(&self) -> Result<SessionDescription, NegotiationError>;
    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), NegotiationError>;
    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), NegotiationError>;
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), NegotiationError>;

    async fn add_track(&self, track: &MediaTrack) -> Result<SenderId, NegotiationError>;
    /// Swaps the track feeding `sender` without renegotiation. `None` mutes the slot.
    async fn replace_track(
        &self,
        sender: SenderId,
        track: Option<&MediaTrack>,
    ) -> Result<(), NegotiationError>;
    async fn remove_track(&self, sender: SenderId) -> Result<(), NegotiationError>;

    fn signaling_state(&self) -> SignalingState;
    fn has_remote_description(&self) -> bool;

    /// Closes the link. Idempotent; never fails.
    async fn close(&self);
}

#[async_trait]
pub trait PeerLinkFactory: Send + Sync {
    async fn create(
        &self,
        config: &PeerLinkConfig,
        events: PeerLinkEventHandler,
    ) -> Result<Arc<dyn PeerLink>, NegotiationError>;
}
