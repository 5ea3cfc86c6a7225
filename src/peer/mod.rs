//! Boundary to the peer-to-peer media link.
//!
//! The call core talks to the connectivity layer only through [`PeerLink`] and
//! [`PeerLinkFactory`]. `sim` provides an in-memory link; the `webrtc-backend`
//! feature provides one over the `webrtc` crate.

pub mod connection_state;
pub mod ice_candidate;
pub mod link_config;
pub mod peer_error;
pub mod peer_link;
pub mod session_description;
pub mod signaling_state;
#[cfg(feature = "webrtc-backend")]
pub mod webrtc_link;

pub use connection_state::ConnectionState;
pub use ice_candidate::IceCandidate;
pub use link_config::{IceServer, PeerLinkConfig};
pub use peer_error::NegotiationError;
pub use peer_link::{PeerLink, PeerLinkEvent, PeerLinkEventHandler, PeerLinkFactory, SenderId};
pub use session_description::{SdpType, SessionDescription};
pub use signaling_state::SignalingState;
