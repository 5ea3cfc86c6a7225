//! In-memory backends for every seam of the call core.
//!
//! They keep enough bookkeeping to assert on what the core did: candidates
//! applied, senders bound, tracks captured and stopped, messages sent.

pub mod media_devices;
pub mod peer_link;
pub mod transport;

pub use media_devices::{OutputRoute, SimMediaDevices};
pub use peer_link::{SimPeerLink, SimPeerLinkFactory};
pub use transport::SimTransport;
