//! RustyCall orchestrates one-to-one audio/video calls over a peer-to-peer
//! media link, coordinated through an out-of-band signaling channel.
//!
//! It provides the call core as a library and one binary:
//! - `call_relay`: a TCP relay that forwards call signaling between users.
//!
//! The connectivity layer, the capture devices and the signaling channel are
//! reached through traits; the `sim` module implements all of them in memory.

/// Remote stream aggregation into render-ready composites.
pub mod aggregator;
/// Call sessions, their state machine and the manager that owns them.
pub mod call;
/// Handles configuration loading and management.
pub mod config;
/// ICE candidate buffering.
pub mod ice;
/// Logging utilities for the application.
pub mod log;
/// Local capture, device selection and audio processing.
pub mod media;
/// The peer link boundary and its optional `webrtc` backend.
pub mod peer;
/// Outbound track bindings and renegotiation.
pub mod renegotiation;
/// Call signaling messages, wire codec, transport and relay.
pub mod signaling;
/// In-memory backends for tests and demos.
pub mod sim;
