//! Outbound track bindings and the renegotiation they may require.

pub mod controller;
pub mod track_role;

pub use controller::{BindingChange, ControllerOutcome, RenegotiationController};
pub use track_role::TrackRole;
