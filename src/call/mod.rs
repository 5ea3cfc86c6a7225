//! Call orchestration: one actor per call, owned by the [`CallManager`].

pub mod call_config;
pub mod call_error;
pub mod call_state;
mod context;
pub mod directory;
pub mod end_reason;
pub mod events;
mod handle;
pub mod manager;
mod session;
mod session_input;

pub use call_config::{
    CallConfig, DEFAULT_EARLY_CANDIDATE_LIMIT, DEFAULT_RING_TIMEOUT, DEFAULT_STUN_SERVERS,
};
pub use call_error::CallError;
pub use call_state::{CallState, Direction};
pub use context::CallServices;
pub use directory::{PeerDirectory, StaticDirectory, display_label};
pub use end_reason::EndReason;
pub use events::CallEvent;
pub use manager::CallManager;
