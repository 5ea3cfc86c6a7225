//! Connectivity candidate handling for a call session.

pub mod candidate_buffer;

pub use candidate_buffer::CandidateBuffer;
