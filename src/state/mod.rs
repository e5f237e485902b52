//! State module for tracking ingestion progress
//!
//! # Components
//!
//! - `ItemStatus`: Stage-completion flags stored per item in the registry
//! - `Stage`: The processing stages the pending-work selector understands
//! - `TranscriptSource`: Provenance of an acquired transcript
//! - `AttemptState`: The retry state machine for one strategy attempt sequence

mod attempt_state;
mod item_status;

// Re-export main types
pub use attempt_state::AttemptState;
pub use item_status::{ItemStatus, Stage, TranscriptSource};
