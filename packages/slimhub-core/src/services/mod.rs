//! Application services layer.
//!
//! Orchestration that spans the session engine and the broadcast layer lives
//! here, between the API and the protocol modules.

pub mod playback;

pub use playback::{PlaybackService, PlaybackStarted, TrackSpec};
