//! Audio sources for broadcast sessions.
//!
//! Providers are blocking and run on one dedicated worker thread. Everything
//! they produce crosses back into the async side through a bounded channel.

mod file;
mod worker;

pub use file::FileAudioProvider;
pub use worker::{
    AudioProvider, ProviderSink, SourceControl, SourceFeed, SourceMessage, SourceWorker,
};

use thiserror::Error;

/// Errors raised by audio providers and the worker that runs them.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("provider failed: {0}")]
    Provider(String),

    #[error("source worker is not running")]
    WorkerUnavailable,

    #[error("failed to spawn source worker: {0}")]
    Spawn(std::io::Error),
}
