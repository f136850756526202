//! Synchronized broadcast of one audio source to every connected player.
//!
//! [`BroadcastSession`] is the pure state machine (barrier, lock-step fan-out,
//! backpressure); [`BroadcastCoordinator`] owns the live session, the player
//! roster and the source feed, and is driven through a [`BroadcastHandle`].

mod coordinator;
mod session;

pub use coordinator::{BroadcastCoordinator, BroadcastHandle, BroadcastStatus};
pub use session::{
    BroadcastPhase, BroadcastSession, ChannelTransport, Flow, SinkClosed, SinkTransport,
};

use thiserror::Error;

use crate::source::SourceError;
use crate::types::PlayerId;

#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("no broadcast session is active")]
    NoActiveSession,

    #[error("stream {requested} is not the active session {active}")]
    SessionMismatch { requested: String, active: String },

    #[error("player {0} is not part of the broadcast")]
    UnknownPlayer(PlayerId),

    #[error("player {0} is already attached")]
    AlreadyAttached(PlayerId),

    #[error("player {0} asked to join after streaming started")]
    LateJoin(PlayerId),

    #[error("no connected players to broadcast to")]
    NoPlayers,

    #[error("broadcast session {0} has finished")]
    SessionFinished(String),

    #[error("broadcast coordinator is not running")]
    CoordinatorUnavailable,

    #[error(transparent)]
    Source(#[from] SourceError),
}
