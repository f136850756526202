//! Event system shared by the session engine, the source worker and the
//! broadcast layer.
//!
//! This module provides:
//! - [`EventEmitter`] trait for components to emit events
//! - [`BroadcastEventBridge`] fanning events out to subscribers
//! - [`EventFilter`] so subscribers receive only the kinds they declare

mod bridge;
mod emitter;
mod filter;

pub use bridge::{BroadcastEventBridge, EventSubscription};
pub use emitter::{EventEmitter, LoggingEventEmitter, NoopEventEmitter};
pub use filter::{EventFilter, EventKind};

#[cfg(test)]
pub(crate) use emitter::RecordingEventEmitter;

use serde::Serialize;

use crate::player::RemoteButton;
use crate::types::{MacAddress, PlayerId, PlayerState};

/// Events delivered through the feed.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "category", rename_all = "camelCase")]
pub enum BroadcastEvent {
    /// Events raised by SlimProto player sessions.
    Player(PlayerEvent),

    /// Events raised by the audio source worker.
    Source(SourceEvent),
}

impl BroadcastEvent {
    /// Returns the kind used for subscription filtering.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Player(event) => event.kind(),
            Self::Source(event) => event.kind(),
        }
    }
}

/// Events raised by a player session.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PlayerEvent {
    /// The player's connection or playback state changed.
    StateChanged {
        #[serde(rename = "playerId")]
        player_id: PlayerId,
        #[serde(skip_serializing_if = "Option::is_none")]
        mac: Option<MacAddress>,
        state: PlayerState,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// Volume was set or stepped, and the new gains sent to the player.
    VolumeChanged {
        #[serde(rename = "playerId")]
        player_id: PlayerId,
        volume: u8,
        #[serde(rename = "oldGain")]
        old_gain: u32,
        #[serde(rename = "newGain")]
        new_gain: u32,
        timestamp: u64,
    },
    /// A recognised infrared remote button was pressed.
    RemoteButtonPressed {
        #[serde(rename = "playerId")]
        player_id: PlayerId,
        button: RemoteButton,
        timestamp: u64,
    },
}

impl PlayerEvent {
    pub fn player_id(&self) -> PlayerId {
        match self {
            Self::StateChanged { player_id, .. }
            | Self::VolumeChanged { player_id, .. }
            | Self::RemoteButtonPressed { player_id, .. } => *player_id,
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Self::StateChanged { .. } => EventKind::PlayerStateChanged,
            Self::VolumeChanged { .. } => EventKind::VolumeChanged,
            Self::RemoteButtonPressed { .. } => EventKind::RemoteButtonPressed,
        }
    }
}

/// Events raised by the audio source worker and its provider.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SourceEvent {
    LoggedIn {
        timestamp: u64,
    },
    LoggedOut {
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        timestamp: u64,
    },
    /// The provider failed to reach or read its upstream.
    ConnectionError {
        error: String,
        timestamp: u64,
    },
    MetadataUpdated {
        #[serde(rename = "sessionId")]
        session_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        timestamp: u64,
    },
    /// Text the provider wants surfaced to a human.
    MessageToUser {
        message: String,
        timestamp: u64,
    },
    LogMessage {
        message: String,
        timestamp: u64,
    },
    /// The provider delivered the last frame of a track.
    EndOfTrack {
        #[serde(rename = "sessionId")]
        session_id: String,
        timestamp: u64,
    },
    PlayTokenLost {
        timestamp: u64,
    },
}

impl SourceEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::LoggedIn { .. } => EventKind::SourceLoggedIn,
            Self::LoggedOut { .. } => EventKind::SourceLoggedOut,
            Self::ConnectionError { .. } => EventKind::SourceConnectionError,
            Self::MetadataUpdated { .. } => EventKind::SourceMetadataUpdated,
            Self::MessageToUser { .. } => EventKind::SourceMessageToUser,
            Self::LogMessage { .. } => EventKind::SourceLogMessage,
            Self::EndOfTrack { .. } => EventKind::SourceEndOfTrack,
            Self::PlayTokenLost { .. } => EventKind::SourcePlayTokenLost,
        }
    }
}
