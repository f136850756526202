//! Subscription filters over the event feed.

use std::collections::HashSet;

use super::BroadcastEvent;

/// Discriminant of every event the feed can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    PlayerStateChanged,
    VolumeChanged,
    RemoteButtonPressed,
    SourceLoggedIn,
    SourceLoggedOut,
    SourceConnectionError,
    SourceMetadataUpdated,
    SourceMessageToUser,
    SourceLogMessage,
    SourceEndOfTrack,
    SourcePlayTokenLost,
}

impl EventKind {
    pub const PLAYER: [EventKind; 3] = [
        Self::PlayerStateChanged,
        Self::VolumeChanged,
        Self::RemoteButtonPressed,
    ];

    pub const SOURCE: [EventKind; 8] = [
        Self::SourceLoggedIn,
        Self::SourceLoggedOut,
        Self::SourceConnectionError,
        Self::SourceMetadataUpdated,
        Self::SourceMessageToUser,
        Self::SourceLogMessage,
        Self::SourceEndOfTrack,
        Self::SourcePlayTokenLost,
    ];
}

/// Set of event kinds a subscriber wants to receive.
///
/// An empty filter accepts nothing; use [`EventFilter::all`] for everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    kinds: HashSet<EventKind>,
}

impl EventFilter {
    pub fn all() -> Self {
        Self::only(EventKind::PLAYER.into_iter().chain(EventKind::SOURCE))
    }

    pub fn only(kinds: impl IntoIterator<Item = EventKind>) -> Self {
        Self {
            kinds: kinds.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn with(mut self, kind: EventKind) -> Self {
        self.kinds.insert(kind);
        self
    }

    pub fn contains(&self, kind: EventKind) -> bool {
        self.kinds.contains(&kind)
    }

    pub fn accepts(&self, event: &BroadcastEvent) -> bool {
        self.contains(event.kind())
    }
}
