//! Event emitter abstraction for decoupling components from transport.
//!
//! Components depend on the [`EventEmitter`] trait rather than concrete broadcast
//! channels, so the session engine can be driven in tests without a runtime.

use super::{PlayerEvent, SourceEvent};

/// Trait for emitting domain events without knowledge of transport.
pub trait EventEmitter: Send + Sync {
    /// Emits an event raised by a player session.
    fn emit_player(&self, event: PlayerEvent);

    /// Emits an event raised by the audio source.
    fn emit_source(&self, event: SourceEvent);
}

/// Emitter that discards every event.
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit_player(&self, _event: PlayerEvent) {}

    fn emit_source(&self, _event: SourceEvent) {}
}

/// Logs all events at debug level.
pub struct LoggingEventEmitter;

impl EventEmitter for LoggingEventEmitter {
    fn emit_player(&self, event: PlayerEvent) {
        tracing::debug!(?event, "player_event");
    }

    fn emit_source(&self, event: SourceEvent) {
        tracing::debug!(?event, "source_event");
    }
}

/// Test emitter that keeps every event in order.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct RecordingEventEmitter {
    events: parking_lot::Mutex<Vec<super::BroadcastEvent>>,
}

#[cfg(test)]
impl RecordingEventEmitter {
    pub(crate) fn take(&self) -> Vec<super::BroadcastEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub(crate) fn player_events(&self) -> Vec<PlayerEvent> {
        self.take()
            .into_iter()
            .filter_map(|event| match event {
                super::BroadcastEvent::Player(event) => Some(event),
                super::BroadcastEvent::Source(_) => None,
            })
            .collect()
    }
}

#[cfg(test)]
impl EventEmitter for RecordingEventEmitter {
    fn emit_player(&self, event: PlayerEvent) {
        self.events.lock().push(super::BroadcastEvent::Player(event));
    }

    fn emit_source(&self, event: SourceEvent) {
        self.events.lock().push(super::BroadcastEvent::Source(event));
    }
}
