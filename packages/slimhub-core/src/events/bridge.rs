//! Bridge that maps emitted events onto the in-process broadcast feed.
//!
//! Subscribers declare the [`EventKind`](super::EventKind)s they want up
//! front and only ever see matching events.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;

use super::emitter::EventEmitter;
use super::{BroadcastEvent, EventFilter, PlayerEvent, SourceEvent};

/// Bridges domain events to a `tokio::sync::broadcast` channel.
///
/// An optional external emitter (for example [`LoggingEventEmitter`](super::LoggingEventEmitter))
/// also receives every event.
#[derive(Clone)]
pub struct BroadcastEventBridge {
    tx: broadcast::Sender<BroadcastEvent>,
    external_emitter: Arc<RwLock<Option<Arc<dyn EventEmitter>>>>,
}

impl BroadcastEventBridge {
    /// Creates a new bridge with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            external_emitter: Arc::new(RwLock::new(None)),
        }
    }

    /// Sets an external emitter that sees every event before the feed does.
    pub fn set_external_emitter(&self, emitter: Arc<dyn EventEmitter>) {
        *self.external_emitter.write() = Some(emitter);
    }

    /// Subscribes to every event kind.
    pub fn subscribe(&self) -> EventSubscription {
        self.subscribe_filtered(EventFilter::all())
    }

    /// Subscribes to the event kinds accepted by `filter`.
    ///
    /// Events emitted before this call are never delivered to the new subscriber.
    pub fn subscribe_filtered(&self, filter: EventFilter) -> EventSubscription {
        EventSubscription {
            rx: self.tx.subscribe(),
            filter,
            lagged: false,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Generates an [`EventEmitter`] method that forwards to the external emitter
/// (if set) and then sends to the broadcast channel.
macro_rules! impl_emit {
    ($method:ident, $event_ty:ty, $variant:ident) => {
        fn $method(&self, event: $event_ty) {
            if let Some(ref emitter) = *self.external_emitter.read() {
                emitter.$method(event.clone());
            }
            if let Err(e) = self.tx.send(BroadcastEvent::$variant(event)) {
                log::trace!("[EventBridge] No subscribers: {}", e);
            }
        }
    };
}

impl EventEmitter for BroadcastEventBridge {
    impl_emit!(emit_player, PlayerEvent, Player);
    impl_emit!(emit_source, SourceEvent, Source);
}

/// A filtered view of the event feed.
pub struct EventSubscription {
    rx: broadcast::Receiver<BroadcastEvent>,
    filter: EventFilter,
    lagged: bool,
}

impl EventSubscription {
    /// Waits for the next accepted event.
    ///
    /// Returns `None` once every bridge handle is gone. Cancel-safe.
    pub async fn recv(&mut self) -> Option<BroadcastEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.filter.accepts(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::warn!("[EventBridge] Subscriber lagged, {} event(s) lost", skipped);
                    self.lagged = true;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Returns the next accepted event already queued, without waiting.
    pub fn try_recv(&mut self) -> Option<BroadcastEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if self.filter.accepts(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    log::warn!("[EventBridge] Subscriber lagged, {} event(s) lost", skipped);
                    self.lagged = true;
                }
                Err(_) => return None,
            }
        }
    }

    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }

    /// True if events were lost since the last call. Clears the flag.
    ///
    /// State derived from the feed should be rebuilt from its source when
    /// this returns true.
    pub fn take_lagged(&mut self) -> bool {
        std::mem::take(&mut self.lagged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use crate::types::{PlayerId, PlayerState};

    fn state_changed(id: u64, state: PlayerState) -> PlayerEvent {
        PlayerEvent::StateChanged {
            player_id: PlayerId::new(id),
            mac: None,
            state,
            timestamp: 0,
        }
    }

    #[tokio::test]
    async fn filtered_subscription_skips_other_kinds() {
        let bridge = BroadcastEventBridge::new(16);
        let mut sub = bridge.subscribe_filtered(EventFilter::only([EventKind::PlayerStateChanged]));

        bridge.emit_source(SourceEvent::LoggedIn { timestamp: 0 });
        bridge.emit_player(PlayerEvent::VolumeChanged {
            player_id: PlayerId::new(1),
            volume: 51,
            old_gain: 47,
            new_gain: 3840,
            timestamp: 0,
        });
        bridge.emit_player(state_changed(1, PlayerState::Established));

        match sub.recv().await {
            Some(BroadcastEvent::Player(PlayerEvent::StateChanged { state, .. })) => {
                assert_eq!(state, PlayerState::Established)
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn subscriber_sees_only_events_after_subscribing() {
        let bridge = BroadcastEventBridge::new(16);
        bridge.emit_player(state_changed(1, PlayerState::Established));

        let mut sub = bridge.subscribe();
        assert_eq!(bridge.subscriber_count(), 1);
        bridge.emit_player(state_changed(2, PlayerState::Established));

        let event = sub.recv().await.unwrap();
        match event {
            BroadcastEvent::Player(event) => assert_eq!(event.player_id(), PlayerId::new(2)),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn lag_is_reported_once() {
        let bridge = BroadcastEventBridge::new(2);
        let mut sub = bridge.subscribe();
        for id in 0..6 {
            bridge.emit_player(state_changed(id, PlayerState::Established));
        }

        assert!(!sub.take_lagged());
        let event = sub.recv().await.unwrap();
        match event {
            BroadcastEvent::Player(event) => assert_eq!(event.player_id(), PlayerId::new(4)),
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(sub.take_lagged());
        assert!(!sub.take_lagged());
    }

    #[tokio::test]
    async fn subscription_ends_when_bridge_dropped() {
        let bridge = BroadcastEventBridge::new(4);
        let mut sub = bridge.subscribe();
        drop(bridge);
        assert!(sub.recv().await.is_none());
    }
}
