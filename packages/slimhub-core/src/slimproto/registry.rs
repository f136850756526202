//! Roster of live player connections.
//!
//! Each connection task owns its [`PlayerSession`](super::PlayerSession); the
//! registry only holds a command channel and a published snapshot per player.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;

use super::session::TrackRequest;
use crate::types::{DeviceType, MacAddress, PlayerId, PlayerState};

/// Control-plane request delivered to a connection task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerCommand {
    Play(TrackRequest),
    Pause,
    Unpause,
    Stop,
    SetVolume(u8),
    Render(String),
}

/// Read-only view of a player, refreshed after every message it handles.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    pub id: PlayerId,
    pub addr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_type: Option<DeviceType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac: Option<MacAddress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firmware_revision: Option<u8>,
    pub state: PlayerState,
    pub volume: u8,
    /// Unix timestamp in milliseconds.
    pub connected_at: u64,
}

impl PlayerSnapshot {
    /// True once HELO has been handled and the connection is still open.
    pub fn is_established(&self) -> bool {
        self.device_type.is_some() && self.state.is_connected()
    }
}

/// Handle to one connection task.
#[derive(Clone)]
pub struct PlayerHandle {
    commands: mpsc::UnboundedSender<PlayerCommand>,
    snapshot: Arc<RwLock<PlayerSnapshot>>,
}

impl PlayerHandle {
    pub fn new(
        commands: mpsc::UnboundedSender<PlayerCommand>,
        snapshot: Arc<RwLock<PlayerSnapshot>>,
    ) -> Self {
        Self { commands, snapshot }
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        self.snapshot.read().clone()
    }

    /// Returns false if the connection task has already gone away.
    pub fn send(&self, command: PlayerCommand) -> bool {
        self.commands.send(command).is_ok()
    }
}

/// Concurrent map of connected players keyed by identity token.
#[derive(Default)]
pub struct PlayerRegistry {
    players: DashMap<PlayerId, PlayerHandle>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: PlayerId, handle: PlayerHandle) {
        self.players.insert(id, handle);
    }

    pub fn remove(&self, id: PlayerId) -> bool {
        self.players.remove(&id).is_some()
    }

    /// Looks a player up by the token it presented.
    pub fn get(&self, id: PlayerId) -> Option<PlayerSnapshot> {
        self.players.get(&id).map(|handle| handle.snapshot())
    }

    pub fn contains(&self, id: PlayerId) -> bool {
        self.players.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Snapshots of every connection, ordered by id.
    pub fn snapshots(&self) -> Vec<PlayerSnapshot> {
        let mut all: Vec<PlayerSnapshot> =
            self.players.iter().map(|entry| entry.snapshot()).collect();
        all.sort_by_key(|s| s.id);
        all
    }

    /// Sends a command to one player.
    pub fn send(&self, id: PlayerId, command: PlayerCommand) -> bool {
        self.players
            .get(&id)
            .map(|handle| handle.send(command))
            .unwrap_or(false)
    }

    /// Sends a command to every player that has completed its handshake.
    ///
    /// Returns the number of players the command was delivered to.
    pub fn send_to_established(&self, command: &PlayerCommand) -> usize {
        let mut ids: Vec<PlayerId> = self
            .players
            .iter()
            .filter(|entry| entry.snapshot.read().is_established())
            .map(|entry| *entry.key())
            .collect();
        ids.sort();
        ids.into_iter()
            .filter(|id| self.send(*id, command.clone()))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(id: u64, established: bool) -> PlayerSnapshot {
        PlayerSnapshot {
            id: PlayerId::new(id),
            addr: "127.0.0.1:1".into(),
            device_type: established.then_some(DeviceType::Squeezebox2),
            mac: None,
            firmware_revision: None,
            state: if established {
                PlayerState::Established
            } else {
                PlayerState::Disconnected
            },
            volume: 50,
            connected_at: 0,
        }
    }

    fn register(
        registry: &PlayerRegistry,
        id: u64,
        established: bool,
    ) -> mpsc::UnboundedReceiver<PlayerCommand> {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = PlayerHandle::new(tx, Arc::new(RwLock::new(snapshot(id, established))));
        registry.insert(PlayerId::new(id), handle);
        rx
    }

    #[test]
    fn commands_reach_only_established_players() {
        let registry = PlayerRegistry::new();
        let mut ready = register(&registry, 1, true);
        let mut fresh = register(&registry, 2, false);

        assert_eq!(registry.send_to_established(&PlayerCommand::Pause), 1);
        assert_eq!(ready.try_recv().unwrap(), PlayerCommand::Pause);
        assert!(fresh.try_recv().is_err());
    }

    #[test]
    fn lookup_by_token() {
        let registry = PlayerRegistry::new();
        let _rx = register(&registry, 7, true);
        assert_eq!(registry.get(PlayerId::new(7)).unwrap().volume, 50);
        assert!(registry.get(PlayerId::new(8)).is_none());
        assert!(registry.remove(PlayerId::new(7)));
        assert!(registry.is_empty());
    }

    #[test]
    fn send_to_closed_task_reports_failure() {
        let registry = PlayerRegistry::new();
        let rx = register(&registry, 1, true);
        drop(rx);
        assert!(!registry.send(PlayerId::new(1), PlayerCommand::Stop));
        assert_eq!(registry.send_to_established(&PlayerCommand::Stop), 0);
    }
}
