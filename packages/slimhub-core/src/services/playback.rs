//! Playback orchestration.
//!
//! Starting a track means two things happen together: the broadcast layer
//! opens a session fed by the track's provider, and every player that session
//! waits for is told over SlimProto to fetch its stream with its own token.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::broadcast::{BroadcastHandle, BroadcastStatus};
use crate::context::ServerIdentity;
use crate::error::{SlimHubError, SlimHubResult};
use crate::slimproto::{FormatCode, PlayerSnapshot, SlimService, TrackRequest};
use crate::source::{AudioProvider, FileAudioProvider};
use crate::types::PlayerId;

/// A local file to play, as accepted by the HTTP API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackSpec {
    pub path: PathBuf,
    /// Encoding of the file. Players decode it themselves.
    #[serde(default)]
    pub format: FormatCode,
    pub title: Option<String>,
    pub artist: Option<String>,
}

/// Result of starting playback.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackStarted {
    pub session_id: String,
    pub stream_path: String,
    /// Players the broadcast waits for before streaming.
    pub players: Vec<PlayerId>,
    /// Players that were sent the play command.
    pub notified: usize,
}

pub struct PlaybackService {
    slim: Arc<SlimService>,
    broadcast: BroadcastHandle,
    identity: ServerIdentity,
    read_chunk_bytes: usize,
    /// Session id and format of the most recent track.
    current: RwLock<Option<(String, FormatCode)>>,
}

impl PlaybackService {
    pub fn new(
        slim: Arc<SlimService>,
        broadcast: BroadcastHandle,
        identity: ServerIdentity,
        read_chunk_bytes: usize,
    ) -> Self {
        Self {
            slim,
            broadcast,
            identity,
            read_chunk_bytes,
            current: RwLock::new(None),
        }
    }

    /// Plays a local file on every connected player.
    pub async fn play_file(&self, track: TrackSpec) -> SlimHubResult<PlaybackStarted> {
        if !track.path.is_file() {
            return Err(SlimHubError::InvalidRequest(format!(
                "{} is not a readable file",
                track.path.display()
            )));
        }
        let title = track.title.or_else(|| {
            track.path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
        });
        let provider =
            FileAudioProvider::new(track.path).with_chunk_bytes(self.read_chunk_bytes);
        self.play(Box::new(provider), track.format, title, track.artist)
            .await
    }

    /// Starts a broadcast fed by `provider` and points the players it waits
    /// for at it.
    ///
    /// Supersedes whatever was playing.
    pub async fn play(
        &self,
        provider: Box<dyn AudioProvider>,
        format: FormatCode,
        title: Option<String>,
        artist: Option<String>,
    ) -> SlimHubResult<PlaybackStarted> {
        let session_id = uuid::Uuid::new_v4().simple().to_string();
        let players = self.broadcast.start(&session_id, provider).await?;

        let stream_path = self.identity.stream_path(&session_id);
        let track = TrackRequest {
            format,
            stream_path: stream_path.clone(),
            title,
            artist,
        };
        *self.current.write() = Some((session_id.clone(), format));
        let unreachable = self.slim.play(&players, &track);
        for id in &unreachable {
            log::warn!(
                "[Playback] Player {} is waited on by session {} but has no connection",
                id,
                session_id
            );
        }
        let notified = players.len() - unreachable.len();
        log::info!(
            "[Playback] Session {} started for {} player(s), {} notified",
            session_id,
            players.len(),
            notified
        );

        Ok(PlaybackStarted {
            session_id,
            stream_path,
            players,
            notified,
        })
    }

    pub fn pause(&self) -> usize {
        let count = self.slim.pause();
        log::info!("[Playback] Paused {} player(s)", count);
        count
    }

    pub fn unpause(&self) -> usize {
        let count = self.slim.unpause();
        log::info!("[Playback] Unpaused {} player(s)", count);
        count
    }

    /// Stops every player and drops the broadcast session.
    pub async fn stop(&self) -> SlimHubResult<usize> {
        let count = self.slim.stop();
        self.current.write().take();
        let dropped = self.broadcast.stop().await?;
        log::info!(
            "[Playback] Stopped {} player(s), session dropped: {}",
            count,
            dropped
        );
        Ok(count)
    }

    /// Sets one player's volume; values above 100 are clamped.
    pub fn set_volume(&self, player: PlayerId, level: u8) -> SlimHubResult<()> {
        if self.slim.set_volume(player, level) {
            Ok(())
        } else {
            Err(SlimHubError::PlayerNotFound(player.to_string()))
        }
    }

    /// Format players were told to expect for `session_id`.
    pub fn stream_format(&self, session_id: &str) -> Option<FormatCode> {
        self.current
            .read()
            .as_ref()
            .filter(|(id, _)| id == session_id)
            .map(|(_, format)| *format)
    }

    pub fn players(&self) -> Vec<PlayerSnapshot> {
        self.slim.players()
    }

    pub fn player(&self, id: PlayerId) -> SlimHubResult<PlayerSnapshot> {
        self.slim
            .player(id)
            .ok_or_else(|| SlimHubError::PlayerNotFound(id.to_string()))
    }

    pub async fn broadcast_status(&self) -> SlimHubResult<Option<BroadcastStatus>> {
        Ok(self.broadcast.status().await?)
    }

    pub fn broadcast(&self) -> &BroadcastHandle {
        &self.broadcast
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::BroadcastCoordinator;
    use crate::events::{
        BroadcastEventBridge, EventEmitter, EventFilter, EventKind, NoopEventEmitter,
        PlayerEvent,
    };
    use crate::slimproto::{PlayerCommand, PlayerHandle};
    use crate::source::SourceWorker;
    use crate::state::{BroadcastConfig, Config};
    use crate::types::{DeviceType, PlayerState};
    use crate::utils::now_millis;
    use std::io::Write;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    fn service(bridge: &BroadcastEventBridge, cancel: &CancellationToken) -> PlaybackService {
        let slim = Arc::new(SlimService::new(Arc::new(NoopEventEmitter), 9000));
        let worker = Arc::new(SourceWorker::spawn(4).unwrap());
        let events = bridge.subscribe_filtered(EventFilter::only([EventKind::PlayerStateChanged]));
        let (coordinator, handle) = BroadcastCoordinator::new(
            events,
            Arc::clone(slim.registry()),
            worker,
            Arc::new(bridge.clone()),
            BroadcastConfig::default(),
        );
        tokio::spawn(coordinator.run(cancel.clone()));
        let identity = ServerIdentity::from_config(&Config {
            hostname: Some("jukebox".into()),
            ..Config::default()
        });
        PlaybackService::new(slim, handle, identity, 1024)
    }

    fn connect(playback: &PlaybackService, id: u64) -> mpsc::UnboundedReceiver<PlayerCommand> {
        let (tx, rx) = mpsc::unbounded_channel();
        let snapshot = PlayerSnapshot {
            id: PlayerId::new(id),
            addr: "127.0.0.1:1".into(),
            device_type: Some(DeviceType::Squeezebox2),
            mac: None,
            firmware_revision: None,
            state: PlayerState::Established,
            volume: 50,
            connected_at: 0,
        };
        playback.slim.registry().insert(
            PlayerId::new(id),
            PlayerHandle::new(tx, Arc::new(RwLock::new(snapshot))),
        );
        rx
    }

    #[tokio::test]
    async fn missing_file_is_rejected() {
        let bridge = BroadcastEventBridge::new(16);
        let cancel = CancellationToken::new();
        let playback = service(&bridge, &cancel);

        let err = playback
            .play_file(TrackSpec {
                path: "/definitely/not/here.mp3".into(),
                format: FormatCode::Mp3,
                title: None,
                artist: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_request");
        cancel.cancel();
    }

    #[tokio::test]
    async fn play_without_players_is_a_conflict() {
        let bridge = BroadcastEventBridge::new(16);
        let cancel = CancellationToken::new();
        let playback = service(&bridge, &cancel);

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"audio").unwrap();
        let err = playback
            .play_file(TrackSpec {
                path: file.path().to_path_buf(),
                format: FormatCode::Mp3,
                title: None,
                artist: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), "conflict");
        cancel.cancel();
    }

    #[tokio::test]
    async fn play_returns_a_stream_path_per_session() {
        let bridge = BroadcastEventBridge::new(16);
        let cancel = CancellationToken::new();
        let playback = service(&bridge, &cancel);

        bridge.emit_player(PlayerEvent::StateChanged {
            player_id: PlayerId::new(1),
            mac: None,
            state: PlayerState::Established,
            timestamp: now_millis(),
        });
        for _ in 0..200 {
            if !playback.broadcast().roster().await.unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"audio").unwrap();
        let started = playback
            .play_file(TrackSpec {
                path: file.path().to_path_buf(),
                format: FormatCode::Mp3,
                title: Some("Song".into()),
                artist: None,
            })
            .await
            .unwrap();

        assert_eq!(started.stream_path, format!("/stream/{}", started.session_id));
        assert_eq!(started.players, vec![PlayerId::new(1)]);
        // the registry has no live connections in this test
        assert_eq!(started.notified, 0);
        assert_eq!(
            playback.stream_format(&started.session_id),
            Some(FormatCode::Mp3)
        );
        assert_eq!(playback.stream_format("other"), None);

        let status = playback.broadcast_status().await.unwrap().unwrap();
        assert_eq!(status.session_id, started.session_id);
        assert_eq!(playback.stop().await.unwrap(), 0);
        assert!(playback.broadcast_status().await.unwrap().is_none());
        cancel.cancel();
    }

    #[tokio::test]
    async fn play_is_sent_to_the_players_the_session_waits_for() {
        let bridge = BroadcastEventBridge::new(16);
        let cancel = CancellationToken::new();
        let playback = service(&bridge, &cancel);

        // 1 is live and in the roster, 2 is only in the roster, 3 is live
        // but the roster has not heard of it yet.
        let mut one = connect(&playback, 1);
        let mut three = connect(&playback, 3);
        for id in [1, 2] {
            bridge.emit_player(PlayerEvent::StateChanged {
                player_id: PlayerId::new(id),
                mac: None,
                state: PlayerState::Established,
                timestamp: now_millis(),
            });
        }
        for _ in 0..200 {
            if playback.broadcast().roster().await.unwrap().len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"audio").unwrap();
        let started = playback
            .play_file(TrackSpec {
                path: file.path().to_path_buf(),
                format: FormatCode::Flac,
                title: None,
                artist: None,
            })
            .await
            .unwrap();

        assert_eq!(started.players, vec![PlayerId::new(1), PlayerId::new(2)]);
        assert_eq!(started.notified, 1);
        match one.try_recv().unwrap() {
            PlayerCommand::Play(track) => {
                assert_eq!(track.stream_path, started.stream_path);
                assert_eq!(track.format, FormatCode::Flac);
            }
            other => panic!("expected play, got {:?}", other),
        }
        assert!(three.try_recv().is_err());
        cancel.cancel();
    }

    #[test]
    fn track_spec_defaults_format() {
        let track: TrackSpec = serde_json::from_str(r#"{"path":"/music/a.ogg"}"#).unwrap();
        assert_eq!(track.format, FormatCode::Ogg);
        assert!(track.title.is_none());
    }
}
