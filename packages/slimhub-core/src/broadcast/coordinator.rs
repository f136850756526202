//! Actor that owns the live broadcast session.
//!
//! The coordinator is the only place a [`BroadcastSession`] is touched. It
//! learns which players are connected from the `StateChanged` feed, drains the
//! source worker's channel, and serves start/attach/stop requests from the
//! HTTP layer and the playback service through a [`BroadcastHandle`].
//!
//! If the feed lags, the roster is rebuilt from the [`PlayerRegistry`] so a
//! lost DISCONNECTED cannot leave a session waiting for a player that is gone.

use std::collections::BTreeSet;
use std::io;
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::session::{BroadcastPhase, BroadcastSession, ChannelTransport, Flow};
use super::BroadcastError;
use crate::events::{
    BroadcastEvent, EventEmitter, EventKind, EventSubscription, PlayerEvent,
};
use crate::slimproto::PlayerRegistry;
use crate::source::{AudioProvider, SourceFeed, SourceMessage, SourceWorker};
use crate::state::BroadcastConfig;
use crate::types::{PlayerId, PlayerState};

const COMMAND_CHANNEL_CAPACITY: usize = 32;

type Reply<T> = oneshot::Sender<Result<T, BroadcastError>>;

enum Command {
    Start {
        session_id: String,
        provider: Box<dyn AudioProvider>,
        reply: Reply<Vec<PlayerId>>,
    },
    Attach {
        session_id: String,
        player: PlayerId,
        transport: ChannelTransport,
        reply: Reply<()>,
    },
    Stop {
        reply: Reply<bool>,
    },
    Status {
        reply: Reply<Option<BroadcastStatus>>,
    },
    Roster {
        reply: Reply<Vec<PlayerId>>,
    },
}

/// Point-in-time view of the active broadcast.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastStatus {
    pub session_id: String,
    pub phase: BroadcastPhase,
    pub players: Vec<PlayerId>,
    pub attached: usize,
    pub pending_chunks: usize,
    pub bytes_sent: u64,
    pub source_paused: bool,
}

/// Cloneable client for the coordinator.
#[derive(Clone)]
pub struct BroadcastHandle {
    tx: mpsc::Sender<Command>,
    sink_queue_frames: usize,
}

impl BroadcastHandle {
    /// Starts a new session for every connected player, superseding any
    /// active one. Returns the players the session waits for.
    pub async fn start(
        &self,
        session_id: &str,
        provider: Box<dyn AudioProvider>,
    ) -> Result<Vec<PlayerId>, BroadcastError> {
        self.request(|reply| Command::Start {
            session_id: session_id.to_string(),
            provider,
            reply,
        })
        .await
    }

    /// Attaches a player's stream request to the active session.
    ///
    /// The returned receiver yields the audio and ends when the session
    /// closes the sink.
    pub async fn attach(
        &self,
        session_id: &str,
        player: PlayerId,
    ) -> Result<mpsc::Receiver<Result<Bytes, io::Error>>, BroadcastError> {
        let (transport, rx) = ChannelTransport::new(self.sink_queue_frames);
        self.request(|reply| Command::Attach {
            session_id: session_id.to_string(),
            player,
            transport,
            reply,
        })
        .await?;
        Ok(rx)
    }

    /// Drops the active session. Returns false if there was none.
    pub async fn stop(&self) -> Result<bool, BroadcastError> {
        self.request(|reply| Command::Stop { reply }).await
    }

    pub async fn status(&self) -> Result<Option<BroadcastStatus>, BroadcastError> {
        self.request(|reply| Command::Status { reply }).await
    }

    /// Players the coordinator currently considers connected.
    pub async fn roster(&self) -> Result<Vec<PlayerId>, BroadcastError> {
        self.request(|reply| Command::Roster { reply }).await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, BroadcastError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| BroadcastError::CoordinatorUnavailable)?;
        rx.await.map_err(|_| BroadcastError::CoordinatorUnavailable)?
    }
}

struct ActiveBroadcast {
    session: BroadcastSession<ChannelTransport>,
    feed: Option<SourceFeed>,
    source_paused: bool,
}

impl ActiveBroadcast {
    /// Mirrors the session's flow state onto the source.
    fn sync_flow(&mut self) {
        let Some(feed) = self.feed.as_ref() else {
            return;
        };
        let paused = self.session.is_paused();
        if paused && !self.source_paused {
            log::debug!("[Broadcast] Pausing source for {}", self.session.id());
            feed.pause();
        } else if !paused && self.source_paused {
            log::debug!("[Broadcast] Resuming source for {}", self.session.id());
            feed.resume();
        }
        self.source_paused = paused;
    }

    fn status(&self) -> BroadcastStatus {
        BroadcastStatus {
            session_id: self.session.id().to_string(),
            phase: self.session.phase(),
            players: self.session.player_ids(),
            attached: self.session.attached_count(),
            pending_chunks: self.session.pending_chunks(),
            bytes_sent: self.session.bytes_sent(),
            source_paused: self.source_paused,
        }
    }
}

pub struct BroadcastCoordinator {
    commands: mpsc::Receiver<Command>,
    events: EventSubscription,
    events_open: bool,
    roster: BTreeSet<PlayerId>,
    registry: Arc<PlayerRegistry>,
    active: Option<ActiveBroadcast>,
    worker: Arc<SourceWorker>,
    emitter: Arc<dyn EventEmitter>,
    config: BroadcastConfig,
}

impl BroadcastCoordinator {
    /// Creates the coordinator and its handle.
    ///
    /// `events` should accept [`EventKind::PlayerStateChanged`]; other kinds
    /// are ignored. `registry` is only consulted after the feed lags. Source
    /// events are republished through `emitter`.
    pub fn new(
        events: EventSubscription,
        registry: Arc<PlayerRegistry>,
        worker: Arc<SourceWorker>,
        emitter: Arc<dyn EventEmitter>,
        config: BroadcastConfig,
    ) -> (Self, BroadcastHandle) {
        if !events.filter().contains(EventKind::PlayerStateChanged) {
            log::warn!("[Broadcast] Subscription does not carry player state changes");
        }
        let (tx, commands) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let handle = BroadcastHandle {
            tx,
            sink_queue_frames: config.sink_queue_frames,
        };
        let coordinator = Self {
            commands,
            events,
            events_open: true,
            roster: BTreeSet::new(),
            registry,
            active: None,
            worker,
            emitter,
            config,
        };
        (coordinator, handle)
    }

    /// Runs until cancelled or every handle is dropped.
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut resume_tick = tokio::time::interval(self.config.resume_poll());
        resume_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        log::info!("[Broadcast] Coordinator started");

        loop {
            let backlog = self
                .active
                .as_ref()
                .is_some_and(|a| a.session.has_backlog());

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                event = self.events.recv(), if self.events_open => {
                    match event {
                        Some(event) => self.handle_event(event),
                        None => {
                            log::warn!("[Broadcast] Event feed closed, roster is now frozen");
                            self.events_open = false;
                        }
                    }
                    if self.events.take_lagged() {
                        self.reconcile_roster();
                    }
                }
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                message = next_source_message(&mut self.active) => {
                    self.handle_source(message);
                }
                _ = resume_tick.tick(), if backlog => self.retry_backlog(),
            }
        }

        if let Some(active) = self.active.take() {
            log::info!(
                "[Broadcast] Dropping session {} on shutdown",
                active.session.id()
            );
        }
        log::info!("[Broadcast] Coordinator stopped");
    }

    fn handle_event(&mut self, event: BroadcastEvent) {
        let BroadcastEvent::Player(PlayerEvent::StateChanged {
            player_id, state, ..
        }) = event
        else {
            return;
        };

        if state == PlayerState::Disconnected {
            self.player_left(player_id);
        } else {
            self.player_joined(player_id);
        }
    }

    fn player_joined(&mut self, player_id: PlayerId) {
        if self.roster.insert(player_id) {
            log::debug!("[Broadcast] Player {} joined the roster", player_id);
            if let Some(active) = self.active.as_mut() {
                active.session.add_player(player_id);
            }
        }
    }

    fn player_left(&mut self, player_id: PlayerId) {
        if self.roster.remove(&player_id) {
            log::debug!("[Broadcast] Player {} left the roster", player_id);
        }
        if let Some(active) = self.active.as_mut() {
            active.session.remove_player(player_id);
            active.sync_flow();
        }
        self.release_if_finished();
    }

    /// Rebuilds the roster from the registry after state changes were lost.
    ///
    /// Entries whose connection is gone from the registry are dropped, and
    /// established connections the roster missed are added.
    fn reconcile_roster(&mut self) {
        let gone: Vec<PlayerId> = self
            .roster
            .iter()
            .copied()
            .filter(|id| !self.registry.contains(*id))
            .collect();
        let missed: Vec<PlayerId> = self
            .registry
            .snapshots()
            .into_iter()
            .filter(|player| player.is_established() && !self.roster.contains(&player.id))
            .map(|player| player.id)
            .collect();

        log::info!(
            "[Broadcast] Reconciled roster after lag: {} gone, {} missed",
            gone.len(),
            missed.len()
        );
        for id in gone {
            self.player_left(id);
        }
        for id in missed {
            self.player_joined(id);
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start {
                session_id,
                provider,
                reply,
            } => {
                let _ = reply.send(self.start(session_id, provider));
            }
            Command::Attach {
                session_id,
                player,
                transport,
                reply,
            } => {
                let result = self.attach(&session_id, player, transport);
                self.release_if_finished();
                let _ = reply.send(result);
            }
            Command::Stop { reply } => {
                let stopped = match self.active.take() {
                    Some(active) => {
                        log::info!("[Broadcast] Stopping session {}", active.session.id());
                        true
                    }
                    None => false,
                };
                let _ = reply.send(Ok(stopped));
            }
            Command::Status { reply } => {
                let _ = reply.send(Ok(self.active.as_ref().map(ActiveBroadcast::status)));
            }
            Command::Roster { reply } => {
                let _ = reply.send(Ok(self.roster.iter().copied().collect()));
            }
        }
    }

    fn start(
        &mut self,
        session_id: String,
        provider: Box<dyn AudioProvider>,
    ) -> Result<Vec<PlayerId>, BroadcastError> {
        if let Some(previous) = self.active.take() {
            log::info!(
                "[Broadcast] Session {} superseded by {}",
                previous.session.id(),
                session_id
            );
        }
        if self.roster.is_empty() {
            return Err(BroadcastError::NoPlayers);
        }

        let session = BroadcastSession::new(
            session_id.clone(),
            self.roster.iter().copied(),
            self.config.sink_queue_frames,
        );
        let players = session.player_ids();
        let feed = self.worker.start(&session_id, provider)?;
        self.active = Some(ActiveBroadcast {
            session,
            feed: Some(feed),
            source_paused: false,
        });
        Ok(players)
    }

    fn attach(
        &mut self,
        session_id: &str,
        player: PlayerId,
        transport: ChannelTransport,
    ) -> Result<(), BroadcastError> {
        let active = self.active.as_mut().ok_or(BroadcastError::NoActiveSession)?;
        if active.session.id() != session_id {
            return Err(BroadcastError::SessionMismatch {
                requested: session_id.to_string(),
                active: active.session.id().to_string(),
            });
        }
        active.session.attach(player, transport)?;
        active.sync_flow();
        Ok(())
    }

    fn handle_source(&mut self, message: Option<SourceMessage>) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        match message {
            Some(SourceMessage::Chunk(chunk)) => {
                if active.session.write(chunk) == Flow::Pause {
                    active.session.pause_producing();
                }
                active.sync_flow();
            }
            Some(SourceMessage::Event(event)) => self.emitter.emit_source(event),
            Some(SourceMessage::Finished) => {
                active.feed = None;
                active.session.finish();
            }
            Some(SourceMessage::Failed(reason)) => {
                log::warn!(
                    "[Broadcast] Source for {} failed, finishing: {}",
                    active.session.id(),
                    reason
                );
                active.feed = None;
                active.session.finish();
            }
            None => {
                log::debug!(
                    "[Broadcast] Source for {} closed without finishing",
                    active.session.id()
                );
                active.feed = None;
                active.session.finish();
            }
        }
        self.release_if_finished();
    }

    fn retry_backlog(&mut self) {
        if let Some(active) = self.active.as_mut() {
            active.session.resume_producing();
            active.sync_flow();
        }
        self.release_if_finished();
    }

    fn release_if_finished(&mut self) {
        if self
            .active
            .as_ref()
            .is_some_and(|a| a.session.is_finished())
        {
            self.active = None;
        }
    }
}

async fn next_source_message(active: &mut Option<ActiveBroadcast>) -> Option<SourceMessage> {
    match active.as_mut().and_then(|a| a.feed.as_mut()) {
        Some(feed) => feed.recv().await,
        None => std::future::pending().await,
    }
}
