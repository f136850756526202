//! TCP accept loop and per-connection tasks for SlimProto.

use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use parking_lot::RwLock;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use super::codec::SlimCodec;
use super::registry::{PlayerCommand, PlayerHandle, PlayerRegistry, PlayerSnapshot};
use super::session::{PlayerSession, TrackRequest};
use super::{ProtocolError, ProtocolResult};
use crate::events::EventEmitter;
use crate::types::{PlayerId, PlayerIdAllocator};

/// Accepts player connections and routes control-plane commands to them.
pub struct SlimService {
    registry: Arc<PlayerRegistry>,
    emitter: Arc<dyn EventEmitter>,
    ids: PlayerIdAllocator,
    http_port: u16,
}

impl SlimService {
    /// Creates the service. `http_port` is where players are told to fetch audio.
    pub fn new(emitter: Arc<dyn EventEmitter>, http_port: u16) -> Self {
        Self {
            registry: Arc::new(PlayerRegistry::new()),
            emitter,
            ids: PlayerIdAllocator::new(),
            http_port,
        }
    }

    pub fn registry(&self) -> &Arc<PlayerRegistry> {
        &self.registry
    }

    /// Binds the SlimProto listener with address reuse enabled.
    pub fn bind(addr: SocketAddr) -> std::io::Result<TcpListener> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        if let Err(e) = socket.set_reuse_address(true) {
            log::warn!("[Slim] Failed to set SO_REUSEADDR on {}: {}", addr, e);
        }
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;
        socket.listen(128)?;
        TcpListener::from_std(socket.into())
    }

    /// Accepts connections until `cancel` fires.
    pub async fn run(self: Arc<Self>, listener: TcpListener, cancel: CancellationToken) {
        match listener.local_addr() {
            Ok(addr) => log::info!("[Slim] Listening on {}", addr),
            Err(e) => log::warn!("[Slim] Listening on unknown address: {}", e),
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        let service = Arc::clone(&self);
                        let cancel = cancel.child_token();
                        tokio::spawn(async move {
                            service.serve_connection(stream, addr, cancel).await;
                        });
                    }
                    Err(e) => log::warn!("[Slim] Accept failed: {}", e),
                },
            }
        }
        log::info!("[Slim] Listener stopped");
    }

    async fn serve_connection(&self, stream: TcpStream, addr: SocketAddr, cancel: CancellationToken) {
        if let Err(e) = stream.set_nodelay(true) {
            log::debug!("[Slim] Failed to set TCP_NODELAY for {}: {}", addr, e);
        }

        let id = self.ids.next_id();
        let (tx, mut commands) = mpsc::unbounded_channel();
        let mut session = PlayerSession::new(id, addr, self.http_port, Arc::clone(&self.emitter));
        let snapshot = Arc::new(RwLock::new(session.snapshot()));
        self.registry
            .insert(id, PlayerHandle::new(tx, Arc::clone(&snapshot)));
        log::info!("[Slim] Connection from {} as player {}", addr, id);

        let mut framed = Framed::new(stream, SlimCodec::new());
        let result: ProtocolResult<()> = loop {
            tokio::select! {
                _ = cancel.cancelled() => break Ok(()),
                inbound = framed.next() => match inbound {
                    Some(Ok(frame)) => {
                        if let Err(e) = session.handle_frame(frame) {
                            break Err(e);
                        }
                    }
                    Some(Err(e)) => break Err(e),
                    None => break Ok(()),
                },
                Some(command) = commands.recv() => session.apply(command),
            }

            *snapshot.write() = session.snapshot();
            if let Err(e) = flush_outbox(&mut framed, &mut session).await {
                break Err(e);
            }
        };

        match result {
            Ok(()) => log::info!("[Slim] Player {} ({}) disconnected", id, addr),
            Err(e) => log::warn!("[Slim] Dropping player {} ({}): {}", id, addr, e),
        }

        session.disconnect();
        self.registry.remove(id);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Control plane
    // ─────────────────────────────────────────────────────────────────────────

    /// Tells each of `players` to fetch and play `track`.
    ///
    /// Returns the players whose connection could not be reached.
    pub fn play(&self, players: &[PlayerId], track: &TrackRequest) -> Vec<PlayerId> {
        players
            .iter()
            .copied()
            .filter(|id| !self.registry.send(*id, PlayerCommand::Play(track.clone())))
            .collect()
    }

    pub fn pause(&self) -> usize {
        self.registry.send_to_established(&PlayerCommand::Pause)
    }

    pub fn unpause(&self) -> usize {
        self.registry.send_to_established(&PlayerCommand::Unpause)
    }

    pub fn stop(&self) -> usize {
        self.registry.send_to_established(&PlayerCommand::Stop)
    }

    pub fn set_volume(&self, id: PlayerId, level: u8) -> bool {
        self.registry.send(id, PlayerCommand::SetVolume(level))
    }

    pub fn render(&self, id: PlayerId, text: String) -> bool {
        self.registry.send(id, PlayerCommand::Render(text))
    }

    pub fn players(&self) -> Vec<PlayerSnapshot> {
        self.registry.snapshots()
    }

    pub fn player(&self, id: PlayerId) -> Option<PlayerSnapshot> {
        self.registry.get(id)
    }
}

async fn flush_outbox(
    framed: &mut Framed<TcpStream, SlimCodec>,
    session: &mut PlayerSession,
) -> Result<(), ProtocolError> {
    let outbox = session.drain_outbox();
    if outbox.is_empty() {
        return Ok(());
    }
    for command in outbox {
        framed.feed(command).await?;
    }
    framed.flush().await
}
