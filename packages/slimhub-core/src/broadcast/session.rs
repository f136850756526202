//! Broadcast session state machine and sink transports.
//!
//! A session tracks one sink per player. Nothing is written until every sink
//! has a transport attached; from then on each chunk goes to every sink, in
//! order, or to none of them.

use std::collections::{BTreeMap, VecDeque};
use std::io;

use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::BroadcastError;
use crate::types::PlayerId;

// ─────────────────────────────────────────────────────────────────────────────
// Transports
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("sink transport closed")]
pub struct SinkClosed;

/// Outbound byte sink for one player, usually an HTTP response body.
pub trait SinkTransport: Send {
    /// True if one more chunk can be written without exceeding the queue.
    fn has_capacity(&self) -> bool;

    fn write(&mut self, chunk: Bytes) -> Result<(), SinkClosed>;

    /// Signals end-of-file to the player. Idempotent.
    fn close(&mut self);
}

/// Transport backed by a bounded channel whose receiver feeds a response body.
#[derive(Debug)]
pub struct ChannelTransport {
    tx: Option<mpsc::Sender<Result<Bytes, io::Error>>>,
}

impl ChannelTransport {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Result<Bytes, io::Error>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx: Some(tx) }, rx)
    }
}

impl SinkTransport for ChannelTransport {
    fn has_capacity(&self) -> bool {
        self.tx.as_ref().is_some_and(|tx| tx.capacity() > 0)
    }

    fn write(&mut self, chunk: Bytes) -> Result<(), SinkClosed> {
        let tx = self.tx.as_ref().ok_or(SinkClosed)?;
        match tx.try_send(Ok(chunk)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Closed(_)) => Err(SinkClosed),
            // Capacity is checked before every write; a full queue here means
            // the reader fell out of step with the rest of the group.
            Err(TrySendError::Full(_)) => Err(SinkClosed),
        }
    }

    fn close(&mut self) {
        self.tx = None;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BroadcastPhase {
    WaitingForPlayers,
    Streaming,
    Finished,
}

/// What the upstream source should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Pause,
}

pub struct BroadcastSession<T: SinkTransport> {
    id: String,
    sinks: BTreeMap<PlayerId, Option<T>>,
    pending: VecDeque<Bytes>,
    pending_limit: usize,
    phase: BroadcastPhase,
    paused: bool,
    upstream_done: bool,
    bytes_sent: u64,
}

impl<T: SinkTransport> BroadcastSession<T> {
    /// Creates a session tracking `players`.
    ///
    /// `pending_limit` is the number of chunks buffered before the upstream is
    /// asked to pause. Chunks are never dropped; the limit only drives [`Flow`].
    pub fn new(
        id: impl Into<String>,
        players: impl IntoIterator<Item = PlayerId>,
        pending_limit: usize,
    ) -> Self {
        let id = id.into();
        let sinks: BTreeMap<_, _> = players.into_iter().map(|p| (p, None)).collect();
        log::info!(
            "[Broadcast] Session {} waiting for {} player(s)",
            id,
            sinks.len()
        );
        Self {
            id,
            sinks,
            pending: VecDeque::new(),
            pending_limit: pending_limit.max(1),
            phase: BroadcastPhase::WaitingForPlayers,
            paused: false,
            upstream_done: false,
            bytes_sent: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn phase(&self) -> BroadcastPhase {
        self.phase
    }

    pub fn is_finished(&self) -> bool {
        self.phase == BroadcastPhase::Finished
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn player_ids(&self) -> Vec<PlayerId> {
        self.sinks.keys().copied().collect()
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    pub fn attached_count(&self) -> usize {
        self.sinks.values().filter(|s| s.is_some()).count()
    }

    pub fn pending_chunks(&self) -> usize {
        self.pending.len()
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    /// True when there is buffered data the next resume could deliver.
    pub fn has_backlog(&self) -> bool {
        self.phase == BroadcastPhase::Streaming && (self.paused || !self.pending.is_empty())
    }

    /// Barrier condition: at least one sink, and every sink has a transport.
    pub fn all_attached(&self) -> bool {
        !self.sinks.is_empty() && self.sinks.values().all(Option::is_some)
    }

    /// Tracks a player that connected after the session was created.
    ///
    /// Only possible while waiting; once streaming the group is fixed.
    pub fn add_player(&mut self, player: PlayerId) -> bool {
        if self.phase != BroadcastPhase::WaitingForPlayers || self.sinks.contains_key(&player) {
            return false;
        }
        self.sinks.insert(player, None);
        log::debug!("[Broadcast] Session {} now tracks player {}", self.id, player);
        true
    }

    /// Stops tracking a player and closes its transport.
    ///
    /// While waiting, this can be the change that opens the barrier.
    pub fn remove_player(&mut self, player: PlayerId) -> bool {
        let Some(slot) = self.sinks.remove(&player) else {
            return false;
        };
        if let Some(mut transport) = slot {
            transport.close();
        }
        log::info!(
            "[Broadcast] Player {} left session {} ({} remaining)",
            player,
            self.id,
            self.sinks.len()
        );
        self.try_open_gate();
        true
    }

    /// Binds a player's stream request to its sink.
    pub fn attach(&mut self, player: PlayerId, transport: T) -> Result<(), BroadcastError> {
        match self.phase {
            BroadcastPhase::Finished => {
                return Err(BroadcastError::SessionFinished(self.id.clone()));
            }
            BroadcastPhase::Streaming if self.sinks.contains_key(&player) => {
                return Err(BroadcastError::AlreadyAttached(player));
            }
            BroadcastPhase::Streaming => return Err(BroadcastError::LateJoin(player)),
            BroadcastPhase::WaitingForPlayers => {}
        }

        let slot = self
            .sinks
            .get_mut(&player)
            .ok_or(BroadcastError::UnknownPlayer(player))?;
        if slot.is_some() {
            return Err(BroadcastError::AlreadyAttached(player));
        }
        *slot = Some(transport);
        log::info!(
            "[Broadcast] Player {} attached to session {} ({}/{})",
            player,
            self.id,
            self.attached_count(),
            self.sinks.len()
        );
        self.try_open_gate();
        Ok(())
    }

    /// Accepts a chunk from the upstream source.
    pub fn write(&mut self, chunk: Bytes) -> Flow {
        if self.is_finished() {
            log::trace!("[Broadcast] Dropping chunk for finished session {}", self.id);
            return Flow::Pause;
        }
        if !chunk.is_empty() {
            self.pending.push_back(chunk);
        }
        self.flush()
    }

    /// Marks the upstream as paused without touching the buffer.
    pub fn pause_producing(&mut self) {
        self.paused = true;
    }

    /// Retries delivery of buffered chunks.
    pub fn resume_producing(&mut self) -> Flow {
        let flow = self.flush();
        self.complete_if_drained();
        flow
    }

    /// Upstream is done. Buffered data is still delivered; the session
    /// finishes and closes every transport once the buffer is empty.
    pub fn finish(&mut self) {
        if self.upstream_done {
            return;
        }
        self.upstream_done = true;
        log::info!(
            "[Broadcast] Upstream finished for session {} ({} chunk(s) buffered)",
            self.id,
            self.pending.len()
        );
        self.flush();
        self.complete_if_drained();
    }

    fn try_open_gate(&mut self) {
        if self.phase == BroadcastPhase::WaitingForPlayers && self.all_attached() {
            self.phase = BroadcastPhase::Streaming;
            log::info!(
                "[Broadcast] All {} player(s) attached, session {} streaming {} buffered chunk(s)",
                self.sinks.len(),
                self.id,
                self.pending.len()
            );
            self.flush();
            self.complete_if_drained();
        }
    }

    fn flush(&mut self) -> Flow {
        if self.phase != BroadcastPhase::Streaming {
            self.paused = self.pending.len() >= self.pending_limit;
            return self.flow();
        }

        while !self.pending.is_empty() {
            if !self.sinks_ready() {
                self.paused = true;
                return Flow::Pause;
            }
            if let Some(chunk) = self.pending.pop_front() {
                self.broadcast(chunk);
            }
        }
        self.paused = false;
        Flow::Continue
    }

    fn flow(&self) -> Flow {
        if self.paused {
            Flow::Pause
        } else {
            Flow::Continue
        }
    }

    fn sinks_ready(&self) -> bool {
        self.sinks
            .values()
            .flatten()
            .all(|transport| transport.has_capacity())
    }

    fn broadcast(&mut self, chunk: Bytes) {
        let mut failed = Vec::new();
        for (player, slot) in self.sinks.iter_mut() {
            if let Some(transport) = slot {
                if transport.write(chunk.clone()).is_err() {
                    failed.push(*player);
                }
            }
        }
        self.bytes_sent += chunk.len() as u64;

        for player in failed {
            log::warn!(
                "[Broadcast] Write to player {} failed, dropping it from session {}",
                player,
                self.id
            );
            if let Some(Some(mut transport)) = self.sinks.remove(&player) {
                transport.close();
            }
        }
    }

    fn complete_if_drained(&mut self) {
        if self.upstream_done
            && self.phase == BroadcastPhase::Streaming
            && self.pending.is_empty()
        {
            self.phase = BroadcastPhase::Finished;
            self.paused = false;
            self.close_all();
            log::info!(
                "[Broadcast] Session {} finished after {} bytes",
                self.id,
                self.bytes_sent
            );
        }
    }

    fn close_all(&mut self) {
        for transport in self.sinks.values_mut().flatten() {
            transport.close();
        }
    }
}

impl<T: SinkTransport> Drop for BroadcastSession<T> {
    fn drop(&mut self) {
        self.close_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct MemoryState {
        chunks: Vec<Bytes>,
        limit: Option<usize>,
        closed: bool,
        broken: bool,
    }

    /// Records everything written; the test keeps a clone to inspect it.
    #[derive(Clone, Default)]
    struct MemoryTransport(Arc<Mutex<MemoryState>>);

    impl MemoryTransport {
        fn limited(limit: usize) -> Self {
            let t = Self::default();
            t.0.lock().limit = Some(limit);
            t
        }

        fn bytes(&self) -> Vec<u8> {
            self.0.lock().chunks.iter().flat_map(|c| c.to_vec()).collect()
        }

        fn chunk_count(&self) -> usize {
            self.0.lock().chunks.len()
        }

        fn is_closed(&self) -> bool {
            self.0.lock().closed
        }

        fn set_limit(&self, limit: Option<usize>) {
            self.0.lock().limit = limit;
        }

        fn break_pipe(&self) {
            self.0.lock().broken = true;
        }
    }

    impl SinkTransport for MemoryTransport {
        fn has_capacity(&self) -> bool {
            let state = self.0.lock();
            state.limit.map_or(true, |l| state.chunks.len() < l)
        }

        fn write(&mut self, chunk: Bytes) -> Result<(), SinkClosed> {
            let mut state = self.0.lock();
            if state.closed || state.broken {
                return Err(SinkClosed);
            }
            state.chunks.push(chunk);
            Ok(())
        }

        fn close(&mut self) {
            self.0.lock().closed = true;
        }
    }

    fn pid(n: u64) -> PlayerId {
        PlayerId::new(n)
    }

    fn session(players: &[u64]) -> BroadcastSession<MemoryTransport> {
        BroadcastSession::new("s1", players.iter().map(|&n| pid(n)), 64)
    }

    #[test]
    fn nothing_is_written_until_every_player_attaches() {
        let mut s = session(&[1, 2, 3]);
        let sinks: Vec<_> = (0..3).map(|_| MemoryTransport::default()).collect();

        s.attach(pid(1), sinks[0].clone()).unwrap();
        s.attach(pid(2), sinks[1].clone()).unwrap();
        s.write(Bytes::from_static(b"ab"));
        s.write(Bytes::from_static(b"cd"));
        assert!(sinks.iter().all(|t| t.bytes().is_empty()));
        assert_eq!(s.phase(), BroadcastPhase::WaitingForPlayers);

        s.attach(pid(3), sinks[2].clone()).unwrap();
        assert_eq!(s.phase(), BroadcastPhase::Streaming);
        s.write(Bytes::from_static(b"ef"));

        for t in &sinks {
            assert_eq!(t.bytes(), b"abcdef");
        }
        assert_eq!(s.bytes_sent(), 6);
    }

    #[test]
    fn empty_session_never_opens() {
        let mut s = session(&[]);
        assert!(!s.all_attached());
        s.write(Bytes::from_static(b"x"));
        assert_eq!(s.phase(), BroadcastPhase::WaitingForPlayers);
        assert_eq!(s.pending_chunks(), 1);
    }

    #[test]
    fn disconnect_mid_stream_does_not_disturb_others() {
        let mut s = session(&[1, 2, 3]);
        let sinks: Vec<_> = (0..3).map(|_| MemoryTransport::default()).collect();
        for (i, t) in sinks.iter().enumerate() {
            s.attach(pid(i as u64 + 1), t.clone()).unwrap();
        }

        s.write(Bytes::from_static(b"12"));
        assert!(s.remove_player(pid(2)));
        s.write(Bytes::from_static(b"34"));

        assert_eq!(sinks[0].bytes(), b"1234");
        assert_eq!(sinks[2].bytes(), b"1234");
        assert_eq!(sinks[1].bytes(), b"12");
        assert!(sinks[1].is_closed());
        assert_eq!(s.sink_count(), 2);
    }

    #[test]
    fn failed_write_removes_only_that_sink() {
        let mut s = session(&[1, 2]);
        let a = MemoryTransport::default();
        let b = MemoryTransport::default();
        s.attach(pid(1), a.clone()).unwrap();
        s.attach(pid(2), b.clone()).unwrap();

        b.break_pipe();
        s.write(Bytes::from_static(b"x"));
        s.write(Bytes::from_static(b"y"));

        assert_eq!(a.bytes(), b"xy");
        assert_eq!(s.player_ids(), vec![pid(1)]);
        assert_eq!(s.phase(), BroadcastPhase::Streaming);
    }

    #[test]
    fn removing_the_last_waiting_player_opens_the_gate() {
        let mut s = session(&[1, 2]);
        let a = MemoryTransport::default();
        s.attach(pid(1), a.clone()).unwrap();
        s.write(Bytes::from_static(b"hold"));

        s.remove_player(pid(2));
        assert_eq!(s.phase(), BroadcastPhase::Streaming);
        assert_eq!(a.bytes(), b"hold");
    }

    #[test]
    fn backpressure_buffers_then_resumes_in_order() {
        let mut s = session(&[1, 2]);
        let fast = MemoryTransport::default();
        let slow = MemoryTransport::limited(1);
        s.attach(pid(1), fast.clone()).unwrap();
        s.attach(pid(2), slow.clone()).unwrap();

        assert_eq!(s.write(Bytes::from_static(b"a")), Flow::Continue);
        assert_eq!(s.write(Bytes::from_static(b"b")), Flow::Pause);
        assert_eq!(s.write(Bytes::from_static(b"c")), Flow::Pause);
        assert!(s.is_paused());
        assert_eq!(fast.bytes(), b"a");
        assert_eq!(s.pending_chunks(), 2);

        // still full
        assert_eq!(s.resume_producing(), Flow::Pause);

        slow.set_limit(None);
        assert_eq!(s.resume_producing(), Flow::Continue);
        assert_eq!(fast.bytes(), b"abc");
        assert_eq!(slow.bytes(), b"abc");
        assert_eq!(fast.chunk_count(), 3);
    }

    #[test]
    fn waiting_session_asks_upstream_to_pause_when_buffer_fills() {
        let mut s: BroadcastSession<MemoryTransport> = BroadcastSession::new("s1", [pid(1)], 2);
        assert_eq!(s.write(Bytes::from_static(b"a")), Flow::Continue);
        assert_eq!(s.write(Bytes::from_static(b"b")), Flow::Pause);

        let t = MemoryTransport::default();
        s.attach(pid(1), t.clone()).unwrap();
        assert!(!s.is_paused());
        assert_eq!(t.bytes(), b"ab");
    }

    #[test]
    fn finish_flushes_then_closes() {
        let mut s = session(&[1]);
        let t = MemoryTransport::limited(1);
        s.attach(pid(1), t.clone()).unwrap();
        s.write(Bytes::from_static(b"a"));
        s.write(Bytes::from_static(b"b"));

        s.finish();
        assert!(!s.is_finished());
        assert!(!t.is_closed());

        t.set_limit(None);
        s.resume_producing();
        assert!(s.is_finished());
        assert!(t.is_closed());
        assert_eq!(t.bytes(), b"ab");
    }

    #[test]
    fn finish_while_waiting_delivers_once_attached() {
        let mut s = session(&[1]);
        s.write(Bytes::from_static(b"short"));
        s.finish();
        assert_eq!(s.phase(), BroadcastPhase::WaitingForPlayers);

        let t = MemoryTransport::default();
        s.attach(pid(1), t.clone()).unwrap();
        assert!(s.is_finished());
        assert_eq!(t.bytes(), b"short");
        assert!(t.is_closed());
    }

    #[test]
    fn attach_errors() {
        let mut s = session(&[1, 2]);
        assert!(matches!(
            s.attach(pid(9), MemoryTransport::default()),
            Err(BroadcastError::UnknownPlayer(_))
        ));
        s.attach(pid(1), MemoryTransport::default()).unwrap();
        assert!(matches!(
            s.attach(pid(1), MemoryTransport::default()),
            Err(BroadcastError::AlreadyAttached(_))
        ));
        s.attach(pid(2), MemoryTransport::default()).unwrap();

        assert!(!s.add_player(pid(3)));
        assert!(matches!(
            s.attach(pid(3), MemoryTransport::default()),
            Err(BroadcastError::LateJoin(_))
        ));
    }

    #[test]
    fn dropping_the_session_closes_transports() {
        let a = MemoryTransport::default();
        {
            let mut s = session(&[1, 2]);
            s.attach(pid(1), a.clone()).unwrap();
        }
        assert!(a.is_closed());
    }

    #[tokio::test]
    async fn channel_transport_reports_capacity_and_eof() {
        let (mut transport, mut rx) = ChannelTransport::new(1);
        assert!(transport.has_capacity());
        transport.write(Bytes::from_static(b"x")).unwrap();
        assert!(!transport.has_capacity());

        assert_eq!(rx.recv().await.unwrap().unwrap(), Bytes::from_static(b"x"));
        transport.close();
        assert!(rx.recv().await.is_none());
        assert_eq!(transport.write(Bytes::from_static(b"y")), Err(SinkClosed));
    }
}
