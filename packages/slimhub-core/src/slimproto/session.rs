//! Per-connection SlimProto state machine.
//!
//! [`PlayerSession`] performs no I/O. Inbound frames go in through
//! [`PlayerSession::handle_frame`], outbound commands accumulate in an outbox
//! the connection task drains, and events go straight to the emitter.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use bytes::Buf;

use super::codec::InboundFrame;
use super::command::{AudioGain, DisplayFrame, FormatCode, ServerCommand, StreamCommand};
use super::opcode::{Opcode, StatCode};
use super::registry::{PlayerCommand, PlayerSnapshot};
use super::{ProtocolError, ProtocolResult};
use crate::events::{EventEmitter, PlayerEvent};
use crate::player::{Display, RemoteButton, Visualisation, Volume};
use crate::protocol_constants::{
    DEFAULT_BRIGHTNESS, GREETING_TEXT, HELO_MIN_LEN, IR_PAYLOAD_LEN, SLIMPROTO_VERSION,
};
use crate::types::{DeviceType, MacAddress, PlayerId, PlayerState};
use crate::utils::now_millis;

/// What a player should fetch and show when told to play.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackRequest {
    pub format: FormatCode,
    /// Server-relative stream path; the player's id is appended as `pid`.
    pub stream_path: String,
    pub title: Option<String>,
    pub artist: Option<String>,
}

impl TrackRequest {
    /// Builds the request URI for one player.
    pub fn player_uri(&self, player: PlayerId) -> String {
        let separator = if self.stream_path.contains('?') { '&' } else { '?' };
        format!("{}{}pid={}", self.stream_path, separator, player)
    }

    fn display_text(&self) -> Option<String> {
        match (&self.title, &self.artist) {
            (Some(title), Some(artist)) => Some(format!("{} by {}", title, artist)),
            (Some(title), None) => Some(title.clone()),
            (None, Some(artist)) => Some(artist.clone()),
            (None, None) => None,
        }
    }
}

/// Protocol state for one connected player.
pub struct PlayerSession {
    id: PlayerId,
    addr: SocketAddr,
    http_port: u16,
    device_type: Option<DeviceType>,
    mac: Option<MacAddress>,
    firmware_revision: Option<u8>,
    volume: Volume,
    display: Display,
    state: PlayerState,
    last_heartbeat: Option<Instant>,
    connected_at: u64,
    outbox: Vec<ServerCommand>,
    emitter: Arc<dyn EventEmitter>,
}

impl PlayerSession {
    /// Creates a session for a freshly accepted connection.
    ///
    /// `http_port` is advertised in `strm` so the player knows where to fetch audio.
    pub fn new(
        id: PlayerId,
        addr: SocketAddr,
        http_port: u16,
        emitter: Arc<dyn EventEmitter>,
    ) -> Self {
        Self {
            id,
            addr,
            http_port,
            device_type: None,
            mac: None,
            firmware_revision: None,
            volume: Volume::default(),
            display: Display::new(),
            state: PlayerState::Disconnected,
            last_heartbeat: None,
            connected_at: now_millis(),
            outbox: Vec::new(),
            emitter,
        }
    }

    pub fn id(&self) -> PlayerId {
        self.id
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn device_type(&self) -> Option<DeviceType> {
        self.device_type
    }

    pub fn mac(&self) -> Option<MacAddress> {
        self.mac
    }

    pub fn volume(&self) -> Volume {
        self.volume
    }

    pub fn display(&self) -> &Display {
        &self.display
    }

    pub fn last_heartbeat(&self) -> Option<Instant> {
        self.last_heartbeat
    }

    /// True once HELO has been processed.
    pub fn is_established(&self) -> bool {
        self.device_type.is_some() && self.state.is_connected()
    }

    /// Takes every command queued since the last drain, in send order.
    pub fn drain_outbox(&mut self) -> Vec<ServerCommand> {
        std::mem::take(&mut self.outbox)
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            id: self.id,
            addr: self.addr.to_string(),
            device_type: self.device_type,
            mac: self.mac,
            firmware_revision: self.firmware_revision,
            state: self.state,
            volume: self.volume.level(),
            connected_at: self.connected_at,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Inbound
    // ─────────────────────────────────────────────────────────────────────────

    /// Dispatches one inbound message. An error means the connection must close.
    pub fn handle_frame(&mut self, frame: InboundFrame) -> ProtocolResult<()> {
        match frame.opcode {
            Opcode::Helo => self.on_helo(&frame.payload),
            Opcode::Stat => self.on_stat(&frame.payload),
            Opcode::Ir => self.on_ir(&frame.payload),
            Opcode::Dsco => {
                log::info!("[Slim] Player {} data stream disconnected", self.id);
                Ok(())
            }
            other => {
                log::debug!(
                    "[Slim] {} received from player {} ({} bytes)",
                    other,
                    self.id,
                    frame.payload.len()
                );
                Ok(())
            }
        }
    }

    fn on_helo(&mut self, payload: &[u8]) -> ProtocolResult<()> {
        if payload.len() < HELO_MIN_LEN {
            return Err(ProtocolError::Truncated {
                opcode: "HELO",
                expected: HELO_MIN_LEN,
                actual: payload.len(),
            });
        }
        let mut mac = [0u8; 6];
        mac.copy_from_slice(&payload[2..8]);

        let device_type = DeviceType::from_id(payload[0]);
        self.device_type = Some(device_type);
        self.firmware_revision = Some(payload[1]);
        self.mac = Some(MacAddress::new(mac));
        log::info!(
            "[Slim] HELO from {} ({}, firmware {}) as player {}",
            MacAddress::new(mac),
            device_type,
            payload[1],
            self.id
        );

        self.initialise_client();
        Ok(())
    }

    fn initialise_client(&mut self) {
        self.send(ServerCommand::Version(SLIMPROTO_VERSION.to_string()));
        self.send(ServerCommand::Stream(StreamCommand::stop()));
        self.send(ServerCommand::Brightness(DEFAULT_BRIGHTNESS));
        self.send(ServerCommand::Visualisation(Visualisation::default()));
        self.send(ServerCommand::Setting(0));
        self.send(ServerCommand::Setting(4));
        self.send(ServerCommand::EnableAudio {
            spdif: true,
            dac: true,
        });
        self.send_volume();
        // The player echoes this back in STMt; only the low 16 bits fit.
        self.send(ServerCommand::Stream(StreamCommand::status(
            now_millis() as u16,
        )));

        self.transition(PlayerState::Established);
        self.render(GREETING_TEXT);
    }

    fn on_stat(&mut self, payload: &[u8]) -> ProtocolResult<()> {
        if payload.len() < 4 {
            return Err(ProtocolError::Truncated {
                opcode: "STAT",
                expected: 4,
                actual: payload.len(),
            });
        }
        let code = StatCode::from_wire([payload[0], payload[1], payload[2], payload[3]])?;
        match code {
            StatCode::Empty => log::trace!("[Slim] Informational STAT from player {}", self.id),
            StatCode::DecoderReady => self.transition(PlayerState::Ready),
            StatCode::Paused => self.transition(PlayerState::Paused),
            StatCode::Resumed | StatCode::TrackStarted => self.transition(PlayerState::Playing),
            StatCode::Underrun => self.transition(PlayerState::Underrun),
            StatCode::Timer => self.last_heartbeat = Some(Instant::now()),
            other => log::debug!("[Slim] STAT {:?} from player {}", other, self.id),
        }
        Ok(())
    }

    fn on_ir(&mut self, payload: &[u8]) -> ProtocolResult<()> {
        if payload.len() < IR_PAYLOAD_LEN {
            return Err(ProtocolError::Truncated {
                opcode: "IR",
                expected: IR_PAYLOAD_LEN,
                actual: payload.len(),
            });
        }
        let mut buf = payload;
        let time = buf.get_u32();
        buf.advance(2);
        let code = buf.get_u32();

        let Some(button) = RemoteButton::from_code(code) else {
            log::debug!("[Slim] Unknown IR code {} at {} from player {}", code, time, self.id);
            return Ok(());
        };
        log::debug!("[Slim] IR {} from player {}", button, self.id);

        self.emitter.emit_player(PlayerEvent::RemoteButtonPressed {
            player_id: self.id,
            button,
            timestamp: now_millis(),
        });
        match button {
            RemoteButton::VolumeUp => {
                self.volume.increment();
                self.send_volume();
            }
            RemoteButton::VolumeDown => {
                self.volume.decrement();
                self.send_volume();
            }
            _ => {}
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Outbound
    // ─────────────────────────────────────────────────────────────────────────

    /// Applies a command from the control plane.
    pub fn apply(&mut self, command: PlayerCommand) {
        match command {
            PlayerCommand::Play(track) => self.play(&track),
            PlayerCommand::Pause => self.pause(),
            PlayerCommand::Unpause => self.unpause(),
            PlayerCommand::Stop => self.stop(),
            PlayerCommand::SetVolume(level) => self.set_volume(level),
            PlayerCommand::Render(text) => self.render(&text),
        }
    }

    pub fn play(&mut self, track: &TrackRequest) {
        let uri = track.player_uri(self.id);
        log::info!("[Slim] Requesting play of {} on player {}", uri, self.id);
        self.send(ServerCommand::Stream(StreamCommand::start(
            track.format,
            uri,
            self.http_port,
        )));
        if let Some(text) = track.display_text() {
            self.render(&text);
        }
    }

    pub fn pause(&mut self) {
        log::info!("[Slim] Sending pause to player {}", self.id);
        self.send(ServerCommand::Stream(StreamCommand::pause()));
    }

    pub fn unpause(&mut self) {
        log::info!("[Slim] Sending unpause to player {}", self.id);
        self.send(ServerCommand::Stream(StreamCommand::unpause()));
    }

    pub fn stop(&mut self) {
        self.send(ServerCommand::Stream(StreamCommand::stop()));
        self.transition(PlayerState::Stopped);
    }

    pub fn set_volume(&mut self, level: u8) {
        self.volume.set(level);
        self.send_volume();
    }

    /// Replaces the display with `text` and sends the new frame.
    pub fn render(&mut self, text: &str) {
        self.display.render(text);
        self.send(ServerCommand::Display(DisplayFrame::new(self.display.frame())));
    }

    /// Marks the connection gone. Emits once, even if called repeatedly.
    pub fn disconnect(&mut self) {
        if self.state != PlayerState::Disconnected || self.device_type.is_some() {
            self.device_type = None;
            self.transition(PlayerState::Disconnected);
        }
    }

    fn send_volume(&mut self) {
        let gain = AudioGain::from_volume(&self.volume);
        log::debug!(
            "[Slim] Volume {} on player {} ({}/{})",
            self.volume.level(),
            self.id,
            gain.old_left,
            gain.new_left
        );
        self.send(ServerCommand::Gain(gain));
        self.emitter.emit_player(PlayerEvent::VolumeChanged {
            player_id: self.id,
            volume: self.volume.level(),
            old_gain: gain.old_left,
            new_gain: gain.new_left,
            timestamp: now_millis(),
        });
    }

    fn send(&mut self, command: ServerCommand) {
        self.outbox.push(command);
    }

    fn transition(&mut self, state: PlayerState) {
        self.state = state;
        self.emitter.emit_player(PlayerEvent::StateChanged {
            player_id: self.id,
            mac: self.mac,
            state,
            timestamp: now_millis(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingEventEmitter;
    use crate::slimproto::StreamAction;
    use bytes::Bytes;

    fn session() -> (PlayerSession, Arc<RecordingEventEmitter>) {
        let emitter = Arc::new(RecordingEventEmitter::default());
        let session = PlayerSession::new(
            PlayerId::new(3),
            "10.0.0.5:40000".parse().unwrap(),
            9000,
            emitter.clone(),
        );
        (session, emitter)
    }

    fn frame(opcode: Opcode, payload: &[u8]) -> InboundFrame {
        InboundFrame {
            opcode,
            payload: Bytes::copy_from_slice(payload),
        }
    }

    fn helo(device: u8) -> InboundFrame {
        frame(Opcode::Helo, &[device, 1, 0x00, 0x04, 0x20, 0x12, 0x34, 0x56])
    }

    fn states(emitter: &RecordingEventEmitter) -> Vec<PlayerState> {
        emitter
            .player_events()
            .into_iter()
            .filter_map(|event| match event {
                PlayerEvent::StateChanged { state, .. } => Some(state),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn helo_runs_the_init_sequence() {
        let (mut session, emitter) = session();
        session.handle_frame(helo(4)).unwrap();

        assert_eq!(session.device_type().map(|d| d.as_str()), Some("squeezebox2"));
        assert_eq!(session.mac().unwrap().to_string(), "00:04:20:12:34:56");
        assert!(session.is_established());

        let sent = session.drain_outbox();
        let tags: Vec<&[u8; 4]> = sent.iter().map(|c| c.tag()).collect();
        assert_eq!(
            tags,
            vec![
                b"vers", b"strm", b"grfb", b"visu", b"setd", b"setd", b"aude", b"audg", b"strm",
                b"grfe"
            ]
        );
        assert_eq!(sent[0], ServerCommand::Version("7.0".into()));
        match &sent[1] {
            ServerCommand::Stream(stream) => assert_eq!(stream, &StreamCommand::stop()),
            other => panic!("expected strm q, got {:?}", other),
        }
        match &sent[8] {
            ServerCommand::Stream(stream) => {
                assert_eq!(stream.action, StreamAction::Status)
            }
            other => panic!("expected strm t, got {:?}", other),
        }

        let events = emitter.player_events();
        assert!(matches!(events[0], PlayerEvent::VolumeChanged { volume: 50, .. }));
        assert!(matches!(
            events[1],
            PlayerEvent::StateChanged {
                state: PlayerState::Established,
                ..
            }
        ));
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn short_helo_is_fatal() {
        let (mut session, _) = session();
        assert!(matches!(
            session.handle_frame(frame(Opcode::Helo, &[4, 1, 0])),
            Err(ProtocolError::Truncated { opcode: "HELO", .. })
        ));
    }

    #[test]
    fn unknown_device_id() {
        let (mut session, _) = session();
        session.handle_frame(helo(42)).unwrap();
        assert_eq!(session.device_type(), Some(DeviceType::Unknown));
    }

    #[test]
    fn track_started_emits_exactly_one_playing() {
        let (mut session, emitter) = session();
        session.handle_frame(frame(Opcode::Stat, b"STMs\0\0\0\0")).unwrap();
        assert_eq!(states(&emitter), vec![PlayerState::Playing]);
        assert_eq!(session.state(), PlayerState::Playing);
    }

    #[test]
    fn stat_transitions() {
        let (mut session, emitter) = session();
        for code in [b"STMp", b"STMr", b"STMu", b"STMd"] {
            session.handle_frame(frame(Opcode::Stat, code)).unwrap();
        }
        assert_eq!(
            states(&emitter),
            vec![
                PlayerState::Paused,
                PlayerState::Playing,
                PlayerState::Underrun,
                PlayerState::Ready
            ]
        );
    }

    #[test]
    fn heartbeat_and_informational_stats_emit_nothing() {
        let (mut session, emitter) = session();
        session.handle_frame(frame(Opcode::Stat, b"STMt")).unwrap();
        session.handle_frame(frame(Opcode::Stat, &[0, 0, 0, 0])).unwrap();
        session.handle_frame(frame(Opcode::Stat, b"STMh")).unwrap();
        session.handle_frame(frame(Opcode::Stat, b"audg")).unwrap();
        assert!(session.last_heartbeat().is_some());
        assert!(emitter.take().is_empty());
    }

    #[test]
    fn bad_stats_are_fatal() {
        let (mut session, _) = session();
        assert!(session.handle_frame(frame(Opcode::Stat, b"ST")).is_err());
        assert!(matches!(
            session.handle_frame(frame(Opcode::Stat, b"STMx")),
            Err(ProtocolError::UnknownStat(_))
        ));
    }

    #[test]
    fn volume_up_button_steps_and_sends_gain() {
        let (mut session, emitter) = session();
        let mut payload = vec![0, 0, 0, 9, 0, 0];
        payload.extend_from_slice(&1988722815u32.to_be_bytes());
        session.handle_frame(frame(Opcode::Ir, &payload)).unwrap();

        assert_eq!(session.volume().level(), 51);
        let sent = session.drain_outbox();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].tag(), b"audg");

        let events = emitter.player_events();
        assert!(matches!(
            events[0],
            PlayerEvent::RemoteButtonPressed {
                button: RemoteButton::VolumeUp,
                ..
            }
        ));
        assert!(matches!(events[1], PlayerEvent::VolumeChanged { volume: 51, .. }));
    }

    #[test]
    fn unknown_ir_code_is_ignored() {
        let (mut session, emitter) = session();
        session
            .handle_frame(frame(Opcode::Ir, &[0, 0, 0, 1, 0, 0, 0, 0, 0, 1]))
            .unwrap();
        assert!(session.drain_outbox().is_empty());
        assert!(emitter.take().is_empty());
    }

    #[test]
    fn play_sends_request_with_player_id() {
        let (mut session, _) = session();
        session.play(&TrackRequest {
            format: FormatCode::Mp3,
            stream_path: "/stream/abc".into(),
            title: Some("Song".into()),
            artist: Some("Band".into()),
        });
        let sent = session.drain_outbox();
        match &sent[0] {
            ServerCommand::Stream(stream) => {
                assert_eq!(stream.request_uri.as_deref(), Some("/stream/abc?pid=3"));
                assert_eq!(stream.format, FormatCode::Mp3);
                assert_eq!(stream.server_port, 9000);
            }
            other => panic!("expected strm s, got {:?}", other),
        }
        assert_eq!(sent[1].tag(), b"grfe");
    }

    #[test]
    fn stop_moves_to_stopped() {
        let (mut session, emitter) = session();
        session.stop();
        assert_eq!(session.state(), PlayerState::Stopped);
        assert_eq!(states(&emitter), vec![PlayerState::Stopped]);
    }

    #[test]
    fn disconnect_emits_once() {
        let (mut session, emitter) = session();
        session.handle_frame(helo(4)).unwrap();
        emitter.take();

        session.disconnect();
        session.disconnect();
        assert_eq!(states(&emitter), vec![PlayerState::Disconnected]);
    }

    #[test]
    fn logged_only_opcodes_are_accepted() {
        let (mut session, emitter) = session();
        for opcode in [Opcode::Bye, Opcode::Resp, Opcode::Meta, Opcode::Ureq] {
            session.handle_frame(frame(opcode, b"x")).unwrap();
        }
        assert!(session.drain_outbox().is_empty());
        assert!(emitter.take().is_empty());
    }
}
