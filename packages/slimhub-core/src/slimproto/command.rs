//! Server-to-player commands and their payload layouts.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use super::ProtocolError;
use crate::player::{Transition, Visualisation, Volume};
use crate::protocol_constants::{DEFAULT_HTTP_PORT, STRM_HEADER_LEN};

// ─────────────────────────────────────────────────────────────────────────────
// strm
// ─────────────────────────────────────────────────────────────────────────────

/// The command character that opens every `strm` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamAction {
    Start,
    Pause,
    Unpause,
    Stop,
    /// Heartbeat request; the player answers with `STMt`.
    Status,
}

impl StreamAction {
    pub const fn code(self) -> u8 {
        match self {
            Self::Start => b's',
            Self::Pause => b'p',
            Self::Unpause => b'u',
            Self::Stop => b'q',
            Self::Status => b't',
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            b's' => Some(Self::Start),
            b'p' => Some(Self::Pause),
            b'u' => Some(Self::Unpause),
            b'q' => Some(Self::Stop),
            b't' => Some(Self::Status),
            _ => None,
        }
    }
}

/// Audio container the player must decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatCode {
    #[default]
    Ogg,
    Mp3,
    Flac,
    Pcm,
}

impl FormatCode {
    pub const fn code(self) -> u8 {
        match self {
            Self::Ogg => b'o',
            Self::Mp3 => b'm',
            Self::Flac => b'f',
            Self::Pcm => b'p',
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            b'o' => Some(Self::Ogg),
            b'm' => Some(Self::Mp3),
            b'f' => Some(Self::Flac),
            b'p' => Some(Self::Pcm),
            _ => None,
        }
    }

    /// Content type served on the audio stream endpoint.
    pub const fn mime_type(self) -> &'static str {
        match self {
            Self::Ogg => "audio/ogg",
            Self::Mp3 => "audio/mpeg",
            Self::Flac => "audio/flac",
            Self::Pcm => "audio/L16",
        }
    }
}

/// The 24-byte `strm` header plus the optional HTTP request line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamCommand {
    pub action: StreamAction,
    /// ASCII `'0'` or `'1'`.
    pub autostart: u8,
    pub format: FormatCode,
    pub pcm_args: [u8; 4],
    pub threshold: u8,
    pub spdif: u8,
    pub transition_duration: u8,
    pub transition_type: u8,
    pub flags: u8,
    pub output_threshold: u8,
    pub replay_gain_high: u16,
    pub replay_gain_low: u16,
    pub server_port: u16,
    /// Zero tells the player to reuse the control connection's server address.
    pub server_ip: u32,
    /// Path (and query) the player requests over HTTP/1.0.
    pub request_uri: Option<String>,
}

impl StreamCommand {
    pub fn new(action: StreamAction) -> Self {
        Self {
            action,
            autostart: b'1',
            format: FormatCode::Ogg,
            pcm_args: *b"1321",
            threshold: 255,
            spdif: b'0',
            transition_duration: 0,
            transition_type: b'0',
            flags: 0x40,
            output_threshold: 0,
            replay_gain_high: 0,
            replay_gain_low: 0,
            server_port: DEFAULT_HTTP_PORT,
            server_ip: 0,
            request_uri: None,
        }
    }

    pub fn stop() -> Self {
        Self {
            autostart: b'0',
            flags: 0,
            ..Self::new(StreamAction::Stop)
        }
    }

    pub fn pause() -> Self {
        Self {
            autostart: b'0',
            flags: 0,
            ..Self::new(StreamAction::Pause)
        }
    }

    pub fn unpause() -> Self {
        Self {
            autostart: b'0',
            flags: 0,
            ..Self::new(StreamAction::Unpause)
        }
    }

    /// Heartbeat carrying a timestamp the player echoes back.
    pub fn status(timestamp: u16) -> Self {
        Self {
            flags: 0,
            replay_gain_high: timestamp,
            ..Self::new(StreamAction::Status)
        }
    }

    /// Tells the player to fetch and decode `uri` from `server_port`.
    pub fn start(format: FormatCode, uri: String, server_port: u16) -> Self {
        Self {
            flags: 0,
            format,
            server_port,
            request_uri: Some(uri),
            ..Self::new(StreamAction::Start)
        }
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        dst.put_u8(self.action.code());
        dst.put_u8(self.autostart);
        dst.put_u8(self.format.code());
        dst.put_slice(&self.pcm_args);
        dst.put_u8(self.threshold);
        dst.put_u8(self.spdif);
        dst.put_u8(self.transition_duration);
        dst.put_u8(self.transition_type);
        dst.put_u8(self.flags);
        dst.put_u8(self.output_threshold);
        dst.put_u8(0);
        dst.put_u16(self.replay_gain_high);
        dst.put_u16(self.replay_gain_low);
        dst.put_u16(self.server_port);
        dst.put_u32(self.server_ip);
        if let Some(uri) = &self.request_uri {
            dst.put_slice(format!("GET {} HTTP/1.0\r\n\r\n", uri).as_bytes());
        }
    }

    pub fn decode(mut src: &[u8]) -> Result<Self, ProtocolError> {
        if src.len() < STRM_HEADER_LEN {
            return Err(ProtocolError::Truncated {
                opcode: "strm",
                expected: STRM_HEADER_LEN,
                actual: src.len(),
            });
        }
        let action = StreamAction::from_code(src.get_u8())
            .ok_or_else(|| ProtocolError::MalformedStream("unknown command".into()))?;
        let autostart = src.get_u8();
        let format = FormatCode::from_code(src.get_u8())
            .ok_or_else(|| ProtocolError::MalformedStream("unknown format".into()))?;
        let mut pcm_args = [0u8; 4];
        src.copy_to_slice(&mut pcm_args);
        let threshold = src.get_u8();
        let spdif = src.get_u8();
        let transition_duration = src.get_u8();
        let transition_type = src.get_u8();
        let flags = src.get_u8();
        let output_threshold = src.get_u8();
        let _reserved = src.get_u8();
        let replay_gain_high = src.get_u16();
        let replay_gain_low = src.get_u16();
        let server_port = src.get_u16();
        let server_ip = src.get_u32();

        let request_uri = if src.is_empty() {
            None
        } else {
            let request = std::str::from_utf8(src)
                .map_err(|_| ProtocolError::MalformedStream("request is not UTF-8".into()))?;
            let uri = request
                .strip_prefix("GET ")
                .and_then(|rest| rest.strip_suffix(" HTTP/1.0\r\n\r\n"))
                .ok_or_else(|| ProtocolError::MalformedStream("bad request line".into()))?;
            Some(uri.to_string())
        };

        Ok(Self {
            action,
            autostart,
            format,
            pcm_args,
            threshold,
            spdif,
            transition_duration,
            transition_type,
            flags,
            output_threshold,
            replay_gain_high,
            replay_gain_low,
            server_port,
            server_ip,
            request_uri,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// audg / grfe
// ─────────────────────────────────────────────────────────────────────────────

/// Left/right gains in both encodings, plus the digital volume and preamp bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioGain {
    pub old_left: u32,
    pub old_right: u32,
    pub digital_volume_control: u8,
    pub preamp: u8,
    pub new_left: u32,
    pub new_right: u32,
}

impl AudioGain {
    pub fn from_volume(volume: &Volume) -> Self {
        let old = volume.old_gain();
        let new = volume.new_gain();
        Self {
            old_left: old,
            old_right: old,
            digital_volume_control: 1,
            preamp: 255,
            new_left: new,
            new_right: new,
        }
    }

    fn encode(&self, dst: &mut BytesMut) {
        dst.put_u32(self.old_left);
        dst.put_u32(self.old_right);
        dst.put_u8(self.digital_volume_control);
        dst.put_u8(self.preamp);
        dst.put_u32(self.new_left);
        dst.put_u32(self.new_right);
    }
}

/// A full-screen bitmap update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayFrame {
    pub offset: u16,
    pub transition: Transition,
    pub param: i8,
    pub bitmap: Bytes,
}

impl DisplayFrame {
    pub fn new(bitmap: Bytes) -> Self {
        Self {
            offset: 0,
            transition: Transition::Clear,
            param: 0,
            bitmap,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

/// Everything the server sends to a player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerCommand {
    Version(String),
    Stream(StreamCommand),
    Brightness(u16),
    Display(DisplayFrame),
    Gain(AudioGain),
    EnableAudio { spdif: bool, dac: bool },
    Visualisation(Visualisation),
    Setting(u8),
}

impl ServerCommand {
    pub const fn tag(&self) -> &'static [u8; 4] {
        match self {
            Self::Version(_) => b"vers",
            Self::Stream(_) => b"strm",
            Self::Brightness(_) => b"grfb",
            Self::Display(_) => b"grfe",
            Self::Gain(_) => b"audg",
            Self::EnableAudio { .. } => b"aude",
            Self::Visualisation(_) => b"visu",
            Self::Setting(_) => b"setd",
        }
    }

    pub fn payload(&self) -> Bytes {
        let mut buf = BytesMut::new();
        match self {
            Self::Version(version) => buf.put_slice(version.as_bytes()),
            Self::Stream(stream) => stream.encode(&mut buf),
            Self::Brightness(level) => buf.put_u16(*level),
            Self::Display(frame) => {
                buf.put_u16(frame.offset);
                buf.put_u8(frame.transition.code());
                buf.put_i8(frame.param);
                buf.put_slice(&frame.bitmap);
            }
            Self::Gain(gain) => gain.encode(&mut buf),
            Self::EnableAudio { spdif, dac } => {
                buf.put_u8(u8::from(*spdif));
                buf.put_u8(u8::from(*dac));
            }
            Self::Visualisation(visualisation) => return visualisation.encode(),
            Self::Setting(id) => buf.put_u8(*id),
        }
        buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strm_defaults_layout() {
        let mut buf = BytesMut::new();
        StreamCommand::new(StreamAction::Stop).encode(&mut buf);
        assert_eq!(buf.len(), STRM_HEADER_LEN);
        assert_eq!(&buf[..7], b"q1o1321");
        assert_eq!(buf[7], 255);
        assert_eq!(buf[8], b'0');
        assert_eq!(buf[11], 0x40);
        assert_eq!(&buf[18..20], &9000u16.to_be_bytes());
        assert_eq!(&buf[20..24], &[0, 0, 0, 0]);
    }

    #[test]
    fn strm_round_trip_with_request() {
        let command = StreamCommand {
            replay_gain_high: 0xbeef,
            replay_gain_low: 7,
            server_ip: 0x0a00_0001,
            ..StreamCommand::start(FormatCode::Flac, "/stream/abc?pid=3".into(), 9001)
        };
        let mut buf = BytesMut::new();
        command.encode(&mut buf);
        assert!(buf.ends_with(b"GET /stream/abc?pid=3 HTTP/1.0\r\n\r\n"));
        assert_eq!(StreamCommand::decode(&buf).unwrap(), command);
    }

    #[test]
    fn strm_decode_rejects_short_payload() {
        assert!(matches!(
            StreamCommand::decode(&[b'q'; 10]),
            Err(ProtocolError::Truncated { expected: 24, actual: 10, .. })
        ));
    }

    #[test]
    fn heartbeat_carries_timestamp() {
        let command = StreamCommand::status(0x1234);
        let mut buf = BytesMut::new();
        command.encode(&mut buf);
        assert_eq!(&buf[..2], b"t1");
        assert_eq!(buf[11], 0);
        assert_eq!(&buf[14..16], &[0x12, 0x34]);
    }

    #[test]
    fn gain_payload_is_eighteen_bytes() {
        let payload = ServerCommand::Gain(AudioGain::from_volume(&Volume::new(100))).payload();
        assert_eq!(payload.len(), 18);
        assert_eq!(&payload[..8], &[0, 0, 0, 128, 0, 0, 0, 128]);
        assert_eq!(&payload[8..10], &[1, 255]);
        assert_eq!(&payload[10..14], &65536u32.to_be_bytes());
    }

    #[test]
    fn display_payload_header() {
        let frame = DisplayFrame {
            offset: 0,
            transition: Transition::PushLeft,
            param: -1,
            bitmap: Bytes::from_static(&[0xaa; 4]),
        };
        let payload = ServerCommand::Display(frame).payload();
        assert_eq!(&payload[..], &[0, 0, b'r', 0xff, 0xaa, 0xaa, 0xaa, 0xaa]);
    }

    #[test]
    fn small_commands() {
        assert_eq!(&ServerCommand::Brightness(4).payload()[..], &[0, 4]);
        assert_eq!(&ServerCommand::Setting(4).payload()[..], &[4]);
        assert_eq!(
            &ServerCommand::EnableAudio { spdif: true, dac: true }.payload()[..],
            &[1, 1]
        );
    }
}
