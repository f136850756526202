//! Inbound opcodes and STAT event codes.

use std::fmt;

use super::ProtocolError;

/// Player-to-server message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Helo,
    Stat,
    Ir,
    Bye,
    Resp,
    Body,
    Meta,
    Dsco,
    Dbug,
    Rawi,
    Anic,
    Butn,
    Knob,
    Setd,
    Ureq,
}

impl Opcode {
    /// Parses the 4-byte opcode field. Trailing `!` and space padding is ignored.
    pub fn from_wire(raw: [u8; 4]) -> Result<Self, ProtocolError> {
        let opcode = match trim_padding(&raw) {
            b"HELO" => Self::Helo,
            b"STAT" => Self::Stat,
            b"IR" => Self::Ir,
            b"BYE" => Self::Bye,
            b"RESP" => Self::Resp,
            b"BODY" => Self::Body,
            b"META" => Self::Meta,
            b"DSCO" => Self::Dsco,
            b"DBUG" => Self::Dbug,
            b"RAWI" => Self::Rawi,
            b"ANIC" => Self::Anic,
            b"BUTN" => Self::Butn,
            b"KNOB" => Self::Knob,
            b"SETD" => Self::Setd,
            b"UREQ" => Self::Ureq,
            _ => {
                return Err(ProtocolError::UnknownOpcode(
                    String::from_utf8_lossy(&raw).into_owned(),
                ))
            }
        };
        Ok(opcode)
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Helo => "HELO",
            Self::Stat => "STAT",
            Self::Ir => "IR",
            Self::Bye => "BYE",
            Self::Resp => "RESP",
            Self::Body => "BODY",
            Self::Meta => "META",
            Self::Dsco => "DSCO",
            Self::Dbug => "DBUG",
            Self::Rawi => "RAWI",
            Self::Anic => "ANIC",
            Self::Butn => "BUTN",
            Self::Knob => "KNOB",
            Self::Setd => "SETD",
            Self::Ureq => "UREQ",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn trim_padding(raw: &[u8]) -> &[u8] {
    let is_pad = |b: &u8| *b == b'!' || *b == b' ';
    let start = raw.iter().position(|b| !is_pad(b)).unwrap_or(raw.len());
    let end = raw.iter().rposition(|b| !is_pad(b)).map_or(start, |i| i + 1);
    &raw[start..end]
}

/// Event code carried in the first four bytes of a STAT payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatCode {
    /// Four zero bytes: nothing to report.
    Empty,
    /// `STMc` connect.
    Connect,
    /// `STMd` decoder ready for the next track.
    DecoderReady,
    /// `STMe` stream connection established.
    StreamEstablished,
    /// `STMf` stream connection closed.
    ConnectionClosed,
    /// `STMh` end of HTTP headers.
    EndOfHeaders,
    /// `STMn` decoder does not support the format.
    NotSupported,
    /// `STMo` output underrun.
    OutputUnderrun,
    /// `STMp` pause confirmed.
    Paused,
    /// `STMr` resume confirmed.
    Resumed,
    /// `STMs` track started.
    TrackStarted,
    /// `STMt` heartbeat.
    Timer,
    /// `STMu` decoder underrun.
    Underrun,
    /// Acknowledgement of an `aude` command.
    AckAude,
    /// Acknowledgement of an `audg` command.
    AckAudg,
    /// Acknowledgement of a `strm` command.
    AckStrm,
}

impl StatCode {
    pub fn from_wire(raw: [u8; 4]) -> Result<Self, ProtocolError> {
        let code = match &raw {
            &[0, 0, 0, 0] => Self::Empty,
            b"STMc" => Self::Connect,
            b"STMd" => Self::DecoderReady,
            b"STMe" => Self::StreamEstablished,
            b"STMf" => Self::ConnectionClosed,
            b"STMh" => Self::EndOfHeaders,
            b"STMn" => Self::NotSupported,
            b"STMo" => Self::OutputUnderrun,
            b"STMp" => Self::Paused,
            b"STMr" => Self::Resumed,
            b"STMs" => Self::TrackStarted,
            b"STMt" => Self::Timer,
            b"STMu" => Self::Underrun,
            b"aude" => Self::AckAude,
            b"audg" => Self::AckAudg,
            b"strm" => Self::AckStrm,
            _ => {
                return Err(ProtocolError::UnknownStat(
                    String::from_utf8_lossy(&raw).into_owned(),
                ))
            }
        };
        Ok(code)
    }
}
