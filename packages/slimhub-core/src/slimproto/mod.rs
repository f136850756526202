//! SlimProto: the TCP control protocol spoken by Squeezebox players.
//!
//! - [`SlimCodec`] frames inbound messages and serializes outbound commands
//! - [`PlayerSession`] is the per-connection state machine
//! - [`SlimService`] accepts connections and keeps the [`PlayerRegistry`]

mod codec;
mod command;
mod opcode;
mod registry;
mod service;
mod session;

pub use codec::{InboundFrame, SlimCodec};
pub use command::{
    AudioGain, DisplayFrame, FormatCode, ServerCommand, StreamAction, StreamCommand,
};
pub use opcode::{Opcode, StatCode};
pub use registry::{PlayerCommand, PlayerHandle, PlayerRegistry, PlayerSnapshot};
pub use service::SlimService;
pub use session::{PlayerSession, TrackRequest};

use thiserror::Error;

/// Errors that end a SlimProto connection.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unknown opcode {0:?}")]
    UnknownOpcode(String),

    #[error("unknown STAT event {0:?}")]
    UnknownStat(String),

    #[error("{opcode} payload too short: expected {expected} bytes, got {actual}")]
    Truncated {
        opcode: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("inbound payload of {length} bytes exceeds limit of {max}")]
    PayloadTooLarge { length: usize, max: usize },

    #[error("outbound command of {0} bytes does not fit a 16-bit length")]
    CommandTooLarge(usize),

    #[error("malformed strm: {0}")]
    MalformedStream(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for SlimProto operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
