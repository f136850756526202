//! UDP discovery: players broadcast probes on port 3483 and any server on
//! the network answers with its name and connection details.

mod datagram;
mod responder;

pub use datagram::{ClientProbe, Datagram, TlvEntry, TlvTag};
pub use responder::{DiscoveryResponder, DiscoveryService};

use thiserror::Error;

/// Errors from decoding datagrams or running the discovery socket.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("empty datagram")]
    Empty,

    #[error("{kind} datagram too short: expected {expected} bytes, got {actual}")]
    Truncated {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("TLV {tag} declares {declared} bytes but only {available} remain")]
    TruncatedValue {
        tag: TlvTag,
        declared: usize,
        available: usize,
    },

    #[error("unknown datagram type {0:#04x}")]
    UnknownType(u8),

    #[error("failed to bind discovery socket: {0}")]
    SocketBind(std::io::Error),

    #[error("failed to send discovery response: {0}")]
    Send(std::io::Error),
}

/// Result type for discovery operations.
pub type DiscoveryResult<T> = Result<T, DiscoveryError>;
