//! Application-wide error type and the HTTP mapping for it.
//!
//! Each subsystem keeps its own `thiserror` enum; [`SlimHubError`] is what
//! crosses the service and API boundaries.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::broadcast::BroadcastError;
use crate::discovery::DiscoveryError;
use crate::slimproto::ProtocolError;
use crate::source::SourceError;

/// Machine-readable error codes for subsystem errors.
pub trait ErrorCode {
    fn code(&self) -> &'static str;
}

impl ErrorCode for ProtocolError {
    fn code(&self) -> &'static str {
        match self {
            Self::UnknownOpcode(_) => "unknown_opcode",
            Self::UnknownStat(_) => "unknown_stat",
            Self::Truncated { .. } => "truncated_payload",
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::CommandTooLarge(_) => "command_too_large",
            Self::MalformedStream(_) => "malformed_stream",
            Self::Io(_) => "io_error",
        }
    }
}

impl ErrorCode for DiscoveryError {
    fn code(&self) -> &'static str {
        match self {
            Self::Empty => "empty_datagram",
            Self::Truncated { .. } | Self::TruncatedValue { .. } => "truncated_datagram",
            Self::UnknownType(_) => "unknown_datagram",
            Self::SocketBind(_) => "socket_bind_failed",
            Self::Send(_) => "send_failed",
        }
    }
}

impl ErrorCode for SourceError {
    fn code(&self) -> &'static str {
        match self {
            Self::Open { .. } => "source_open_failed",
            Self::Io(_) => "source_io_error",
            Self::Provider(_) => "source_failed",
            Self::WorkerUnavailable => "source_worker_unavailable",
            Self::Spawn(_) => "source_worker_spawn_failed",
        }
    }
}

impl ErrorCode for BroadcastError {
    fn code(&self) -> &'static str {
        match self {
            Self::NoActiveSession => "no_active_session",
            Self::SessionMismatch { .. } => "session_mismatch",
            Self::UnknownPlayer(_) => "unknown_player",
            Self::AlreadyAttached(_) => "already_attached",
            Self::LateJoin(_) => "late_join",
            Self::NoPlayers => "no_players",
            Self::SessionFinished(_) => "session_finished",
            Self::CoordinatorUnavailable => "coordinator_unavailable",
            Self::Source(e) => e.code(),
        }
    }
}

/// Application-wide error type for the SlimHub server.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum SlimHubError {
    #[error("Player not found: {0}")]
    PlayerNotFound(String),

    /// No broadcast session matches the request.
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// The request is valid but clashes with the current broadcast state.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The audio source could not be started or failed.
    #[error("Source error: {0}")]
    Source(String),

    /// Socket setup failed.
    #[error("Network error: {0}")]
    Network(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Discovery failed: {0}")]
    Discovery(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl SlimHubError {
    /// Returns a machine-readable error code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::PlayerNotFound(_) => "player_not_found",
            Self::SessionNotFound(_) => "session_not_found",
            Self::Conflict(_) => "conflict",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Source(_) => "source_error",
            Self::Network(_) => "network_error",
            Self::Internal(_) => "internal_error",
            Self::Configuration(_) => "configuration_error",
            Self::Discovery(_) => "discovery_failed",
            Self::Protocol(_) => "protocol_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::PlayerNotFound(_) | Self::SessionNotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub use crate::discovery::DiscoveryResult;
pub use crate::slimproto::ProtocolResult;

pub type SlimHubResult<T> = Result<T, SlimHubError>;

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    status: u16,
}

impl IntoResponse for SlimHubError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.code(),
            message: self.to_string(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<BroadcastError> for SlimHubError {
    fn from(err: BroadcastError) -> Self {
        let message = err.to_string();
        match err {
            BroadcastError::NoActiveSession
            | BroadcastError::SessionMismatch { .. }
            | BroadcastError::SessionFinished(_) => Self::SessionNotFound(message),
            BroadcastError::UnknownPlayer(_) => Self::PlayerNotFound(message),
            BroadcastError::AlreadyAttached(_)
            | BroadcastError::LateJoin(_)
            | BroadcastError::NoPlayers => Self::Conflict(message),
            BroadcastError::CoordinatorUnavailable => Self::Internal(message),
            BroadcastError::Source(e) => e.into(),
        }
    }
}

impl From<SourceError> for SlimHubError {
    fn from(err: SourceError) -> Self {
        Self::Source(err.to_string())
    }
}

impl From<DiscoveryError> for SlimHubError {
    fn from(err: DiscoveryError) -> Self {
        match err {
            DiscoveryError::SocketBind(_) => Self::Network(err.to_string()),
            _ => Self::Discovery(err.to_string()),
        }
    }
}

impl From<ProtocolError> for SlimHubError {
    fn from(err: ProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}
