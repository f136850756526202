//! Per-player audio stream endpoint.
//!
//! Each player fetches `/stream/{session_id}?pid=<token>` after being told to
//! play. The request is attached to that player's sink in the broadcast; the
//! response body ends when the session closes the sink.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use axum::{
    body::Body,
    extract::{connect_info::ConnectInfo, Path, Query, State},
    http::header,
    response::Response,
};
use bytes::Bytes;
use futures::stream::StreamExt;
use serde::Deserialize;
use tokio_stream::wrappers::ReceiverStream;

use crate::api::AppState;
use crate::error::{SlimHubError, SlimHubResult};
use crate::protocol_constants::APP_NAME;
use crate::types::PlayerId;

#[derive(Debug, Deserialize)]
pub(super) struct StreamQuery {
    pid: Option<String>,
}

/// Logs a summary of one player's stream when the body is dropped.
struct StreamGuard {
    session_id: String,
    player: PlayerId,
    remote: SocketAddr,
    started: Instant,
    bytes: AtomicU64,
    chunks: AtomicU64,
}

impl StreamGuard {
    fn record(&self, chunk: &Bytes) {
        self.bytes.fetch_add(chunk.len() as u64, Ordering::Relaxed);
        self.chunks.fetch_add(1, Ordering::Relaxed);
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        log::info!(
            "[Stream] Closed: player={}, client={}, session={}, {} bytes in {} chunk(s) over {:?}",
            self.player,
            self.remote,
            self.session_id,
            self.bytes.load(Ordering::Relaxed),
            self.chunks.load(Ordering::Relaxed),
            self.started.elapsed()
        );
    }
}

pub(super) async fn stream_audio(
    Path(session_id): Path<String>,
    Query(query): Query<StreamQuery>,
    State(state): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
) -> SlimHubResult<Response> {
    let pid = query
        .pid
        .ok_or_else(|| SlimHubError::InvalidRequest("missing pid parameter".into()))?;
    let player: PlayerId = pid
        .parse()
        .map_err(|_| SlimHubError::InvalidRequest(format!("invalid pid: {}", pid)))?;

    log::info!(
        "[Stream] New connection: player={}, client={}, session={}",
        player,
        remote,
        session_id
    );
    let rx = state.broadcast.attach(&session_id, player).await?;

    let content_type = state
        .playback
        .stream_format(&session_id)
        .map_or("application/octet-stream", |format| format.mime_type());

    let guard = StreamGuard {
        session_id,
        player,
        remote,
        started: Instant::now(),
        bytes: AtomicU64::new(0),
        chunks: AtomicU64::new(0),
    };
    let body = ReceiverStream::new(rx).map(move |chunk| {
        if let Ok(ref bytes) = chunk {
            guard.record(bytes);
        }
        chunk
    });

    Response::builder()
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CACHE_CONTROL, "no-cache")
        .header("icy-name", APP_NAME)
        .body(Body::from_stream(body))
        .map_err(|e| SlimHubError::Internal(e.to_string()))
}
