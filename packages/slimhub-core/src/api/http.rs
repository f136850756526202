//! HTTP route handlers.
//!
//! All handlers are thin; they delegate to the playback service and the
//! broadcast handle.

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::api::events::stream_events;
use crate::api::response::{api_ok, api_success};
use crate::api::stream::stream_audio;
use crate::api::AppState;
use crate::error::{SlimHubError, SlimHubResult};
use crate::protocol_constants::{APP_NAME, SERVER_VERSION};
use crate::services::TrackSpec;
use crate::types::PlayerId;

// ─────────────────────────────────────────────────────────────────────────────
// Request Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct VolumeRequest {
    volume: u8,
}

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

/// Creates the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/players", get(list_players))
        .route("/api/players/{id}", get(get_player))
        .route("/api/players/{id}/volume", post(set_volume))
        .route("/api/playback/play", post(play))
        .route("/api/playback/pause", post(pause))
        .route("/api/playback/unpause", post(unpause))
        .route("/api/playback/stop", post(stop))
        .route("/api/broadcast", get(broadcast_status))
        .route("/api/events", get(stream_events))
        .route("/stream/{session_id}", get(stream_audio))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn parse_player_id(raw: &str) -> SlimHubResult<PlayerId> {
    raw.parse()
        .map_err(|_| SlimHubError::InvalidRequest(format!("invalid player id: {}", raw)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    api_success(json!({
        "status": "ok",
        "service": APP_NAME,
        "version": SERVER_VERSION,
        "hostname": state.identity.hostname,
        "players": state.playback.players().len(),
    }))
}

async fn list_players(State(state): State<AppState>) -> impl IntoResponse {
    api_success(json!({ "players": state.playback.players() }))
}

async fn get_player(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> SlimHubResult<impl IntoResponse> {
    let player = state.playback.player(parse_player_id(&id)?)?;
    Ok(api_success(player))
}

async fn set_volume(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<VolumeRequest>,
) -> SlimHubResult<impl IntoResponse> {
    let player = parse_player_id(&id)?;
    state.playback.set_volume(player, payload.volume)?;
    Ok(api_ok())
}

async fn play(
    State(state): State<AppState>,
    Json(track): Json<TrackSpec>,
) -> SlimHubResult<impl IntoResponse> {
    let started = state.playback.play_file(track).await?;
    Ok(api_success(started))
}

async fn pause(State(state): State<AppState>) -> impl IntoResponse {
    api_success(json!({ "players": state.playback.pause() }))
}

async fn unpause(State(state): State<AppState>) -> impl IntoResponse {
    api_success(json!({ "players": state.playback.unpause() }))
}

async fn stop(State(state): State<AppState>) -> SlimHubResult<impl IntoResponse> {
    let players = state.playback.stop().await?;
    Ok(api_success(json!({ "players": players })))
}

async fn broadcast_status(State(state): State<AppState>) -> SlimHubResult<impl IntoResponse> {
    let status = state.broadcast.status().await?;
    let roster = state.broadcast.roster().await?;
    Ok(api_success(json!({ "broadcast": status, "roster": roster })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::bootstrap_services;
    use crate::state::Config;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio_util::sync::CancellationToken;

    /// Serves the router on an ephemeral port and returns its address.
    async fn spawn_api(
        cancel: &CancellationToken,
    ) -> (std::net::SocketAddr, crate::bootstrap::BootstrappedServices) {
        let config = Config {
            hostname: Some("jukebox".into()),
            ..Config::default()
        };
        let services = bootstrap_services(&config).unwrap();
        services.start_coordinator();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(crate::api::serve(listener, services.app_state(), cancel.clone()));
        (addr, services)
    }

    async fn request(addr: std::net::SocketAddr, method: &str, path: &str, body: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let raw = format!(
            "{} {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
            method,
            path,
            body.len(),
            body
        );
        stream.write_all(raw.as_bytes()).await.unwrap();
        let mut response = String::new();
        tokio::time::timeout(Duration::from_secs(5), stream.read_to_string(&mut response))
            .await
            .unwrap()
            .unwrap();
        response
    }

    #[tokio::test]
    async fn health_reports_identity() {
        let cancel = CancellationToken::new();
        let (addr, _services) = spawn_api(&cancel).await;

        let response = request(addr, "GET", "/health", "").await;
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains(r#""hostname":"jukebox""#));
        assert!(response.contains(r#""players":0"#));
        cancel.cancel();
    }

    #[tokio::test]
    async fn unknown_player_volume_is_404() {
        let cancel = CancellationToken::new();
        let (addr, _services) = spawn_api(&cancel).await;

        let response = request(addr, "POST", "/api/players/42/volume", r#"{"volume":10}"#).await;
        assert!(response.starts_with("HTTP/1.1 404"));
        assert!(response.contains(r#""error":"player_not_found""#));

        let response = request(addr, "POST", "/api/players/abc/volume", r#"{"volume":10}"#).await;
        assert!(response.starts_with("HTTP/1.1 400"));
        cancel.cancel();
    }

    #[tokio::test]
    async fn stream_without_session_is_404() {
        let cancel = CancellationToken::new();
        let (addr, _services) = spawn_api(&cancel).await;

        let response = request(addr, "GET", "/stream/nope?pid=1", "").await;
        assert!(response.starts_with("HTTP/1.1 404"));
        assert!(response.contains(r#""error":"session_not_found""#));

        let response = request(addr, "GET", "/stream/nope", "").await;
        assert!(response.starts_with("HTTP/1.1 400"));
        cancel.cancel();
    }

    #[tokio::test]
    async fn event_feed_streams_player_events() {
        use crate::events::{EventEmitter, PlayerEvent};
        use crate::types::PlayerState;

        let cancel = CancellationToken::new();
        let (addr, services) = spawn_api(&cancel).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /api/events?category=player HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();

        // Keep emitting until the subscriber, which attaches asynchronously,
        // has seen one.
        let mut received = String::new();
        let mut buf = [0u8; 1024];
        for _ in 0..100 {
            services.event_bridge.emit_player(PlayerEvent::StateChanged {
                player_id: PlayerId::new(7),
                mac: None,
                state: PlayerState::Established,
                timestamp: 0,
            });
            if let Ok(Ok(n)) =
                tokio::time::timeout(Duration::from_millis(50), stream.read(&mut buf)).await
            {
                received.push_str(&String::from_utf8_lossy(&buf[..n]));
                if received.contains("event: player") {
                    break;
                }
            }
        }

        assert!(received.starts_with("HTTP/1.1 200"), "{}", received);
        assert!(received.contains("text/event-stream"));
        assert!(received.contains("event: player"), "{}", received);
        assert!(received.contains(r#""state":"established""#), "{}", received);

        let response = request(addr, "GET", "/api/events?category=bogus", "").await;
        assert!(response.starts_with("HTTP/1.1 400"));
        cancel.cancel();
    }

    #[tokio::test]
    async fn broadcast_status_is_empty_when_idle() {
        let cancel = CancellationToken::new();
        let (addr, _services) = spawn_api(&cancel).await;

        let response = request(addr, "GET", "/api/broadcast", "").await;
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains(r#""broadcast":null"#));
        assert!(response.contains(r#""roster":[]"#));
        cancel.cancel();
    }
}
