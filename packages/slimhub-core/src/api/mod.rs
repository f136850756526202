//! HTTP API layer.
//!
//! Thin handlers over the playback service and the broadcast handle, plus the
//! per-player audio stream endpoint.

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::broadcast::BroadcastHandle;
use crate::context::ServerIdentity;
use crate::events::BroadcastEventBridge;
use crate::services::PlaybackService;
use crate::state::Config;

pub mod events;
pub mod http;
pub mod response;
pub mod stream;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind to port: {0}")]
    Bind(#[from] std::io::Error),
}

/// Shared application state for the API layer.
#[derive(Clone)]
pub struct AppState {
    pub playback: Arc<PlaybackService>,
    pub broadcast: BroadcastHandle,
    pub event_bridge: Arc<BroadcastEventBridge>,
    pub identity: ServerIdentity,
    pub config: Arc<RwLock<Config>>,
}

/// Builder for constructing an `AppState`.
#[derive(Default)]
pub struct AppStateBuilder {
    playback: Option<Arc<PlaybackService>>,
    broadcast: Option<BroadcastHandle>,
    event_bridge: Option<Arc<BroadcastEventBridge>>,
    identity: Option<ServerIdentity>,
    config: Option<Arc<RwLock<Config>>>,
}

impl AppStateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn playback(mut self, playback: Arc<PlaybackService>) -> Self {
        self.playback = Some(playback);
        self
    }

    pub fn broadcast(mut self, broadcast: BroadcastHandle) -> Self {
        self.broadcast = Some(broadcast);
        self
    }

    pub fn event_bridge(mut self, bridge: Arc<BroadcastEventBridge>) -> Self {
        self.event_bridge = Some(bridge);
        self
    }

    pub fn identity(mut self, identity: ServerIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn config(mut self, config: Arc<RwLock<Config>>) -> Self {
        self.config = Some(config);
        self
    }

    /// Builds the `AppState`, panicking if required fields are missing.
    pub fn build(self) -> AppState {
        AppState {
            playback: self.playback.expect("playback is required"),
            broadcast: self.broadcast.expect("broadcast is required"),
            event_bridge: self.event_bridge.expect("event_bridge is required"),
            identity: self.identity.expect("identity is required"),
            config: self.config.expect("config is required"),
        }
    }
}

impl AppState {
    pub fn builder() -> AppStateBuilder {
        AppStateBuilder::new()
    }
}

/// Binds the configured HTTP address and serves until `cancel` fires.
pub async fn start_server(state: AppState, cancel: CancellationToken) -> Result<(), ServerError> {
    let addr = {
        let config = state.config.read();
        SocketAddr::new(config.bind_address, config.http_port)
    };
    let listener = TcpListener::bind(addr).await?;
    serve(listener, state, cancel).await
}

/// Serves the API on an already-bound listener.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    cancel: CancellationToken,
) -> Result<(), ServerError> {
    log::info!("[Server] Listening on http://{}", listener.local_addr()?);
    let app = http::create_router(state);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(cancel.cancelled_owned())
    .await?;
    log::info!("[Server] HTTP server stopped");
    Ok(())
}
