//! Application bootstrap and dependency wiring.
//!
//! The composition root: every service is created here, in dependency order,
//! and the long-running listeners are started from here.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::api::{self, AppState};
use crate::broadcast::{BroadcastCoordinator, BroadcastHandle};
use crate::context::ServerIdentity;
use crate::discovery::{DiscoveryResponder, DiscoveryService};
use crate::error::{SlimHubError, SlimHubResult};
use crate::events::{
    BroadcastEventBridge, EventEmitter, EventFilter, EventKind, LoggingEventEmitter,
};
use crate::runtime::BackgroundTasks;
use crate::services::PlaybackService;
use crate::slimproto::SlimService;
use crate::source::SourceWorker;
use crate::state::Config;

/// How long each background task gets to stop after cancellation.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Container for all bootstrapped services.
pub struct BootstrappedServices {
    pub config: Arc<RwLock<Config>>,
    /// How the server presents itself to players.
    pub identity: ServerIdentity,
    /// Event feed shared by the session engine, the broadcast layer and the source worker.
    pub event_bridge: Arc<BroadcastEventBridge>,
    /// SlimProto listener and player registry.
    pub slim: Arc<SlimService>,
    pub source_worker: Arc<SourceWorker>,
    pub broadcast: BroadcastHandle,
    pub playback: Arc<PlaybackService>,
    /// Held until the background tasks start.
    coordinator: Mutex<Option<BroadcastCoordinator>>,
    tasks: BackgroundTasks,
}

impl BootstrappedServices {
    pub fn cancel_token(&self) -> &CancellationToken {
        self.tasks.cancel_token()
    }

    /// Builds the API state from the wired services.
    pub fn app_state(&self) -> AppState {
        AppState::builder()
            .playback(Arc::clone(&self.playback))
            .broadcast(self.broadcast.clone())
            .event_bridge(Arc::clone(&self.event_bridge))
            .identity(self.identity.clone())
            .config(Arc::clone(&self.config))
            .build()
    }

    /// Spawns the broadcast coordinator. Returns false if it is already running.
    pub fn start_coordinator(&self) -> bool {
        let Some(coordinator) = self.coordinator.lock().take() else {
            return false;
        };
        self.tasks
            .spawn("broadcast", move |cancel| coordinator.run(cancel));
        true
    }

    /// Binds the SlimProto, discovery and HTTP sockets and starts serving.
    ///
    /// # Errors
    ///
    /// Returns [`SlimHubError::Network`] if any socket cannot be bound.
    pub async fn start_background_tasks(&self) -> SlimHubResult<()> {
        let config = self.config.read().clone();
        self.start_coordinator();

        let slim_addr = SocketAddr::new(config.bind_address, config.slimproto_port);
        let listener = SlimService::bind(slim_addr).map_err(|e| {
            SlimHubError::Network(format!("failed to bind SlimProto on {}: {}", slim_addr, e))
        })?;
        let slim = Arc::clone(&self.slim);
        self.tasks
            .spawn("slimproto", move |cancel| slim.run(listener, cancel));

        let discovery_addr = SocketAddr::new(config.bind_address, config.discovery_port);
        let discovery = Arc::new(DiscoveryService::bind(
            discovery_addr,
            DiscoveryResponder::new(self.identity.clone()),
        )?);
        self.tasks
            .spawn("discovery", move |cancel| discovery.run(cancel));

        let http_addr = SocketAddr::new(config.bind_address, config.http_port);
        let listener = TcpListener::bind(http_addr).await.map_err(|e| {
            SlimHubError::Network(format!("failed to bind HTTP on {}: {}", http_addr, e))
        })?;
        let state = self.app_state();
        self.tasks.spawn("http", move |cancel| async move {
            if let Err(e) = api::serve(listener, state, cancel).await {
                log::error!("[Bootstrap] HTTP server failed: {}", e);
            }
        });

        log::info!(
            "[Bootstrap] Serving as '{}': slimproto={}, discovery={}, http={}",
            self.identity.hostname,
            slim_addr,
            discovery_addr,
            http_addr
        );
        Ok(())
    }

    /// Initiates graceful shutdown of all services.
    pub async fn shutdown(&self) {
        log::info!("[Bootstrap] Beginning graceful shutdown...");

        let total = self.tasks.len();
        let clean = self.tasks.shutdown(SHUTDOWN_GRACE).await;
        log::info!("[Bootstrap] {}/{} task(s) stopped cleanly", clean, total);

        let worker = Arc::clone(&self.source_worker);
        if let Err(e) = tokio::task::spawn_blocking(move || worker.shutdown()).await {
            log::error!("[Bootstrap] Source worker shutdown failed: {}", e);
        }

        log::info!("[Bootstrap] Shutdown complete");
    }
}

/// Bootstraps all application services with their dependencies.
///
/// Wiring order:
///
/// 1. Identity and the event bridge
/// 2. SlimProto service (publishes player events to the bridge)
/// 3. Source worker thread
/// 4. Broadcast coordinator (subscribes to player state changes)
/// 5. Playback service (drives both of the above)
///
/// Nothing is bound until [`BootstrappedServices::start_background_tasks`].
///
/// # Errors
///
/// Returns an error if the configuration is invalid, if called outside a
/// Tokio runtime, or if the source worker thread cannot be spawned.
pub fn bootstrap_services(config: &Config) -> SlimHubResult<BootstrappedServices> {
    config.validate().map_err(SlimHubError::Configuration)?;

    let handle = tokio::runtime::Handle::try_current()
        .map_err(|e| SlimHubError::Internal(format!("no Tokio runtime: {}", e)))?;
    let tasks = BackgroundTasks::new(handle, CancellationToken::new());

    let identity = ServerIdentity::from_config(config);

    let event_bridge = Arc::new(BroadcastEventBridge::new(config.event_channel_capacity));
    event_bridge.set_external_emitter(Arc::new(LoggingEventEmitter));

    let slim = Arc::new(SlimService::new(
        Arc::clone(&event_bridge) as Arc<dyn EventEmitter>,
        config.http_port,
    ));

    let source_worker = Arc::new(SourceWorker::spawn(
        config.broadcast.source_channel_capacity,
    )?);

    // Subscribe before any player can connect so the roster misses nothing.
    let player_states =
        event_bridge.subscribe_filtered(EventFilter::only([EventKind::PlayerStateChanged]));
    let (coordinator, broadcast) = BroadcastCoordinator::new(
        player_states,
        Arc::clone(slim.registry()),
        Arc::clone(&source_worker),
        Arc::clone(&event_bridge) as Arc<dyn EventEmitter>,
        config.broadcast.clone(),
    );

    let playback = Arc::new(PlaybackService::new(
        Arc::clone(&slim),
        broadcast.clone(),
        identity.clone(),
        config.broadcast.read_chunk_bytes,
    ));

    log::info!(
        "[Bootstrap] Services wired for '{}' ({})",
        identity.hostname,
        identity.uuid
    );

    Ok(BootstrappedServices {
        config: Arc::new(RwLock::new(config.clone())),
        identity,
        event_bridge,
        slim,
        source_worker,
        broadcast,
        playback,
        coordinator: Mutex::new(Some(coordinator)),
        tasks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::PlayerEvent;
    use crate::types::{PlayerId, PlayerState};
    use crate::utils::now_millis;

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let config = Config {
            event_channel_capacity: 0,
            ..Config::default()
        };
        let err = bootstrap_services(&config).err().unwrap();
        assert_eq!(err.code(), "configuration_error");
    }

    #[tokio::test]
    async fn coordinator_starts_once_and_tracks_players() {
        let services = bootstrap_services(&Config::default()).unwrap();
        assert!(services.start_coordinator());
        assert!(!services.start_coordinator());

        services.event_bridge.emit_player(PlayerEvent::StateChanged {
            player_id: PlayerId::new(7),
            mac: None,
            state: PlayerState::Established,
            timestamp: now_millis(),
        });
        let mut roster = Vec::new();
        for _ in 0..200 {
            roster = services.broadcast.roster().await.unwrap();
            if !roster.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(roster, vec![PlayerId::new(7)]);

        services.shutdown().await;
        assert!(services.cancel_token().is_cancelled());
    }

    #[tokio::test]
    async fn serves_on_ephemeral_ports() {
        let config = Config {
            bind_address: "127.0.0.1".parse().unwrap(),
            slimproto_port: 0,
            discovery_port: 0,
            http_port: 0,
            ..Config::default()
        };
        let services = bootstrap_services(&config).unwrap();
        services.start_background_tasks().await.unwrap();
        services.shutdown().await;
    }
}
