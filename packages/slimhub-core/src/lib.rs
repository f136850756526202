//! SlimHub Core - server-side engine for Squeezebox-family network players.
//!
//! This crate speaks the SlimProto control protocol to hardware and software
//! Squeezebox players, answers their UDP discovery probes, and fans a single
//! audio source out to every connected player in lock-step.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`slimproto`]: Frame codec, per-connection session engine and player registry
//! - [`discovery`]: UDP discovery datagram codec and responder
//! - [`broadcast`]: Synchronized fan-out of one source to many players
//! - [`source`]: Worker thread that produces audio frames for a broadcast
//! - [`player`]: Volume, display, remote-control and visualiser models
//! - [`events`]: Event system shared by all components
//! - [`services`]: Playback orchestration across slimproto and broadcast
//! - [`api`]: HTTP control surface and audio stream endpoint
//! - [`error`]: Centralized error types
//!
//! # Abstraction Traits
//!
//! - [`EventEmitter`](events::EventEmitter): Emitting domain events
//! - [`SinkTransport`](broadcast::SinkTransport): Per-player audio transports
//! - [`AudioProvider`](source::AudioProvider): Blocking audio producers

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod bootstrap;
pub mod broadcast;
pub mod context;
pub mod discovery;
pub mod error;
pub mod events;
pub mod player;
pub mod protocol_constants;
pub mod runtime;
pub mod services;
pub mod slimproto;
pub mod source;
pub mod state;
pub mod types;
pub mod utils;

// Re-export commonly used types at the crate root
pub use context::ServerIdentity;
pub use error::{ErrorCode, SlimHubError, SlimHubResult};
pub use events::{
    BroadcastEvent, BroadcastEventBridge, EventEmitter, EventFilter, EventKind, PlayerEvent,
    SourceEvent,
};
pub use state::{BroadcastConfig, Config};
pub use types::{DeviceType, MacAddress, PlayerId, PlayerState};
pub use utils::now_millis;

// Re-export protocol types
pub use slimproto::{PlayerRegistry, PlayerSession, SlimCodec, SlimService};

// Re-export broadcast types
pub use broadcast::{BroadcastCoordinator, BroadcastHandle, BroadcastSession};

// Re-export bootstrap types
pub use bootstrap::{bootstrap_services, BootstrappedServices};

// Re-export API types
pub use api::{start_server, AppState, AppStateBuilder, ServerError};
