//! Core configuration types.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::protocol_constants::{
    DEFAULT_HTTP_PORT, DEFAULT_READ_CHUNK_BYTES, DEFAULT_RESUME_POLL_MS,
    DEFAULT_SINK_QUEUE_FRAMES, DEFAULT_SOURCE_CHANNEL_CAPACITY, DISCOVERY_PORT,
    EVENT_CHANNEL_CAPACITY, SLIMPROTO_PORT,
};

/// Configuration for synchronized broadcast fan-out.
///
/// Controls how much audio may queue per player and how the source is
/// throttled when players fall behind.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct BroadcastConfig {
    /// Frames queued per player before the source is paused.
    pub sink_queue_frames: usize,

    /// Capacity of the channel carrying frames from the source worker.
    pub source_channel_capacity: usize,

    /// Interval at which a paused broadcast retries resumption (milliseconds).
    pub resume_poll_ms: u64,

    /// Chunk size used by the file provider (bytes).
    pub read_chunk_bytes: usize,
}

impl BroadcastConfig {
    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.sink_queue_frames == 0 {
            return Err("sink_queue_frames must be >= 1 (mpsc::channel panics on 0)".to_string());
        }
        if self.source_channel_capacity == 0 {
            return Err(
                "source_channel_capacity must be >= 1 (mpsc::channel panics on 0)".to_string(),
            );
        }
        if self.resume_poll_ms == 0 {
            return Err("resume_poll_ms must be >= 1".to_string());
        }
        if self.read_chunk_bytes == 0 {
            return Err("read_chunk_bytes must be >= 1".to_string());
        }
        Ok(())
    }

    pub fn resume_poll(&self) -> Duration {
        Duration::from_millis(self.resume_poll_ms)
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            sink_queue_frames: DEFAULT_SINK_QUEUE_FRAMES,
            source_channel_capacity: DEFAULT_SOURCE_CHANNEL_CAPACITY,
            resume_poll_ms: DEFAULT_RESUME_POLL_MS,
            read_chunk_bytes: DEFAULT_READ_CHUNK_BYTES,
        }
    }
}

/// Configuration for the SlimHub server.
///
/// All fields have sensible defaults.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Address every listener binds to.
    pub bind_address: IpAddr,

    /// TCP port for SlimProto control connections.
    pub slimproto_port: u16,

    /// UDP port for discovery probes.
    pub discovery_port: u16,

    /// HTTP port for the control API and audio streams.
    pub http_port: u16,

    /// Name announced to players. Defaults to the machine hostname.
    pub hostname: Option<String>,

    /// Instance UUID announced to players. Generated when unset.
    pub server_uuid: Option<String>,

    /// Capacity of the event broadcast channel.
    pub event_channel_capacity: usize,

    /// Broadcast fan-out settings.
    pub broadcast: BroadcastConfig,
}

impl Config {
    pub fn validate(&self) -> Result<(), String> {
        if self.event_channel_capacity == 0 {
            return Err(
                "event_channel_capacity must be >= 1 (broadcast::channel panics on 0)".to_string(),
            );
        }
        self.broadcast.validate()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            slimproto_port: SLIMPROTO_PORT,
            discovery_port: DISCOVERY_PORT,
            http_port: DEFAULT_HTTP_PORT,
            hostname: None,
            server_uuid: None,
            event_channel_capacity: EVENT_CHANNEL_CAPACITY,
            broadcast: BroadcastConfig::default(),
        }
    }
}
