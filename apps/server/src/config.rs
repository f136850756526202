//! Server configuration.
//!
//! Loaded from an optional YAML file, then overridden from `SLIMHUB_*`
//! environment variables; CLI flags are applied last in `main`.

use std::net::IpAddr;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use slimhub_core::protocol_constants::{DEFAULT_HTTP_PORT, DISCOVERY_PORT, SLIMPROTO_PORT};
use slimhub_core::BroadcastConfig;

/// Server configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address every listener binds to.
    /// Override: `SLIMHUB_BIND_ADDRESS`
    pub bind_address: IpAddr,

    /// SlimProto TCP port.
    /// Override: `SLIMHUB_SLIMPROTO_PORT`
    pub slimproto_port: u16,

    /// Discovery UDP port.
    /// Override: `SLIMHUB_DISCOVERY_PORT`
    pub discovery_port: u16,

    /// HTTP port for the API and player audio streams.
    /// Override: `SLIMHUB_HTTP_PORT`
    pub http_port: u16,

    /// Name announced to players; the machine hostname when unset.
    /// Override: `SLIMHUB_HOSTNAME`
    pub hostname: Option<String>,

    /// Stable instance UUID; a fresh one per run when unset.
    /// Override: `SLIMHUB_SERVER_UUID`
    pub server_uuid: Option<String>,

    /// Broadcast fan-out tuning.
    pub broadcast: BroadcastConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::from([0, 0, 0, 0]),
            slimproto_port: SLIMPROTO_PORT,
            discovery_port: DISCOVERY_PORT,
            http_port: DEFAULT_HTTP_PORT,
            hostname: None,
            server_uuid: None,
            broadcast: BroadcastConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Applies `SLIMHUB_*` overrides read through `lookup`.
    ///
    /// Unparseable values are logged and ignored.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        fn parsed<T: std::str::FromStr>(key: &str, value: Option<String>) -> Option<T> {
            let value = value?;
            match value.parse() {
                Ok(parsed) => Some(parsed),
                Err(_) => {
                    log::warn!("Ignoring invalid {}={}", key, value);
                    None
                }
            }
        }

        if let Some(addr) = parsed("SLIMHUB_BIND_ADDRESS", lookup("SLIMHUB_BIND_ADDRESS")) {
            self.bind_address = addr;
        }
        if let Some(port) = parsed("SLIMHUB_SLIMPROTO_PORT", lookup("SLIMHUB_SLIMPROTO_PORT")) {
            self.slimproto_port = port;
        }
        if let Some(port) = parsed("SLIMHUB_DISCOVERY_PORT", lookup("SLIMHUB_DISCOVERY_PORT")) {
            self.discovery_port = port;
        }
        if let Some(port) = parsed("SLIMHUB_HTTP_PORT", lookup("SLIMHUB_HTTP_PORT")) {
            self.http_port = port;
        }
        if let Some(name) = lookup("SLIMHUB_HOSTNAME").filter(|s| !s.is_empty()) {
            self.hostname = Some(name);
        }
        if let Some(uuid) = lookup("SLIMHUB_SERVER_UUID").filter(|s| !s.is_empty()) {
            self.server_uuid = Some(uuid);
        }
    }

    /// Converts to slimhub-core's Config type.
    pub fn to_core_config(&self) -> slimhub_core::Config {
        slimhub_core::Config {
            bind_address: self.bind_address,
            slimproto_port: self.slimproto_port,
            discovery_port: self.discovery_port,
            http_port: self.http_port,
            hostname: self.hostname.clone(),
            server_uuid: self.server_uuid.clone(),
            broadcast: self.broadcast.clone(),
            ..Default::default()
        }
    }
}
