//! Server identity shared by discovery, the session engine and the HTTP surface.

use crate::protocol_constants::SERVER_VERSION;
use crate::state::Config;

/// How this server presents itself to players on the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerIdentity {
    /// Full hostname, answered to `NAME` requests and truncated for legacy probes.
    pub hostname: String,
    /// Instance UUID, answered to `UUID` requests.
    pub uuid: String,
    /// Server version, answered to `VERS` requests.
    pub version: String,
    /// Port players fetch audio from, answered to `JSON` requests.
    pub http_port: u16,
}

impl ServerIdentity {
    /// Resolves the identity from configuration, filling in the machine
    /// hostname and a fresh UUID where the configuration leaves them unset.
    pub fn from_config(config: &Config) -> Self {
        Self {
            hostname: config
                .hostname
                .clone()
                .unwrap_or_else(detect_hostname),
            uuid: config
                .server_uuid
                .clone()
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            version: SERVER_VERSION.to_string(),
            http_port: config.http_port,
        }
    }

    /// Server-relative path of the audio stream for a broadcast session.
    pub fn stream_path(&self, session_id: &str) -> String {
        format!("/stream/{}", session_id)
    }
}

/// Returns the machine hostname, or `"slimhub"` if it cannot be read.
pub fn detect_hostname() -> String {
    match hostname::get() {
        Ok(name) => name.to_string_lossy().into_owned(),
        Err(e) => {
            log::warn!("[Context] Could not read hostname, using default: {}", e);
            "slimhub".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_values_win() {
        let config = Config {
            hostname: Some("jukebox".into()),
            server_uuid: Some("fixed".into()),
            http_port: 9100,
            ..Config::default()
        };
        let identity = ServerIdentity::from_config(&config);
        assert_eq!(identity.hostname, "jukebox");
        assert_eq!(identity.uuid, "fixed");
        assert_eq!(identity.http_port, 9100);
        assert_eq!(identity.stream_path("abc"), "/stream/abc");
    }

    #[test]
    fn missing_values_are_filled_in() {
        let identity = ServerIdentity::from_config(&Config::default());
        assert!(!identity.hostname.is_empty());
        assert_eq!(identity.uuid.len(), 36);
    }
}
