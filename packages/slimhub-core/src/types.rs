//! Identity and state types shared between the session engine, the event
//! feed and the broadcast layer.

use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize, Serializer};

// ─────────────────────────────────────────────────────────────────────────────
// Player Identity
// ─────────────────────────────────────────────────────────────────────────────

/// Opaque per-connection identity token.
///
/// Rendered in decimal inside the stream URI a player is told to fetch
/// (`?pid=<id>`), and parsed back when the player's HTTP request arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(u64);

impl PlayerId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PlayerId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

/// Hands out unique [`PlayerId`]s for the lifetime of the process.
#[derive(Debug, Default)]
pub struct PlayerIdAllocator {
    last: AtomicU64,
}

impl PlayerIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> PlayerId {
        PlayerId(self.last.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Hardware Address
// ─────────────────────────────────────────────────────────────────────────────

/// 6-byte hardware address reported by a player in HELO or a discovery probe.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            a, b, c, d, e, g
        )
    }
}

impl fmt::Debug for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MacAddress({})", self)
    }
}

impl Serialize for MacAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Device Type
// ─────────────────────────────────────────────────────────────────────────────

/// Player hardware family, resolved from the HELO device id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceType {
    Squeezebox,
    Softsqueeze,
    Squeezebox2,
    Transporter,
    Softsqueeze3,
    Unknown,
}

impl DeviceType {
    pub const fn from_id(id: u8) -> Self {
        match id {
            2 => Self::Squeezebox,
            3 => Self::Softsqueeze,
            4 => Self::Squeezebox2,
            5 => Self::Transporter,
            6 => Self::Softsqueeze3,
            _ => Self::Unknown,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Squeezebox => "squeezebox",
            Self::Softsqueeze => "softsqueeze",
            Self::Squeezebox2 => "squeezebox2",
            Self::Transporter => "transporter",
            Self::Softsqueeze3 => "softsqueeze3",
            Self::Unknown => "unknown device",
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for DeviceType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Player State
// ─────────────────────────────────────────────────────────────────────────────

/// Connection and playback state of a single player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlayerState {
    /// No handshake yet, or the connection has gone away.
    Disconnected,
    /// HELO received and the init sequence sent.
    Established,
    /// Server told the player to stop.
    Stopped,
    Paused,
    Playing,
    /// Player reported its decoder ran dry.
    Underrun,
    /// Player finished decoding and is ready for the next track.
    Ready,
}

impl PlayerState {
    /// True once the handshake has completed and until the connection ends.
    pub const fn is_connected(&self) -> bool {
        !matches!(self, Self::Disconnected)
    }
}

impl fmt::Display for PlayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Established => "established",
            Self::Stopped => "stopped",
            Self::Paused => "paused",
            Self::Playing => "playing",
            Self::Underrun => "underrun",
            Self::Ready => "ready",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_table_matches_firmware_ids() {
        assert_eq!(DeviceType::from_id(4).as_str(), "squeezebox2");
        assert_eq!(DeviceType::from_id(5), DeviceType::Transporter);
        assert_eq!(DeviceType::from_id(0).as_str(), "unknown device");
        assert_eq!(DeviceType::from_id(99), DeviceType::Unknown);
    }

    #[test]
    fn player_ids_are_unique_and_round_trip_as_decimal() {
        let ids = PlayerIdAllocator::new();
        let a = ids.next_id();
        let b = ids.next_id();
        assert_ne!(a, b);
        assert_eq!(a.to_string().parse::<PlayerId>().unwrap(), a);
    }

    #[test]
    fn mac_address_serializes_as_colon_hex() {
        let mac = MacAddress::new([0x00, 0x04, 0x20, 0x12, 0xab, 0xcd]);
        assert_eq!(mac.to_string(), "00:04:20:12:ab:cd");
        assert_eq!(
            serde_json::to_string(&mac).unwrap(),
            "\"00:04:20:12:ab:cd\""
        );
    }
}
