//! Protocol constants for SlimProto, discovery and the HTTP stream surface.
//!
//! Values here are fixed by player firmware and must not drift.

// ─────────────────────────────────────────────────────────────────────────────
// Application Identity
// ─────────────────────────────────────────────────────────────────────────────

/// Application name used in logs and the player greeting.
pub const APP_NAME: &str = "SlimHub";

/// Version reported to discovery probes (`VERS` tag).
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Text rendered on a player's display once the handshake completes.
pub const GREETING_TEXT: &str = "Connected to SlimHub";

// ─────────────────────────────────────────────────────────────────────────────
// Network Ports
// ─────────────────────────────────────────────────────────────────────────────

/// TCP port players connect to for SlimProto control.
pub const SLIMPROTO_PORT: u16 = 3483;

/// UDP port players broadcast discovery probes to.
pub const DISCOVERY_PORT: u16 = 3483;

/// HTTP port players fetch audio from. Also advertised in `strm`.
pub const DEFAULT_HTTP_PORT: u16 = 9000;

// ─────────────────────────────────────────────────────────────────────────────
// SlimProto Framing
// ─────────────────────────────────────────────────────────────────────────────

/// Protocol version announced in the `vers` command.
pub const SLIMPROTO_VERSION: &str = "7.0";

/// Inbound header: 4-byte opcode followed by a 4-byte big-endian length.
pub const INBOUND_HEADER_LEN: usize = 8;

/// Largest inbound payload accepted before the connection is dropped.
pub const MAX_INBOUND_PAYLOAD: usize = 1024 * 1024;

/// The outbound 16-bit length field counts the 4-byte command tag as well.
pub const OUTBOUND_TAG_LEN: usize = 4;

/// Minimum HELO payload: device id, firmware revision, 6-byte MAC.
pub const HELO_MIN_LEN: usize = 8;

/// IR payload: 4-byte timestamp, 2 pad bytes, 4-byte code.
pub const IR_PAYLOAD_LEN: usize = 10;

/// Length of the fixed `strm` header before the optional HTTP request line.
pub const STRM_HEADER_LEN: usize = 24;

/// Display brightness sent during the handshake (`grfb`).
pub const DEFAULT_BRIGHTNESS: u16 = 4;

// ─────────────────────────────────────────────────────────────────────────────
// Discovery
// ─────────────────────────────────────────────────────────────────────────────

/// Hostname field width in the legacy `D` response.
pub const LEGACY_HOSTNAME_LEN: usize = 16;

/// Length of a legacy `d` discovery request.
pub const LEGACY_REQUEST_LEN: usize = 18;

/// TLV values are length-prefixed by a single byte.
pub const MAX_TLV_VALUE_LEN: usize = 255;

// ─────────────────────────────────────────────────────────────────────────────
// Event Channel
// ─────────────────────────────────────────────────────────────────────────────

/// Default capacity of the internal event broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 100;

// ─────────────────────────────────────────────────────────────────────────────
// Broadcast Fan-out
// ─────────────────────────────────────────────────────────────────────────────

/// Default number of frames queued per player before the source is paused.
pub const DEFAULT_SINK_QUEUE_FRAMES: usize = 64;

/// Default capacity of the worker-to-coordinator frame channel.
pub const DEFAULT_SOURCE_CHANNEL_CAPACITY: usize = 32;

/// Default interval at which a paused broadcast retries resumption.
pub const DEFAULT_RESUME_POLL_MS: u64 = 20;

/// Default size of chunks read by the file provider.
pub const DEFAULT_READ_CHUNK_BYTES: usize = 16 * 1024;
