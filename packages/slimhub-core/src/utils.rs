//! General utilities shared across the application.

use std::fmt::Write as _;
use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the current Unix timestamp in milliseconds.
///
/// Returns 0 if the system clock is before the Unix epoch.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Renders bytes as space-separated lowercase hex, for diagnostics.
#[must_use]
pub fn hex_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{:02x}", b);
    }
    out
}

/// Truncates `s` to at most `max_bytes` bytes without splitting a UTF-8 character.
#[must_use]
pub fn truncate_utf8(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_bytes_formats_pairs() {
        assert_eq!(hex_bytes(&[0x00, 0x04, 0x20, 0xff]), "00 04 20 ff");
        assert_eq!(hex_bytes(&[]), "");
    }

    #[test]
    fn truncate_utf8_respects_char_boundaries() {
        assert_eq!(truncate_utf8("jukebox", 16), "jukebox");
        assert_eq!(truncate_utf8("abcdefghijklmnopq", 16), "abcdefghijklmnop");
        // 'é' is two bytes; cutting at 16 would split the final one
        let name = "aaaaaaaaaaaaaaaé";
        assert_eq!(name.len(), 17);
        assert_eq!(truncate_utf8(name, 16), "aaaaaaaaaaaaaaa");
    }
}
