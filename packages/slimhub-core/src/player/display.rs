//! Monochrome graphic display model (320x32) and its wire frame.
//!
//! Text is drawn with the 8x8 bitmap fonts from `font8x8`, scaled up so a
//! line fills half the display height.

use bytes::{BufMut, Bytes, BytesMut};
use font8x8::{UnicodeFonts, BASIC_FONTS, LATIN_FONTS};

pub const DISPLAY_WIDTH: usize = 320;
pub const DISPLAY_HEIGHT: usize = 32;

/// One big-endian `u32` per column.
pub const FRAME_BYTES: usize = DISPLAY_WIDTH * 4;

const GLYPH_SIZE: usize = 8;
const TEXT_SCALE: usize = 2;

/// Screen transition the player animates when a new frame arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transition {
    #[default]
    Clear,
    PushLeft,
    PushRight,
    PushUp,
    PushDown,
    BumpLeft,
    BumpRight,
    BumpDown,
    BumpUp,
}

impl Transition {
    /// Single-character code sent in the `grfe` header.
    pub const fn code(self) -> u8 {
        match self {
            Self::Clear => b'c',
            Self::PushLeft => b'r',
            Self::PushRight => b'l',
            Self::PushUp => b'u',
            Self::PushDown => b'd',
            Self::BumpLeft => b'L',
            Self::BumpRight => b'R',
            Self::BumpDown => b'U',
            Self::BumpUp => b'D',
        }
    }
}

/// 1-bit framebuffer, stored column-major the way the player consumes it.
///
/// Bit `b` of a column word holds the pixel at row `31 - b`, so the top row
/// is the most significant bit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Display {
    columns: Vec<u32>,
}

impl Display {
    pub fn new() -> Self {
        Self {
            columns: vec![0; DISPLAY_WIDTH],
        }
    }

    pub fn clear(&mut self) {
        self.columns.iter_mut().for_each(|c| *c = 0);
    }

    /// Sets a single pixel. Coordinates outside the display are ignored.
    pub fn set_pixel(&mut self, x: usize, y: usize, on: bool) {
        if x >= DISPLAY_WIDTH || y >= DISPLAY_HEIGHT {
            return;
        }
        let mask = 1u32 << (DISPLAY_HEIGHT - 1 - y);
        if on {
            self.columns[x] |= mask;
        } else {
            self.columns[x] &= !mask;
        }
    }

    pub fn pixel(&self, x: usize, y: usize) -> bool {
        if x >= DISPLAY_WIDTH || y >= DISPLAY_HEIGHT {
            return false;
        }
        self.columns[x] & (1u32 << (DISPLAY_HEIGHT - 1 - y)) != 0
    }

    pub fn is_blank(&self) -> bool {
        self.columns.iter().all(|c| *c == 0)
    }

    /// Replaces the display contents with a single line of text.
    pub fn render(&mut self, text: &str) {
        self.clear();
        let line_height = GLYPH_SIZE * TEXT_SCALE;
        let top = (DISPLAY_HEIGHT - line_height) / 2;
        self.draw_text(text, 0, top, TEXT_SCALE);
    }

    /// Draws `text` with its top-left corner at `(x, y)`, clipping at the edges.
    ///
    /// Returns the x coordinate just past the last glyph drawn.
    pub fn draw_text(&mut self, text: &str, x: usize, y: usize, scale: usize) -> usize {
        let advance = GLYPH_SIZE * scale;
        let mut cursor = x;
        for ch in text.chars() {
            if cursor >= DISPLAY_WIDTH {
                break;
            }
            if let Some(glyph) = glyph_for(ch) {
                self.blit(&glyph, cursor, y, scale);
            }
            cursor += advance;
        }
        cursor.min(DISPLAY_WIDTH)
    }

    fn blit(&mut self, glyph: &[u8; 8], x: usize, y: usize, scale: usize) {
        for (row, bits) in glyph.iter().enumerate() {
            for col in 0..GLYPH_SIZE {
                if bits & (1 << col) == 0 {
                    continue;
                }
                for dy in 0..scale {
                    for dx in 0..scale {
                        self.set_pixel(x + col * scale + dx, y + row * scale + dy, true);
                    }
                }
            }
        }
    }

    /// Packs the framebuffer into the 1280-byte bitmap carried by `grfe`.
    pub fn frame(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(FRAME_BYTES);
        for column in &self.columns {
            buf.put_u32(*column);
        }
        buf.freeze()
    }
}

impl Default for Display {
    fn default() -> Self {
        Self::new()
    }
}

fn glyph_for(ch: char) -> Option<[u8; 8]> {
    BASIC_FONTS
        .get(ch)
        .or_else(|| LATIN_FONTS.get(ch))
        .or_else(|| BASIC_FONTS.get('?'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_is_320_big_endian_columns() {
        let mut display = Display::new();
        display.set_pixel(0, 0, true);
        display.set_pixel(319, 31, true);

        let frame = display.frame();
        assert_eq!(frame.len(), FRAME_BYTES);
        // top row is the high bit of the first column
        assert_eq!(&frame[..4], &[0x80, 0x00, 0x00, 0x00]);
        // bottom row is the low bit of the last column
        assert_eq!(&frame[FRAME_BYTES - 4..], &[0x00, 0x00, 0x00, 0x01]);
    }

    #[test]
    fn out_of_range_pixels_are_ignored() {
        let mut display = Display::new();
        display.set_pixel(DISPLAY_WIDTH, 0, true);
        display.set_pixel(0, DISPLAY_HEIGHT, true);
        assert!(display.is_blank());
        assert!(!display.pixel(400, 40));
    }

    #[test]
    fn render_draws_text_in_the_middle_band() {
        let mut display = Display::new();
        display.render("Hi");
        assert!(!display.is_blank());
        for x in 0..DISPLAY_WIDTH {
            for y in (0..8).chain(24..32) {
                assert!(!display.pixel(x, y), "pixel lit outside text band at {},{}", x, y);
            }
        }
        // two glyphs of 16 pixels each
        assert!((32..DISPLAY_WIDTH).all(|x| (0..DISPLAY_HEIGHT).all(|y| !display.pixel(x, y))));
    }

    #[test]
    fn render_replaces_previous_contents() {
        let mut display = Display::new();
        display.set_pixel(300, 2, true);
        display.render("");
        assert!(display.is_blank());
    }

    #[test]
    fn long_text_is_clipped() {
        let mut display = Display::new();
        let end = display.draw_text(&"W".repeat(40), 0, 0, 2);
        assert_eq!(end, DISPLAY_WIDTH);
    }

    #[test]
    fn transition_codes() {
        assert_eq!(Transition::Clear.code(), b'c');
        assert_eq!(Transition::PushLeft.code(), b'r');
        assert_eq!(Transition::BumpUp.code(), b'D');
    }
}
