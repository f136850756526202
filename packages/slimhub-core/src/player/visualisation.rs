//! Visualiser parameter blocks carried by the `visu` command.

use bytes::{BufMut, Bytes, BytesMut};

/// Which visualiser the player should run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Visualisation {
    None,
    SpectrumAnalyser(SpectrumAnalyser),
}

impl Visualisation {
    const NONE_ID: u8 = 0;
    const SPECTRUM_ID: u8 = 2;

    /// Encodes the `visu` payload: type byte, word count, then parameter words.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        match self {
            Self::None => {
                buf.put_u8(Self::NONE_ID);
                buf.put_u8(0);
            }
            Self::SpectrumAnalyser(spectrum) => {
                let words = spectrum.words();
                buf.put_u8(Self::SPECTRUM_ID);
                // Count of words that follow, mono included (11, not 3).
                buf.put_u8(words.len() as u8);
                for word in words {
                    buf.put_u32(word);
                }
            }
        }
        buf.freeze()
    }
}

impl Default for Visualisation {
    fn default() -> Self {
        Self::SpectrumAnalyser(SpectrumAnalyser::stereo())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMode {
    Stereo,
    Mono,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bandwidth {
    High,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    LeftToRight,
    RightToLeft,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clipping {
    ShowAll,
    ClipSubbands,
}

/// Geometry of one analyser channel on the display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpectrumChannel {
    pub position: u32,
    pub width: u32,
    pub orientation: Orientation,
    pub bar_width: u32,
    pub bar_space: u32,
    pub clipping: Clipping,
    pub bar_grey: u32,
    pub cap_grey: u32,
}

impl SpectrumChannel {
    pub fn new(position: u32, width: u32) -> Self {
        Self {
            position,
            width,
            orientation: Orientation::LeftToRight,
            bar_width: 4,
            bar_space: 1,
            clipping: Clipping::ShowAll,
            bar_grey: 1,
            cap_grey: 3,
        }
    }

    fn words(&self) -> [u32; 8] {
        [
            self.position,
            self.width,
            match self.orientation {
                Orientation::LeftToRight => 0,
                Orientation::RightToLeft => 1,
            },
            self.bar_width,
            self.bar_space,
            match self.clipping {
                Clipping::ShowAll => 0,
                Clipping::ClipSubbands => 1,
            },
            self.bar_grey,
            self.cap_grey,
        ]
    }
}

/// Spectrum analyser settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpectrumAnalyser {
    pub channels: ChannelMode,
    pub bandwidth: Bandwidth,
    pub preemphasis: u32,
    pub left: SpectrumChannel,
    pub right: SpectrumChannel,
}

impl SpectrumAnalyser {
    /// Two 160-pixel channels side by side.
    pub fn stereo() -> Self {
        Self {
            channels: ChannelMode::Stereo,
            bandwidth: Bandwidth::High,
            preemphasis: 0x10000,
            left: SpectrumChannel::new(0, 160),
            right: SpectrumChannel::new(160, 160),
        }
    }

    pub fn mono() -> Self {
        Self {
            channels: ChannelMode::Mono,
            ..Self::stereo()
        }
    }

    fn words(&self) -> Vec<u32> {
        let mut words = vec![
            match self.channels {
                ChannelMode::Stereo => 0,
                ChannelMode::Mono => 1,
            },
            match self.bandwidth {
                Bandwidth::High => 0,
                Bandwidth::Low => 1,
            },
            self.preemphasis,
        ];
        words.extend_from_slice(&self.left.words());
        if self.channels == ChannelMode::Stereo {
            words.extend_from_slice(&self.right.words());
        }
        words
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_is_two_zero_bytes() {
        assert_eq!(&Visualisation::None.encode()[..], &[0, 0]);
    }

    #[test]
    fn stereo_spectrum_layout() {
        let payload = Visualisation::default().encode();
        assert_eq!(payload[0], 2);
        assert_eq!(payload[1], 19);
        assert_eq!(payload.len(), 2 + 19 * 4);
        // preemphasis is the third word
        assert_eq!(&payload[10..14], &0x10000u32.to_be_bytes());
        // right channel starts at pixel 160
        let right = 2 + 11 * 4;
        assert_eq!(&payload[right..right + 4], &160u32.to_be_bytes());
    }

    #[test]
    fn mono_spectrum_omits_right_channel() {
        let payload = Visualisation::SpectrumAnalyser(SpectrumAnalyser::mono()).encode();
        assert_eq!(payload[1], 11);
        assert_eq!(payload.len(), 2 + 11 * 4);
        assert_eq!(&payload[2..6], &1u32.to_be_bytes());
    }
}
