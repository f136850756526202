//! Infrared remote button table for the standard Squeezebox remote.

use std::fmt;

use serde::{Serialize, Serializer};

/// Logical button on the Squeezebox remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteButton {
    Sleep,
    Power,
    Rewind,
    Pause,
    Forward,
    Add,
    Play,
    Up,
    Down,
    Left,
    Right,
    VolumeUp,
    VolumeDown,
    Digit(u8),
    Favorites,
    Search,
    Browse,
    Shuffle,
    Repeat,
    NowPlaying,
    Size,
    Brightness,
}

const CODES: [(u32, RemoteButton); 31] = [
    (1988737095, RemoteButton::Sleep),
    (1988706495, RemoteButton::Power),
    (1988739135, RemoteButton::Rewind),
    (1988698335, RemoteButton::Pause),
    (1988730975, RemoteButton::Forward),
    (1988714655, RemoteButton::Add),
    (1988694255, RemoteButton::Play),
    (1988747295, RemoteButton::Up),
    (1988735055, RemoteButton::Down),
    (1988726895, RemoteButton::Left),
    (1988743215, RemoteButton::Right),
    (1988722815, RemoteButton::VolumeUp),
    (1988690175, RemoteButton::VolumeDown),
    (1988751375, RemoteButton::Digit(1)),
    (1988692215, RemoteButton::Digit(2)),
    (1988724855, RemoteButton::Digit(3)),
    (1988708535, RemoteButton::Digit(4)),
    (1988741175, RemoteButton::Digit(5)),
    (1988700375, RemoteButton::Digit(6)),
    (1988733015, RemoteButton::Digit(7)),
    (1988716695, RemoteButton::Digit(8)),
    (1988749335, RemoteButton::Digit(9)),
    (1988696295, RemoteButton::Favorites),
    (1988728935, RemoteButton::Digit(0)),
    (1988712615, RemoteButton::Search),
    (1988718735, RemoteButton::Browse),
    (1988745255, RemoteButton::Shuffle),
    (1988704455, RemoteButton::Repeat),
    (1988720775, RemoteButton::NowPlaying),
    (1988753415, RemoteButton::Size),
    (1988691195, RemoteButton::Brightness),
];

impl RemoteButton {
    /// Looks up the button for a raw IR code.
    pub fn from_code(code: u32) -> Option<Self> {
        CODES
            .iter()
            .find(|(known, _)| *known == code)
            .map(|(_, button)| *button)
    }

    /// Raw IR code the remote sends for this button.
    pub fn code(&self) -> Option<u32> {
        CODES
            .iter()
            .find(|(_, button)| button == self)
            .map(|(code, _)| *code)
    }

    pub fn name(&self) -> &'static str {
        const DIGITS: [&str; 10] = ["0", "1", "2", "3", "4", "5", "6", "7", "8", "9"];
        match self {
            Self::Sleep => "sleep",
            Self::Power => "power",
            Self::Rewind => "rewind",
            Self::Pause => "pause",
            Self::Forward => "forward",
            Self::Add => "add",
            Self::Play => "play",
            Self::Up => "up",
            Self::Down => "down",
            Self::Left => "left",
            Self::Right => "right",
            Self::VolumeUp => "volumeup",
            Self::VolumeDown => "volumedown",
            Self::Digit(d) => DIGITS.get(usize::from(*d)).copied().unwrap_or("?"),
            Self::Favorites => "favorites",
            Self::Search => "search",
            Self::Browse => "browse",
            Self::Shuffle => "shuffle",
            Self::Repeat => "repeat",
            Self::NowPlaying => "nowplaying",
            Self::Size => "size",
            Self::Brightness => "brightness",
        }
    }
}

impl fmt::Display for RemoteButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for RemoteButton {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}
