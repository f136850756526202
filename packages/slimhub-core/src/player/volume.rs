//! Volume model and the two gain encodings players understand.
//!
//! Older firmware takes a gain from a fixed lookup table. Newer firmware takes
//! a 16.16 fixed-point multiplier derived from a piecewise-linear dB curve.

/// Legacy gain table, indexed by volume level `0..=100`.
pub const OLD_GAIN_MAP: [u32; 101] = [
    0, 1, 1, 1, 2, 2, 2, 3, 3, 4, //
    5, 5, 6, 6, 7, 8, 9, 9, 10, 11, //
    12, 13, 14, 15, 16, 16, 17, 18, 19, 20, //
    22, 23, 24, 25, 26, 27, 28, 29, 30, 32, //
    33, 34, 35, 37, 38, 39, 40, 42, 43, 44, //
    46, 47, 48, 50, 51, 53, 54, 56, 57, 59, //
    60, 61, 63, 65, 66, 68, 69, 71, 72, 74, //
    75, 77, 79, 80, 82, 84, 85, 87, 89, 90, //
    92, 94, 96, 97, 99, 101, 103, 104, 106, 108, 110, //
    112, 113, 115, 117, 119, 121, 123, 125, 127, 128,
];

const TOTAL_VOLUME_RANGE_DB: f64 = -50.0;
const MAX_VOLUME_DB: f64 = 0.0;
const STEP_POINT: f64 = -1.0;
const STEP_FRACTION: f64 = 1.0;

/// Below this attenuation the multiplier loses its low byte of precision.
const COARSE_GAIN_FLOOR_DB: f64 = -30.0;

/// A player's volume level, always within `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Volume {
    level: u8,
}

impl Volume {
    pub const MIN: u8 = 0;
    pub const MAX: u8 = 100;
    pub const STEP: u8 = 1;
    pub const DEFAULT: u8 = 50;

    /// Creates a volume, clamping `level` to the valid range.
    pub fn new(level: u8) -> Self {
        Self {
            level: level.min(Self::MAX),
        }
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn set(&mut self, level: u8) {
        self.level = level.min(Self::MAX);
    }

    pub fn increment(&mut self) {
        self.set(self.level.saturating_add(Self::STEP));
    }

    pub fn decrement(&mut self) {
        self.level = self.level.saturating_sub(Self::STEP);
    }

    /// Gain for firmware that predates the dB curve.
    pub fn old_gain(&self) -> u32 {
        OLD_GAIN_MAP[usize::from(self.level)]
    }

    /// Attenuation in dB for the current level.
    pub fn decibels(&self) -> f64 {
        let step_db = TOTAL_VOLUME_RANGE_DB * STEP_FRACTION;
        let slope_high = MAX_VOLUME_DB - step_db / (100.0 - STEP_POINT);
        let slope_low = step_db - TOTAL_VOLUME_RANGE_DB / (STEP_POINT - 0.0);

        let x2 = f64::from(self.level);
        let (m, x1, y1) = if x2 > STEP_POINT {
            (slope_high, 100.0, MAX_VOLUME_DB)
        } else {
            (slope_low, 0.0, TOTAL_VOLUME_RANGE_DB)
        };
        m * (x2 - x1) + y1
    }

    /// 16.16 fixed-point gain for current firmware.
    ///
    /// Between -30 dB and 0 dB the multiplier is rounded to 8 fractional bits.
    pub fn new_gain(&self) -> u32 {
        let db = self.decibels();
        let multiplier = 10f64.powf(db / 20.0);
        if (COARSE_GAIN_FLOOR_DB..=MAX_VOLUME_DB).contains(&db) {
            ((multiplier * 256.0 + 0.5).floor() as u32) * 256
        } else {
            (multiplier * 65536.0 + 0.5).floor() as u32
        }
    }
}

impl Default for Volume {
    fn default() -> Self {
        Self::new(Self::DEFAULT)
    }
}
