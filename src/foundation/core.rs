use crate::foundation::error::{ClipfeedError, ClipfeedResult};

/// Tolerance used when comparing presentation times, in seconds.
///
/// One microsecond: the resolution of container timestamps, well above float rounding noise.
pub const TIME_EPSILON: f64 = 0.000_001;

/// Kind of media track inside an asset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackKind {
    /// Picture track.
    Video,
    /// Sound track.
    Audio,
}

impl std::fmt::Display for TrackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Video => f.write_str("video"),
            Self::Audio => f.write_str("audio"),
        }
    }
}

/// Frames-per-second represented as a rational `num/den`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Fps {
    /// Numerator (frames).
    pub num: u32,
    /// Denominator (seconds), must be non-zero.
    pub den: u32,
}

impl Fps {
    /// Create a validated FPS value.
    pub fn new(num: u32, den: u32) -> ClipfeedResult<Self> {
        if den == 0 {
            return Err(ClipfeedError::validation("Fps den must be > 0"));
        }
        if num == 0 {
            return Err(ClipfeedError::validation("Fps num must be > 0"));
        }
        Ok(Self { num, den })
    }

    /// Convert to floating-point FPS.
    pub fn as_f64(self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }

    /// Duration of one frame in seconds.
    pub fn frame_duration_secs(self) -> f64 {
        f64::from(self.den) / f64::from(self.num)
    }

    /// Timestamp of frame `index` in seconds.
    pub fn frame_time_secs(self, index: u64) -> f64 {
        (index as f64) * self.frame_duration_secs()
    }

    /// Index of the frame whose display interval contains `secs`.
    ///
    /// Times within [`TIME_EPSILON`] of the next frame boundary snap forward so that
    /// `frame_index_at(frame_time_secs(n)) == n` despite float rounding.
    pub fn frame_index_at(self, secs: f64) -> u64 {
        if !secs.is_finite() || secs <= 0.0 {
            return 0;
        }
        ((secs + TIME_EPSILON) * self.as_f64()).floor() as u64
    }

    /// Number of frames needed to cover `secs` (ceil semantics).
    pub fn frames_in(self, secs: f64) -> u64 {
        if !secs.is_finite() || secs <= 0.0 {
            return 0;
        }
        ((secs * self.as_f64()) - TIME_EPSILON).ceil().max(0.0) as u64
    }
}

/// Return `true` when `a` and `b` are the same instant within [`TIME_EPSILON`].
pub fn same_time(a: f64, b: f64) -> bool {
    (a - b).abs() <= TIME_EPSILON
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
