use serde::{Deserialize, Serialize};

use crate::foundation::core::TIME_EPSILON;

/// JSON-facing composition definition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompositionDef {
    /// Total composition duration in seconds.
    pub duration: f64,
    /// Items placed on the composition timeline.
    pub items: Vec<CompositionItem>,
}

fn default_playback_rate() -> f64 {
    1.0
}

/// One media source placed on the composition timeline.
///
/// Times are in seconds. `duration` is the length of one iteration on the item timeline; the
/// source range it covers is `[start_time, start_time + duration * playback_rate)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompositionItem {
    /// Unique item identifier inside the composition.
    pub id: String,
    /// Asset identifier handed to the media backend (a file path for `ffmpeg`).
    pub path: String,
    /// Source in-point.
    #[serde(default)]
    pub start_time: f64,
    /// Composition time at which the item starts.
    #[serde(default)]
    pub composition_start_time: f64,
    /// Duration of one iteration on the item timeline.
    pub duration: f64,
    /// Source seconds consumed per item second.
    #[serde(default = "default_playback_rate")]
    pub playback_rate: f64,
    /// Restart from `start_time` after each iteration.
    #[serde(default, rename = "loop")]
    pub looping: bool,
    /// Skip audio extraction for this item.
    #[serde(default)]
    pub muted: bool,
}

/// Position of an item-local time inside the loop structure of an item.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LoopPosition {
    /// Iteration index, 0 for the first pass.
    pub loop_index: u64,
    /// Time inside the iteration, in `[0, duration]`.
    pub within: f64,
}

impl CompositionItem {
    /// Create an item with default rate, no looping and no muting.
    pub fn new(id: impl Into<String>, path: impl Into<String>, duration: f64) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            start_time: 0.0,
            composition_start_time: 0.0,
            duration,
            playback_rate: 1.0,
            looping: false,
            muted: false,
        }
    }

    /// Return a copy with looping enabled or disabled.
    pub fn with_looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    /// Return a copy with the given source in-point.
    pub fn with_start_time(mut self, start_time: f64) -> Self {
        self.start_time = start_time;
        self
    }

    /// Return a copy placed at the given composition time.
    pub fn with_composition_start_time(mut self, t: f64) -> Self {
        self.composition_start_time = t;
        self
    }

    /// Return a copy with the given playback rate.
    pub fn with_playback_rate(mut self, rate: f64) -> Self {
        self.playback_rate = rate;
        self
    }

    /// Return a copy with audio muted or unmuted.
    pub fn with_muted(mut self, muted: bool) -> Self {
        self.muted = muted;
        self
    }

    /// Map composition time to item-local time.
    pub fn local_time(&self, composition_time: f64) -> f64 {
        composition_time - self.composition_start_time
    }

    /// Return `true` when the item contributes to the composition at `composition_time`.
    pub fn is_active_at(&self, composition_time: f64) -> bool {
        let local = self.local_time(composition_time);
        if local < -TIME_EPSILON {
            return false;
        }
        self.looping || local < self.duration - TIME_EPSILON
    }

    /// Split item-local time into loop iteration and offset.
    ///
    /// Non-looping items clamp into `[0, duration]` and always report iteration 0. A looping item
    /// at exactly `k * duration` is at the start of iteration `k`.
    pub fn loop_position(&self, local: f64) -> LoopPosition {
        let local = if local.is_finite() { local.max(0.0) } else { 0.0 };
        if !self.looping || self.duration <= 0.0 {
            return LoopPosition {
                loop_index: 0,
                within: local.min(self.duration.max(0.0)),
            };
        }
        let loop_index = ((local + TIME_EPSILON) / self.duration).floor().max(0.0) as u64;
        let within = (local - (loop_index as f64) * self.duration).max(0.0);
        LoopPosition { loop_index, within }
    }

    /// Source time at offset `within` of an iteration.
    pub fn source_time_at(&self, within: f64) -> f64 {
        self.start_time + within * self.playback_rate
    }

    /// Exclusive end of the source range covered by one iteration.
    pub fn source_end(&self) -> f64 {
        self.source_time_at(self.duration)
    }

    /// Item-local time of source timestamp `source_time` in iteration `loop_index`.
    ///
    /// Source times before the in-point map to the iteration start.
    pub fn local_from_source(&self, loop_index: u64, source_time: f64) -> f64 {
        let within = ((source_time - self.start_time) / self.playback_rate).max(0.0);
        (loop_index as f64) * self.duration + within
    }
}
