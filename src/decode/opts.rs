use crate::media::track::AudioFormat;

/// Environment variable overriding [`DecoderOpts::max_queue_units`].
pub const ENV_MAX_QUEUE_UNITS: &str = "CLIPFEED_MAX_QUEUE_UNITS";
/// Environment variable overriding the look-ahead margin in seconds.
pub const ENV_LOOKAHEAD_SECS: &str = "CLIPFEED_LOOKAHEAD_SECS";

/// How the caller paces decoding.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DecodeMode {
    /// Wall-clock paced preview: keep a look-ahead margin so playback never waits on the codec.
    #[default]
    RealTime,
    /// Unpaced batch export: decode exactly as far as each request needs.
    Offline,
}

impl DecodeMode {
    /// Look-ahead margin used when no explicit value is configured.
    pub fn default_lookahead_secs(self) -> f64 {
        match self {
            Self::RealTime => 0.25,
            Self::Offline => 0.0,
        }
    }
}

/// Options controlling an [`crate::ItemDecoder`].
#[derive(Clone, Debug, PartialEq)]
pub struct DecoderOpts {
    /// Pacing mode; selects the default look-ahead margin.
    pub mode: DecodeMode,
    /// Maximum decoded video frames held per queue (minimum 2).
    pub max_queue_units: usize,
    /// Maximum decoded audio chunks held per queue (minimum 2).
    pub max_audio_queue_units: usize,
    /// Explicit look-ahead margin in seconds. `None` uses the mode default.
    pub lookahead_secs: Option<f64>,
    /// PCM layout requested from audio readers.
    pub audio: AudioFormat,
    /// Forward jumps further than this past the buffered data reopen the reader instead of
    /// decoding through.
    pub forward_seek_threshold: f64,
}

impl Default for DecoderOpts {
    fn default() -> Self {
        let opts = Self {
            mode: DecodeMode::RealTime,
            max_queue_units: 8,
            max_audio_queue_units: 32,
            lookahead_secs: None,
            audio: AudioFormat::default(),
            forward_seek_threshold: 5.0,
        };
        opts.with_env_overrides()
    }
}

impl DecoderOpts {
    /// Default options for `mode`.
    pub fn for_mode(mode: DecodeMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Apply `CLIPFEED_MAX_QUEUE_UNITS` and `CLIPFEED_LOOKAHEAD_SECS` when set and valid.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(n) = std::env::var(ENV_MAX_QUEUE_UNITS)
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|&n| n > 0)
        {
            self.max_queue_units = n;
        }
        if let Some(secs) = std::env::var(ENV_LOOKAHEAD_SECS)
            .ok()
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|s| s.is_finite() && *s >= 0.0)
        {
            self.lookahead_secs = Some(secs);
        }
        self
    }

    /// Set the pacing mode.
    pub fn with_mode(mut self, mode: DecodeMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the video queue capacity.
    pub fn with_max_queue_units(mut self, units: usize) -> Self {
        self.max_queue_units = units;
        self
    }

    /// Set the audio queue capacity.
    pub fn with_max_audio_queue_units(mut self, units: usize) -> Self {
        self.max_audio_queue_units = units;
        self
    }

    /// Set an explicit look-ahead margin.
    pub fn with_lookahead_secs(mut self, secs: f64) -> Self {
        self.lookahead_secs = Some(secs);
        self
    }

    /// Set the PCM layout requested from audio readers.
    pub fn with_audio_format(mut self, audio: AudioFormat) -> Self {
        self.audio = audio;
        self
    }

    /// Set the forward seek threshold.
    pub fn with_forward_seek_threshold(mut self, secs: f64) -> Self {
        self.forward_seek_threshold = secs;
        self
    }

    /// Effective look-ahead margin in seconds.
    pub fn lookahead(&self) -> f64 {
        self.lookahead_secs
            .filter(|s| s.is_finite() && *s >= 0.0)
            .unwrap_or_else(|| self.mode.default_lookahead_secs())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/decode/opts.rs"]
mod tests;
