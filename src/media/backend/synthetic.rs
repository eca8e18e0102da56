//! Deterministic in-memory backend.
//!
//! Assets are registered by name and generated on demand: every video frame encodes its index in
//! the first pixel, audio is a sine tone. Decoding starts at the keyframe preceding the requested
//! time, so consumers see the same pre-roll behaviour as with a real codec. Corrupt frames, fatal
//! codec errors and open failures can be injected per asset.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::foundation::core::{Fps, TrackKind};
use crate::foundation::error::{ClipfeedError, ClipfeedResult};
use crate::media::handle::{AudioChunk, VideoFrame};
use crate::media::track::{AudioFormat, MediaBackend, Pull, SourceInfo, TimedUnit, TrackReader};

/// Tone parameters of a synthetic audio track.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SyntheticAudio {
    /// Native sample rate in Hz (reported by `probe`).
    pub sample_rate: u32,
    /// Native channel count (reported by `probe`).
    pub channels: u16,
    /// Tone frequency in Hz.
    pub frequency_hz: f32,
    /// Peak amplitude.
    pub amplitude: f32,
}

/// Description of a generated asset.
#[derive(Clone, Debug, PartialEq)]
pub struct SyntheticAsset {
    /// Asset duration in seconds.
    pub duration_secs: f64,
    /// Picture track frame rate, `None` for audio-only assets.
    pub fps: Option<Fps>,
    /// Picture width in pixels.
    pub width: u32,
    /// Picture height in pixels.
    pub height: u32,
    /// Frames between keyframes.
    pub keyframe_interval: u64,
    /// Audio track, if any.
    pub audio: Option<SyntheticAudio>,
    /// Frame indices that fail to decode (skipped by readers).
    pub corrupt_frames: Vec<u64>,
    /// Frame index at which the video codec fails for good.
    pub fatal_at_frame: Option<u64>,
    /// Track kinds whose readers fail to open.
    pub failing_opens: Vec<TrackKind>,
}

impl SyntheticAsset {
    /// Video-only asset, 16x16 pixels, keyframe every 15 frames.
    pub fn video(duration_secs: f64, fps: Fps) -> Self {
        Self {
            duration_secs,
            fps: Some(fps),
            width: 16,
            height: 16,
            keyframe_interval: 15,
            audio: None,
            corrupt_frames: Vec::new(),
            fatal_at_frame: None,
            failing_opens: Vec::new(),
        }
    }

    /// Audio-only asset.
    pub fn audio_only(duration_secs: f64, sample_rate: u32, channels: u16) -> Self {
        Self {
            fps: None,
            width: 0,
            height: 0,
            ..Self::video(duration_secs, Fps { num: 1, den: 1 })
        }
        .with_audio(sample_rate, channels)
    }

    /// Add a 440 Hz audio track.
    pub fn with_audio(mut self, sample_rate: u32, channels: u16) -> Self {
        self.audio = Some(SyntheticAudio {
            sample_rate,
            channels,
            frequency_hz: 440.0,
            amplitude: 0.5,
        });
        self
    }

    /// Set the picture size.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set the keyframe interval (minimum 1).
    pub fn with_keyframe_interval(mut self, frames: u64) -> Self {
        self.keyframe_interval = frames.max(1);
        self
    }

    /// Mark frames that fail to decode.
    pub fn with_corrupt_frames(mut self, frames: impl IntoIterator<Item = u64>) -> Self {
        self.corrupt_frames = frames.into_iter().collect();
        self
    }

    /// Make the video codec fail permanently when reaching `frame`.
    pub fn with_fatal_error_at(mut self, frame: u64) -> Self {
        self.fatal_at_frame = Some(frame);
        self
    }

    /// Make readers of `kind` fail to open.
    pub fn with_open_failure(mut self, kind: TrackKind) -> Self {
        self.failing_opens.push(kind);
        self
    }

    fn frame_count(&self) -> u64 {
        self.fps.map_or(0, |fps| fps.frames_in(self.duration_secs))
    }
}

/// Frame index encoded by the synthetic backend in the first pixel of a frame.
pub fn synthetic_frame_index(frame: &VideoFrame) -> Option<u64> {
    let px = frame.rgba8.get(0..3)?;
    Some(u64::from(px[0]) | (u64::from(px[1]) << 8) | (u64::from(px[2]) << 16))
}

/// Open/close counters shared by all readers of a [`SyntheticBackend`].
#[derive(Debug, Default)]
pub struct ReaderStats {
    video_opens: AtomicUsize,
    audio_opens: AtomicUsize,
    video_live: AtomicUsize,
    audio_live: AtomicUsize,
    video_peak: AtomicUsize,
    audio_peak: AtomicUsize,
}

impl ReaderStats {
    fn counters(&self, kind: TrackKind) -> (&AtomicUsize, &AtomicUsize, &AtomicUsize) {
        match kind {
            TrackKind::Video => (&self.video_opens, &self.video_live, &self.video_peak),
            TrackKind::Audio => (&self.audio_opens, &self.audio_live, &self.audio_peak),
        }
    }

    fn opened(&self, kind: TrackKind) {
        let (opens, live, peak) = self.counters(kind);
        opens.fetch_add(1, Ordering::SeqCst);
        let now = live.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
    }

    fn closed(&self, kind: TrackKind) {
        let (_, live, _) = self.counters(kind);
        live.fetch_sub(1, Ordering::SeqCst);
    }

    /// Total readers of `kind` opened so far.
    pub fn opens(&self, kind: TrackKind) -> usize {
        self.counters(kind).0.load(Ordering::SeqCst)
    }

    /// Readers of `kind` currently open.
    pub fn live(&self, kind: TrackKind) -> usize {
        self.counters(kind).1.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously open readers of `kind`.
    pub fn peak(&self, kind: TrackKind) -> usize {
        self.counters(kind).2.load(Ordering::SeqCst)
    }
}

/// In-memory [`MediaBackend`] generating registered assets.
#[derive(Debug, Default)]
pub struct SyntheticBackend {
    assets: HashMap<String, SyntheticAsset>,
    stats: Arc<ReaderStats>,
}

impl SyntheticBackend {
    /// Create a backend without assets.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `asset` under `name`.
    pub fn with_asset(mut self, name: impl Into<String>, asset: SyntheticAsset) -> Self {
        self.assets.insert(name.into(), asset);
        self
    }

    /// Shared reader counters.
    pub fn stats(&self) -> Arc<ReaderStats> {
        Arc::clone(&self.stats)
    }

    fn asset(&self, name: &str) -> ClipfeedResult<&SyntheticAsset> {
        self.assets
            .get(name)
            .ok_or_else(|| ClipfeedError::open_failed(format!("unknown synthetic asset '{name}'")))
    }

    fn check_open(asset: &SyntheticAsset, name: &str, kind: TrackKind) -> ClipfeedResult<()> {
        if asset.failing_opens.contains(&kind) {
            return Err(ClipfeedError::open_failed(format!(
                "synthetic {kind} codec refused to initialize for '{name}'"
            )));
        }
        Ok(())
    }
}

impl MediaBackend for SyntheticBackend {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn probe(&self, asset: &str) -> ClipfeedResult<SourceInfo> {
        let a = self.asset(asset)?;
        Ok(SourceInfo {
            has_video: a.fps.is_some(),
            has_audio: a.audio.is_some(),
            width: a.width,
            height: a.height,
            fps: a.fps,
            duration_secs: a.duration_secs,
            audio_sample_rate: a.audio.map(|x| x.sample_rate),
            audio_channels: a.audio.map(|x| x.channels),
        })
    }

    fn open_video(
        &self,
        asset: &str,
        start_time: f64,
    ) -> ClipfeedResult<Box<dyn TrackReader<VideoFrame>>> {
        let a = self.asset(asset)?;
        let fps = a
            .fps
            .ok_or_else(|| ClipfeedError::track_unavailable(TrackKind::Video))?;
        Self::check_open(a, asset, TrackKind::Video)?;

        let target = fps.frame_index_at(start_time);
        let next = target - target % a.keyframe_interval;
        self.stats.opened(TrackKind::Video);
        Ok(Box::new(SyntheticVideoReader {
            asset: a.clone(),
            fps,
            next,
            end: a.frame_count(),
            stats: Arc::clone(&self.stats),
            closed: false,
        }))
    }

    fn open_audio(
        &self,
        asset: &str,
        start_time: f64,
        format: AudioFormat,
    ) -> ClipfeedResult<Box<dyn TrackReader<AudioChunk>>> {
        let a = self.asset(asset)?;
        let tone = a
            .audio
            .ok_or_else(|| ClipfeedError::track_unavailable(TrackKind::Audio))?;
        Self::check_open(a, asset, TrackKind::Audio)?;
        if format.sample_rate == 0 || format.channels == 0 {
            return Err(ClipfeedError::open_failed(
                "audio format must have non-zero sample rate and channels",
            ));
        }

        let chunk = u64::from(format.chunk_frames.max(1));
        let start_sample = (start_time.max(0.0) * f64::from(format.sample_rate)).floor() as u64;
        let total = (a.duration_secs * f64::from(format.sample_rate)).round() as u64;
        self.stats.opened(TrackKind::Audio);
        Ok(Box::new(SyntheticAudioReader {
            tone,
            format,
            next_sample: start_sample - start_sample % chunk,
            total_samples: total,
            stats: Arc::clone(&self.stats),
            closed: false,
        }))
    }
}

struct SyntheticVideoReader {
    asset: SyntheticAsset,
    fps: Fps,
    next: u64,
    end: u64,
    stats: Arc<ReaderStats>,
    closed: bool,
}

impl TrackReader<VideoFrame> for SyntheticVideoReader {
    fn pull_next(&mut self) -> ClipfeedResult<Pull<VideoFrame>> {
        if self.closed || self.next >= self.end {
            return Ok(Pull::EndOfTrack);
        }
        let idx = self.next;
        if self.asset.fatal_at_frame.is_some_and(|f| idx >= f) {
            return Err(ClipfeedError::decode_failed(format!(
                "synthetic codec failure at frame {idx}"
            )));
        }
        self.next += 1;
        if self.asset.corrupt_frames.contains(&idx) {
            return Ok(Pull::Skipped(format!("corrupt packet for frame {idx}")));
        }

        let px = [idx as u8, (idx >> 8) as u8, (idx >> 16) as u8, 255];
        let n = self.asset.width as usize * self.asset.height as usize;
        let mut rgba8 = Vec::with_capacity(n.max(1) * 4);
        for _ in 0..n.max(1) {
            rgba8.extend_from_slice(&px);
        }
        Ok(Pull::Unit(TimedUnit {
            source_time: self.fps.frame_time_secs(idx),
            duration: self.fps.frame_duration_secs(),
            payload: VideoFrame {
                width: self.asset.width.max(1),
                height: self.asset.height.max(1),
                rgba8,
            },
        }))
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.stats.closed(TrackKind::Video);
        }
    }
}

struct SyntheticAudioReader {
    tone: SyntheticAudio,
    format: AudioFormat,
    next_sample: u64,
    total_samples: u64,
    stats: Arc<ReaderStats>,
    closed: bool,
}

impl TrackReader<AudioChunk> for SyntheticAudioReader {
    fn pull_next(&mut self) -> ClipfeedResult<Pull<AudioChunk>> {
        if self.closed || self.next_sample >= self.total_samples {
            return Ok(Pull::EndOfTrack);
        }
        let first = self.next_sample;
        let frames = u64::from(self.format.chunk_frames.max(1)).min(self.total_samples - first);
        let rate = f64::from(self.format.sample_rate);
        let channels = usize::from(self.format.channels);

        let mut interleaved_f32 = Vec::with_capacity(frames as usize * channels);
        for n in first..first + frames {
            let phase = std::f64::consts::TAU * f64::from(self.tone.frequency_hz) * (n as f64) / rate;
            let v = (phase.sin() as f32) * self.tone.amplitude;
            interleaved_f32.extend(std::iter::repeat_n(v, channels));
        }
        self.next_sample += frames;

        Ok(Pull::Unit(TimedUnit {
            source_time: (first as f64) / rate,
            duration: (frames as f64) / rate,
            payload: AudioChunk {
                sample_rate: self.format.sample_rate,
                channels: self.format.channels,
                interleaved_f32,
            },
        }))
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.stats.closed(TrackKind::Audio);
        }
    }
}

#[cfg(test)]
#[path = "../../../tests/unit/media/synthetic.rs"]
mod tests;
