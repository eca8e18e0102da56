//! Track reader capability and the reader state the item decoder keeps per open track.

use crate::foundation::core::{Fps, TIME_EPSILON, TrackKind, same_time};
use crate::foundation::error::{ClipfeedError, ClipfeedResult};
use crate::media::handle::{AudioChunk, Payload, VideoFrame};

/// A decoded unit as produced by a backend, positioned in source time.
#[derive(Clone, Debug)]
pub struct TimedUnit<P> {
    /// Presentation timestamp inside the source asset, in seconds.
    pub source_time: f64,
    /// Display duration in source seconds.
    pub duration: f64,
    /// Decoded data.
    pub payload: P,
}

/// Result of pulling from a [`TrackReader`].
#[derive(Debug)]
pub enum Pull<P> {
    /// Next unit in presentation order.
    Unit(TimedUnit<P>),
    /// A single packet failed to decode; decoding can continue.
    Skipped(String),
    /// The track has no more units.
    EndOfTrack,
}

/// Sequential decode access to one track of an asset.
///
/// Readers are created by a [`MediaBackend`] positioned at or before the requested start time.
pub trait TrackReader<P>: Send {
    /// Decode the next unit.
    ///
    /// A non-recoverable codec failure is returned as [`ClipfeedError::DecodeFailed`].
    fn pull_next(&mut self) -> ClipfeedResult<Pull<P>>;

    /// Release decoder resources. Must be idempotent.
    fn close(&mut self);
}

/// Output PCM layout requested from audio readers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AudioFormat {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Channel count.
    pub channels: u16,
    /// Sample frames per decoded chunk.
    pub chunk_frames: u32,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            channels: 2,
            chunk_frames: 1_024,
        }
    }
}

/// Basic metadata about a source asset.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceInfo {
    /// Whether the asset has a picture track.
    pub has_video: bool,
    /// Whether the asset has at least one audio track.
    pub has_audio: bool,
    /// Picture width in pixels (0 without video).
    pub width: u32,
    /// Picture height in pixels (0 without video).
    pub height: u32,
    /// Nominal frame rate of the picture track.
    pub fps: Option<Fps>,
    /// Container duration in seconds (0 when unknown).
    pub duration_secs: f64,
    /// Native audio sample rate.
    pub audio_sample_rate: Option<u32>,
    /// Native audio channel count.
    pub audio_channels: Option<u16>,
}

/// Platform media capability: probe assets and open track readers.
pub trait MediaBackend: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Inspect the tracks of an asset.
    fn probe(&self, asset: &str) -> ClipfeedResult<SourceInfo>;

    /// Open the picture track at `start_time` (source seconds).
    fn open_video(
        &self,
        asset: &str,
        start_time: f64,
    ) -> ClipfeedResult<Box<dyn TrackReader<VideoFrame>>>;

    /// Open the first audio track at `start_time`, converted to `format`.
    fn open_audio(
        &self,
        asset: &str,
        start_time: f64,
        format: AudioFormat,
    ) -> ClipfeedResult<Box<dyn TrackReader<AudioChunk>>>;
}

/// Payloads that have a matching track kind and can be opened through a [`MediaBackend`].
pub trait TrackPayload: Payload + Sized {
    /// Track kind carrying this payload.
    const KIND: TrackKind;

    /// Open a reader for this payload's track.
    fn open_reader(
        backend: &dyn MediaBackend,
        asset: &str,
        start_time: f64,
        audio: AudioFormat,
    ) -> ClipfeedResult<Box<dyn TrackReader<Self>>>;

    /// Restrict `unit` to the source range `[start, end)`, or `None` when nothing of it remains.
    ///
    /// Units are kept whole unless the payload can be cut.
    fn clip_to_window(unit: TimedUnit<Self>, _start: f64, _end: f64) -> Option<TimedUnit<Self>> {
        Some(unit)
    }
}

impl TrackPayload for VideoFrame {
    const KIND: TrackKind = TrackKind::Video;

    fn open_reader(
        backend: &dyn MediaBackend,
        asset: &str,
        start_time: f64,
        _audio: AudioFormat,
    ) -> ClipfeedResult<Box<dyn TrackReader<Self>>> {
        backend.open_video(asset, start_time)
    }
}

impl TrackPayload for AudioChunk {
    const KIND: TrackKind = TrackKind::Audio;

    fn open_reader(
        backend: &dyn MediaBackend,
        asset: &str,
        start_time: f64,
        audio: AudioFormat,
    ) -> ClipfeedResult<Box<dyn TrackReader<Self>>> {
        backend.open_audio(asset, start_time, audio)
    }

    /// Drops the sample frames that lie before `start` or at and after `end`.
    fn clip_to_window(mut unit: TimedUnit<Self>, start: f64, end: f64) -> Option<TimedUnit<Self>> {
        let rate = f64::from(unit.payload.sample_rate);
        let channels = usize::from(unit.payload.channels);
        if rate <= 0.0 || channels == 0 {
            return Some(unit);
        }
        let frames = unit.payload.frame_count();
        let head = if unit.source_time < start - TIME_EPSILON {
            (((start - unit.source_time) * rate).round() as usize).min(frames)
        } else {
            0
        };
        let unit_end = unit.source_time + frames as f64 / rate;
        let tail = if unit_end > end + TIME_EPSILON {
            (((end - unit.source_time) * rate).round().max(0.0) as usize).min(frames)
        } else {
            frames
        };
        if tail <= head {
            return None;
        }
        if head == 0 && tail == frames {
            return Some(unit);
        }

        unit.payload.interleaved_f32.truncate(tail * channels);
        unit.payload.interleaved_f32.drain(..head * channels);
        if head > 0 {
            unit.source_time = start;
        }
        unit.duration = (tail - head) as f64 / rate;
        Some(unit)
    }
}

/// Where a reader should start and stop inside the source, and which loop iteration it feeds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct ReadWindow {
    /// Effective start in source seconds.
    pub(crate) start: f64,
    /// Exclusive end in source seconds.
    pub(crate) end: f64,
    /// Loop iteration fed by this reader.
    pub(crate) loop_index: u64,
}

/// One open track plus the bookkeeping needed to expose only units inside its window.
///
/// Units before `window.start` are pre-roll: they are decoded and discarded, except for the last
/// one, which is kept when the first in-window unit does not land exactly on the start (its display
/// interval covers the start). Units at or past `window.end` terminate the track.
pub(crate) struct ReaderState<P> {
    reader: Box<dyn TrackReader<P>>,
    kind: TrackKind,
    window: ReadWindow,
    cursor: f64,
    last_emitted: Option<f64>,
    pending: Option<TimedUnit<P>>,
    queued: Option<TimedUnit<P>>,
    deferred_error: Option<ClipfeedError>,
    started: bool,
    exhausted: bool,
    closed: bool,
    discarded: u64,
}

impl<P: TrackPayload> ReaderState<P> {
    /// Open a reader through `backend` for `window`.
    pub(crate) fn open(
        backend: &dyn MediaBackend,
        asset: &str,
        window: ReadWindow,
        audio: AudioFormat,
    ) -> ClipfeedResult<Self> {
        let reader = P::open_reader(backend, asset, window.start, audio)?;
        tracing::debug!(
            kind = %P::KIND,
            asset,
            start = window.start,
            end = window.end,
            loop_index = window.loop_index,
            "opened track reader"
        );
        Ok(Self::from_reader(reader, window))
    }

    pub(crate) fn from_reader(reader: Box<dyn TrackReader<P>>, window: ReadWindow) -> Self {
        Self {
            reader,
            kind: P::KIND,
            window,
            cursor: window.start,
            last_emitted: None,
            pending: None,
            queued: None,
            deferred_error: None,
            started: false,
            exhausted: false,
            closed: false,
            discarded: 0,
        }
    }

    pub(crate) fn loop_index(&self) -> u64 {
        self.window.loop_index
    }

    /// Source time of the last unit handed out (the window start before the first one).
    pub(crate) fn cursor(&self) -> f64 {
        self.cursor
    }

    /// Return `true` once end-of-track (or a fatal error) has been reported.
    pub(crate) fn is_exhausted(&self) -> bool {
        self.exhausted && self.queued.is_none() && self.pending.is_none()
    }

    /// Number of pre-roll, corrupt or out-of-order units dropped so far.
    pub(crate) fn discarded(&self) -> u64 {
        self.discarded
    }

    /// Next unit inside the window, clipped to it, `Ok(None)` at end-of-track.
    pub(crate) fn next_unit(&mut self) -> ClipfeedResult<Option<TimedUnit<P>>> {
        loop {
            let Some(unit) = self.next_in_window()? else {
                return Ok(None);
            };
            match P::clip_to_window(unit, self.window.start, self.window.end) {
                Some(unit) => return Ok(Some(unit)),
                None => self.discarded += 1,
            }
        }
    }

    fn next_in_window(&mut self) -> ClipfeedResult<Option<TimedUnit<P>>> {
        if let Some(unit) = self.queued.take() {
            return Ok(Some(self.emit(unit)));
        }
        if let Some(err) = self.deferred_error.take() {
            return Err(err);
        }
        if self.exhausted || self.closed {
            return Ok(self.pending.take().map(|u| self.emit(u)));
        }

        loop {
            let pulled = match self.reader.pull_next() {
                Ok(p) => p,
                Err(err) => {
                    self.exhausted = true;
                    if let Some(pending) = self.pending.take() {
                        self.deferred_error = Some(err);
                        return Ok(Some(self.emit(pending)));
                    }
                    return Err(err);
                }
            };

            let unit = match pulled {
                Pull::Unit(unit) => unit,
                Pull::Skipped(reason) => {
                    self.discarded += 1;
                    tracing::warn!(kind = %self.kind, %reason, "skipping undecodable unit");
                    continue;
                }
                Pull::EndOfTrack => {
                    self.exhausted = true;
                    return Ok(self.pending.take().map(|u| self.emit(u)));
                }
            };

            if !unit.source_time.is_finite() {
                self.discarded += 1;
                continue;
            }
            if let Some(last) = self.last_emitted
                && unit.source_time <= last + TIME_EPSILON
            {
                self.discarded += 1;
                tracing::warn!(
                    kind = %self.kind,
                    t = unit.source_time,
                    last,
                    "dropping out-of-order unit"
                );
                continue;
            }
            if unit.source_time >= self.window.end - TIME_EPSILON {
                self.exhausted = true;
                return Ok(self.pending.take().map(|u| self.emit(u)));
            }

            if !self.started {
                if unit.source_time < self.window.start - TIME_EPSILON {
                    if self.pending.replace(unit).is_some() {
                        self.discarded += 1;
                    }
                    continue;
                }
                self.started = true;
                if let Some(pending) = self.pending.take() {
                    if same_time(unit.source_time, self.window.start) {
                        self.discarded += 1;
                    } else {
                        self.queued = Some(unit);
                        return Ok(Some(self.emit(pending)));
                    }
                }
            }

            return Ok(Some(self.emit(unit)));
        }
    }

    fn emit(&mut self, unit: TimedUnit<P>) -> TimedUnit<P> {
        self.started = true;
        self.last_emitted = Some(unit.source_time);
        self.cursor = unit.source_time;
        unit
    }

    /// Close the underlying reader; safe to call repeatedly.
    pub(crate) fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.exhausted = true;
        self.pending = None;
        self.queued = None;
        self.deferred_error = None;
        self.reader.close();
        tracing::debug!(
            kind = %self.kind,
            loop_index = self.window.loop_index,
            discarded = self.discarded,
            "closed track reader"
        );
    }
}

impl<P> Drop for ReaderState<P> {
    fn drop(&mut self) {
        if !self.closed {
            self.closed = true;
            self.reader.close();
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/media/track.rs"]
mod tests;
