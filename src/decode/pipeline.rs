//! Decode state machine for one media type of one composition item.
//!
//! A pipeline owns up to two lanes. The primary lane answers time queries. When the primary reader
//! reaches the end of a looping item, the next iteration is opened into the secondary lane and the
//! two lanes are swapped once requests cross the loop boundary. Presentation times are item-local
//! and include `loop_index * duration`, so both lanes together form one strictly increasing stream.

use std::mem;

use crate::foundation::core::TIME_EPSILON;
use crate::foundation::error::ClipfeedResult;
use crate::media::handle::{DecodedUnit, UnitHandle};
use crate::media::queue::UnitQueue;
use crate::media::track::{AudioFormat, MediaBackend, ReadWindow, ReaderState, TimedUnit, TrackPayload};
use crate::scene::model::CompositionItem;

/// Lifecycle of one media type inside an [`crate::ItemDecoder`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    /// No reader opened yet.
    Idle,
    /// The primary reader is feeding the primary queue.
    Reading,
    /// The primary reader is exhausted and the next loop iteration feeds the secondary queue.
    Looping,
    /// The source is exhausted; the last unit is held.
    EndOfSource,
    /// The track is unavailable or could not be opened.
    Failed,
    /// Terminal; every reader is closed.
    Released,
}

/// Source seconds read back from the end when a non-looping item is sought to its end.
const END_SEEK_LOOKBACK_SECS: f64 = 1.0;

#[derive(Clone, Copy, Debug)]
pub(crate) struct PipelineConfig {
    pub(crate) capacity: usize,
    pub(crate) margin: f64,
    pub(crate) forward_seek_threshold: f64,
    pub(crate) audio: AudioFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Step {
    Progress,
    Blocked,
    Exhausted,
}

/// A reader and the queue it feeds.
struct Lane<P> {
    reader: Option<ReaderState<P>>,
    queue: UnitQueue<P>,
    /// Item-local time the reader was opened for.
    origin: f64,
    first_pt: Option<f64>,
    frontier: Option<f64>,
}

impl<P: TrackPayload> Lane<P> {
    fn new(capacity: usize) -> Self {
        Self {
            reader: None,
            queue: UnitQueue::new(capacity),
            origin: 0.0,
            first_pt: None,
            frontier: None,
        }
    }

    fn close_reader(&mut self) {
        if let Some(mut reader) = self.reader.take() {
            reader.close();
            tracing::debug!(
                kind = %P::KIND,
                loop_index = reader.loop_index(),
                cursor = reader.cursor(),
                discarded = reader.discarded(),
                "closed track reader"
            );
        }
    }

    fn reset(&mut self) {
        self.close_reader();
        self.queue.clear();
        self.origin = 0.0;
        self.first_pt = None;
        self.frontier = None;
    }

    fn attach(&mut self, reader: ReaderState<P>, origin: f64) {
        self.reset();
        self.reader = Some(reader);
        self.origin = origin;
    }

    fn pull(&mut self, item: &CompositionItem) -> Step {
        let Some(reader) = self.reader.as_mut() else {
            return Step::Exhausted;
        };
        if reader.is_exhausted() {
            return Step::Exhausted;
        }
        if self.queue.is_full() {
            return Step::Blocked;
        }
        let loop_index = reader.loop_index();
        match reader.next_unit() {
            Ok(Some(unit)) => {
                self.push(item, unit, loop_index);
                Step::Progress
            }
            Ok(None) => Step::Exhausted,
            Err(err) => {
                tracing::warn!(
                    kind = %P::KIND,
                    item = %item.id,
                    error = %err,
                    "decode failed; ending track early"
                );
                Step::Exhausted
            }
        }
    }

    fn push(&mut self, item: &CompositionItem, unit: TimedUnit<P>, loop_index: u64) {
        let decoded = DecodedUnit {
            presentation_time: item.local_from_source(loop_index, unit.source_time),
            source_time: unit.source_time,
            duration: unit.duration / item.playback_rate,
            loop_index,
            payload: unit.payload,
        };
        let pt = decoded.presentation_time;
        match self.queue.push(decoded) {
            Ok(()) => {
                self.frontier = Some(pt);
                self.first_pt.get_or_insert(pt);
            }
            Err(rejected) => tracing::debug!(
                kind = %P::KIND,
                t = rejected.presentation_time,
                "dropping unit that does not advance the queue"
            ),
        }
    }
}

/// Reader/queue state machine for one media type.
pub(crate) struct TrackPipeline<P> {
    item: CompositionItem,
    cfg: PipelineConfig,
    state: PipelineState,
    primary: Lane<P>,
    next: Lane<P>,
    has_looped: bool,
    last_requested_time: Option<f64>,
}

impl<P: TrackPayload> TrackPipeline<P> {
    pub(crate) fn new(item: CompositionItem, cfg: PipelineConfig) -> Self {
        Self {
            primary: Lane::new(cfg.capacity),
            next: Lane::new(cfg.capacity),
            item,
            cfg,
            state: PipelineState::Idle,
            has_looped: false,
            last_requested_time: None,
        }
    }

    pub(crate) fn state(&self) -> PipelineState {
        self.state
    }

    pub(crate) fn has_looped(&self) -> bool {
        self.has_looped
    }

    pub(crate) fn last_requested_time(&self) -> Option<f64> {
        self.last_requested_time
    }

    pub(crate) fn open_readers(&self) -> usize {
        usize::from(self.primary.reader.is_some()) + usize::from(self.next.reader.is_some())
    }

    /// Presentation times of every buffered unit, primary lane first.
    pub(crate) fn buffered_timestamps(&self) -> Vec<f64> {
        let mut out = self.primary.queue.timestamps();
        out.extend(self.next.queue.timestamps());
        out
    }

    /// Stop using this track without releasing the pipeline.
    pub(crate) fn disable(&mut self) {
        if self.state == PipelineState::Released {
            return;
        }
        self.primary.reset();
        self.next.reset();
        self.state = PipelineState::Failed;
    }

    pub(crate) fn release(&mut self) {
        if self.state == PipelineState::Released {
            return;
        }
        self.primary.reset();
        self.next.reset();
        self.state = PipelineState::Released;
    }

    /// Drop all buffered state and reopen at item-local time `t`.
    pub(crate) fn seek(&mut self, backend: &dyn MediaBackend, t: f64) -> ClipfeedResult<()> {
        if self.state == PipelineState::Released {
            return Ok(());
        }
        self.primary.reset();
        self.next.reset();

        let pos = self.item.loop_position(t);
        self.has_looped = pos.loop_index > 0;
        let end = self.item.source_end();
        let mut start = self.item.source_time_at(pos.within);
        let mut origin = (pos.loop_index as f64) * self.item.duration + pos.within;
        if !self.item.looping && pos.within >= self.item.duration - TIME_EPSILON {
            // Nothing starts at the very end; read the tail so the last unit can be held.
            start = (end - END_SEEK_LOOKBACK_SECS).max(self.item.start_time);
            origin = self.item.local_from_source(pos.loop_index, start);
        }
        let window = ReadWindow {
            start,
            end,
            loop_index: pos.loop_index,
        };
        match ReaderState::open(backend, &self.item.path, window, self.cfg.audio) {
            Ok(reader) => {
                self.primary.attach(reader, origin);
                self.state = PipelineState::Reading;
                Ok(())
            }
            Err(err) => {
                self.state = PipelineState::Failed;
                Err(err)
            }
        }
    }

    /// Decode ahead until the newest buffered unit is past `t + margin`, the queue is full or
    /// the source is exhausted.
    pub(crate) fn advance(&mut self, backend: &dyn MediaBackend, t: f64) -> ClipfeedResult<()> {
        match self.state {
            PipelineState::Released | PipelineState::Failed => return Ok(()),
            PipelineState::Idle => self.seek(backend, t)?,
            _ => {
                if self.is_forward_jump(t) {
                    tracing::debug!(kind = %P::KIND, t, "advance jumped ahead; reopening");
                    self.seek(backend, t)?;
                }
            }
        }
        self.pump(backend, t + self.cfg.margin, None)
    }

    /// Newest unit with `presentation_time <= t`.
    ///
    /// With `force`, decoding is driven until a newer unit exists (the answer is exact) or the
    /// source is exhausted; a full queue is pre-evicted up to `t` to make room. Without `force`
    /// only already-decoded units are considered.
    pub(crate) fn acquire(
        &mut self,
        backend: &dyn MediaBackend,
        t: f64,
        force: bool,
    ) -> ClipfeedResult<Option<UnitHandle<P>>> {
        match self.state {
            PipelineState::Released => return Ok(None),
            PipelineState::Idle => {
                self.last_requested_time = Some(t);
                self.seek(backend, t)?;
            }
            PipelineState::Failed => {
                self.last_requested_time = Some(t);
            }
            _ => {
                self.last_requested_time = Some(t);
                if self.is_backward_miss(t) || self.is_forward_jump(t) {
                    tracing::debug!(kind = %P::KIND, item = %self.item.id, t, "implicit seek");
                    self.seek(backend, t)?;
                }
            }
        }

        self.promote_if_due(t);
        if force {
            self.pump(backend, t, Some(t))?;
        }
        Ok(self.primary.queue.acquire_for_time(t))
    }

    fn newest_time(&self) -> Option<f64> {
        self.next
            .queue
            .newest_time()
            .or_else(|| self.primary.queue.newest_time())
    }

    /// Units at or before `t` were decoded and evicted, or the reader started past `t`.
    fn is_backward_miss(&self, t: f64) -> bool {
        let earliest = self.primary.queue.oldest_time().or(self.primary.frontier);
        let Some(earliest) = earliest else {
            return self.primary.origin > t + TIME_EPSILON;
        };
        if t + TIME_EPSILON >= earliest {
            return false;
        }
        self.primary.first_pt.is_some_and(|f| f <= t + TIME_EPSILON)
            || self.primary.origin > t + TIME_EPSILON
    }

    fn is_forward_jump(&self, t: f64) -> bool {
        if !matches!(self.state, PipelineState::Reading | PipelineState::Looping) {
            return false;
        }
        if self.item.looping
            && let Some(reader) = self.primary.reader.as_ref()
            && self.item.loop_position(t).loop_index > reader.loop_index() + 1
        {
            return true;
        }
        let reference = self
            .newest_time()
            .or(self.primary.frontier)
            .unwrap_or(self.primary.origin);
        t > reference + self.cfg.forward_seek_threshold
    }

    /// Swap in the next loop iteration once `t` reaches its first instant.
    fn promote_if_due(&mut self, t: f64) {
        if self.state != PipelineState::Looping || t + TIME_EPSILON < self.next.origin {
            return;
        }
        mem::swap(&mut self.primary, &mut self.next);
        self.next.reset();
        self.state = PipelineState::Reading;
        tracing::debug!(
            kind = %P::KIND,
            item = %self.item.id,
            loop_index = self.primary.reader.as_ref().map(ReaderState::loop_index),
            "promoted next loop iteration"
        );
    }

    fn pump(
        &mut self,
        backend: &dyn MediaBackend,
        target: f64,
        consume_at: Option<f64>,
    ) -> ClipfeedResult<()> {
        loop {
            if let Some(t) = consume_at {
                self.promote_if_due(t);
            }
            if self.newest_time().is_some_and(|n| n > target + TIME_EPSILON) {
                return Ok(());
            }
            match self.decode_one(backend)? {
                Step::Progress => {}
                Step::Blocked => {
                    let freed = match consume_at {
                        Some(t) if self.state == PipelineState::Reading => {
                            self.primary.queue.evict_before_time(t)
                        }
                        _ => 0,
                    };
                    if freed == 0 {
                        return Ok(());
                    }
                }
                Step::Exhausted => return Ok(()),
            }
        }
    }

    fn decode_one(&mut self, backend: &dyn MediaBackend) -> ClipfeedResult<Step> {
        match self.state {
            PipelineState::Reading => match self.primary.pull(&self.item) {
                Step::Exhausted => self.on_end_of_track(backend),
                step => Ok(step),
            },
            PipelineState::Looping => Ok(self.next.pull(&self.item)),
            _ => Ok(Step::Exhausted),
        }
    }

    fn on_end_of_track(&mut self, backend: &dyn MediaBackend) -> ClipfeedResult<Step> {
        if !self.item.looping {
            self.primary.close_reader();
            self.state = PipelineState::EndOfSource;
            tracing::debug!(kind = %P::KIND, item = %self.item.id, "source exhausted; holding last unit");
            return Ok(Step::Exhausted);
        }

        let loop_index = self
            .primary
            .reader
            .as_ref()
            .map_or(0, ReaderState::loop_index)
            + 1;
        let window = ReadWindow {
            start: self.item.start_time,
            end: self.item.source_end(),
            loop_index,
        };
        match ReaderState::open(backend, &self.item.path, window, self.cfg.audio) {
            Ok(reader) => {
                let origin = (loop_index as f64) * self.item.duration;
                self.next.attach(reader, origin);
                self.state = PipelineState::Looping;
                self.has_looped = true;
                Ok(Step::Progress)
            }
            Err(err) => {
                self.primary.close_reader();
                self.state = PipelineState::Failed;
                Err(err)
            }
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/decode/pipeline.rs"]
mod tests;
