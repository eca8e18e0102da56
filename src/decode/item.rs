use std::sync::Arc;

use crate::decode::opts::DecoderOpts;
use crate::decode::pipeline::{PipelineConfig, PipelineState, TrackPipeline};
use crate::foundation::core::TIME_EPSILON;
use crate::foundation::error::ClipfeedResult;
use crate::media::handle::{AudioChunk, FrameHandle, SampleHandle, VideoFrame};
use crate::media::track::{MediaBackend, SourceInfo};
use crate::scene::composition::validate_item;
use crate::scene::model::CompositionItem;

/// Decoder for one composition item: a video pipeline and an audio pipeline over one asset.
///
/// All times passed to the decoder are composition times; they are mapped to item-local time
/// using the item's composition start, loop flag and duration. Times before the item starts
/// yield no units. A non-looping item holds its last unit after its duration.
///
/// Every mutating call takes `&mut self`. An `ItemDecoder` is `Send` but performs no internal
/// locking: callers sharing one across threads wrap it in a `Mutex`.
pub struct ItemDecoder {
    item: CompositionItem,
    backend: Arc<dyn MediaBackend>,
    info: Option<SourceInfo>,
    video: TrackPipeline<VideoFrame>,
    audio: TrackPipeline<AudioChunk>,
    released: bool,
}

impl ItemDecoder {
    /// Create a decoder for `item`, probing its asset through `backend`.
    ///
    /// A failed probe is not an error here: audio is disabled and the video failure surfaces on
    /// the first advance or seek.
    pub fn new(
        item: CompositionItem,
        backend: Arc<dyn MediaBackend>,
        opts: DecoderOpts,
    ) -> ClipfeedResult<Self> {
        validate_item(&item)?;
        let margin = opts.lookahead();
        let video_cfg = PipelineConfig {
            capacity: opts.max_queue_units,
            margin,
            forward_seek_threshold: opts.forward_seek_threshold,
            audio: opts.audio,
        };
        let audio_cfg = PipelineConfig {
            capacity: opts.max_audio_queue_units,
            ..video_cfg
        };
        let mut video = TrackPipeline::new(item.clone(), video_cfg);
        let mut audio = TrackPipeline::new(item.clone(), audio_cfg);

        let info = match backend.probe(&item.path) {
            Ok(info) => {
                if !info.has_video {
                    video.disable();
                }
                if !info.has_audio || item.muted {
                    audio.disable();
                }
                Some(info)
            }
            Err(err) => {
                tracing::warn!(item = %item.id, path = %item.path, error = %err, "probe failed");
                audio.disable();
                None
            }
        };
        tracing::debug!(
            item = %item.id,
            backend = backend.name(),
            has_video = info.as_ref().is_some_and(|i| i.has_video),
            has_audio = info.as_ref().is_some_and(|i| i.has_audio),
            "created item decoder"
        );

        Ok(Self {
            item,
            backend,
            info,
            video,
            audio,
            released: false,
        })
    }

    /// The item being decoded.
    pub fn item(&self) -> &CompositionItem {
        &self.item
    }

    /// Probe result, if the probe succeeded.
    pub fn source_info(&self) -> Option<&SourceInfo> {
        self.info.as_ref()
    }

    /// Lifecycle state of the video pipeline.
    pub fn video_state(&self) -> PipelineState {
        self.video.state()
    }

    /// Lifecycle state of the audio pipeline.
    pub fn audio_state(&self) -> PipelineState {
        self.audio.state()
    }

    /// Return `true` once either track has started a second loop iteration.
    pub fn has_looped(&self) -> bool {
        self.video.has_looped() || self.audio.has_looped()
    }

    /// Item-local time of the most recent frame request.
    pub fn last_requested_time(&self) -> Option<f64> {
        self.video.last_requested_time()
    }

    /// Number of track readers currently open (video and audio).
    pub fn open_reader_count(&self) -> usize {
        self.video.open_readers() + self.audio.open_readers()
    }

    /// Presentation times of the buffered video frames.
    pub fn buffered_video_times(&self) -> Vec<f64> {
        self.video.buffered_timestamps()
    }

    /// Presentation times of the buffered audio chunks.
    pub fn buffered_audio_times(&self) -> Vec<f64> {
        self.audio.buffered_timestamps()
    }

    fn local_time(&self, composition_time: f64) -> f64 {
        let local = self.item.local_time(composition_time);
        let local = if local.is_finite() { local.max(0.0) } else { 0.0 };
        if self.item.looping {
            local
        } else {
            local.min(self.item.duration)
        }
    }

    fn is_before_start(&self, composition_time: f64) -> bool {
        self.item.local_time(composition_time) < -TIME_EPSILON
    }

    /// Keep the video look-ahead ahead of `t`.
    ///
    /// Only a failure to open the video track is reported.
    pub fn advance_decoder(&mut self, t: f64) -> ClipfeedResult<()> {
        if self.released {
            return Ok(());
        }
        let local = self.local_time(t);
        self.video.advance(self.backend.as_ref(), local)
    }

    /// Drop all buffered state of both tracks and reopen them at `t`.
    ///
    /// A video open failure is returned. An audio open failure disables audio for this item.
    #[tracing::instrument(level = "debug", skip(self), fields(item = %self.item.id))]
    pub fn seek_to(&mut self, t: f64) -> ClipfeedResult<()> {
        if self.released {
            return Ok(());
        }
        let local = self.local_time(t);

        if self.should_extract_audio()
            && let Err(err) = self.audio.seek(self.backend.as_ref(), local)
        {
            tracing::warn!(item = %self.item.id, error = %err, "audio open failed; disabling audio");
            self.audio.disable();
        }

        let video_available = self.info.as_ref().is_none_or(|i| i.has_video);
        if video_available {
            self.video.seek(self.backend.as_ref(), local)?;
        }
        Ok(())
    }

    /// Video frame visible at `t`, or `None` when no frame qualifies.
    ///
    /// With `force`, decoding is driven until the returned frame is the newest one at or before
    /// `t`. Without it, only already-decoded frames are considered. Backward jumps and large
    /// forward jumps reopen the reader.
    pub fn acquire_frame_for_time(&mut self, t: f64, force: bool) -> Option<FrameHandle> {
        if self.released || self.is_before_start(t) {
            return None;
        }
        let local = self.local_time(t);
        match self.video.acquire(self.backend.as_ref(), local, force) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!(item = %self.item.id, t, error = %err, "video unavailable");
                None
            }
        }
    }

    /// Keep the audio look-ahead ahead of `t`.
    ///
    /// A failure to open the audio track disables audio for this item and is returned once.
    pub fn advance_audio_decoder(&mut self, t: f64) -> ClipfeedResult<()> {
        if !self.should_extract_audio() {
            return Ok(());
        }
        let local = self.local_time(t);
        if let Err(err) = self.audio.advance(self.backend.as_ref(), local) {
            self.audio.disable();
            return Err(err);
        }
        Ok(())
    }

    /// Audio chunk playing at `t`, decoding as needed.
    ///
    /// Returns `None` when the item has no usable audio or no chunk covers `t`.
    pub fn get_audio_sample_for_time(&mut self, t: f64) -> Option<SampleHandle> {
        if !self.should_extract_audio() || self.is_before_start(t) {
            return None;
        }
        let local = self.local_time(t);
        match self.audio.acquire(self.backend.as_ref(), local, true) {
            Ok(sample) => sample,
            Err(err) => {
                tracing::warn!(item = %self.item.id, error = %err, "audio open failed; disabling audio");
                self.audio.disable();
                None
            }
        }
    }

    /// Return `true` when the item has a usable, unmuted audio track.
    pub fn should_extract_audio(&self) -> bool {
        !self.released
            && !self.item.muted
            && self.info.as_ref().is_some_and(|i| i.has_audio)
            && self.audio.state() != PipelineState::Failed
    }

    /// Close every reader and drop every buffered unit. Further calls are no-ops.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.video.release();
        self.audio.release();
        tracing::debug!(item = %self.item.id, "released item decoder");
    }

    /// Return `true` once [`ItemDecoder::release`] has been called.
    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl std::fmt::Debug for ItemDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemDecoder")
            .field("item", &self.item.id)
            .field("backend", &self.backend.name())
            .field("video", &self.video.state())
            .field("audio", &self.audio.state())
            .field("released", &self.released)
            .finish()
    }
}

static_assertions::assert_impl_all!(ItemDecoder: Send);

#[cfg(test)]
#[path = "../../tests/unit/decode/item.rs"]
mod tests;
