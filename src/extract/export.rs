use std::collections::BTreeMap;

use crate::extract::extractor::CompositionExtractor;
use crate::extract::mix::mix_audio_samples;
use crate::foundation::core::Fps;
use crate::foundation::error::{ClipfeedError, ClipfeedResult};
use crate::media::handle::{AudioChunk, FrameHandle};

/// Fixed-rate schedule of composition times covering a duration.
///
/// Frame `i` is sampled at `i / fps`; the frame count is `ceil(duration * fps)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExportSchedule {
    fps: Fps,
    frame_count: u64,
}

impl ExportSchedule {
    /// Schedule covering `duration` seconds at `fps`.
    pub fn new(duration: f64, fps: Fps) -> ClipfeedResult<Self> {
        if !duration.is_finite() || duration <= 0.0 {
            return Err(ClipfeedError::validation(
                "export duration must be finite and > 0",
            ));
        }
        Ok(Self {
            fps,
            frame_count: fps.frames_in(duration),
        })
    }

    /// Output frame rate.
    pub fn fps(&self) -> Fps {
        self.fps
    }

    /// Number of output frames.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Composition time of frame `index`.
    pub fn time_of(&self, index: u64) -> f64 {
        self.fps.frame_time_secs(index)
    }

    /// `(index, composition time)` of every output frame, in order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, f64)> + '_ {
        (0..self.frame_count).map(|i| (i, self.time_of(i)))
    }
}

/// Progress notification sent after each exported frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExportProgress {
    /// Frames handed to the consumer so far.
    pub frames_completed: u64,
    /// Total frames in the schedule.
    pub frame_count: u64,
}

/// Decoded content of one output frame.
#[derive(Debug)]
pub struct ExportFrame {
    /// Frame index in the schedule.
    pub index: u64,
    /// Composition time of the frame.
    pub time: f64,
    /// Frame of every visible item, keyed by item id.
    pub frames: BTreeMap<String, FrameHandle>,
    /// Mix of the audio delivered since the previous frame.
    pub audio: Option<AudioChunk>,
}

/// Export counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExportStats {
    /// Frames handed to the consumer.
    pub frames_total: u64,
    /// Frames with at least one visible item.
    pub frames_with_video: u64,
    /// Mixed audio sample frames (samples per channel) handed to the consumer.
    pub audio_sample_frames: u64,
}

/// Drive `extractor` over the whole composition at `fps`.
///
/// Each output frame is handed to `on_frame` in order, followed by an `on_progress` call. The
/// extractor is released when the export ends, whether it completed or `on_frame` failed.
pub fn run_export<F, P>(
    extractor: &mut CompositionExtractor,
    fps: Fps,
    mut on_frame: F,
    mut on_progress: P,
) -> ClipfeedResult<ExportStats>
where
    F: FnMut(ExportFrame) -> ClipfeedResult<()>,
    P: FnMut(ExportProgress),
{
    let result = export_frames(extractor, fps, &mut on_frame, &mut on_progress);
    extractor.release();
    result
}

fn export_frames(
    extractor: &mut CompositionExtractor,
    fps: Fps,
    on_frame: &mut dyn FnMut(ExportFrame) -> ClipfeedResult<()>,
    on_progress: &mut dyn FnMut(ExportProgress),
) -> ClipfeedResult<ExportStats> {
    let schedule = ExportSchedule::new(extractor.composition().duration(), fps)?;
    tracing::debug!(
        frames = schedule.frame_count(),
        fps = fps.as_f64(),
        "starting export"
    );

    extractor.seek(0.0);
    let mut stats = ExportStats::default();
    for (index, time) in schedule.iter() {
        let frames = extractor.decode_composition_frames(time);
        let audio = mix_audio_samples(&extractor.decode_composition_audio(time));

        stats.frames_total += 1;
        if !frames.is_empty() {
            stats.frames_with_video += 1;
        }
        if let Some(a) = &audio {
            stats.audio_sample_frames += a.frame_count() as u64;
        }

        on_frame(ExportFrame {
            index,
            time,
            frames,
            audio,
        })?;
        on_progress(ExportProgress {
            frames_completed: index + 1,
            frame_count: schedule.frame_count(),
        });
    }
    tracing::debug!(?stats, "export finished");
    Ok(stats)
}

#[cfg(test)]
#[path = "../../tests/unit/extract/export.rs"]
mod tests;
