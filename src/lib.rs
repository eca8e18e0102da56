//! clipfeed decodes the media items of a video composition into time-addressed frames and audio.
//!
//! Each composition item gets an [`ItemDecoder`]: a video and an audio pipeline over one asset,
//! each a track reader feeding a bounded look-ahead queue. Callers ask for the unit visible at a
//! composition time and get a cheap, shareable handle back:
//!
//! - Build or load a [`Composition`]
//! - Pick a [`MediaBackend`] ([`FfmpegBackend`] or [`SyntheticBackend`])
//! - Query items one by one with [`ItemDecoder`], or all at once with [`CompositionExtractor`]
//! - Drive an offline pass with [`run_export`]
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod foundation;

/// Per-item decoding.
pub mod decode;
/// Composition-level extraction, audio mixing and export.
pub mod extract;
/// Media capability: track readers, queues, handles and backends.
pub mod media;
/// Boundary composition model.
pub mod scene;

pub use crate::foundation::core::{Fps, TIME_EPSILON, TrackKind};
pub use crate::foundation::error::{ClipfeedError, ClipfeedResult};

pub use crate::decode::item::ItemDecoder;
pub use crate::decode::opts::{DecodeMode, DecoderOpts};
pub use crate::decode::pipeline::PipelineState;
pub use crate::extract::export::{
    ExportFrame, ExportProgress, ExportSchedule, ExportStats, run_export,
};
pub use crate::extract::extractor::{CompositionExtractor, ExtractorOpts};
pub use crate::extract::mix::mix_audio_samples;
pub use crate::media::backend::ffmpeg::{FfmpegBackend, is_ffmpeg_on_path};
pub use crate::media::backend::synthetic::{SyntheticAsset, SyntheticBackend};
pub use crate::media::handle::{AudioChunk, FrameHandle, SampleHandle, UnitHandle, VideoFrame};
pub use crate::media::track::{
    AudioFormat, MediaBackend, Pull, SourceInfo, TimedUnit, TrackReader,
};
pub use crate::scene::composition::Composition;
pub use crate::scene::model::CompositionItem;
