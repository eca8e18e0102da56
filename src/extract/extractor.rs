use std::collections::BTreeMap;
use std::sync::Arc;

use rayon::prelude::*;

use crate::decode::item::ItemDecoder;
use crate::decode::opts::{DecodeMode, DecoderOpts};
use crate::foundation::core::TIME_EPSILON;
use crate::foundation::error::{ClipfeedError, ClipfeedResult};
use crate::media::handle::{FrameHandle, SampleHandle};
use crate::media::track::MediaBackend;
use crate::scene::composition::Composition;

/// Requests further apart than this restart audio delivery at the requested time instead of
/// catching up chunk by chunk.
const AUDIO_CATCH_UP_LIMIT_SECS: f64 = 1.0;

/// Upper bound on chunks delivered for one item by a single audio request.
const MAX_CHUNKS_PER_REQUEST: usize = 256;

/// Options for [`CompositionExtractor`].
#[derive(Clone, Debug)]
pub struct ExtractorOpts {
    /// Options applied to every item decoder.
    pub decoder: DecoderOpts,
    /// Decode items in parallel (rayon), using a dedicated thread pool.
    pub parallel: bool,
    /// Override the number of rayon worker threads. `None` uses rayon defaults.
    pub threads: Option<usize>,
}

impl Default for ExtractorOpts {
    fn default() -> Self {
        Self {
            decoder: DecoderOpts::for_mode(DecodeMode::Offline),
            parallel: false,
            threads: None,
        }
    }
}

impl ExtractorOpts {
    /// Set the per-item decoder options.
    pub fn with_decoder(mut self, decoder: DecoderOpts) -> Self {
        self.decoder = decoder;
        self
    }

    /// Enable or disable parallel item decoding.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Set the worker thread count used when `parallel` is enabled.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }
}

/// Audio delivery position of one item, in composition time.
#[derive(Clone, Copy, Debug, Default)]
struct AudioCursor {
    /// End of the last delivered chunk.
    end: Option<f64>,
    /// Presentation time (item-local) of the last delivered chunk.
    last_pt: Option<f64>,
}

/// Synchronous extractor decoding every item of a composition at a composition time.
///
/// Each item has its own [`ItemDecoder`]; a failure in one item never affects the others.
#[derive(Debug)]
pub struct CompositionExtractor {
    composition: Composition,
    decoders: Vec<ItemDecoder>,
    audio: Vec<AudioCursor>,
    pool: Option<rayon::ThreadPool>,
    released: bool,
}

impl CompositionExtractor {
    /// Validate `composition` and create one decoder per item.
    pub fn new(
        composition: Composition,
        backend: Arc<dyn MediaBackend>,
        opts: ExtractorOpts,
    ) -> ClipfeedResult<Self> {
        composition.validate()?;
        let decoders = composition
            .items()
            .iter()
            .map(|item| ItemDecoder::new(item.clone(), Arc::clone(&backend), opts.decoder.clone()))
            .collect::<ClipfeedResult<Vec<_>>>()?;
        let pool = if opts.parallel {
            Some(build_thread_pool(opts.threads)?)
        } else {
            None
        };
        tracing::debug!(
            items = decoders.len(),
            parallel = opts.parallel,
            "created composition extractor"
        );
        Ok(Self {
            audio: vec![AudioCursor::default(); decoders.len()],
            composition,
            decoders,
            pool,
            released: false,
        })
    }

    /// The composition being extracted.
    pub fn composition(&self) -> &Composition {
        &self.composition
    }

    /// Item decoders in composition order.
    pub fn decoders(&self) -> &[ItemDecoder] {
        &self.decoders
    }

    /// Decoder of the item with id `id`.
    pub fn decoder(&self, id: &str) -> Option<&ItemDecoder> {
        self.decoders.iter().find(|d| d.item().id == id)
    }

    /// Reposition every item at composition time `t`.
    ///
    /// Items whose video cannot be opened are logged and skipped.
    pub fn seek(&mut self, t: f64) {
        for (decoder, cursor) in self.decoders.iter_mut().zip(self.audio.iter_mut()) {
            *cursor = AudioCursor::default();
            if let Err(err) = decoder.seek_to(t) {
                tracing::warn!(item = %decoder.item().id, error = %err, "seek failed");
            }
        }
    }

    /// Frame of every item visible at composition time `t`, keyed by item id.
    ///
    /// Items that have not started yet or have no video are absent.
    pub fn decode_composition_frames(&mut self, t: f64) -> BTreeMap<String, FrameHandle> {
        if self.released {
            return BTreeMap::new();
        }
        let decode = |d: &mut ItemDecoder| {
            d.acquire_frame_for_time(t, true)
                .map(|frame| (d.item().id.clone(), frame))
        };
        match self.pool.as_ref() {
            Some(pool) => pool.install(|| self.decoders.par_iter_mut().filter_map(decode).collect()),
            None => self.decoders.iter_mut().filter_map(decode).collect(),
        }
    }

    /// Audio chunks of every unmuted item up to composition time `t`, keyed by item id.
    ///
    /// Each chunk is delivered once: successive calls return the chunks following the ones
    /// already returned, up to the chunk playing at `t`. Items without usable audio are absent.
    pub fn decode_composition_audio(&mut self, t: f64) -> BTreeMap<String, Vec<SampleHandle>> {
        let mut out = BTreeMap::new();
        if self.released {
            return out;
        }
        for (decoder, cursor) in self.decoders.iter_mut().zip(self.audio.iter_mut()) {
            if decoder.item().muted || !decoder.should_extract_audio() {
                continue;
            }
            let chunks = collect_audio(decoder, cursor, t);
            if !chunks.is_empty() {
                out.insert(decoder.item().id.clone(), chunks);
            }
        }
        out
    }

    /// Release every item decoder. Further calls are no-ops.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        for decoder in &mut self.decoders {
            decoder.release();
        }
        tracing::debug!("released composition extractor");
    }
}

impl Drop for CompositionExtractor {
    fn drop(&mut self) {
        self.release();
    }
}

fn collect_audio(decoder: &mut ItemDecoder, cursor: &mut AudioCursor, t: f64) -> Vec<SampleHandle> {
    let comp_start = decoder.item().composition_start_time;
    let mut at = match cursor.end {
        Some(end) if end <= t + TIME_EPSILON && t - end <= AUDIO_CATCH_UP_LIMIT_SECS => end,
        Some(end) if end > t + TIME_EPSILON && t + AUDIO_CATCH_UP_LIMIT_SECS >= end => {
            return Vec::new();
        }
        _ => t,
    };

    let mut chunks = Vec::new();
    while at <= t + TIME_EPSILON && chunks.len() < MAX_CHUNKS_PER_REQUEST {
        let Some(sample) = decoder.get_audio_sample_for_time(at) else {
            break;
        };
        if cursor
            .last_pt
            .is_some_and(|pt| (pt - sample.presentation_time()).abs() <= TIME_EPSILON)
        {
            break;
        }
        let end = comp_start + sample.presentation_time() + sample.duration();
        if sample.duration() <= 0.0 || end <= at + TIME_EPSILON {
            break;
        }
        cursor.last_pt = Some(sample.presentation_time());
        cursor.end = Some(end);
        at = end;
        chunks.push(sample);
    }
    chunks
}

fn build_thread_pool(threads: Option<usize>) -> ClipfeedResult<rayon::ThreadPool> {
    if let Some(n) = threads
        && n == 0
    {
        return Err(ClipfeedError::validation(
            "extractor 'threads' must be >= 1 when set",
        ));
    }
    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(n) = threads {
        builder = builder.num_threads(n);
    }
    builder
        .build()
        .map_err(|e| ClipfeedError::Other(anyhow::anyhow!("failed to build rayon thread pool: {e}")))
}

#[cfg(test)]
#[path = "../../tests/unit/extract/extractor.rs"]
mod tests;
