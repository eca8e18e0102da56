use std::collections::BTreeMap;

use crate::media::handle::{AudioChunk, SampleHandle};

/// Concatenate consecutive chunks of one item into a single interleaved buffer.
///
/// Chunks whose format differs from the first chunk are skipped.
pub fn concat_chunks(chunks: &[SampleHandle]) -> Option<AudioChunk> {
    let first = chunks.first()?;
    let (sample_rate, channels) = (first.sample_rate(), first.channels());
    let mut interleaved_f32 = Vec::with_capacity(chunks.iter().map(|c| c.samples().len()).sum());
    for chunk in chunks {
        if chunk.sample_rate() != sample_rate || chunk.channels() != channels {
            tracing::warn!(
                expected_rate = sample_rate,
                expected_channels = channels,
                rate = chunk.sample_rate(),
                channels = chunk.channels(),
                "skipping audio chunk with mismatched format"
            );
            continue;
        }
        interleaved_f32.extend_from_slice(chunk.samples());
    }
    Some(AudioChunk {
        sample_rate,
        channels,
        interleaved_f32,
    })
}

/// Mix per-item audio into one buffer.
///
/// Mixing is additive with a `1 / n` gain for `n` contributing items, clamped to `[-1, 1]`. A
/// single item is passed through unscaled. The output has the format of the first item and the
/// length of the longest contribution; items with another format are skipped.
pub fn mix_audio_samples(per_item: &BTreeMap<String, Vec<SampleHandle>>) -> Option<AudioChunk> {
    let mut tracks = per_item.values().filter_map(|chunks| concat_chunks(chunks));
    let first = tracks.next()?;
    let rest: Vec<AudioChunk> = tracks
        .filter(|t| {
            let same = t.sample_rate == first.sample_rate && t.channels == first.channels;
            if !same {
                tracing::warn!(rate = t.sample_rate, channels = t.channels, "skipping item with mismatched audio format");
            }
            same
        })
        .collect();
    if rest.is_empty() {
        return Some(first);
    }

    let gain = 1.0 / (rest.len() + 1) as f32;
    let len = rest
        .iter()
        .map(|t| t.interleaved_f32.len())
        .fold(first.interleaved_f32.len(), usize::max);
    let mut out = vec![0.0f32; len];
    for track in std::iter::once(&first).chain(rest.iter()) {
        for (dst, src) in out.iter_mut().zip(&track.interleaved_f32) {
            *dst += src * gain;
        }
    }
    for s in &mut out {
        *s = s.clamp(-1.0, 1.0);
    }

    Some(AudioChunk {
        sample_rate: first.sample_rate,
        channels: first.channels,
        interleaved_f32: out,
    })
}

#[cfg(test)]
#[path = "../../tests/unit/extract/mix.rs"]
mod tests;
