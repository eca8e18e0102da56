use super::*;
use crate::foundation::core::{Fps, TrackKind};
use crate::media::backend::synthetic::{SyntheticAsset, SyntheticBackend, synthetic_frame_index};
use crate::scene::model::CompositionItem;

fn backend() -> Arc<SyntheticBackend> {
    let fps = Fps::new(30, 1).unwrap();
    Arc::new(
        SyntheticBackend::new()
            .with_asset("av", SyntheticAsset::video(4.0, fps).with_audio(44_100, 2))
            .with_asset("v", SyntheticAsset::video(4.0, fps))
            .with_asset("tone", SyntheticAsset::audio_only(1.0, 44_100, 2)),
    )
}

fn composition() -> Composition {
    Composition::new(
        4.0,
        vec![
            CompositionItem::new("a", "av", 4.0),
            CompositionItem::new("b", "v", 2.0).with_composition_start_time(1.0),
            CompositionItem::new("m", "av", 4.0).with_muted(true),
        ],
    )
}

fn indices(frames: &BTreeMap<String, FrameHandle>) -> BTreeMap<String, Option<u64>> {
    frames
        .iter()
        .map(|(id, f)| (id.clone(), synthetic_frame_index(f.payload())))
        .collect()
}

#[test]
fn frames_are_keyed_by_visible_item() {
    let b = backend();
    let mut ex = CompositionExtractor::new(composition(), b, ExtractorOpts::default()).unwrap();

    let early = ex.decode_composition_frames(0.5);
    assert_eq!(early.keys().collect::<Vec<_>>(), vec!["a", "m"]);
    assert_eq!(synthetic_frame_index(early["a"].payload()), Some(15));

    let later = ex.decode_composition_frames(1.5);
    assert_eq!(later.len(), 3);
    assert_eq!(synthetic_frame_index(later["b"].payload()), Some(15));
    assert_eq!(synthetic_frame_index(later["a"].payload()), Some(45));
}

#[test]
fn parallel_decoding_matches_sequential() {
    let b = backend();
    let mut seq = CompositionExtractor::new(composition(), b.clone(), ExtractorOpts::default()).unwrap();
    let mut par = CompositionExtractor::new(
        composition(),
        b,
        ExtractorOpts::default().with_parallel(true).with_threads(2),
    )
    .unwrap();

    for i in 0..20u32 {
        let t = f64::from(i) * 0.1;
        assert_eq!(
            indices(&seq.decode_composition_frames(t)),
            indices(&par.decode_composition_frames(t)),
            "t={t}"
        );
    }
}

#[test]
fn audio_chunks_are_delivered_once_and_contiguously() {
    let b = backend();
    let mut ex = CompositionExtractor::new(composition(), b, ExtractorOpts::default()).unwrap();

    let mut delivered = Vec::new();
    for i in 0..30u32 {
        let audio = ex.decode_composition_audio(f64::from(i) / 30.0);
        assert!(!audio.contains_key("m"));
        assert!(!audio.contains_key("b"));
        if let Some(chunks) = audio.get("a") {
            delivered.extend(chunks.iter().cloned());
        }
    }

    assert!(!delivered.is_empty());
    assert_eq!(delivered[0].presentation_time(), 0.0);
    for pair in delivered.windows(2) {
        let expected = pair[0].presentation_time() + pair[0].duration();
        assert!(
            (pair[1].presentation_time() - expected).abs() < 1e-6,
            "gap or repeat between {} and {}",
            pair[0].presentation_time(),
            pair[1].presentation_time()
        );
    }
    let last = delivered.last().unwrap();
    assert!(last.presentation_time() <= 29.0 / 30.0);
    assert!(last.presentation_time() + last.duration() > 29.0 / 30.0);
}

#[test]
fn looping_audio_does_not_repeat_samples_at_the_boundary() {
    let b = backend();
    let comp = Composition::new(
        0.2,
        vec![CompositionItem::new("t", "tone", 0.05).with_looping(true)],
    );
    let mut ex = CompositionExtractor::new(comp, b, ExtractorOpts::default()).unwrap();

    let mut delivered = Vec::new();
    for i in 0..20u32 {
        if let Some(chunks) = ex.decode_composition_audio(f64::from(i) / 100.0).remove("t") {
            delivered.extend(chunks);
        }
    }

    for pair in delivered.windows(2) {
        let expected = pair[0].presentation_time() + pair[0].duration();
        assert!(
            (pair[1].presentation_time() - expected).abs() < 1e-6,
            "gap or repeat between {} and {}",
            pair[0].presentation_time(),
            pair[1].presentation_time()
        );
    }
    let first_loop: usize = delivered
        .iter()
        .filter(|c| c.loop_index() == 0)
        .map(|c| c.frame_count())
        .sum();
    assert_eq!(first_loop, 2205);
    let second = delivered.iter().find(|c| c.loop_index() == 1).unwrap();
    assert!((second.presentation_time() - 0.05).abs() < 1e-9);
    assert_eq!(second.source_time(), 0.0);
}

#[test]
fn seek_restarts_audio_delivery_at_the_target() {
    let b = backend();
    let mut ex = CompositionExtractor::new(composition(), b, ExtractorOpts::default()).unwrap();
    ex.decode_composition_audio(0.0);

    ex.seek(3.0);
    let audio = ex.decode_composition_audio(3.0);
    let chunks = &audio["a"];
    assert_eq!(chunks.len(), 1);
    assert!(chunks[0].presentation_time() <= 3.0);
    assert!(chunks[0].presentation_time() + chunks[0].duration() > 3.0);
}

#[test]
fn failing_item_does_not_affect_the_others() {
    let b = backend();
    let comp = Composition::new(
        2.0,
        vec![
            CompositionItem::new("ok", "v", 2.0),
            CompositionItem::new("gone", "missing", 2.0),
        ],
    );
    let mut ex = CompositionExtractor::new(comp, b, ExtractorOpts::default()).unwrap();
    ex.seek(0.5);
    let frames = ex.decode_composition_frames(0.5);
    assert_eq!(frames.keys().collect::<Vec<_>>(), vec!["ok"]);
    assert!(ex.decode_composition_audio(0.5).is_empty());
}

#[test]
fn release_closes_every_reader() {
    let b = backend();
    let stats = b.stats();
    let mut ex = CompositionExtractor::new(composition(), b, ExtractorOpts::default()).unwrap();
    ex.decode_composition_frames(1.5);
    ex.decode_composition_audio(1.5);
    assert!(stats.live(TrackKind::Video) > 0);

    ex.release();
    ex.release();
    assert_eq!(stats.live(TrackKind::Video), 0);
    assert_eq!(stats.live(TrackKind::Audio), 0);
    assert!(ex.decode_composition_frames(1.6).is_empty());
    assert!(ex.decode_composition_audio(1.6).is_empty());
}

#[test]
fn dropping_the_extractor_releases_it() {
    let b = backend();
    let stats = b.stats();
    {
        let mut ex = CompositionExtractor::new(composition(), b, ExtractorOpts::default()).unwrap();
        ex.decode_composition_frames(1.5);
    }
    assert_eq!(stats.live(TrackKind::Video), 0);
}

#[test]
fn zero_threads_is_rejected() {
    let b = backend();
    let opts = ExtractorOpts::default().with_parallel(true).with_threads(0);
    let err = CompositionExtractor::new(composition(), b, opts).unwrap_err();
    let ok = CompositionExtractor::new(composition(), backend(), ExtractorOpts::default()).unwrap();
    assert!(format!("{ok:?}").contains("CompositionExtractor"));
    assert!(err.to_string().contains("threads"));
}

#[test]
fn lookup_by_item_id() {
    let b = backend();
    let ex = CompositionExtractor::new(composition(), b, ExtractorOpts::default()).unwrap();
    assert_eq!(ex.decoders().len(), 3);
    assert!(ex.decoder("b").is_some());
    assert!(ex.decoder("zzz").is_none());
    assert_eq!(ex.composition().duration(), 4.0);
}
