use super::*;
use crate::decode::opts::DecodeMode;
use crate::foundation::core::{Fps, TrackKind};
use crate::media::backend::synthetic::{SyntheticAsset, SyntheticBackend, synthetic_frame_index};

fn backend() -> Arc<SyntheticBackend> {
    let fps = Fps::new(30, 1).unwrap();
    Arc::new(
        SyntheticBackend::new()
            .with_asset("av", SyntheticAsset::video(2.0, fps).with_audio(44_100, 2))
            .with_asset("v", SyntheticAsset::video(2.0, fps))
            .with_asset(
                "bad_audio",
                SyntheticAsset::video(2.0, fps)
                    .with_audio(44_100, 2)
                    .with_open_failure(TrackKind::Audio),
            ),
    )
}

fn decoder(b: &Arc<SyntheticBackend>, item: CompositionItem) -> ItemDecoder {
    let opts = DecoderOpts::for_mode(DecodeMode::Offline).with_lookahead_secs(0.0);
    ItemDecoder::new(item, b.clone(), opts).unwrap()
}

#[test]
fn composition_start_offsets_item_time() {
    let b = backend();
    let item = CompositionItem::new("a", "av", 2.0).with_composition_start_time(1.0);
    let mut d = decoder(&b, item);

    assert!(d.acquire_frame_for_time(0.5, true).is_none());
    let f = d.acquire_frame_for_time(1.5, true).unwrap();
    assert_eq!(synthetic_frame_index(f.payload()), Some(15));
    assert_eq!(d.last_requested_time(), Some(0.5));
}

#[test]
fn source_in_point_and_rate_map_to_source_frames() {
    let b = backend();
    let item = CompositionItem::new("a", "av", 0.5)
        .with_start_time(0.5)
        .with_playback_rate(2.0);
    let mut d = decoder(&b, item);

    let f = d.acquire_frame_for_time(0.25, true).unwrap();
    assert_eq!(synthetic_frame_index(f.payload()), Some(30));
    assert!((f.presentation_time() - 0.25).abs() < 1e-9);
    assert!((f.duration() - 1.0 / 60.0).abs() < 1e-9);
}

#[test]
fn muted_items_do_not_extract_audio() {
    let b = backend();
    let mut d = decoder(&b, CompositionItem::new("a", "av", 2.0).with_muted(true));
    assert!(!d.should_extract_audio());
    assert!(d.get_audio_sample_for_time(0.5).is_none());
    assert!(d.advance_audio_decoder(0.5).is_ok());
}

#[test]
fn audio_open_failure_disables_audio_without_failing_seek() {
    let b = backend();
    let mut d = decoder(&b, CompositionItem::new("a", "bad_audio", 2.0));
    assert!(d.should_extract_audio());
    d.seek_to(0.5).unwrap();
    assert!(!d.should_extract_audio());
    assert_eq!(d.audio_state(), PipelineState::Failed);
    assert!(d.acquire_frame_for_time(0.5, true).is_some());
}

#[test]
fn audio_open_failure_is_reported_by_advance_once() {
    let b = backend();
    let mut d = decoder(&b, CompositionItem::new("a", "bad_audio", 2.0));
    assert!(d.advance_audio_decoder(0.0).is_err());
    assert!(d.advance_audio_decoder(0.1).is_ok());
    assert!(!d.should_extract_audio());
}

#[test]
fn unknown_asset_fails_on_first_video_use() {
    let b = backend();
    let mut d = decoder(&b, CompositionItem::new("a", "missing", 2.0));
    assert!(d.source_info().is_none());
    assert!(!d.should_extract_audio());
    assert!(d.advance_decoder(0.0).is_err());
    assert!(d.acquire_frame_for_time(0.0, true).is_none());
    assert_eq!(d.video_state(), PipelineState::Failed);
}

#[test]
fn invalid_items_are_rejected() {
    let b = backend();
    let item = CompositionItem::new("a", "av", 0.0);
    let err = ItemDecoder::new(item, b, DecoderOpts::default()).unwrap_err();
    assert!(err.to_string().starts_with("validation error:"));
}

#[test]
fn release_closes_both_tracks() {
    let b = backend();
    let stats = b.stats();
    let mut d = decoder(&b, CompositionItem::new("a", "av", 2.0));
    d.advance_decoder(0.0).unwrap();
    d.advance_audio_decoder(0.0).unwrap();
    assert_eq!(d.open_reader_count(), 2);

    d.release();
    d.release();
    assert!(d.is_released());
    assert_eq!(d.open_reader_count(), 0);
    assert_eq!(stats.live(TrackKind::Video), 0);
    assert_eq!(stats.live(TrackKind::Audio), 0);
    assert!(!d.should_extract_audio());
    assert!(d.acquire_frame_for_time(0.1, true).is_none());
    assert!(d.seek_to(0.0).is_ok());
    assert_eq!(d.open_reader_count(), 0);
}

#[test]
fn seeking_past_a_non_looping_item_holds_its_last_frame() {
    let b = backend();
    let mut d = decoder(&b, CompositionItem::new("a", "v", 2.0));
    d.seek_to(3.0).unwrap();
    let f = d.acquire_frame_for_time(3.0, true).unwrap();
    assert_eq!(synthetic_frame_index(f.payload()), Some(59));
}

#[test]
fn audio_starts_exactly_at_an_off_grid_in_point() {
    let b = backend();
    let item = CompositionItem::new("a", "av", 1.0).with_start_time(0.3);
    let mut d = decoder(&b, item);

    let s = d.get_audio_sample_for_time(0.0).unwrap();
    assert_eq!(s.presentation_time(), 0.0);
    assert_eq!(s.source_time(), 0.3);
    // 0.3 s is sample 13230, inside the chunk starting at 12 * 1024.
    assert_eq!(s.frame_count(), 13 * 1024 - 13_230);
    let phase = std::f64::consts::TAU * 440.0 * 13_230.0 / 44_100.0;
    let expected = (phase.sin() as f32) * 0.5;
    assert_eq!(&s.samples()[..2], &[expected, expected]);

    let next = d.get_audio_sample_for_time(s.duration() + 1e-4).unwrap();
    assert!((next.presentation_time() - s.duration()).abs() < 1e-9);
    assert_eq!(next.frame_count(), 1024);
}
