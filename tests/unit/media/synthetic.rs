use super::*;

fn fps30() -> Fps {
    Fps::new(30, 1).unwrap()
}

fn backend() -> SyntheticBackend {
    SyntheticBackend::new()
        .with_asset(
            "clip",
            SyntheticAsset::video(1.0, fps30()).with_audio(48_000, 2),
        )
        .with_asset("tone", SyntheticAsset::audio_only(0.55, 44_100, 1))
}

fn frames(reader: &mut dyn TrackReader<VideoFrame>) -> Vec<(f64, u64)> {
    let mut out = Vec::new();
    loop {
        match reader.pull_next().unwrap() {
            Pull::Unit(u) => out.push((u.source_time, synthetic_frame_index(&u.payload).unwrap())),
            Pull::Skipped(_) => {}
            Pull::EndOfTrack => break,
        }
    }
    out
}

#[test]
fn probe_reports_tracks() {
    let b = backend();
    let info = b.probe("clip").unwrap();
    assert!(info.has_video && info.has_audio);
    assert_eq!(info.fps, Some(fps30()));
    assert_eq!(info.audio_sample_rate, Some(48_000));

    let info = b.probe("tone").unwrap();
    assert!(!info.has_video && info.has_audio);
    assert!(matches!(b.probe("nope"), Err(ClipfeedError::OpenFailed(_))));
}

#[test]
fn video_reader_starts_at_the_preceding_keyframe() {
    let b = backend();
    let mut r = b.open_video("clip", 0.6).unwrap();
    let got = frames(r.as_mut());
    assert_eq!(got[0].1, 15);
    assert_eq!(got.last().unwrap().1, 29);
    assert_eq!(got.len(), 15);
    assert!((got[1].0 - 16.0 / 30.0).abs() < 1e-9);
}

#[test]
fn corrupt_and_fatal_frames_are_reported() {
    let b = SyntheticBackend::new().with_asset(
        "bad",
        SyntheticAsset::video(1.0, fps30())
            .with_corrupt_frames([1])
            .with_fatal_error_at(3),
    );
    let mut r = b.open_video("bad", 0.0).unwrap();
    assert!(matches!(r.pull_next().unwrap(), Pull::Unit(_)));
    assert!(matches!(r.pull_next().unwrap(), Pull::Skipped(_)));
    assert!(matches!(r.pull_next().unwrap(), Pull::Unit(_)));
    assert!(matches!(r.pull_next(), Err(ClipfeedError::DecodeFailed(_))));
}

#[test]
fn missing_tracks_and_open_failures() {
    let b = backend().with_asset(
        "broken",
        SyntheticAsset::video(1.0, fps30()).with_open_failure(TrackKind::Video),
    );
    assert!(
        b.open_video("tone", 0.0)
            .err()
            .unwrap()
            .is_track_unavailable()
    );
    assert!(matches!(
        b.open_video("broken", 0.0),
        Err(ClipfeedError::OpenFailed(_))
    ));
    assert!(
        b.open_audio("broken", 0.0, AudioFormat::default())
            .err()
            .unwrap()
            .is_track_unavailable()
    );
}

#[test]
fn audio_reader_produces_requested_format_and_partial_tail() {
    let b = backend();
    let format = AudioFormat {
        sample_rate: 1_000,
        channels: 2,
        chunk_frames: 100,
    };
    let mut r = b.open_audio("tone", 0.25, format).unwrap();
    let mut chunks = Vec::new();
    while let Pull::Unit(u) = r.pull_next().unwrap() {
        chunks.push(u);
    }
    assert!((chunks[0].source_time - 0.2).abs() < 1e-9);
    assert_eq!(chunks[0].payload.channels, 2);
    assert_eq!(chunks[0].payload.frame_count(), 100);
    assert_eq!(chunks.len(), 4);
    assert_eq!(chunks[3].payload.frame_count(), 50);
    assert!((chunks[3].duration - 0.05).abs() < 1e-9);
}

#[test]
fn stats_track_open_readers() {
    let b = backend();
    let stats = b.stats();
    let mut a = b.open_video("clip", 0.0).unwrap();
    let mut c = b.open_video("clip", 0.5).unwrap();
    assert_eq!(stats.live(TrackKind::Video), 2);
    a.close();
    a.close();
    c.close();
    assert_eq!(stats.live(TrackKind::Video), 0);
    assert_eq!(stats.opens(TrackKind::Video), 2);
    assert_eq!(stats.peak(TrackKind::Video), 2);
    assert_eq!(stats.opens(TrackKind::Audio), 0);
}
