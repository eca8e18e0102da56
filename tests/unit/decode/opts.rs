use super::*;

#[test]
fn mode_selects_default_margin() {
    let rt = DecoderOpts::for_mode(DecodeMode::RealTime);
    let off = DecoderOpts::for_mode(DecodeMode::Offline);
    if std::env::var(ENV_LOOKAHEAD_SECS).is_err() {
        assert_eq!(rt.lookahead(), 0.25);
        assert_eq!(off.lookahead(), 0.0);
    }
    assert_eq!(off.mode, DecodeMode::Offline);
}

#[test]
fn explicit_margin_wins_and_invalid_falls_back() {
    let opts = DecoderOpts::default()
        .with_mode(DecodeMode::Offline)
        .with_lookahead_secs(1.5);
    assert_eq!(opts.lookahead(), 1.5);

    let mut bad = opts.clone();
    bad.lookahead_secs = Some(f64::NAN);
    assert_eq!(bad.lookahead(), 0.0);
}

#[test]
fn builders_set_fields() {
    let opts = DecoderOpts::default()
        .with_max_queue_units(3)
        .with_max_audio_queue_units(5)
        .with_forward_seek_threshold(2.0)
        .with_audio_format(AudioFormat {
            sample_rate: 48_000,
            channels: 1,
            chunk_frames: 256,
        });
    assert_eq!(opts.max_queue_units, 3);
    assert_eq!(opts.max_audio_queue_units, 5);
    assert_eq!(opts.forward_seek_threshold, 2.0);
    assert_eq!(opts.audio.channels, 1);
}
