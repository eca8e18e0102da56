use super::*;

#[test]
fn parses_rational_and_integer_frame_rates() {
    assert_eq!(parse_rational_fps("30000/1001"), Some(Fps { num: 30000, den: 1001 }));
    assert_eq!(parse_rational_fps("25"), Some(Fps { num: 25, den: 1 }));
    assert_eq!(parse_rational_fps("0/0"), None);
    assert_eq!(parse_rational_fps("abc"), None);
}

#[cfg(not(feature = "media-ffmpeg"))]
#[test]
fn disabled_feature_reports_open_failure() {
    let b = FfmpegBackend::new();
    assert!(matches!(
        b.probe("clip.mp4"),
        Err(ClipfeedError::OpenFailed(_))
    ));
    assert!(matches!(
        b.open_video("clip.mp4", 0.0),
        Err(ClipfeedError::OpenFailed(_))
    ));
}

#[cfg(feature = "media-ffmpeg")]
#[test]
fn missing_file_fails_to_probe() {
    if !is_ffmpeg_on_path() {
        return;
    }
    let b = FfmpegBackend::new();
    assert!(b.probe("/definitely/not/here.mp4").is_err());
}
