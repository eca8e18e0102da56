use super::*;

#[test]
fn display_prefixes_are_stable() {
    assert!(
        ClipfeedError::validation("x")
            .to_string()
            .contains("validation error:")
    );
    assert!(
        ClipfeedError::open_failed("x")
            .to_string()
            .contains("open failed:")
    );
    assert!(
        ClipfeedError::decode_failed("x")
            .to_string()
            .contains("decode failed:")
    );
    assert!(
        ClipfeedError::serde("x")
            .to_string()
            .contains("serialization error:")
    );
}

#[test]
fn track_unavailable_names_the_kind() {
    let err = ClipfeedError::track_unavailable(TrackKind::Audio);
    assert!(err.is_track_unavailable());
    assert_eq!(err.to_string(), "track unavailable: asset has no audio track");
    assert!(!ClipfeedError::open_failed("x").is_track_unavailable());
}

#[test]
fn other_preserves_source() {
    let base = std::io::Error::other("boom");
    let err = ClipfeedError::Other(anyhow::Error::new(base));
    assert!(err.to_string().contains("boom"));
}
