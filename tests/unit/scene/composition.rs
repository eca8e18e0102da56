use super::*;
use crate::scene::model::LoopPosition;

const JSON: &str = r#"{
    "duration": 12.0,
    "items": [
        { "id": "a", "path": "a.mp4", "duration": 4.0, "loop": true },
        { "id": "b", "path": "b.mp4", "start_time": 1.5, "composition_start_time": 2.0,
          "duration": 3.0, "playback_rate": 2.0, "muted": true }
    ]
}"#;

#[test]
fn parse_applies_defaults() {
    let comp = Composition::from_reader(JSON.as_bytes()).unwrap();
    comp.validate().unwrap();
    assert_eq!(comp.duration(), 12.0);

    let a = comp.item("a").unwrap();
    assert!(a.looping);
    assert!(!a.muted);
    assert_eq!(a.playback_rate, 1.0);
    assert_eq!(a.start_time, 0.0);

    let b = comp.item("b").unwrap();
    assert!(!b.looping);
    assert!(b.muted);
    assert_eq!(b.playback_rate, 2.0);
}

#[test]
fn json_round_trip_keeps_loop_field_name() {
    let comp = Composition::from_reader(JSON.as_bytes()).unwrap();
    let s = comp.to_json_string().unwrap();
    assert!(s.contains("\"loop\": true"));
    let back = Composition::from_reader(s.as_bytes()).unwrap();
    assert_eq!(back.items(), comp.items());
}

#[test]
fn validate_rejects_bad_items() {
    let dup = Composition::new(
        1.0,
        vec![
            CompositionItem::new("x", "a.mp4", 1.0),
            CompositionItem::new("x", "b.mp4", 1.0),
        ],
    );
    assert!(dup.validate().is_err());

    let bad_rate = Composition::new(
        1.0,
        vec![CompositionItem::new("x", "a.mp4", 1.0).with_playback_rate(0.0)],
    );
    assert!(bad_rate.validate().is_err());

    let bad_duration = Composition::new(1.0, vec![CompositionItem::new("x", "a.mp4", -1.0)]);
    assert!(bad_duration.validate().is_err());

    assert!(Composition::new(0.0, Vec::new()).validate().is_err());
}

#[test]
fn malformed_json_is_a_serde_error() {
    let err = Composition::from_reader("{".as_bytes()).unwrap_err();
    assert!(matches!(err, ClipfeedError::Serde(_)));
}

#[test]
fn loop_position_splits_iterations() {
    let item = CompositionItem::new("x", "a.mp4", 2.0).with_looping(true);
    assert_eq!(
        item.loop_position(0.5),
        LoopPosition {
            loop_index: 0,
            within: 0.5
        }
    );
    let at_boundary = item.loop_position(2.0);
    assert_eq!(at_boundary.loop_index, 1);
    assert!(at_boundary.within.abs() < 1e-9);
    assert_eq!(item.loop_position(5.0).loop_index, 2);
    assert_eq!(item.loop_position(-3.0).loop_index, 0);
}

#[test]
fn non_looping_position_clamps() {
    let item = CompositionItem::new("x", "a.mp4", 2.0);
    let p = item.loop_position(7.0);
    assert_eq!(p.loop_index, 0);
    assert_eq!(p.within, 2.0);
}

#[test]
fn source_mapping_applies_start_and_rate() {
    let item = CompositionItem::new("x", "a.mp4", 3.0)
        .with_start_time(1.0)
        .with_playback_rate(2.0)
        .with_composition_start_time(10.0);
    assert_eq!(item.local_time(11.0), 1.0);
    assert_eq!(item.source_time_at(1.0), 3.0);
    assert_eq!(item.source_end(), 7.0);
    assert_eq!(item.local_from_source(0, 3.0), 1.0);
    assert_eq!(item.local_from_source(2, 1.0), 6.0);
    assert_eq!(item.local_from_source(0, 0.5), 0.0);
    assert!(item.is_active_at(10.0));
    assert!(!item.is_active_at(9.0));
    assert!(!item.is_active_at(13.0));
}
