use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::*;

struct ScriptedReader {
    script: VecDeque<ClipfeedResult<Pull<VideoFrame>>>,
    closes: Arc<AtomicUsize>,
}

impl TrackReader<VideoFrame> for ScriptedReader {
    fn pull_next(&mut self) -> ClipfeedResult<Pull<VideoFrame>> {
        self.script.pop_front().unwrap_or(Ok(Pull::EndOfTrack))
    }

    fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

fn unit(t: f64) -> ClipfeedResult<Pull<VideoFrame>> {
    Ok(Pull::Unit(TimedUnit {
        source_time: t,
        duration: 0.1,
        payload: VideoFrame {
            width: 1,
            height: 1,
            rgba8: vec![0; 4],
        },
    }))
}

fn state(
    script: Vec<ClipfeedResult<Pull<VideoFrame>>>,
    start: f64,
    end: f64,
) -> (ReaderState<VideoFrame>, Arc<AtomicUsize>) {
    let closes = Arc::new(AtomicUsize::new(0));
    let reader = ScriptedReader {
        script: script.into(),
        closes: Arc::clone(&closes),
    };
    let window = ReadWindow {
        start,
        end,
        loop_index: 0,
    };
    (ReaderState::from_reader(Box::new(reader), window), closes)
}

fn drain(st: &mut ReaderState<VideoFrame>) -> Vec<f64> {
    let mut out = Vec::new();
    while let Ok(Some(u)) = st.next_unit() {
        out.push(u.source_time);
    }
    out
}

fn ten_units() -> Vec<ClipfeedResult<Pull<VideoFrame>>> {
    (0..10).map(|i| unit(f64::from(i) * 0.1)).collect()
}

#[test]
fn preroll_keeps_the_unit_covering_the_start() {
    let (mut st, _) = state(ten_units(), 0.25, 10.0);
    let got = drain(&mut st);
    assert!((got[0] - 0.2).abs() < 1e-9);
    assert!((got[1] - 0.3).abs() < 1e-9);
    assert_eq!(got.len(), 8);
    assert_eq!(st.discarded(), 2);
}

#[test]
fn preroll_drops_everything_before_an_exact_start() {
    let (mut st, _) = state(ten_units(), 0.2, 10.0);
    let got = drain(&mut st);
    assert!((got[0] - 0.2).abs() < 1e-9);
    assert_eq!(got.len(), 8);
}

#[test]
fn window_end_terminates_the_track() {
    let (mut st, _) = state(ten_units(), 0.0, 0.35);
    let got = drain(&mut st);
    assert_eq!(got.len(), 4);
    assert!(st.is_exhausted());
    assert!((st.cursor() - 0.3).abs() < 1e-9);
}

#[test]
fn skipped_and_out_of_order_units_are_dropped() {
    let script = vec![
        unit(0.0),
        Ok(Pull::Skipped("bad packet".to_string())),
        unit(0.1),
        unit(0.05),
        unit(0.1),
        unit(0.2),
    ];
    let (mut st, _) = state(script, 0.0, 10.0);
    let got = drain(&mut st);
    assert_eq!(got.len(), 3);
    assert_eq!(st.discarded(), 3);
}

#[test]
fn fatal_error_surfaces_once_then_ends() {
    let script = vec![unit(0.0), Err(ClipfeedError::decode_failed("codec died"))];
    let (mut st, _) = state(script, 0.0, 10.0);
    assert!(st.next_unit().unwrap().is_some());
    assert!(matches!(
        st.next_unit(),
        Err(ClipfeedError::DecodeFailed(_))
    ));
    assert!(st.next_unit().unwrap().is_none());
    assert!(st.is_exhausted());
}

#[test]
fn fatal_error_after_preroll_still_delivers_the_candidate() {
    let script = vec![unit(0.0), unit(0.1), Err(ClipfeedError::decode_failed("x"))];
    let (mut st, _) = state(script, 0.5, 10.0);
    let first = st.next_unit().unwrap().unwrap();
    assert!((first.source_time - 0.1).abs() < 1e-9);
    assert!(st.next_unit().is_err());
}

#[test]
fn start_past_the_last_unit_yields_the_last_unit() {
    let script = vec![unit(0.0), unit(0.1)];
    let (mut st, _) = state(script, 5.0, 10.0);
    let got = drain(&mut st);
    assert_eq!(got.len(), 1);
    assert!((got[0] - 0.1).abs() < 1e-9);
}

#[test]
fn close_is_idempotent_and_drop_does_not_close_twice() {
    let (mut st, closes) = state(ten_units(), 0.0, 10.0);
    st.close();
    st.close();
    assert!(st.next_unit().unwrap().is_none());
    drop(st);
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[test]
fn drop_closes_an_open_reader() {
    let (st, closes) = state(ten_units(), 0.0, 10.0);
    drop(st);
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}
