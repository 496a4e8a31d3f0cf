//! Tracker integration tests
//!
//! Drives `AsyncPitchTracker` the way an audio callback would: fixed-size
//! blocks pushed from the producing thread, results polled from another.
//!
//! Run with:
//! ```bash
//! cargo test -p tuner-core --test tracker_integration
//! ```

use std::time::{Duration, Instant};

use tuner_core::{
    AnalysisResult, AsyncPitchTracker, NoteChangeFilter, PitchEstimator, SampleSink,
    TrackerOptions, TunerConfig, UNKNOWN_NOTE,
};

const SAMPLE_RATE: u32 = 44100;
const BLOCK: usize = 1024;

/// Generate a test sine wave buffer.
fn generate_sine(frequency: f64, len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| {
            let t = i as f64 / SAMPLE_RATE as f64;
            (0.8 * (2.0 * std::f64::consts::PI * frequency * t).sin()) as f32
        })
        .collect()
}

fn test_tracker(capture_window: usize) -> AsyncPitchTracker {
    AsyncPitchTracker::from_config(&TunerConfig {
        capture_window,
        shutdown_timeout_ms: 5000,
        ..TunerConfig::default()
    })
    .expect("Failed to create test tracker")
}

/// Feeds the same block over and over until `done` accepts the latest
/// result or the deadline passes.
fn feed_until(
    tracker: &AsyncPitchTracker,
    block: &[f32],
    done: impl Fn(&AnalysisResult) -> bool,
) -> AnalysisResult {
    let deadline = Instant::now() + Duration::from_secs(20);
    loop {
        tracker.feed(block, SAMPLE_RATE);
        let latest = tracker.latest();
        if done(&latest) || Instant::now() > deadline {
            return latest;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn test_detects_a4_through_worker() {
    let tracker = test_tracker(8192);
    // One block covers the whole window, so every analysis sees a clean tone.
    let signal = generate_sine(440.0, 8192);

    let result = feed_until(&tracker, &signal, |r| r.nearest_note_name == "A4");
    assert_eq!(result.nearest_note_name, "A4");
    assert!(result.cents_offset.abs() < 5, "{}", result.cents_offset);
    assert!(tracker.analyses_completed() > 0);

    tracker.shutdown();
    assert!(!tracker.is_running());
}

#[test]
fn test_silence_through_worker_is_unknown() {
    let tracker = test_tracker(4096);
    let silence = vec![0.0f32; 4096];

    let result = feed_until(&tracker, &silence, |_| tracker.analyses_completed() > 0);
    assert!(tracker.analyses_completed() > 0);
    assert_eq!(result.nearest_note_name, UNKNOWN_NOTE);
    assert_eq!(result.cents_offset, 0);
}

#[test]
fn test_feed_never_waits_for_worker() {
    // A large window keeps the worker busy for a while on every hand-off.
    let tracker = test_tracker(96000);
    let block = generate_sine(440.0, 512);

    let start = Instant::now();
    let mut slowest = Duration::ZERO;
    for _ in 0..2000 {
        let t = Instant::now();
        tracker.feed(&block, SAMPLE_RATE);
        slowest = slowest.max(t.elapsed());
    }

    assert!(
        slowest < Duration::from_millis(50),
        "feed blocked for {slowest:?}"
    );
    assert!(start.elapsed() < Duration::from_secs(2));
    // Most of those blocks were dropped, not queued.
    assert!(tracker.analyses_completed() < 2000);
}

#[test]
fn test_latest_is_idempotent_between_publications() {
    let tracker = test_tracker(4096);
    assert_eq!(tracker.latest(), tracker.latest());

    let signal = generate_sine(440.0, 4096);
    feed_until(&tracker, &signal, |r| r.is_known());
    tracker.shutdown();

    // Nothing can publish after shutdown.
    let first = tracker.latest();
    let second = tracker.latest();
    assert_eq!(first, second);
}

#[test]
fn test_feed_after_shutdown_is_ignored() {
    let tracker = test_tracker(4096);
    tracker.shutdown();
    tracker.shutdown();

    let completed = tracker.analyses_completed();
    tracker.feed(&generate_sine(440.0, BLOCK), SAMPLE_RATE);
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(tracker.analyses_completed(), completed);
    assert_eq!(tracker.latest(), AnalysisResult::placeholder());
}

#[test]
fn test_shutdown_is_bounded() {
    let estimator = PitchEstimator::from_config(&TunerConfig::default()).unwrap();
    let tracker = AsyncPitchTracker::new(
        estimator,
        TrackerOptions {
            block_capacity: BLOCK,
            shutdown_timeout: Duration::from_millis(200),
        },
    )
    .unwrap();
    tracker.feed(&generate_sine(440.0, BLOCK), SAMPLE_RATE);

    let start = Instant::now();
    tracker.shutdown();
    // Either the analysis finished in time or the worker was detached.
    assert!(start.elapsed() < Duration::from_secs(5));
    assert!(!tracker.is_running());
}

#[test]
fn test_last_block_returns_handed_off_samples() {
    let tracker = test_tracker(4096);
    let mut out = Vec::new();
    assert_eq!(tracker.last_block(&mut out), SAMPLE_RATE);
    assert!(out.is_empty());

    let block = generate_sine(440.0, 256);
    let deadline = Instant::now() + Duration::from_secs(10);
    while tracker.analyses_completed() == 0 && Instant::now() < deadline {
        tracker.feed(&block, 48000);
        std::thread::sleep(Duration::from_millis(1));
    }

    assert_eq!(tracker.last_block(&mut out), 48000);
    assert_eq!(out, block);
}

#[test]
fn test_tracker_as_sample_sink() {
    fn pump(sink: &dyn SampleSink, signal: &[f32]) {
        for block in signal.chunks(BLOCK) {
            sink.feed(block, SAMPLE_RATE);
        }
    }

    let estimator = PitchEstimator::from_config(&TunerConfig {
        capture_window: 8192,
        ..TunerConfig::default()
    })
    .unwrap();
    pump(&estimator, &generate_sine(440.0, 8192));
    assert_eq!(estimator.analyze().unwrap().nearest_note_name, "A4");

    let tracker = test_tracker(4096);
    pump(&tracker, &generate_sine(440.0, 8192));
    tracker.shutdown();
}

#[test]
fn test_note_change_filter_on_live_results() {
    let tracker = test_tracker(8192);
    let signal = generate_sine(440.0, 8192);
    let mut filter = NoteChangeFilter::new();

    let result = feed_until(&tracker, &signal, |r| r.nearest_note_name == "A4");
    assert!(filter.accept(&result));
    let again = feed_until(&tracker, &signal, |_| true);
    if again.nearest_note_name == result.nearest_note_name {
        assert!(!filter.accept(&again));
    }
}
