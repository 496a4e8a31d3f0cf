//! # Tuner - command line front end
//!
//! Captures the default input device, runs the pitch tracker and logs the
//! detected note.
//!
//! ## Architecture
//! - **Audio Thread**: CPAL callback handing blocks to the tracker, never blocking
//! - **Analysis Thread**: owned by `AsyncPitchTracker`
//! - **Main Thread**: polls the latest result on a timer until Enter is pressed
//!   or the configured run time elapses
//!
//! ## Usage
//! ```text
//! tuner-cli [config.json]
//! tuner-cli --print-config
//! ```

mod audio;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use cpal::traits::StreamTrait;
use crossbeam_channel::{Receiver, select};
use log::{debug, info, warn};
use tuner_core::{AnalysisResult, AsyncPitchTracker, NoteChangeFilter, TunerConfig};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match std::env::args().nth(1).as_deref() {
        Some("--print-config") => {
            println!("{}", serde_json::to_string_pretty(&TunerConfig::default())?);
            return Ok(());
        }
        Some(path) => TunerConfig::load(path)
            .with_context(|| format!("Failed to load config from {path}"))?,
        None => TunerConfig::default(),
    };

    info!(
        "Starting tuner: window {} samples, notes {}..{}, A4 = {} Hz",
        config.capture_window, config.lowest_note, config.highest_note, config.reference_pitch
    );

    let tracker = Arc::new(
        AsyncPitchTracker::from_config(&config).context("Failed to start pitch tracker")?,
    );
    let (stream, sample_rate) = audio::start_audio_capture(Arc::clone(&tracker), config.sample_rate)
        .context("Failed to start audio capture")?;
    if sample_rate != config.sample_rate {
        warn!(
            "Device runs at {sample_rate} Hz instead of the configured {} Hz",
            config.sample_rate
        );
    }

    info!("Listening. Press Enter to stop.");
    run_polling_loop(&tracker, &config);

    info!("Stopping stream and exiting...");
    if let Err(e) = stream.pause() {
        warn!("Error pausing stream: {e}");
    }
    drop(stream);
    tracker.shutdown();
    info!("Tuner finished");
    Ok(())
}

/// Polls the tracker until the user presses Enter or the run time elapses.
fn run_polling_loop(tracker: &AsyncPitchTracker, config: &TunerConfig) {
    let ticker = crossbeam_channel::tick(config.poll_interval());
    let deadline = match config.run_seconds {
        Some(secs) => crossbeam_channel::after(Duration::from_secs(secs)),
        None => crossbeam_channel::never(),
    };
    let mut quit = spawn_stdin_watcher();

    let mut filter = NoteChangeFilter::new();
    let mut seen = tracker.analyses_completed();

    loop {
        let mut stdin_closed = false;
        select! {
            recv(ticker) -> _ => poll(tracker, config, &mut filter, &mut seen),
            recv(quit) -> msg => match msg {
                Ok(()) => break,
                Err(_) => stdin_closed = true,
            },
            recv(deadline) -> _ => {
                info!("Run time elapsed");
                break;
            },
        }
        if stdin_closed {
            // Only the deadline can end the loop now.
            quit = crossbeam_channel::never();
        }
    }
}

/// Reports the latest result if a new analysis has been published since the
/// last poll.
fn poll(
    tracker: &AsyncPitchTracker,
    config: &TunerConfig,
    filter: &mut NoteChangeFilter,
    seen: &mut u64,
) {
    let completed = tracker.analyses_completed();
    if completed == *seen {
        return;
    }
    *seen = completed;

    let result = tracker.latest();
    if config.debounce_note_changes && !filter.accept(&result) {
        return;
    }
    report(&result);
}

fn report(result: &AnalysisResult) {
    if result.is_known() {
        info!(
            "{:<4} {:+4} cents  ({:.2} Hz)",
            result.nearest_note_name, result.cents_offset, result.estimated_frequency
        );
    } else {
        debug!("No pitch detected");
    }
}

/// Signals once a line has been read from stdin. The sender is dropped on
/// EOF or read errors.
fn spawn_stdin_watcher() -> Receiver<()> {
    let (tx, rx) = crossbeam_channel::bounded(1);
    thread::spawn(move || {
        let mut line = String::new();
        if let Ok(n) = std::io::stdin().read_line(&mut line) {
            if n > 0 {
                let _ = tx.send(());
            }
        }
    });
    rx
}
