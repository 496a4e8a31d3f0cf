//! # Asynchronous Tracking Module
//!
//! Runs the estimator on a dedicated worker thread so the audio callback never
//! waits for an analysis.
//!
//! ## Hand-off
//! The callback and the worker meet at a single pre-allocated slot guarded by a
//! mutex, plus a zero-capacity channel. `feed` only succeeds when it gets the
//! slot without waiting *and* the worker is parked on the channel; otherwise the
//! block is dropped. Nothing queues up: the next analysis always sees the most
//! recent audio the worker was ready for.
//!
//! ## Publication
//! Every successful analysis replaces the latest result. Callers that only
//! care about note changes can run results through a [`NoteChangeFilter`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, select};
use log::{debug, warn};
use parking_lot::Mutex;
use thiserror::Error;

use crate::config::TunerConfig;
use crate::error::ConfigError;
use crate::estimator::PitchEstimator;
use crate::{AnalysisResult, SampleSink};

/// Errors raised while starting a tracker.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to spawn analysis worker: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Tuning knobs of the hand-off and the worker lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerOptions {
    /// Samples pre-allocated in the hand-off slot.
    pub block_capacity: usize,
    /// Upper bound on how long `shutdown` waits for the worker.
    pub shutdown_timeout: Duration,
}

impl Default for TrackerOptions {
    fn default() -> Self {
        Self::from(&TunerConfig::default())
    }
}

impl From<&TunerConfig> for TrackerOptions {
    fn from(config: &TunerConfig) -> Self {
        Self {
            block_capacity: config.block_capacity,
            shutdown_timeout: config.shutdown_timeout(),
        }
    }
}

/// The block most recently handed to the worker.
struct HandOff {
    samples: Vec<f32>,
    sample_rate: u32,
}

/// State shared between the tracker handle and its worker.
struct Shared {
    estimator: PitchEstimator,
    slot: Mutex<HandOff>,
    latest: Mutex<AnalysisResult>,
    completed: AtomicU64,
}

impl Shared {
    fn process_hand_off(&self) {
        {
            let slot = self.slot.lock();
            self.estimator.feed(&slot.samples, slot.sample_rate);
        }

        match self.estimator.analyze() {
            Ok(result) => {
                *self.latest.lock() = result;
                self.completed.fetch_add(1, Ordering::Release);
            }
            Err(e) => warn!("Analysis failed, keeping previous result: {e}"),
        }
    }
}

/// Non-blocking front end to a [`PitchEstimator`] running on its own thread.
pub struct AsyncPitchTracker {
    shared: Arc<Shared>,
    ready_tx: Sender<()>,
    cancel_tx: Sender<()>,
    exited_rx: Receiver<()>,
    worker: Mutex<Option<JoinHandle<()>>>,
    shutdown_timeout: Duration,
}

impl AsyncPitchTracker {
    /// Starts the worker thread. A placeholder result ("Unknown", 0 Hz) is
    /// published before this returns.
    pub fn new(estimator: PitchEstimator, options: TrackerOptions) -> Result<Self, TrackerError> {
        let shared = Arc::new(Shared {
            slot: Mutex::new(HandOff {
                samples: Vec::with_capacity(options.block_capacity),
                sample_rate: estimator.sample_rate(),
            }),
            estimator,
            latest: Mutex::new(AnalysisResult::placeholder()),
            completed: AtomicU64::new(0),
        });

        let (ready_tx, ready_rx) = crossbeam_channel::bounded(0);
        let (cancel_tx, cancel_rx) = crossbeam_channel::bounded(1);
        let (exited_tx, exited_rx) = crossbeam_channel::bounded(1);

        let worker_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("tuner-analysis".into())
            .spawn(move || run_worker(worker_shared, ready_rx, cancel_rx, exited_tx))
            .map_err(TrackerError::Spawn)?;

        Ok(Self {
            shared,
            ready_tx,
            cancel_tx,
            exited_rx,
            worker: Mutex::new(Some(handle)),
            shutdown_timeout: options.shutdown_timeout,
        })
    }

    /// Builds the estimator and the tracker from one configuration.
    pub fn from_config(config: &TunerConfig) -> Result<Self, TrackerError> {
        let estimator = PitchEstimator::from_config(config)?;
        Self::new(estimator, TrackerOptions::from(config))
    }

    /// Offers a block of samples to the worker without ever blocking.
    ///
    /// The block is dropped when the worker is still busy with the previous
    /// one. Blocks up to `block_capacity` samples are copied without allocating.
    pub fn feed(&self, samples: &[f32], sample_rate: u32) {
        let Some(mut slot) = self.shared.slot.try_lock() else {
            return;
        };
        if self.ready_tx.try_send(()).is_err() {
            return;
        }
        // The worker waits for the slot lock, so it reads the block only
        // after this copy is complete.
        slot.samples.clear();
        slot.samples.extend_from_slice(samples);
        slot.sample_rate = sample_rate;
    }

    /// The most recently published result.
    pub fn latest(&self) -> AnalysisResult {
        self.shared.latest.lock().clone()
    }

    /// Copies the block most recently handed to the worker into `out` and
    /// returns its sample rate.
    pub fn last_block(&self, out: &mut Vec<f32>) -> u32 {
        let slot = self.shared.slot.lock();
        out.clear();
        out.extend_from_slice(&slot.samples);
        slot.sample_rate
    }

    /// Number of analyses published since the tracker started.
    pub fn analyses_completed(&self) -> u64 {
        self.shared.completed.load(Ordering::Acquire)
    }

    /// Whether the worker has been started and not yet shut down.
    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }

    /// Stops the worker and waits for it to exit, at most for the configured
    /// shutdown timeout. An analysis in progress is allowed to finish. Calling
    /// this more than once is harmless.
    pub fn shutdown(&self) {
        let Some(handle) = self.worker.lock().take() else {
            return;
        };

        debug!("Shutting down analysis worker...");
        let _ = self.cancel_tx.try_send(());

        match self.exited_rx.recv_timeout(self.shutdown_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if handle.join().is_err() {
                    warn!("Analysis worker panicked");
                } else {
                    debug!("Analysis worker finished");
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "Analysis worker did not stop within {:?}, detaching it",
                    self.shutdown_timeout
                );
            }
        }
    }
}

impl SampleSink for AsyncPitchTracker {
    fn feed(&self, samples: &[f32], sample_rate: u32) {
        AsyncPitchTracker::feed(self, samples, sample_rate);
    }
}

impl Drop for AsyncPitchTracker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(
    shared: Arc<Shared>,
    ready_rx: Receiver<()>,
    cancel_rx: Receiver<()>,
    exited_tx: Sender<()>,
) {
    debug!("Analysis worker started");
    loop {
        select! {
            recv(ready_rx) -> msg => match msg {
                Ok(()) => shared.process_hand_off(),
                Err(_) => break,
            },
            recv(cancel_rx) -> _ => {
                debug!("Analysis worker received shutdown signal");
                break;
            },
        }
    }
    let _ = exited_tx.send(());
}

/// Caller-side debounce: passes a result only when its note name differs
/// from the last one passed.
#[derive(Debug, Clone, Default)]
pub struct NoteChangeFilter {
    last_note: Option<String>,
}

impl NoteChangeFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if `result` names a different note than the previous
    /// accepted result, and remembers it.
    pub fn accept(&mut self, result: &AnalysisResult) -> bool {
        if self.last_note.as_deref() == Some(result.nearest_note_name.as_str()) {
            return false;
        }
        self.last_note = Some(result.nearest_note_name.clone());
        true
    }

    /// Forgets the last note, so the next result always passes.
    pub fn reset(&mut self) {
        self.last_note = None;
    }
}
