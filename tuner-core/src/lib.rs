// tuner-core/src/lib.rs

//! The core logic for the chromatic tuner.
//! This crate is responsible for buffering the input stream, estimating the
//! fundamental frequency by autocorrelation and mapping it to the nearest
//! equal-tempered note. It is completely headless and performs no audio I/O.

pub mod config;
pub mod error;
pub mod estimator;
pub mod fft;
pub mod notes;
pub mod ring_buffer;
pub mod tracker;

use serde::Serialize;

pub use config::TunerConfig;
pub use error::{AnalysisError, ConfigError, SizeMismatch};
pub use estimator::PitchEstimator;
pub use notes::{Note, NoteTable};
pub use ring_buffer::RingBuffer;
pub use tracker::{AsyncPitchTracker, NoteChangeFilter, TrackerError, TrackerOptions};

/// Note name reported when no pitch could be estimated.
pub const UNKNOWN_NOTE: &str = "Unknown";

/// Distance between the estimate and one note of the table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NoteDeviation {
    pub note: Note,
    /// Absolute distance in cents.
    pub cents_from_estimate: f64,
}

/// Represents the result of a single analysis pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    /// Estimated fundamental frequency in Hz, 0 when unknown.
    pub estimated_frequency: f64,
    /// The name of the nearest note, or [`UNKNOWN_NOTE`].
    pub nearest_note_name: String,
    /// Signed deviation from the nearest note in cents, truncated.
    pub cents_offset: i8,
    /// One entry per note of the table, in table order.
    pub deviations: Vec<NoteDeviation>,
    /// The autocorrelation values searched for the pitch period.
    pub autocorrelation_window: Vec<f64>,
}

impl AnalysisResult {
    /// Result published before any analysis has completed.
    pub fn placeholder() -> Self {
        Self {
            estimated_frequency: 0.0,
            nearest_note_name: UNKNOWN_NOTE.to_string(),
            cents_offset: 0,
            deviations: Vec::new(),
            autocorrelation_window: Vec::new(),
        }
    }

    pub fn is_known(&self) -> bool {
        self.nearest_note_name != UNKNOWN_NOTE
    }
}

impl Default for AnalysisResult {
    fn default() -> Self {
        Self::placeholder()
    }
}

/// Anything that accepts blocks of mono samples from an audio callback.
pub trait SampleSink: Send + Sync {
    fn feed(&self, samples: &[f32], sample_rate: u32);
}
