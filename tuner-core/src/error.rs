//! # Error Types
//!
//! Structural problems (wrong buffer sizes, bad configuration) are reported as
//! typed errors. Numeric edge cases inside an analysis are not errors; they
//! degrade the result to an "Unknown" note instead.

use thiserror::Error;

/// A caller-supplied buffer does not have the length the operation requires.
///
/// Also raised by the spectral transform when the length is not a power of two,
/// in which case `expected` is the next power of two.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("buffer size mismatch: expected {expected} elements, got {actual}")]
pub struct SizeMismatch {
    pub expected: usize,
    pub actual: usize,
}

/// Failure of a single `analyze()` pass.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("failed to retrieve contents of sample ring: {0}")]
    Retrieve(#[source] SizeMismatch),

    #[error("failed to calculate forward FFT: {0}")]
    Forward(#[source] SizeMismatch),

    #[error("failed to calculate inverse FFT: {0}")]
    Inverse(#[source] SizeMismatch),
}

/// Misconfiguration detected at construction time.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("capacity must be greater than zero")]
    ZeroCapacity,

    #[error("note table is empty")]
    EmptyNoteTable,

    #[error("invalid note name: {0:?}")]
    InvalidNoteName(String),

    #[error("lowest note {lowest} is above highest note {highest}")]
    InvertedRange { lowest: String, highest: String },

    #[error("note {name} has a non-positive or non-finite frequency ({frequency})")]
    InvalidFrequency { name: String, frequency: f64 },

    #[error("sample rate must be greater than zero")]
    ZeroSampleRate,

    #[error("could not access config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not parse config file: {0}")]
    Json(#[from] serde_json::Error),
}
