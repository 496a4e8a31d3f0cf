//! # Pitch Estimation Module
//!
//! Estimates the fundamental frequency of the most recent capture window by
//! autocorrelation, then maps it onto the note table.
//!
//! ## Algorithm
//! 1. Copy the window into a buffer of `next_power_of_two(2n)` samples and
//!    zero-pad the rest, so the correlation does not wrap around
//! 2. Forward FFT, replace every bin by its squared magnitude (power spectrum)
//! 3. Inverse FFT, which yields the autocorrelation (Wiener–Khinchin)
//! 4. Search the maximum within the lags spanned by the note table
//! 5. Parabolic interpolation around the peak for sub-sample accuracy
//! 6. Cents against every note; the closest one wins
//!
//! Silence and other degenerate windows produce an "Unknown" result instead
//! of an error.

use parking_lot::{Mutex, RwLock};
use rustfft::num_complex::Complex;

use crate::config::TunerConfig;
use crate::error::{AnalysisError, ConfigError};
use crate::fft::{next_power_of_two, SpectralTransform};
use crate::notes::{cents_between, NoteTable};
use crate::ring_buffer::RingBuffer;
use crate::{AnalysisResult, NoteDeviation, SampleSink, UNKNOWN_NOTE};

/// Samples converted per step in `feed`, so conversion needs no heap buffer.
const FEED_CHUNK: usize = 256;

/// Working memory of one analysis. Fully overwritten on every pass.
struct Scratch {
    transform: SpectralTransform,
    correlation: Vec<f64>,
    spectrum: Vec<Complex<f64>>,
}

/// Autocorrelation pitch estimator over a fixed capture window.
pub struct PitchEstimator {
    notes: NoteTable,
    ring: RingBuffer<f64>,
    /// Held for writing across ring writes, so a window and its sample rate
    /// are always read together.
    sample_rate: RwLock<u32>,
    /// Serializes analyses.
    scratch: Mutex<Scratch>,
}

impl PitchEstimator {
    /// Creates an estimator keeping the last `capture_window` samples.
    ///
    /// # Errors
    /// * `ConfigError::ZeroCapacity` if `capture_window` is zero
    pub fn new(
        capture_window: usize,
        sample_rate: u32,
        notes: NoteTable,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            notes,
            ring: RingBuffer::new(capture_window)?,
            sample_rate: RwLock::new(sample_rate),
            scratch: Mutex::new(Scratch {
                transform: SpectralTransform::new(),
                correlation: Vec::new(),
                spectrum: Vec::new(),
            }),
        })
    }

    /// Creates an estimator from a validated configuration.
    pub fn from_config(config: &TunerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Self::new(config.capture_window, config.sample_rate, config.note_table()?)
    }

    pub fn notes(&self) -> &NoteTable {
        &self.notes
    }

    pub fn capture_window(&self) -> usize {
        self.ring.capacity()
    }

    pub fn sample_rate(&self) -> u32 {
        *self.sample_rate.read()
    }

    /// Appends samples to the capture window and records their sample rate.
    pub fn feed(&self, samples: &[f32], sample_rate: u32) {
        // Anything older than one window would be overwritten anyway.
        let skip = samples.len().saturating_sub(self.ring.capacity());
        let samples = &samples[skip..];

        let mut rate = self.sample_rate.write();
        let mut converted = [0.0f64; FEED_CHUNK];
        for chunk in samples.chunks(FEED_CHUNK) {
            for (dst, &src) in converted.iter_mut().zip(chunk) {
                *dst = f64::from(src);
            }
            self.ring.enqueue(&converted[..chunk.len()]);
        }
        *rate = sample_rate;
    }

    /// Estimates the pitch of the current capture window.
    ///
    /// # Errors
    /// * `AnalysisError` if one of the transform stages rejects its buffers
    pub fn analyze(&self) -> Result<AnalysisResult, AnalysisError> {
        let mut scratch = self.scratch.lock();
        let Scratch {
            transform,
            correlation,
            spectrum,
        } = &mut *scratch;

        let n = self.ring.capacity();
        let fft_size = next_power_of_two(2 * n);
        if correlation.len() != fft_size {
            correlation.resize(fft_size, 0.0);
        }
        if spectrum.len() != fft_size {
            spectrum.resize(fft_size, Complex::default());
        }

        let sample_rate = {
            let rate = self.sample_rate.read();
            self.ring
                .retrieve(&mut correlation[..n])
                .map_err(AnalysisError::Retrieve)?;
            *rate
        };
        correlation[n..].fill(0.0);

        transform
            .forward(correlation, spectrum)
            .map_err(AnalysisError::Forward)?;
        for bin in spectrum.iter_mut() {
            *bin = *bin * bin.conj();
        }
        transform
            .inverse(spectrum, correlation)
            .map_err(AnalysisError::Inverse)?;

        let Some(lags) = self.notes.lag_range(sample_rate, fft_size) else {
            return Ok(self.unknown(Vec::new()));
        };
        let low = *lags.start();
        let window = &correlation[lags];

        // No energy at lag zero means there is no signal to correlate.
        let silent = !(correlation[0] > 0.0);
        let peak = match find_maximum(window) {
            Some(offset) if !silent => low + offset,
            _ => return Ok(self.unknown(window.to_vec())),
        };

        let period = peak as f64 + parabolic_shift(correlation, peak);
        let estimated_frequency = f64::from(sample_rate) / period;
        Ok(self.describe(estimated_frequency, window.to_vec()))
    }

    /// Builds the result for a frequency estimate, falling back to "Unknown"
    /// when the estimate is not a usable frequency.
    fn describe(&self, estimated_frequency: f64, window: Vec<f64>) -> AnalysisResult {
        if !(estimated_frequency.is_finite() && estimated_frequency > 0.0) {
            return self.unknown(window);
        }

        let mut nearest: Option<(&str, f64)> = None;
        let deviations = self
            .notes
            .notes()
            .iter()
            .map(|note| {
                let cents = cents_between(estimated_frequency, note.frequency);
                if nearest.is_none_or(|(_, best)| cents.abs() < best.abs()) {
                    nearest = Some((note.name.as_str(), cents));
                }
                NoteDeviation {
                    note: note.clone(),
                    cents_from_estimate: cents.abs(),
                }
            })
            .collect();

        let (name, cents) = match nearest {
            Some((name, cents)) if cents.is_finite() => (name, cents),
            _ => return self.unknown(window),
        };

        AnalysisResult {
            estimated_frequency,
            nearest_note_name: name.to_string(),
            // Truncates toward zero and saturates.
            cents_offset: cents as i8,
            deviations,
            autocorrelation_window: window,
        }
    }

    /// Result for a window without a usable pitch. Every note is infinitely
    /// far from a missing estimate.
    fn unknown(&self, window: Vec<f64>) -> AnalysisResult {
        AnalysisResult {
            estimated_frequency: 0.0,
            nearest_note_name: UNKNOWN_NOTE.to_string(),
            cents_offset: 0,
            deviations: self
                .notes
                .notes()
                .iter()
                .map(|note| NoteDeviation {
                    note: note.clone(),
                    cents_from_estimate: f64::INFINITY,
                })
                .collect(),
            autocorrelation_window: window,
        }
    }
}

impl SampleSink for PitchEstimator {
    fn feed(&self, samples: &[f32], sample_rate: u32) {
        PitchEstimator::feed(self, samples, sample_rate);
    }
}

/// Index of the first maximum, ignoring NaN. `None` if nothing compares.
fn find_maximum(values: &[f64]) -> Option<usize> {
    let mut max_val = f64::NEG_INFINITY;
    let mut max_idx = None;
    for (idx, &value) in values.iter().enumerate() {
        if value > max_val {
            max_val = value;
            max_idx = Some(idx);
        }
    }
    max_idx
}

/// Parabolic interpolation of the peak position around `peak`.
///
/// Neighbours are clamped at the buffer edges. The shift is limited to half a
/// sample either way; a NaN shift (flat peak) is passed through and rejected
/// later as a non-finite frequency.
fn parabolic_shift(values: &[f64], peak: usize) -> f64 {
    let left = values[peak.saturating_sub(1)];
    let center = values[peak];
    let right = values[(peak + 1).min(values.len() - 1)];

    let shift = 0.5 * (right - left) / (2.0 * center - right - left);
    shift.clamp(-0.5, 0.5)
}
