//! # Fast Fourier Transform (FFT) Module
//!
//! Real-input forward and real-output inverse transforms over caller-supplied,
//! power-of-two sized buffers. The forward spectrum is stored at full length
//! (conjugate-symmetric half included) so the estimator can work on it bin by bin.
//!
//! ## Features
//! - High-performance FFT using RustFFT
//! - Plans cached per size, scratch buffers reused between calls
//! - Inverse normalized by `1/N` so that `inverse(forward(x)) == x`

use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::error::SizeMismatch;

/// Returns the smallest power of two that is greater than or equal to `n`.
///
/// `next_power_of_two(0)` is 1.
pub fn next_power_of_two(n: usize) -> usize {
    n.next_power_of_two()
}

fn check_power_of_two(len: usize) -> Result<(), SizeMismatch> {
    if len.is_power_of_two() {
        Ok(())
    } else {
        Err(SizeMismatch {
            expected: next_power_of_two(len),
            actual: len,
        })
    }
}

fn check_same_len(expected: usize, actual: usize) -> Result<(), SizeMismatch> {
    if expected == actual {
        Ok(())
    } else {
        Err(SizeMismatch { expected, actual })
    }
}

struct Plans {
    len: usize,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
}

/// Forward/inverse FFT pair for real signals.
///
/// The transform itself is stateless; the struct only keeps the plans for the
/// most recent size and working memory. It holds no `FftPlanner`, which is
/// not `Send`.
pub struct SpectralTransform {
    plans: Option<Plans>,
    work: Vec<Complex<f64>>,
    scratch: Vec<Complex<f64>>,
}

impl Default for SpectralTransform {
    fn default() -> Self {
        Self::new()
    }
}

impl SpectralTransform {
    pub fn new() -> Self {
        Self {
            plans: None,
            work: Vec::new(),
            scratch: Vec::new(),
        }
    }

    fn plans_for(&mut self, len: usize) -> (Arc<dyn Fft<f64>>, Arc<dyn Fft<f64>>) {
        if let Some(plans) = self.plans.as_ref().filter(|plans| plans.len == len) {
            return (Arc::clone(&plans.forward), Arc::clone(&plans.inverse));
        }

        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(len);
        let inverse = planner.plan_fft_inverse(len);
        let scratch_len = forward
            .get_inplace_scratch_len()
            .max(inverse.get_inplace_scratch_len());
        self.scratch.resize(scratch_len, Complex::default());
        self.plans = Some(Plans {
            len,
            forward: Arc::clone(&forward),
            inverse: Arc::clone(&inverse),
        });
        (forward, inverse)
    }

    /// Computes the full complex spectrum of a real signal.
    ///
    /// # Errors
    /// * `SizeMismatch` if `input.len()` is not a power of two or differs from `output.len()`
    pub fn forward(
        &mut self,
        input: &[f64],
        output: &mut [Complex<f64>],
    ) -> Result<(), SizeMismatch> {
        let len = input.len();
        check_power_of_two(len)?;
        check_same_len(len, output.len())?;

        for (bin, &sample) in output.iter_mut().zip(input) {
            *bin = Complex { re: sample, im: 0.0 };
        }

        let (fft, _) = self.plans_for(len);
        fft.process_with_scratch(output, &mut self.scratch);
        Ok(())
    }

    /// Computes the real part of the inverse transform, normalized by `1/N`.
    ///
    /// # Errors
    /// * `SizeMismatch` if `input.len()` is not a power of two or differs from `output.len()`
    pub fn inverse(
        &mut self,
        input: &[Complex<f64>],
        output: &mut [f64],
    ) -> Result<(), SizeMismatch> {
        let len = input.len();
        check_power_of_two(len)?;
        check_same_len(len, output.len())?;

        let (_, fft) = self.plans_for(len);
        self.work.clear();
        self.work.extend_from_slice(input);
        fft.process_with_scratch(&mut self.work, &mut self.scratch);

        let norm = 1.0 / len as f64;
        for (sample, bin) in output.iter_mut().zip(&self.work) {
            *sample = bin.re * norm;
        }
        Ok(())
    }
}
