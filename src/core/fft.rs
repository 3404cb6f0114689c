//! Real forward/inverse transforms at power-of-two lengths.
//!
//! Thin wrapper over `rustfft` holding one plan per transform length so the
//! processing path never replans. Real input is carried in a complex scratch
//! buffer; the inverse rebuilds the negative-frequency half by conjugate
//! mirroring from the `n/2 + 1` stored bins.

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

/// Zero-valued complex number, used for buffer initialisation.
pub const COMPLEX_ZERO: Complex<f32> = Complex::new(0.0, 0.0);

/// Smallest transform the analysis stage may shrink to.
pub const MIN_LOG2_TRANSFORM: u32 = 6;

/// Number of meaningful spectrum bins of a real transform of length
/// `1 << log2_length`.
#[inline]
pub fn bin_count(log2_length: u32) -> usize {
    (1usize << log2_length) / 2 + 1
}

/// Pre-planned forward and inverse transforms for every length between
/// [`MIN_LOG2_TRANSFORM`] and the nominal transform length.
pub struct Transforms {
    min_log2: u32,
    forward: Vec<Arc<dyn Fft<f32>>>,
    inverse: Vec<Arc<dyn Fft<f32>>>,
    buffer: Vec<Complex<f32>>,
}

impl Transforms {
    /// Plans all transform lengths up to `1 << max_log2`.
    pub fn new(max_log2: u32) -> Self {
        let min_log2 = MIN_LOG2_TRANSFORM.min(max_log2);
        let mut planner = FftPlanner::new();
        let mut forward = Vec::new();
        let mut inverse = Vec::new();
        for log2 in min_log2..=max_log2 {
            forward.push(planner.plan_fft_forward(1 << log2));
            inverse.push(planner.plan_fft_inverse(1 << log2));
        }
        Self {
            min_log2,
            forward,
            inverse,
            buffer: vec![COMPLEX_ZERO; 1 << max_log2],
        }
    }

    /// Forward real transform of `time[..n]`, writing the first `n/2 + 1`
    /// bins into `spectrum`.
    pub fn forward(&mut self, log2_length: u32, time: &[f32], spectrum: &mut [Complex<f32>]) {
        let n = 1usize << log2_length;
        let bins = bin_count(log2_length);
        for (slot, &sample) in self.buffer[..n].iter_mut().zip(time[..n].iter()) {
            *slot = Complex::new(sample, 0.0);
        }
        let plan = &self.forward[(log2_length - self.min_log2) as usize];
        plan.process(&mut self.buffer[..n]);
        spectrum[..bins].copy_from_slice(&self.buffer[..bins]);
    }

    /// Inverse real transform of the half-spectrum `spectrum[..n/2 + 1]`
    /// into `time[..n]`, including the `1/n` normalisation.
    pub fn inverse(&mut self, log2_length: u32, spectrum: &[Complex<f32>], time: &mut [f32]) {
        let n = 1usize << log2_length;
        let bins = bin_count(log2_length);
        self.buffer[..bins].copy_from_slice(&spectrum[..bins]);
        // Mirror negative frequencies so the inverse comes out real.
        for bin in 1..bins - 1 {
            self.buffer[n - bin] = self.buffer[bin].conj();
        }
        let plan = &self.inverse[(log2_length - self.min_log2) as usize];
        plan.process(&mut self.buffer[..n]);
        let norm = 1.0 / n as f32;
        for (out, c) in time[..n].iter_mut().zip(self.buffer[..n].iter()) {
            *out = c.re * norm;
        }
    }
}
