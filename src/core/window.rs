//! Analysis and synthesis windows for the granular transform.
//!
//! The analysis window is a periodic raised cosine over the full transform
//! length. The synthesis window covers only the central half of the
//! transform frame and is shaped so that the product of the two windows,
//! overlapped at the synthesis hop, sums to exactly one. Unit-speed
//! passthrough therefore reconstructs the input bit-for-bit up to f32
//! rounding.

use std::f64::consts::PI;

/// Gain folded into the synthesis window so the four-fold overlap of the
/// window product sums to unity.
const LAP_GAIN: f64 = 0.5;

/// Periodic raised-cosine (Hann) window of the given length.
///
/// The periodic form (denominator `n`, not `n - 1`) is required for the
/// overlap-add identity to hold exactly at hop-aligned offsets.
pub fn analysis_window(length: usize) -> Vec<f32> {
    let n = length as f64;
    (0..length)
        .map(|i| (0.5 - 0.5 * (2.0 * PI * i as f64 / n).cos()) as f32)
        .collect()
}

/// Synthesis window over the central half of the transform frame.
///
/// For synthesis hop `h` the transform frame is `8h` samples and the window
/// spans frame offsets `[2h, 6h)`. Its value is a raised cosine over `4h`
/// divided by the analysis window section it overlays, so that the product
/// `analysis * synthesis` is itself a raised cosine of length `4h`, which
/// sums to a constant across the four grains lapping any output sample.
pub fn synthesis_window(log2_synthesis_hop: u32) -> Vec<f32> {
    let hop = 1usize << log2_synthesis_hop;
    let support = 4 * hop;
    let transform = 8 * hop;
    (0..support)
        .map(|m| {
            let lobe = 0.5 - 0.5 * (2.0 * PI * m as f64 / support as f64).cos();
            let analysis =
                0.5 - 0.5 * (2.0 * PI * (m + 2 * hop) as f64 / transform as f64).cos();
            (LAP_GAIN * lobe / analysis) as f32
        })
        .collect()
}

/// Multiplies `data` by `window` element-wise, in place.
#[inline]
pub fn apply_window(data: &mut [f32], window: &[f32]) {
    for (sample, &w) in data.iter_mut().zip(window.iter()) {
        *sample *= w;
    }
}
