//! Time-varying resampling between the grain pipeline's internal buffers and
//! caller-facing audio.
//!
//! Two directions exist: input-side resampling scatters external frames into
//! the internal buffer ahead of the transform, output-side resampling
//! gathers internal frames out to the caller after overlap-add. The ratio
//! may ramp linearly across a call, and the fractional read/write offset is
//! carried between calls so consecutive invocations stay phase-aligned.

use crate::core::types::{ResampleMode, SampleRates};

/// Frames of zero padding on both ends of an internal buffer, so
/// interpolation taps never address out of range.
pub const PADDING: usize = 32;

/// Absolute offset drift tolerated when the call is asked to consume the
/// internal buffer exactly.
const ALIGNED_DRIFT_TOLERANCE: f64 = 1e-2;

/// Interpolation kernel of a resampling pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    /// Round to the nearest internal frame.
    Nearest,
    /// Linear interpolation between the two straddling frames.
    Bilinear,
}

/// One direction of resampling: disabled, or an interpolation kernel with a
/// ratio of internal frames per external frame.
#[derive(Debug, Clone, Copy)]
pub struct Operation {
    pub interpolation: Option<Interpolation>,
    pub ratio: f64,
}

impl Default for Operation {
    fn default() -> Self {
        Self {
            interpolation: None,
            ratio: 1.0,
        }
    }
}

impl Operation {
    #[inline]
    pub fn enabled(&self) -> bool {
        self.interpolation.is_some()
    }
}

/// The input-side and output-side operations of one grain.
#[derive(Debug, Clone, Copy, Default)]
pub struct Operations {
    pub input: Operation,
    pub output: Operation,
}

impl Operations {
    /// Derives the resample ratio from the pitch and rate pair and
    /// distributes it between the input and output sides according to
    /// `mode`. Returns the residual speed correction
    /// `(input_rate / output_rate) / output.ratio` that the hop arithmetic
    /// must absorb.
    pub fn setup(&mut self, rates: SampleRates, pitch: f64, mode: ResampleMode) -> f64 {
        let resample_ratio = pitch * rates.ratio();
        self.input = Operation {
            interpolation: Some(Interpolation::Bilinear),
            ratio: 1.0 / resample_ratio,
        };
        self.output = Operation {
            interpolation: Some(Interpolation::Bilinear),
            ratio: resample_ratio,
        };

        // Force modes keep their side active even at ratio one; the auto
        // modes collapse to the identity there.
        if mode == ResampleMode::ForceOut {
            self.input.interpolation = None;
        } else if mode == ResampleMode::ForceIn {
            self.output.interpolation = None;
        } else if resample_ratio == 1.0 {
            self.input.interpolation = None;
            self.output.interpolation = None;
        } else if mode == ResampleMode::AutoIn {
            self.output.interpolation = None;
        } else if mode == ResampleMode::AutoOut {
            self.input.interpolation = None;
        } else if resample_ratio > 1.0 {
            self.output.interpolation = None;
        } else {
            self.input.interpolation = None;
        }

        if !self.input.enabled() {
            self.input.ratio = 1.0;
        }

        if self.output.enabled() {
            rates.ratio() / self.output.ratio
        } else {
            self.output.ratio = 1.0;
            rates.ratio()
        }
    }
}

/// Planar audio buffer flanked by zeroed margins, with a fractional offset
/// carried across resampling calls.
pub struct Internal {
    data: Vec<f32>,
    channel_stride: usize,
    channels: usize,
    max_frame_count: usize,
    /// Frames of the unpadded region that the next call consumes.
    pub frame_count: usize,
    /// Fractional frame offset into the unpadded region where the next call
    /// starts reading or writing.
    pub offset: f64,
}

impl Internal {
    pub fn new(max_frame_count: usize, channels: usize) -> Self {
        let channel_stride = PADDING + max_frame_count + PADDING;
        Self {
            data: vec![0.0; channel_stride * channels],
            channel_stride,
            channels,
            max_frame_count,
            frame_count: max_frame_count,
            offset: 0.0,
        }
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    #[inline]
    pub fn max_frame_count(&self) -> usize {
        self.max_frame_count
    }

    /// Zeroes the whole buffer, margins included.
    pub fn zero(&mut self) {
        self.data.fill(0.0);
    }

    /// One channel of the unpadded region.
    #[inline]
    pub fn channel(&self, channel: usize) -> &[f32] {
        &self.data[channel * self.channel_stride + PADDING..][..self.max_frame_count]
    }

    /// Mutable access to one channel of the unpadded region.
    #[inline]
    pub fn channel_mut(&mut self, channel: usize) -> &mut [f32] {
        &mut self.data[channel * self.channel_stride + PADDING..][..self.max_frame_count]
    }

    /// One full padded channel row, margins included.
    #[inline]
    pub fn row(&self, channel: usize) -> &[f32] {
        &self.data[channel * self.channel_stride..][..self.channel_stride]
    }

    /// Mutable access to one full padded channel row.
    #[inline]
    pub fn row_mut(&mut self, channel: usize) -> &mut [f32] {
        &mut self.data[channel * self.channel_stride..][..self.channel_stride]
    }

    /// The whole planar buffer starting at the first unpadded frame of
    /// channel zero, with its channel stride. Used to expose the buffer as
    /// an output chunk without copying.
    #[inline]
    pub fn planar(&self) -> (&[f32], usize) {
        (&self.data[PADDING..], self.channel_stride)
    }
}

/// External frame count that consumes the internal buffer at the mean of the
/// two ramp endpoint ratios.
#[inline]
fn ideal_frame_count(internal: &Internal, ratio_begin: f64, ratio_end: f64) -> usize {
    (2.0 * (internal.frame_count as f64 - internal.offset) / (ratio_begin + ratio_end)).round()
        as usize
}

/// Checks the post-call offset for drift and resets it if the resampler
/// landed badly. Drift beyond the tolerance means the caller's frame-count
/// arithmetic is broken.
fn check_landing(internal: &mut Internal, ratio_end: f64, align_end: bool) {
    internal.offset -= internal.frame_count as f64;
    let tolerance = if align_end {
        ALIGNED_DRIFT_TOLERANCE
    } else {
        f64::max(ALIGNED_DRIFT_TOLERANCE, 1.1 * ratio_end)
    };
    if internal.offset.abs() > tolerance {
        log::error!(
            "resample landed badly: offset {} exceeds tolerance {}",
            internal.offset,
            tolerance
        );
        debug_assert!(false, "resample landed badly");
        internal.offset = 0.0;
    }
}

/// Scatters external frames into the internal buffer, summing each frame
/// into the straddling internal positions scaled by the instantaneous ratio.
/// The ratio scaling acts as a prefilter gain so downsampling conserves
/// amplitude. Frames outside `unmuted` contribute silence.
///
/// `source` is planar with `source_stride` between channels and frame 0 at
/// external row 0. Returns the number of external frames consumed.
pub fn resample_input(
    internal: &mut Internal,
    source: &[f32],
    source_stride: usize,
    source_rows: usize,
    unmuted: std::ops::Range<usize>,
    interpolation: Interpolation,
    ratio_begin: f64,
    ratio_end: f64,
) -> usize {
    let ideal = ideal_frame_count(internal, ratio_begin, ratio_end);
    if ideal > source_rows {
        // A sub-frame alignment corner can ask for one frame more than the
        // chunk supplies; consume what exists and let the landing check
        // absorb the shortfall.
        log::warn!(
            "resample_input: ideal frame count {} exceeds supplied {}",
            ideal,
            source_rows
        );
    }
    let active = ideal.min(source_rows);
    internal.zero();
    if active == 0 {
        return 0;
    }

    let unmuted_begin = unmuted.start.min(active);
    let unmuted_end = unmuted.end.clamp(unmuted_begin, active);

    let ratio_gradient = (ratio_end - ratio_begin) / active as f64;
    let mut ratio = ratio_begin + 0.5 * ratio_gradient;
    let mut x = PADDING as f64 + internal.offset;
    let channels = internal.channels;
    let stride = internal.channel_stride;

    for row in 0..active {
        debug_assert!(x >= 0.0 && ratio > 0.0);
        if row >= unmuted_begin && row < unmuted_end {
            let gain = ratio as f32;
            match interpolation {
                Interpolation::Nearest => {
                    let index = (x + 0.5) as usize;
                    for c in 0..channels {
                        internal.data[c * stride + index] += source[c * source_stride + row] * gain;
                    }
                }
                Interpolation::Bilinear => {
                    let index = x as usize;
                    let fraction = (x - index as f64) as f32;
                    for c in 0..channels {
                        let sample = source[c * source_stride + row];
                        internal.data[c * stride + index] += sample * (1.0 - fraction) * gain;
                        internal.data[c * stride + index + 1] += sample * fraction * gain;
                    }
                }
            }
        }
        x += ratio;
        ratio += ratio_gradient;
    }

    internal.offset = x - PADDING as f64;
    check_landing(internal, ratio_end, false);
    active
}

/// Gathers internal frames out to `dest`, interpolating at positions that
/// advance by the (possibly ramping) ratio per output frame. With
/// `align_end` the end ratio is back-solved so the call consumes the
/// internal buffer exactly. Returns the number of frames written; zero if
/// `dest` cannot hold the ideal frame count.
#[allow(clippy::too_many_arguments)]
pub fn resample_output(
    internal: &mut Internal,
    dest: &mut [f32],
    dest_stride: usize,
    dest_capacity: usize,
    interpolation: Interpolation,
    ratio_begin: f64,
    mut ratio_end: f64,
    align_end: bool,
) -> usize {
    let ideal = ideal_frame_count(internal, ratio_begin, ratio_end);
    if ideal > dest_capacity {
        log::error!(
            "resample_output: need {} output frames but buffer holds {}",
            ideal,
            dest_capacity
        );
        debug_assert!(false, "resample_output: output buffer too small");
        return 0;
    }
    let active = ideal;
    if active == 0 {
        return 0;
    }

    if align_end {
        let mean_ratio = (internal.frame_count as f64 - internal.offset) / active as f64;
        ratio_end = 2.0 * mean_ratio - ratio_begin;
        debug_assert!(ratio_end > 0.0);
    }

    let ratio_gradient = (ratio_end - ratio_begin) / active as f64;
    let mut ratio = ratio_begin + 0.5 * ratio_gradient;
    let mut x = PADDING as f64 + internal.offset;
    let channels = internal.channels;
    let stride = internal.channel_stride;

    for row in 0..active {
        debug_assert!(x >= 0.0 && ratio > 0.0);
        match interpolation {
            Interpolation::Nearest => {
                let index = (x + 0.5) as usize;
                for c in 0..channels {
                    dest[c * dest_stride + row] = internal.data[c * stride + index];
                }
            }
            Interpolation::Bilinear => {
                let index = x as usize;
                let fraction = (x - index as f64) as f32;
                for c in 0..channels {
                    dest[c * dest_stride + row] = internal.data[c * stride + index]
                        * (1.0 - fraction)
                        + internal.data[c * stride + index + 1] * fraction;
                }
            }
        }
        x += ratio;
        ratio += ratio_gradient;
    }

    internal.offset = x - PADDING as f64;
    check_landing(internal, ratio_end, align_end);
    active
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_internal(frames: usize) -> Internal {
        let mut internal = Internal::new(frames, 1);
        for (i, slot) in internal.channel_mut(0).iter_mut().enumerate() {
            *slot = i as f32;
        }
        internal.frame_count = frames;
        internal
    }

    #[test]
    fn test_setup_auto_in_out_routing() {
        let rates = SampleRates::same(44100);
        let mut ops = Operations::default();

        // Pitch up: input side only.
        let correction = ops.setup(rates, 2.0, ResampleMode::AutoInOut);
        assert!(ops.input.enabled() && !ops.output.enabled());
        assert_eq!(ops.input.ratio, 0.5);
        assert_eq!(ops.output.ratio, 1.0);
        assert_eq!(correction, 1.0);

        // Pitch down: output side only.
        let correction = ops.setup(rates, 0.5, ResampleMode::AutoInOut);
        assert!(!ops.input.enabled() && ops.output.enabled());
        assert_eq!(ops.output.ratio, 0.5);
        assert_eq!(correction, 2.0);

        // Unity: identity.
        let correction = ops.setup(rates, 1.0, ResampleMode::AutoInOut);
        assert!(!ops.input.enabled() && !ops.output.enabled());
        assert_eq!(correction, 1.0);
    }

    #[test]
    fn test_setup_force_modes_resample_at_unity() {
        let rates = SampleRates::same(48000);
        let mut ops = Operations::default();
        ops.setup(rates, 1.0, ResampleMode::ForceIn);
        assert!(ops.input.enabled() && !ops.output.enabled());
        ops.setup(rates, 1.0, ResampleMode::ForceOut);
        assert!(!ops.input.enabled() && ops.output.enabled());
    }

    #[test]
    fn test_setup_rate_conversion_feeds_input_side() {
        // 44.1k in, 22.05k out at pitch 1 is a ratio-2 downsample on the
        // input side under AutoInOut.
        let rates = SampleRates {
            input: 44100,
            output: 22050,
        };
        let mut ops = Operations::default();
        let correction = ops.setup(rates, 1.0, ResampleMode::AutoInOut);
        assert!(ops.input.enabled());
        assert_eq!(ops.input.ratio, 0.5);
        assert_eq!(correction, 2.0);
    }

    #[test]
    fn test_output_gather_identity() {
        let mut internal = ramp_internal(64);
        let mut dest = vec![0.0f32; 64];
        let frames = resample_output(
            &mut internal,
            &mut dest,
            64,
            64,
            Interpolation::Bilinear,
            1.0,
            1.0,
            false,
        );
        assert_eq!(frames, 64);
        for (i, &x) in dest.iter().enumerate() {
            assert!((x - i as f32).abs() < 1e-5);
        }
        assert!(internal.offset.abs() < 1e-9);
    }

    #[test]
    fn test_output_gather_halves_at_ratio_two() {
        let mut internal = ramp_internal(64);
        let mut dest = vec![0.0f32; 64];
        let frames = resample_output(
            &mut internal,
            &mut dest,
            64,
            64,
            Interpolation::Bilinear,
            2.0,
            2.0,
            false,
        );
        assert_eq!(frames, 32);
        // Every second ramp value.
        assert!((dest[10] - 20.0).abs() < 1e-4);
    }

    #[test]
    fn test_output_offset_carries_across_calls() {
        let mut internal = ramp_internal(64);
        let mut dest = vec![0.0f32; 128];
        let first = resample_output(
            &mut internal,
            &mut dest,
            128,
            128,
            Interpolation::Bilinear,
            0.75,
            0.75,
            false,
        );
        let offset = internal.offset;
        assert!(offset.abs() <= 0.75 * 1.1);
        // Second call starts where the first landed.
        let second = resample_output(
            &mut internal,
            &mut dest,
            128,
            128,
            Interpolation::Bilinear,
            0.75,
            0.75,
            false,
        );
        let total = first + second;
        let expected = (2.0_f64 * 64.0 / 0.75).round() as usize;
        assert!(
            (total as i64 - expected as i64).abs() <= 1,
            "total {} expected {}",
            total,
            expected
        );
    }

    #[test]
    fn test_output_align_end_consumes_exactly() {
        let mut internal = ramp_internal(96);
        let mut dest = vec![0.0f32; 256];
        resample_output(
            &mut internal,
            &mut dest,
            256,
            256,
            Interpolation::Bilinear,
            0.8,
            0.9,
            true,
        );
        assert!(internal.offset.abs() <= ALIGNED_DRIFT_TOLERANCE);
    }

    #[test]
    fn test_input_scatter_identity() {
        let mut internal = Internal::new(64, 1);
        internal.frame_count = 64;
        let source: Vec<f32> = (0..64).map(|i| i as f32).collect();
        let consumed = resample_input(
            &mut internal,
            &source,
            64,
            64,
            0..64,
            Interpolation::Bilinear,
            1.0,
            1.0,
        );
        assert_eq!(consumed, 64);
        for (i, &x) in internal.channel(0).iter().enumerate() {
            assert!((x - i as f32).abs() < 1e-5, "frame {}: {}", i, x);
        }
    }

    #[test]
    fn test_input_scatter_gain_conserves_amplitude() {
        // Downsampling a DC signal by two: each internal frame accumulates
        // two external frames scaled by ratio 0.5, so DC level is preserved.
        let mut internal = Internal::new(32, 1);
        internal.frame_count = 32;
        let source = vec![1.0f32; 64];
        resample_input(
            &mut internal,
            &source,
            64,
            64,
            0..64,
            Interpolation::Bilinear,
            0.5,
            0.5,
        );
        let inner = internal.channel(0);
        for &x in &inner[2..30] {
            assert!((x - 1.0).abs() < 1e-4, "{}", x);
        }
    }

    #[test]
    fn test_input_scatter_respects_mute_range() {
        let mut internal = Internal::new(32, 1);
        internal.frame_count = 32;
        let source = vec![1.0f32; 32];
        resample_input(
            &mut internal,
            &source,
            32,
            32,
            8..24,
            Interpolation::Bilinear,
            1.0,
            1.0,
        );
        let inner = internal.channel(0);
        assert!(inner[..7].iter().all(|&x| x == 0.0));
        assert!(inner[30..].iter().all(|&x| x == 0.0));
        assert!((inner[16] - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_nearest_interpolation() {
        let mut internal = ramp_internal(16);
        let mut dest = vec![0.0f32; 16];
        resample_output(
            &mut internal,
            &mut dest,
            16,
            16,
            Interpolation::Nearest,
            1.0,
            1.0,
            false,
        );
        for (i, &x) in dest.iter().enumerate() {
            assert_eq!(x, i as f32);
        }
    }

    #[test]
    fn test_two_channel_strides() {
        let mut internal = Internal::new(16, 2);
        internal.frame_count = 16;
        for c in 0..2 {
            for (i, slot) in internal.channel_mut(c).iter_mut().enumerate() {
                *slot = (c * 100 + i) as f32;
            }
        }
        let mut dest = vec![0.0f32; 40];
        let frames = resample_output(
            &mut internal,
            &mut dest,
            20,
            16,
            Interpolation::Bilinear,
            1.0,
            1.0,
            false,
        );
        assert_eq!(frames, 16);
        assert_eq!(dest[3], 3.0);
        assert_eq!(dest[20 + 3], 103.0);
    }
}
