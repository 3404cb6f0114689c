//! Hop and transform-length arithmetic derived from the sample-rate pair.

use crate::core::resample::Operations;
use crate::core::types::{Request, SampleRates};
use crate::error::ConfigError;

/// Smallest permitted log2 synthesis hop after adjustment.
const MIN_LOG2_SYNTHESIS_HOP: u32 = 4;
/// Largest permitted log2 synthesis hop after adjustment.
const MAX_LOG2_SYNTHESIS_HOP: u32 = 12;
/// Nominal grain period as a fraction of a second (10 ms).
const GRAIN_RATE_HZ: f64 = 100.0;

/// Upper bound on the input-side resample ratio a stretcher tolerates, and
/// therefore on how much wider than the transform an input chunk can get.
/// Two octaves of upward pitch shift at equal sample rates.
pub const MAX_INPUT_RESAMPLE_RATIO: f64 = 4.0;

/// Upper bound on output lengthening by the output-side resampler (two
/// octaves of downward pitch shift).
const MAX_OUTPUT_RESAMPLE_FACTOR: usize = 4;

/// Maps the sample-rate pair and the log2 hop adjustment to the synthesis
/// hop, transform length, buffer bounds, and the request preroll/advance
/// helpers.
#[derive(Debug, Clone, Copy)]
pub struct Timing {
    pub sample_rates: SampleRates,
    pub log2_synthesis_hop: u32,
}

impl Timing {
    /// Chooses the synthesis hop nearest 10 ms at the output rate, shifted
    /// by `log2_synthesis_hop_adjust`.
    pub fn new(
        sample_rates: SampleRates,
        log2_synthesis_hop_adjust: i32,
    ) -> Result<Self, ConfigError> {
        if sample_rates.input == 0 || sample_rates.output == 0 {
            return Err(ConfigError::InvalidSampleRate(sample_rates));
        }
        if !(-1..=1).contains(&log2_synthesis_hop_adjust) {
            return Err(ConfigError::InvalidHopAdjust(log2_synthesis_hop_adjust));
        }
        let nominal = (sample_rates.output as f64 / GRAIN_RATE_HZ).log2().round() as i32;
        let log2_synthesis_hop = (nominal + log2_synthesis_hop_adjust)
            .clamp(MIN_LOG2_SYNTHESIS_HOP as i32, MAX_LOG2_SYNTHESIS_HOP as i32)
            as u32;
        Ok(Self {
            sample_rates,
            log2_synthesis_hop,
        })
    }

    /// Transform length is eight synthesis hops.
    #[inline]
    pub fn log2_transform_length(&self) -> u32 {
        self.log2_synthesis_hop + 3
    }

    /// Synthesis hop in output frames.
    #[inline]
    pub fn synthesis_hop(&self) -> usize {
        1 << self.log2_synthesis_hop
    }

    /// One synthesis hop expressed in input frames for this request. When
    /// the request routes resampling to the output side, each grain emits
    /// more (or fewer) than a hop of frames, and the position must advance
    /// correspondingly further (or less) to hold the requested speed.
    fn unit_hop(&self, request: &Request) -> f64 {
        let mut operations = Operations::default();
        let correction =
            operations.setup(self.sample_rates, request.pitch, request.resample_mode);
        self.synthesis_hop() as f64 * correction
    }

    /// Upper bound on the width of any input chunk a grain may request,
    /// for caller buffer sizing.
    pub fn max_input_frame_count(&self) -> usize {
        let half = 1usize << (self.log2_transform_length() - 1);
        2 * (((half as f64) * MAX_INPUT_RESAMPLE_RATIO).round() as usize + 1)
    }

    /// Upper bound on the frame count of any output chunk.
    pub fn max_output_frame_count(&self) -> usize {
        self.synthesis_hop() * MAX_OUTPUT_RESAMPLE_FACTOR + 2
    }

    /// Rewinds the request by the pipeline depth so that playback reaching
    /// the original position finds a primed pipeline, and marks the request
    /// discontinuous.
    pub fn preroll(&self, request: &mut Request) {
        let transform_length = 1usize << self.log2_transform_length();
        let grains = transform_length.div_ceil(2 * self.synthesis_hop());
        request.position -= grains as f64 * request.speed * self.unit_hop(request);
        request.reset = true;
    }

    /// Advances the request by one grain of playback at its speed and
    /// clears the reset flag. The granular loop calls this between grains
    /// when constant-speed playback is wanted.
    pub fn next(&self, request: &mut Request) {
        request.position += request.speed * self.unit_hop(request);
        request.reset = false;
    }
}
