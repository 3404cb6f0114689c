//! Per-grain state and the grain-specification arithmetic: which segment of
//! input a grain consumes, how far the analysis hops, and how the rounding
//! error is carried so consecutive grains stay aligned.

use crate::core::fft::{bin_count, COMPLEX_ZERO};
use crate::core::phase::Turns;
use crate::core::resample::{self, Internal, Operations};
use crate::core::types::{InputChunk, Request, SampleRates};
use crate::instrument::Instrumentation;
use crate::stretch::output::Segment;
use crate::stretch::partials::Partial;
use rustfft::num_complex::Complex;

/// Analysis-hop state of one grain.
#[derive(Debug, Clone, Copy, Default)]
pub struct Analysis {
    /// Accumulated difference between the rounded and ideal grain
    /// positions, in input frames. Stays within ±0.5 while the stretcher
    /// runs continuously.
    pub position_error: f64,
    /// Ideal analysis hop in (possibly resampled) input frames.
    pub hop_ideal: f64,
    /// Rounded analysis hop actually applied. Negative for reverse play.
    pub hop: i32,
    /// `hop_ideal` over the synthesis hop: the effective time-stretch speed
    /// after input resampling.
    pub speed: f64,
}

/// One slot of the grain pipeline.
pub struct Grain {
    /// Effective log2 transform length; reset to the nominal value by
    /// `specify` and possibly reduced by the analysis stage when mute
    /// regions dominate.
    pub log2_transform_length: u32,
    pub request: Request,
    /// Position delta to the previous grain, or the speed-implied hop.
    pub request_hop: f64,
    /// True when this grain continues the previous one (no reset, previous
    /// position finite).
    pub continuous: bool,
    /// ±1 when this grain plays at exactly unit speed in an unbroken run of
    /// same-signed unit-speed grains; phase propagation is bypassed.
    pub passthrough: i32,
    /// Bins below the anti-alias cutoff for this grain.
    pub valid_bin_count: usize,
    pub mute_head: usize,
    pub mute_tail: usize,
    pub resample_ops: Operations,
    pub input_chunk: InputChunk,
    pub analysis: Analysis,
    /// Frame offset of the (possibly shrunken) analysis window within the
    /// nominal transform frame.
    pub window_offset: usize,
    buffer_start_position: f64,

    /// Half spectrum, `bin_count(nominal)` bins per channel, planar.
    pub transformed: Vec<Complex<f32>>,
    /// Per-bin phase of the channel-folded spectrum, fixed-point turns.
    pub phase: Vec<Turns>,
    /// Per-bin energy of the channel-folded spectrum.
    pub energy: Vec<f32>,
    /// Per-bin synthesis phase rotation, fixed-point turns.
    pub rotation: Vec<Turns>,
    /// Per-bin measured deviation from the nominal analysis advance.
    pub delta: Vec<Turns>,
    pub partials: Vec<Partial>,
    /// Input segment after optional input-side resampling.
    pub input_resampled: Internal,
    /// Copy of the muted input chunk, kept only while the overlap check is
    /// active.
    pub input_copy: Vec<f32>,
    /// Synthesised, windowed, lap-accumulated output owned by this slot.
    pub segment: Segment,
}

impl Grain {
    pub fn new(log2_synthesis_hop: u32, channels: usize) -> Self {
        let log2_transform_length = log2_synthesis_hop + 3;
        let bins = bin_count(log2_transform_length);
        Self {
            log2_transform_length,
            request: Request::flush(),
            request_hop: f64::NAN,
            continuous: false,
            passthrough: 0,
            valid_bin_count: 0,
            mute_head: 0,
            mute_tail: 0,
            resample_ops: Operations::default(),
            input_chunk: InputChunk::default(),
            analysis: Analysis::default(),
            window_offset: 0,
            buffer_start_position: 0.0,
            transformed: vec![COMPLEX_ZERO; bins * channels],
            phase: vec![0; bins],
            energy: vec![0.0; bins],
            rotation: vec![0; bins],
            delta: vec![0; bins],
            partials: Vec::with_capacity(bins),
            input_resampled: Internal::new(1 << log2_transform_length, channels),
            input_copy: Vec::new(),
            segment: Segment::new(log2_synthesis_hop, channels),
        }
    }

    /// True if this grain produces audio (finite request position).
    #[inline]
    pub fn valid(&self) -> bool {
        self.request.position.is_finite()
    }

    /// True if this grain plays backwards.
    #[inline]
    pub fn reverse(&self) -> bool {
        self.analysis.hop < 0
    }

    /// Copies the request, derives the resample operations and hop
    /// arithmetic, and computes the input chunk the caller must supply.
    pub fn specify(
        &mut self,
        request: &Request,
        previous: &Grain,
        sample_rates: SampleRates,
        log2_synthesis_hop: u32,
        buffer_start_position: f64,
        instrumentation: &Instrumentation,
    ) -> InputChunk {
        self.request = *request;
        debug_assert!(!self.valid() || request.pitch > 0.0);

        let synthesis_hop = (1u32 << log2_synthesis_hop) as f64;
        let unit_hop = synthesis_hop
            * self
                .resample_ops
                .setup(sample_rates, request.pitch, request.resample_mode);

        self.request_hop = request.position - previous.request.position;

        if !request.reset
            && request.speed.is_finite()
            && self.request_hop.is_finite()
            && (request.speed * unit_hop - self.request_hop).abs() > 1.0
        {
            instrumentation.log(format_args!(
                "specify_grain: speed={} implies hop of {}/{} but position has advanced by {}/{} since previous grain",
                request.speed,
                request.speed * unit_hop,
                sample_rates.input,
                self.request_hop,
                sample_rates.input
            ));
        }

        if !self.request_hop.is_finite() || request.reset {
            self.request_hop = request.speed * unit_hop;
        }

        self.analysis.hop_ideal = self.request_hop * self.resample_ops.input.ratio;

        self.continuous = !request.reset && previous.request.position.is_finite();
        if self.continuous {
            // The rounded hop absorbs the carried error; whatever rounding
            // leaves over is carried to the next grain.
            self.analysis.position_error =
                previous.analysis.position_error - self.analysis.hop_ideal;
            self.analysis.hop = (-self.analysis.position_error).round() as i32;
            self.analysis.position_error += self.analysis.hop as f64;
        } else {
            self.analysis.hop = self.analysis.hop_ideal.round() as i32;
            self.analysis.position_error = request.position.round() - request.position;
        }

        self.analysis.speed = self.analysis.hop_ideal / synthesis_hop;

        self.passthrough = if self.analysis.speed.abs() == 1.0 {
            self.analysis.speed as i32
        } else {
            0
        };
        if self.continuous && self.passthrough != previous.passthrough {
            self.passthrough = 0;
        }

        self.log2_transform_length = log2_synthesis_hop + 3;
        self.input_resampled.frame_count = 1 << self.log2_transform_length;
        self.buffer_start_position = buffer_start_position;

        let mut half = (self.input_resampled.frame_count / 2) as i32;
        if self.resample_ops.input.ratio != 1.0 {
            half = (half as f64 / self.resample_ops.input.ratio).round() as i32 + 1;
        }
        self.input_chunk = InputChunk {
            begin: -half,
            end: half,
        };

        if !request.position.is_finite() {
            self.input_chunk = InputChunk::default();
            return self.input_chunk;
        }

        let offset = (request.position - buffer_start_position).round() as i32;
        self.input_chunk.begin += offset;
        self.input_chunk.end += offset;
        self.input_chunk
    }

    /// Captures a muted copy of the input chunk and verifies the caller
    /// contract: no NaN samples, and byte-identical audio wherever this
    /// chunk overlaps the previous grain's chunk. A NaN is fatal; an
    /// overlap mismatch is logged.
    pub fn overlap_check(
        &mut self,
        data: Option<&[f32]>,
        channel_stride: usize,
        channels: usize,
        previous: &Grain,
        instrumentation: &Instrumentation,
    ) {
        let frame_count = self.input_chunk.frame_count() as usize;
        let active = frame_count - self.mute_head - self.mute_tail;

        self.input_copy.clear();
        self.input_copy.resize(frame_count * channels, 0.0);
        if let Some(data) = data {
            for c in 0..channels {
                let src = &data[c * channel_stride..][..active];
                let dst = &mut self.input_copy[c * frame_count + self.mute_head..][..active];
                dst.copy_from_slice(src);
            }
        }

        if self.input_copy.iter().any(|x| x.is_nan()) {
            log::error!("NaN detected in input audio");
            panic!("NaN detected in input audio");
        }

        let overlap_start = self.input_chunk.begin.max(previous.input_chunk.begin);
        let overlap_end = self.input_chunk.end.min(previous.input_chunk.end);
        let overlap = overlap_end - overlap_start;
        if overlap <= 0 || previous.input_copy.is_empty() {
            return;
        }

        let previous_frames = previous.input_chunk.frame_count() as usize;
        let ours = (overlap_start - self.input_chunk.begin) as usize;
        let theirs = (overlap_start - previous.input_chunk.begin) as usize;
        let mut matches = true;
        for c in 0..channels {
            let a = &self.input_copy[c * frame_count + ours..][..overlap as usize];
            let b = &previous.input_copy[c * previous_frames + theirs..][..overlap as usize];
            if a != b {
                matches = false;
            }
        }
        if !matches {
            instrumentation.log(format_args!(
                "UNEXPECTED INPUT: the {} {} frames of this grain's input chunk differ from the {} {} frames of the previous grain's input chunk",
                if overlap_start == self.input_chunk.begin { "first" } else { "last" },
                overlap,
                if overlap_start == self.input_chunk.begin { "last" } else { "first" },
                overlap
            ));
        }
    }

    /// Runs the input-side resampler into [`Self::input_resampled`], seeded
    /// with the sub-frame offset that keeps the grain centre aligned after
    /// rounding.
    ///
    /// `source` follows the analyse-grain convention: its frame 0 is the
    /// first unmuted frame of the chunk, not chunk frame 0. The scatter
    /// origin is therefore advanced past the muted head so every sample
    /// lands at its true chunk position, and the mute counts collapse to
    /// an unmuted prefix of the shifted rows. Returns true when input
    /// resampling is active (the caller then reads the resampled buffer
    /// and drops its mute counts).
    pub fn resample_input(
        &mut self,
        source: &[f32],
        source_stride: usize,
        mute_head: usize,
        mute_tail: usize,
    ) -> bool {
        let Some(interpolation) = self.resample_ops.input.interpolation else {
            return false;
        };
        let ratio = self.resample_ops.input.ratio;
        let half = (self.input_resampled.frame_count / 2) as f64;
        let first_frame = (self.input_chunk.begin + mute_head as i32) as f64;
        let relative_first =
            first_frame - (self.request.position - self.buffer_start_position);
        self.input_resampled.offset =
            relative_first * ratio + half - self.analysis.position_error;

        let rows = self.input_chunk.frame_count() as usize;
        resample::resample_input(
            &mut self.input_resampled,
            source,
            source_stride,
            rows - mute_head,
            0..rows - mute_head - mute_tail,
            interpolation,
            ratio,
            ratio,
        );
        true
    }
}
