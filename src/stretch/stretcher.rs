//! The stretcher façade: orchestrates specify → analyse → synthesise over
//! the grain pipeline and owns every processing buffer.

use crate::core::fft::{bin_count, Transforms, COMPLEX_ZERO};
use crate::core::phase;
use crate::core::resample::{self, Interpolation};
use crate::core::timing::Timing;
use crate::core::types::{InputChunk, OutputChunk, Request, SampleRates};
use crate::error::ConfigError;
use crate::instrument::{Instrumentation, Stage};
use crate::stretch::analysis::AnalysisInput;
use crate::stretch::output::{OutputStage, Segment};
use crate::stretch::partials;
use crate::stretch::ring::GrainRing;
use crate::stretch::synthesis;

/// Name of this implementation flavour.
const EDITION: &str = "basic";

/// Granular time-stretching and pitch-shifting engine.
///
/// The stretcher is driven one grain at a time: [`Stretcher::specify_grain`]
/// names the input segment the grain needs, [`Stretcher::analyse_grain`]
/// consumes the caller's samples, and [`Stretcher::synthesise_grain`]
/// returns a chunk of output. All buffers are allocated at construction;
/// the processing path allocates nothing.
///
/// A stretcher is single-threaded; run one instance per thread for
/// multi-stream use.
pub struct Stretcher {
    timing: Timing,
    channels: usize,
    transforms: Transforms,
    input: AnalysisInput,
    grains: GrainRing,
    output: OutputStage,
    instrumentation: Instrumentation,
}

impl Stretcher {
    /// Builds a stretcher for the given rate pair and channel count.
    ///
    /// `log2_synthesis_hop_adjust` shifts the grain rate by one octave:
    /// -1 doubles the granular frequency (lower latency, may help weak
    /// transients), +1 halves it (may benefit dense tonal material). Most
    /// callers should pass 0.
    pub fn new(
        sample_rates: SampleRates,
        channel_count: usize,
        log2_synthesis_hop_adjust: i32,
    ) -> Result<Self, ConfigError> {
        if channel_count == 0 {
            return Err(ConfigError::InvalidChannelCount(channel_count));
        }
        let timing = Timing::new(sample_rates, log2_synthesis_hop_adjust)?;
        let log2_hop = timing.log2_synthesis_hop;
        let max_output = timing.max_output_frame_count();
        Ok(Self {
            timing,
            channels: channel_count,
            transforms: Transforms::new(log2_hop + 3),
            input: AnalysisInput::new(log2_hop, channel_count),
            grains: GrainRing::new(log2_hop, channel_count),
            output: OutputStage::new(log2_hop, channel_count, max_output),
            instrumentation: Instrumentation::new(),
        })
    }

    /// Name of this implementation flavour.
    pub fn edition() -> &'static str {
        EDITION
    }

    /// Release version string.
    pub fn version() -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    /// Number of audio channels processed per grain.
    #[inline]
    pub fn channel_count(&self) -> usize {
        self.channels
    }

    /// The rate pair the stretcher was built for.
    #[inline]
    pub fn sample_rates(&self) -> SampleRates {
        self.timing.sample_rates
    }

    /// Largest number of frames [`Stretcher::specify_grain`] may ever
    /// request, for caller buffer sizing.
    #[inline]
    pub fn max_input_frame_count(&self) -> usize {
        self.timing.max_input_frame_count()
    }

    /// Largest frame count any output chunk can carry.
    #[inline]
    pub fn max_output_frame_count(&self) -> usize {
        self.timing.max_output_frame_count()
    }

    /// Toggles diagnostic logging and the input overlap check. Idempotent.
    pub fn enable_instrumentation(&mut self, enable: bool) {
        self.instrumentation.enable(enable);
    }

    /// Rewinds `request` so the pipeline is primed by the time playback
    /// reaches the original position, and marks it discontinuous.
    pub fn preroll(&self, request: &mut Request) {
        self.timing.preroll(request);
    }

    /// Advances `request` by one synthesis hop of playback at its speed.
    pub fn next(&self, request: &mut Request) {
        self.timing.next(request);
    }

    /// True when every grain in the pipeline is a flush grain.
    pub fn is_flushed(&self) -> bool {
        self.grains.flushed()
    }

    /// Rotates the pipeline and computes the input chunk the new grain
    /// needs. `buffer_start_position` is the input-frame position of the
    /// first sample the caller's buffer holds; chunk offsets are relative
    /// to it.
    pub fn specify_grain(&mut self, request: &Request, buffer_start_position: f64) -> InputChunk {
        self.instrumentation.check_sequence(Stage::Specify);
        self.grains.rotate();
        let (current, previous) = self.grains.pair_mut(0, 1);
        current.specify(
            request,
            previous,
            self.timing.sample_rates,
            self.timing.log2_synthesis_hop,
            buffer_start_position,
            &self.instrumentation,
        )
    }

    /// Analyses the grain set up by the last [`Stretcher::specify_grain`].
    ///
    /// `data` is planar: channel `c` starts at `data[c * channel_stride]`,
    /// and frame 0 is the first frame past the muted head of the chunk, so
    /// the slice holds `frame_count - mute_head - mute_tail` frames per
    /// channel. `None` mutes the whole grain. Mute counts are clamped to
    /// the chunk. The samples are read during this call only.
    pub fn analyse_grain(
        &mut self,
        data: Option<&[f32]>,
        channel_stride: usize,
        mute_frame_count_head: i32,
        mute_frame_count_tail: i32,
    ) {
        self.instrumentation.check_sequence(Stage::Analyse);
        let channels = self.channels;
        let nominal_bins = bin_count(self.timing.log2_synthesis_hop + 3);

        if self.instrumentation.enabled() {
            if self.instrumentation.take_banner() {
                log::debug!(
                    "stretcher: sample_rates=[{}, {}] channel_count={} synthesis_hop={}",
                    self.timing.sample_rates.input,
                    self.timing.sample_rates.output,
                    channels,
                    self.timing.synthesis_hop()
                );
            }
            let request = &self.grains[0].request;
            log::debug!(
                "analyse_grain: position={} speed={} pitch={} reset={} mute={}:{}",
                request.position,
                request.speed,
                request.pitch,
                request.reset,
                mute_frame_count_head,
                mute_frame_count_tail
            );
        }

        self.grains[0].valid_bin_count = 0;
        if !self.grains[0].valid() {
            return;
        }

        let frame_count = self.grains[0].input_chunk.frame_count().max(0) as usize;
        let (mute_head, mute_tail) = if data.is_some() {
            let head = (mute_frame_count_head.max(0) as usize).min(frame_count);
            let tail = (mute_frame_count_tail.max(0) as usize).min(frame_count - head);
            (head, tail)
        } else {
            (frame_count, 0)
        };

        let resampled = {
            let (grain, previous) = self.grains.pair_mut(0, 1);
            grain.mute_head = mute_head;
            grain.mute_tail = mute_tail;

            if self.instrumentation.checks_active() {
                grain.overlap_check(
                    data,
                    channel_stride,
                    channels,
                    previous,
                    &self.instrumentation,
                );
            }

            match data {
                Some(data) => grain.resample_input(data, channel_stride, mute_head, mute_tail),
                None => {
                    // A fully muted grain analyses silence whatever the
                    // resample setup; stage zeros through the resampled
                    // buffer.
                    grain.input_resampled.zero();
                    false
                }
            }
        };

        // Window the grain, reading either the caller's buffer or the
        // resampled staging buffer. Resampling has already absorbed the
        // mute ranges.
        let (log2_length, window_offset) = {
            let grain = &self.grains[0];
            if resampled || data.is_none() {
                let (source, stride) = grain.input_resampled.planar();
                let head = if data.is_none() {
                    1usize << (self.timing.log2_synthesis_hop + 3)
                } else {
                    0
                };
                self.input.apply_window(source, stride, head, 0)
            } else {
                self.input
                    .apply_window(data.unwrap_or(&[]), channel_stride, mute_head, mute_tail)
            }
        };

        let grain = &mut self.grains[0];
        grain.log2_transform_length = log2_length;
        grain.window_offset = window_offset;

        let input_stride = self.input.channel_stride();
        for c in 0..channels {
            self.transforms.forward(
                log2_length,
                &self.input.windowed[c * input_stride..],
                &mut grain.transformed[c * nominal_bins..],
            );
        }

        // Anti-alias cutoff for output-side pitch shifts: bins above
        // n / output.ratio would alias once the output is resampled.
        let n = nominal_bins - 1;
        let cut = (n as f64 / grain.resample_ops.output.ratio).ceil() as usize;
        let valid = (cut.min(n) + 1).min(bin_count(log2_length));
        grain.valid_bin_count = valid;
        for c in 0..channels {
            grain.transformed[c * nominal_bins + valid..(c + 1) * nominal_bins].fill(COMPLEX_ZERO);
        }

        // Fold channels and extract per-bin energy and fixed-point phase.
        for bin in 0..valid {
            let mut folded = COMPLEX_ZERO;
            for c in 0..channels {
                folded += grain.transformed[c * nominal_bins + bin];
            }
            grain.energy[bin] = folded.norm_sqr();
            grain.phase[bin] = phase::from_radians(folded.arg());
        }

        partials::enumerate(&mut grain.partials, valid, &grain.energy);

        let (grain, previous) = self.grains.pair_mut(0, 1);
        if grain.continuous {
            partials::suppress_transients(&mut grain.partials, &grain.energy, &previous.energy);
        }
    }

    /// Synthesises the grain analysed by the last
    /// [`Stretcher::analyse_grain`] and returns the next chunk of output.
    ///
    /// The chunk borrows the stretcher's buffers and stays valid until the
    /// next call; its request snapshots describe the output-to-input
    /// timestamp mapping. During pipeline fill and drain the snapshot
    /// positions may be non-finite, in which case the chunk carries no
    /// playable audio.
    pub fn synthesise_grain(&mut self) -> OutputChunk<'_> {
        self.instrumentation.check_sequence(Stage::Synthesise);

        let log2_hop = self.timing.log2_synthesis_hop;
        let hop = 1usize << log2_hop;
        let channels = self.channels;
        let nominal_bins = bin_count(log2_hop + 3);
        let nominal_length = 1usize << (log2_hop + 3);

        if self.grains[0].valid() {
            {
                let (grain, previous) = self.grains.pair_mut(0, 1);
                debug_assert!(
                    grain.passthrough == 0 || grain.analysis.speed == grain.passthrough as f64
                );
                synthesis::propagate(log2_hop, grain, previous);
                debug_assert!(
                    grain.passthrough == 0
                        || grain.rotation[..grain.valid_bin_count].iter().all(|&r| r == 0)
                );
            }

            let grain = &mut self.grains[0];
            let valid = grain.valid_bin_count;
            let reverse = grain.reverse();
            let log2_length = grain.log2_transform_length;

            // Rotate the spectrum into output phase; reverse playback
            // conjugates so the segment comes out time-mirrored.
            for bin in 0..valid {
                let rotation = phase::to_complex(grain.rotation[bin]);
                for c in 0..channels {
                    let index = c * nominal_bins + bin;
                    let x = grain.transformed[index];
                    let x = if reverse { x.conj() } else { x };
                    grain.transformed[index] = x * rotation;
                }
            }

            for c in 0..channels {
                self.transforms.inverse(
                    log2_length,
                    &grain.transformed[c * nominal_bins..],
                    &mut self.output.inverse[c * nominal_length..],
                );
            }

            // Overlap-add: each quarter of the synthesis-window support
            // lands in the hop segment of the grain slot it laps.
            let start = grain.window_offset;
            let length = 1usize << log2_length;
            for quarter in 0..4 {
                let slot = 3 - quarter;
                let lo = 2 * hop + quarter * hop;
                let hi = lo + hop;
                let begin = lo.max(start);
                let end = hi.min(start + length);
                if begin >= end {
                    continue;
                }
                for c in 0..channels {
                    let inverse = &self.output.inverse[c * nominal_length..];
                    let window = &self.output.synthesis_window;
                    let segment = self.grains[slot].segment.internal.channel_mut(c);
                    for frame in begin..end {
                        segment[frame - lo] +=
                            inverse[frame - start] * window[frame - 2 * hop];
                    }
                }
            }
        }

        // Complete the lapped margins of the two oldest segments before the
        // oldest leaves the pipeline.
        {
            let (following, released) = self.grains.pair_mut(2, 3);
            Segment::lap_padding(&mut released.segment, &mut following.segment);
        }

        let requests = [self.grains[2].request, self.grains[1].request];
        let ratio_begin = self.grains[2].resample_ops.output.ratio;
        let ratio_end = self.grains[1].resample_ops.output.ratio;
        let resampling = self.grains[2].resample_ops.output.enabled()
            || self.grains[1].resample_ops.output.enabled();

        if resampling {
            // Pitch change is realised continuously across the chunk by
            // ramping from the older grain's ratio to the newer one's.
            let stride = self.output.resampled_stride;
            let internal = &mut self.grains[3].segment.internal;
            internal.frame_count = hop;
            internal.offset = self.output.resample_offset;
            let frames = resample::resample_output(
                internal,
                &mut self.output.resampled,
                stride,
                stride,
                Interpolation::Bilinear,
                ratio_begin,
                ratio_end,
                true,
            );
            self.output.resample_offset = internal.offset;
            OutputChunk::new(&self.output.resampled, frames, stride, requests)
        } else {
            let (data, stride) = self.grains[3].segment.internal.planar();
            OutputChunk::new(data, hop, stride, requests)
        }
    }
}
