//! Output-side staging: per-grain lap segments, the lap-padding step that
//! completes segment margins before release, and the buffers behind the
//! emitted output chunk.

use crate::core::resample::{Internal, PADDING};
use crate::core::window::synthesis_window;

/// One grain's share of the output stream: a padded buffer of one synthesis
/// hop into which the four lapping grains accumulate their windowed
/// contributions. The padding margins double as the output resampler's
/// interpolation guard.
pub struct Segment {
    pub internal: Internal,
    hop: usize,
}

impl Segment {
    pub fn new(log2_synthesis_hop: u32, channels: usize) -> Self {
        let hop = 1usize << log2_synthesis_hop;
        let mut internal = Internal::new(hop, channels);
        internal.frame_count = hop;
        Self { internal, hop }
    }

    /// Frames of finished audio this segment emits.
    #[inline]
    pub fn hop(&self) -> usize {
        self.hop
    }

    /// Clears the accumulation region and margins for reuse by a new grain.
    pub fn zero(&mut self) {
        self.internal.zero();
        self.internal.frame_count = self.hop;
    }

    /// Completes the lapped margins of the two oldest segments before the
    /// older one is released: the released segment's tail margin receives
    /// the start of the following segment, and the following segment's head
    /// margin receives the end of the released one. Interpolation taps at
    /// the chunk boundary then read continuous audio.
    pub fn lap_padding(released: &mut Segment, following: &mut Segment) {
        let hop = released.hop;
        let lap = PADDING.min(hop);
        let channels = released.internal.channels();
        for c in 0..channels {
            released.internal.row_mut(c)[PADDING + hop..PADDING + hop + lap]
                .copy_from_slice(&following.internal.channel(c)[..lap]);
            following.internal.row_mut(c)[PADDING - lap..PADDING]
                .copy_from_slice(&released.internal.channel(c)[hop - lap..hop]);
        }
    }
}

/// Fixed buffers behind `synthesise_grain`: the inverse-transform scratch,
/// the synthesis window, the resampled output staging buffer, and the
/// fractional offset the output resampler carries between grains.
pub struct OutputStage {
    /// Inverse transform output, one nominal transform length per channel.
    pub inverse: Vec<f32>,
    /// Synthesis window over the central half of the transform frame.
    pub synthesis_window: Vec<f32>,
    /// Staging buffer for output-side resampling, planar.
    pub resampled: Vec<f32>,
    /// Stride between channels of [`Self::resampled`].
    pub resampled_stride: usize,
    /// Fractional read offset carried across grains so consecutive output
    /// chunks stay phase-aligned through ratio changes.
    pub resample_offset: f64,
}

impl OutputStage {
    pub fn new(log2_synthesis_hop: u32, channels: usize, max_output_frame_count: usize) -> Self {
        let transform = 1usize << (log2_synthesis_hop + 3);
        Self {
            inverse: vec![0.0; transform * channels],
            synthesis_window: synthesis_window(log2_synthesis_hop),
            resampled: vec![0.0; max_output_frame_count * channels],
            resampled_stride: max_output_frame_count,
            resample_offset: 0.0,
        }
    }
}
