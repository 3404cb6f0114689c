//! Analysis-side windowing: applies the tapered window to the grain's input
//! segment, shrinking the window when mute regions dominate.

use crate::core::fft::MIN_LOG2_TRANSFORM;
use crate::core::window::analysis_window;

/// Windowed input staging for the forward transform.
///
/// Holds one pre-computed analysis window per permitted transform length so
/// the processing path allocates nothing. The windowed data is planar with a
/// stride of one nominal transform length per channel.
pub struct AnalysisInput {
    log2_nominal: u32,
    channels: usize,
    /// Analysis windows indexed by `log2_length - MIN_LOG2_TRANSFORM`.
    windows: Vec<Vec<f32>>,
    /// Windowed input, `1 << log2_nominal` frames per channel.
    pub windowed: Vec<f32>,
}

impl AnalysisInput {
    pub fn new(log2_synthesis_hop: u32, channels: usize) -> Self {
        let log2_nominal = log2_synthesis_hop + 3;
        let windows = (MIN_LOG2_TRANSFORM..=log2_nominal)
            .map(|log2| analysis_window(1 << log2))
            .collect();
        Self {
            log2_nominal,
            channels,
            windows,
            windowed: vec![0.0; (1usize << log2_nominal) * channels],
        }
    }

    /// Stride between channels of [`Self::windowed`].
    #[inline]
    pub fn channel_stride(&self) -> usize {
        1 << self.log2_nominal
    }

    /// Windows the grain's input segment into [`Self::windowed`].
    ///
    /// The grain's frame covers one nominal transform length; frames outside
    /// `[mute_head, n - mute_tail)` are silent. `source` is planar with
    /// `source_stride` between channels and holds only the unmuted frames:
    /// its frame 0 corresponds to grain frame `mute_head`. When the unmuted
    /// region covers less than half the window, the window halves until it
    /// fits, and is re-centred on the unmuted region. Returns the effective
    /// log2 transform length and the frame offset of the window within the
    /// nominal frame.
    pub fn apply_window(
        &mut self,
        source: &[f32],
        source_stride: usize,
        mute_head: usize,
        mute_tail: usize,
    ) -> (u32, usize) {
        let nominal = 1usize << self.log2_nominal;
        let active_begin = mute_head.min(nominal);
        let active_end = nominal - mute_tail.min(nominal - active_begin);
        let active = active_end - active_begin;

        self.windowed.fill(0.0);
        if active == 0 {
            return (self.log2_nominal, 0);
        }

        let mut log2_length = self.log2_nominal;
        while log2_length > MIN_LOG2_TRANSFORM && active < (1usize << log2_length) / 2 {
            log2_length -= 1;
        }
        let length = 1usize << log2_length;

        // Centre the window on the unmuted region, clamped into the frame.
        let centre = (active_begin + active_end) / 2;
        let start = centre
            .saturating_sub(length / 2)
            .min(nominal - length);

        let window = &self.windows[(log2_length - MIN_LOG2_TRANSFORM) as usize];
        for c in 0..self.channels {
            let src = &source[c * source_stride..][..active];
            let dst = &mut self.windowed[c * nominal..][..length];
            for (j, (out, &w)) in dst.iter_mut().zip(window.iter()).enumerate() {
                let frame = start + j;
                *out = if frame >= active_begin && frame < active_end {
                    src[frame - active_begin] * w
                } else {
                    0.0
                };
            }
        }

        (log2_length, start)
    }
}
