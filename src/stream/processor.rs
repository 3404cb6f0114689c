//! Push-style streaming over the granular API.
//!
//! The caller feeds forward-playback audio in segments of its own choosing
//! and asks for a (possibly fractional) number of output frames per call.
//! The processor keeps a planar input FIFO sized for the stretcher's worst
//! case, runs the grain cadence as often as needed, and dithers the
//! per-call output count to the floor or ceiling of the request so the
//! long-run rate is exact.

use crate::core::types::{InputChunk, Request, CHUNK_BEGIN, CHUNK_END};
use crate::stretch::stretcher::Stretcher;

/// An output chunk copied out of the stretcher so it can be consumed across
/// `process` calls.
struct StagedChunk {
    data: Vec<f32>,
    stride: usize,
    frame_count: usize,
    request: [Request; 2],
    synthesised: bool,
}

impl StagedChunk {
    fn new(stride: usize, channels: usize) -> Self {
        Self {
            data: vec![0.0; stride * channels],
            stride,
            frame_count: 0,
            request: [Request::flush(); 2],
            synthesised: false,
        }
    }

    /// True once the staged chunk carries playable audio.
    fn playable(&self) -> bool {
        self.synthesised && self.request[CHUNK_BEGIN].position.is_finite()
    }
}

/// Streaming wrapper for forward playback at positive speed.
pub struct StreamProcessor {
    stretcher: Stretcher,
    channel_count: usize,

    /// Planar input FIFO; `buffer[c * channel_stride + i]` holds input
    /// frame `begin + i` of channel `c`.
    buffer: Vec<f32>,
    channel_stride: usize,
    /// Absolute input-frame position of the first buffered frame.
    begin: i32,
    /// Absolute input-frame position past the last buffered frame.
    end: i32,
    /// Input chunk of the most recently specified grain.
    input_chunk: InputChunk,

    request: Request,
    staged: StagedChunk,
    consumed: usize,
    frames_needed: f64,
}

impl StreamProcessor {
    /// Wraps `stretcher` for streaming. `max_push_frame_count` bounds the
    /// input frame count of any single [`StreamProcessor::process`] call.
    pub fn new(stretcher: Stretcher, max_push_frame_count: usize) -> Self {
        let channel_count = stretcher.channel_count();
        let channel_stride = stretcher.max_input_frame_count() + max_push_frame_count;
        let staged = StagedChunk::new(stretcher.max_output_frame_count(), channel_count);
        Self {
            stretcher,
            channel_count,
            buffer: vec![0.0; channel_stride * channel_count],
            channel_stride,
            begin: 0,
            end: 0,
            input_chunk: InputChunk::default(),
            request: Request::flush(),
            staged,
            consumed: 0,
            frames_needed: 0.0,
        }
    }

    /// The wrapped stretcher.
    pub fn stretcher(&self) -> &Stretcher {
        &self.stretcher
    }

    /// Appends one segment of input to the FIFO, discarding or compacting
    /// frames the current grain chunk no longer needs. `None` appends
    /// silence.
    fn append(&mut self, input: Option<&[&[f32]]>, frame_count: usize) {
        let count = frame_count as i32;
        let mut discard = 0i32;

        if self.input_chunk.begin < self.end {
            if self.begin < self.input_chunk.begin {
                // Compact: drop frames before the chunk and slide the rest
                // to the front.
                let shift = (self.input_chunk.begin - self.begin) as usize;
                let held = (self.end - self.begin) as usize;
                for c in 0..self.channel_count {
                    let row = &mut self.buffer[c * self.channel_stride..][..self.channel_stride];
                    row.copy_within(shift..held, 0);
                }
                self.begin = self.input_chunk.begin;
            }
        } else {
            // The whole buffer lies before the chunk; drop it, and as much
            // of the incoming segment as is already stale.
            discard = (self.input_chunk.begin - self.begin).min(count);
            self.begin = self.end;
        }

        let offset = (self.end - self.begin) as usize;
        let keep = (count - discard) as usize;
        for c in 0..self.channel_count {
            let row = &mut self.buffer[c * self.channel_stride + offset..][..keep];
            match input {
                Some(channels) => {
                    row.copy_from_slice(&channels[c][discard as usize..frame_count])
                }
                None => row.fill(0.0),
            }
        }
        self.begin += discard;
        self.end += count;
        debug_assert!(self.end >= self.begin);
        debug_assert!((self.end - self.begin) as usize <= self.channel_stride);
    }

    /// Analyses the pending grain from the FIFO, muting whatever part of
    /// its chunk lies outside the buffered range.
    fn analyse_pending(&mut self) {
        let mute_head = self.begin - self.input_chunk.begin;
        let mute_tail = self.input_chunk.end - self.end;
        let offset = (-mute_head).max(0) as usize;
        self.stretcher.analyse_grain(
            Some(&self.buffer[offset..]),
            self.channel_stride,
            mute_head,
            mute_tail,
        );
    }

    /// Processes one segment of audio.
    ///
    /// Renders into `output`, one slice per channel, each long enough for
    /// `output_frame_count.ceil()` frames. `input` supplies
    /// `input_frame_count` frames per channel, or `None` for silence (used
    /// to drain the pipeline at end of stream). The number of frames
    /// rendered dithers between the floor and ceiling of
    /// `output_frame_count` so the requested rate is exact in the long run.
    /// Returns the number of frames rendered.
    pub fn process(
        &mut self,
        input: Option<&[&[f32]]>,
        output: &mut [&mut [f32]],
        input_frame_count: usize,
        output_frame_count: f64,
        pitch: f64,
    ) -> usize {
        self.append(input, input_frame_count);

        self.request.speed = input_frame_count as f64 / output_frame_count;
        self.request.pitch = pitch;
        self.frames_needed += output_frame_count;

        let target = self.frames_needed.round() as usize;
        let denominator = output_frame_count.round().max(1.0);

        let mut frame_counter = 0usize;
        let mut process_grain = false;
        while frame_counter != target {
            if process_grain {
                if self.request.position.is_finite() {
                    self.analyse_pending();
                    let staged_stride = self.staged.stride;
                    let chunk = self.stretcher.synthesise_grain();
                    let frames = chunk.frame_count();
                    for c in 0..self.channel_count {
                        self.staged.data[c * staged_stride..][..frames]
                            .copy_from_slice(chunk.channel(c));
                    }
                    self.staged.frame_count = frames;
                    self.staged.request = chunk.request;
                    self.staged.synthesised = true;
                    self.consumed = 0;
                }

                // Walk the grain centre towards the freshest buffered audio,
                // interpolating through the frames this call appended.
                let remaining = denominator - frame_counter as f64;
                let position = self.end as f64
                    - self.stretcher.max_input_frame_count() as f64 / 2.0
                    - input_frame_count as f64 * remaining / denominator;
                self.request.reset = !(position > self.request.position);
                self.request.position = position;
                self.input_chunk = self.stretcher.specify_grain(&self.request, 0.0);
            }

            if self.staged.playable() {
                let need = target - frame_counter;
                let available = self.staged.frame_count - self.consumed;
                let n = need.min(available);
                for c in 0..self.channel_count {
                    output[c][frame_counter..frame_counter + n].copy_from_slice(
                        &self.staged.data[c * self.staged.stride + self.consumed..][..n],
                    );
                }
                frame_counter += n;
                self.consumed += n;
            }

            process_grain = true;
        }

        self.frames_needed -= frame_counter as f64;
        frame_counter
    }

    /// Total input frames pushed so far.
    pub fn input_position(&self) -> i32 {
        self.end
    }

    /// Playback position of the most recently consumed output frame, in
    /// input-frame units.
    pub fn output_position(&self) -> f64 {
        let begin = self.staged.request[CHUNK_BEGIN].position;
        let end = self.staged.request[CHUNK_END].position;
        if self.staged.frame_count == 0 {
            return begin;
        }
        begin + self.consumed as f64 * (end - begin) / self.staged.frame_count as f64
    }

    /// Input frames buffered ahead of the playback position.
    pub fn latency(&self) -> f64 {
        self.input_position() as f64 - self.output_position()
    }
}
