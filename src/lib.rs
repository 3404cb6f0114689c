#![forbid(unsafe_code)]
//! Granular phase-vocoder audio speed and pitch changer.
//!
//! `warpgrain` changes the playback speed and pitch of digital audio
//! independently, in real time or offline. Audio is processed one grain at
//! a time: the caller asks which input segment the next grain needs, hands
//! over the samples, and receives a chunk of output, so the engine works
//! equally for file rendering, scrubbing, reverse play, and live streams.
//!
//! # Granular API
//!
//! ```
//! use warpgrain::{Request, SampleRates, Stretcher};
//!
//! let input: Vec<f32> = (0..88200)
//!     .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 44100.0).sin())
//!     .collect();
//!
//! let mut stretcher = Stretcher::new(SampleRates::same(44100), 1, 0).unwrap();
//! let mut request = Request {
//!     position: 0.0,
//!     speed: 0.5, // half speed, original pitch
//!     ..Request::default()
//! };
//! stretcher.preroll(&mut request);
//!
//! for _ in 0..8 {
//!     let chunk = stretcher.specify_grain(&request, 0.0);
//!     let head = (-chunk.begin).max(0);
//!     let tail = (chunk.end - input.len() as i32).max(0);
//!     let first = (chunk.begin + head) as usize;
//!     stretcher.analyse_grain(Some(&input[first..]), input.len(), head, tail);
//!     let output = stretcher.synthesise_grain();
//!     // append output.channel(0)[..output.frame_count()] to the result
//!     drop(output);
//!     stretcher.next(&mut request);
//! }
//! ```
//!
//! # Streaming
//!
//! For push-style forward playback, [`StreamProcessor`] manages the input
//! FIFO and grain cadence:
//!
//! ```
//! use warpgrain::{SampleRates, StreamProcessor, Stretcher};
//!
//! let stretcher = Stretcher::new(SampleRates::same(44100), 1, 0).unwrap();
//! let mut processor = StreamProcessor::new(stretcher, 1024);
//! // processor.process(...) per audio callback
//! ```

pub mod core;
pub mod error;
pub mod instrument;
pub mod stream;
pub mod stretch;

pub use crate::core::resample::{Interpolation, Operation, Operations};
pub use crate::core::types::{
    InputChunk, OutputChunk, Request, ResampleMode, Sample, SampleRates, CHUNK_BEGIN, CHUNK_END,
};
pub use crate::error::ConfigError;
pub use crate::stream::processor::StreamProcessor;
pub use crate::stretch::stretcher::Stretcher;

/// Name of this implementation flavour.
pub fn edition() -> &'static str {
    Stretcher::edition()
}

/// Release version string.
pub fn version() -> &'static str {
    Stretcher::version()
}
