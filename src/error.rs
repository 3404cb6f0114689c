//! Error types for the warpgrain crate.
//!
//! Only construction can fail recoverably. Processing-path misuse (wrong
//! call order, impossible resampler arithmetic) is a programming error and
//! is fatal by policy: logged, then the process dies.

use crate::core::types::SampleRates;
use thiserror::Error;

/// Errors raised while building a stretcher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Both sample rates must be positive.
    #[error("invalid sample rates: input {} Hz, output {} Hz", .0.input, .0.output)]
    InvalidSampleRate(SampleRates),

    /// At least one audio channel is required.
    #[error("invalid channel count: {0}")]
    InvalidChannelCount(usize),

    /// The log2 synthesis-hop adjustment must be -1, 0, or +1.
    #[error("invalid log2 synthesis hop adjustment: {0} (expected -1, 0 or +1)")]
    InvalidHopAdjust(i32),
}
