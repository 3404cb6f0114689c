//! The granular phase-vocoder engine: grains, the four-slot pipeline,
//! partial tracking, analysis/synthesis stages, and the stretcher façade.

pub mod analysis;
pub mod grain;
pub mod output;
pub mod partials;
pub mod ring;
pub mod stretcher;
pub mod synthesis;
