//! Stream-oriented wrapper over the granular API for forward playback.

pub mod processor;
