//! Input validation errors
//!
//! Everything here is reported synchronously to the caller and never
//! silently corrected. Device and decode failures have their own types in
//! [`crate::audio`] and [`crate::audio_file`].

use thiserror::Error;

/// Errors raised by buffer construction, mixing and tempo/meter validation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BandtakeError {
    /// Mixer was handed a different number of buffers and volumes
    #[error("Mix input mismatch: {buffers} buffers but {volumes} volumes")]
    MismatchedInputs { buffers: usize, volumes: usize },

    /// Mixer was handed no buffers at all
    #[error("No input buffers to mix")]
    NoInputs,

    /// Buffers that must share a sample rate do not
    #[error("Sample rate mismatch: expected {expected}Hz, found {found}Hz")]
    SampleRateMismatch { expected: u32, found: u32 },

    #[error("Invalid tempo: {0} BPM (must be above 0 and at most 300)")]
    InvalidTempo(f64),

    #[error("Invalid beats per bar: {0} (must be 1-32)")]
    InvalidBeatsPerBar(u32),

    #[error("Invalid note value: {0} (must be 1, 2, 4, 8, 16 or 32)")]
    InvalidDenominator(u32),

    /// Time signature string could not be parsed as `N/D`
    #[error("Invalid time signature: {0:?}")]
    InvalidTimeSignature(String),

    #[error("Invalid channel count: {0} (must be 1 or 2)")]
    InvalidChannelCount(usize),

    #[error("Invalid sample rate: {0}Hz")]
    InvalidSampleRate(u32),

    /// Planar channels of one buffer differ in length
    #[error("Channel lengths differ")]
    ChannelLengthMismatch,

    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    /// Offset slider range is empty, inverted or out of bounds
    #[error("Invalid offset range: min={min}s, max={max}s (need min < max within ±3600s)")]
    InvalidOffsetRange { min: f64, max: f64 },
}

/// Result type for validation-bearing operations
pub type Result<T> = std::result::Result<T, BandtakeError>;
