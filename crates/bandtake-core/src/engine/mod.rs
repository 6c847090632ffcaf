//! Mixing and playback engine
//!
//! - [`mixer`]: sums corrected takes into one stereo buffer
//! - [`build`]: turns a song's stems into stems, click and count-in buffers
//! - [`scheduler`]: plays those buffers in sync on an output device

pub mod build;
pub mod mixer;
pub mod scheduler;

pub use build::{
    build_mix, build_take_preview, longest_take_duration, BuildOptions, MixResult, StemInput, Volume,
    DEFAULT_SONG_SECONDS,
};
pub use mixer::{mix, MIX_CHANNELS};
pub use scheduler::{
    ActiveSource, PlaybackBuffers, PlaybackError, PlaybackPhase, PlaybackResult, PlaybackScheduler,
    PlaybackSession, PlaybackStatus, SourceRole, END_TOLERANCE_SECONDS,
};
