//! Bandtake Core - click tracks, take alignment, mixing and synchronized playback

pub mod audio;
pub mod audio_file;
pub mod click;
pub mod config;
pub mod engine;
pub mod error;
pub mod music;
pub mod offset;
pub mod types;
pub mod waveform;

pub use error::{BandtakeError, Result};
pub use types::*;
