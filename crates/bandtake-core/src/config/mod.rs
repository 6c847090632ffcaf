//! Application configuration
//!
//! Stored as YAML, by default at `~/.config/bandtake/config.yaml`:
//!
//! ```yaml
//! audio:
//!   device: null
//!   buffer_size: Default
//!   sample_rate: 48000
//! playback:
//!   click_enabled: true
//!   count_in_enabled: false
//! waveform:
//!   width: 800
//!   gridlines: true
//! ```
//!
//! Missing sections and fields take their defaults.

mod io;
mod paths;

use serde::{Deserialize, Serialize};

use crate::audio::AudioConfig;
use crate::waveform::DEFAULT_WIDTH;

pub use io::{load_config, save_config};
pub use paths::{default_config_dir, default_config_path, CONFIG_FILE_NAME};

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Output device, buffer size and sample rate
    pub audio: AudioConfig,
    pub playback: PlaybackConfig,
    pub waveform: WaveformConfig,
}

/// Playback toggles remembered between sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Render the click track with the mix
    pub click_enabled: bool,
    /// Play one bar of count-in before starting from the top
    pub count_in_enabled: bool,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            click_enabled: true,
            count_in_enabled: false,
        }
    }
}

/// Waveform display settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaveformConfig {
    /// Canvas width in pixel columns
    pub width: usize,
    /// Overlay bar gridlines
    pub gridlines: bool,
}

impl Default for WaveformConfig {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            gridlines: true,
        }
    }
}
