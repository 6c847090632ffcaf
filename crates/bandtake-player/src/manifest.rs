//! Song manifest
//!
//! ```yaml
//! title: Night Drive
//! bpm: 96
//! time_signature: "4/4"
//! duration: { minutes: 3, seconds: 30 }
//! stems:
//!   - instrument: drums
//!     path: takes/drums-3.wav
//!   - instrument: bass
//!     path: takes/bass-1.flac
//!     offset_seconds: 0.12
//!     volume: 80
//!     muted: false
//! ```
//!
//! Relative stem paths are resolved against the manifest's directory.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bandtake_core::music::{SongDuration, TempoMeter, TimeSignature};
use bandtake_core::engine::Volume;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SongManifest {
    #[serde(default)]
    pub title: String,
    pub bpm: f64,
    #[serde(default)]
    pub time_signature: TimeSignature,
    /// Minimum song length; the longest take wins if longer
    #[serde(default)]
    pub duration: Option<SongDuration>,
    #[serde(default)]
    pub stems: Vec<StemEntry>,
}

/// One instrument's selected take
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StemEntry {
    pub instrument: String,
    pub path: PathBuf,
    #[serde(default)]
    pub offset_seconds: f64,
    #[serde(default)]
    pub volume: Volume,
    #[serde(default)]
    pub muted: bool,
}

impl SongManifest {
    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read song manifest: {:?}", path))?;
        serde_yaml::from_str(&contents).with_context(|| format!("Failed to parse song manifest: {:?}", path))
    }

    pub fn tempo(&self) -> Result<TempoMeter> {
        TempoMeter::with_time_signature(self.bpm, self.time_signature)
            .with_context(|| format!("Invalid tempo in {:?}", self.title))
    }

    /// Stem paths, relative ones joined onto `base_dir`
    pub fn stem_paths(&self, base_dir: &Path) -> Vec<PathBuf> {
        self.stems
            .iter()
            .map(|stem| {
                if stem.path.is_absolute() {
                    stem.path.clone()
                } else {
                    base_dir.join(&stem.path)
                }
            })
            .collect()
    }
}
