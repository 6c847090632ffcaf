//! Mix building
//!
//! Turns a song's stems into the three buffers the scheduler plays:
//!
//! ```text
//! takes ──offset──► corrected ──mix(volumes)──► stems ─┐
//! tempo ──synth──────────────────────────────► click ──┼──► PlaybackBuffers
//! tempo ──synth──────────────────────────────► count-in┘
//! ```
//!
//! The click track stays a separate buffer so it can be muted live without
//! re-mixing.

use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::mixer::{mix, MIX_CHANNELS};
use crate::click::ClickSynth;
use crate::error::Result;
use crate::music::{SongDuration, TempoMeter};
use crate::offset::Take;
use crate::types::SampleBuffer;

/// Song length used when there is nothing to measure (seconds)
pub const DEFAULT_SONG_SECONDS: f64 = 30.0;

/// Instrument volume in integer UI units (0-100)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub struct Volume(u8);

impl Volume {
    pub const MAX: u8 = 100;

    /// Clamp to 0-100
    pub fn new(units: u32) -> Self {
        Self(units.min(Self::MAX as u32) as u8)
    }

    #[inline]
    pub fn units(&self) -> u8 {
        self.0
    }

    /// Linear gain 0.0-1.0
    #[inline]
    pub fn gain(&self) -> f32 {
        self.0 as f32 / Self::MAX as f32
    }
}

impl Default for Volume {
    fn default() -> Self {
        Self(Self::MAX)
    }
}

impl From<u32> for Volume {
    fn from(units: u32) -> Self {
        Self::new(units)
    }
}

impl From<Volume> for u32 {
    fn from(volume: Volume) -> Self {
        volume.0 as u32
    }
}

/// One instrument's contribution to the mix
#[derive(Debug, Clone)]
pub struct StemInput {
    pub name: String,
    /// Selected take, if the instrument has one
    pub take: Option<Take>,
    pub volume: Volume,
    pub muted: bool,
}

impl StemInput {
    pub fn new(name: impl Into<String>, take: Option<Take>) -> Self {
        Self {
            name: name.into(),
            take,
            volume: Volume::default(),
            muted: false,
        }
    }

    /// Has a take and is neither muted nor at zero volume
    pub fn is_audible(&self) -> bool {
        self.take.is_some() && !self.muted && self.volume.units() > 0
    }
}

/// What to render besides the stems
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildOptions {
    pub include_click: bool,
    pub include_count_in: bool,
    /// Requested song length; the stems always win if longer
    pub duration: Option<SongDuration>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            include_click: true,
            include_count_in: false,
            duration: None,
        }
    }
}

/// Buffers produced for one song
#[derive(Debug, Clone)]
pub struct MixResult {
    pub stems: Arc<SampleBuffer>,
    pub click: Option<Arc<SampleBuffer>>,
    pub count_in: Option<Arc<SampleBuffer>>,
    /// Seconds
    pub total_duration: f64,
}

/// Longest offset-corrected take among audible stems (seconds)
///
/// This is the floor for the user's requested song duration.
pub fn longest_take_duration(stems: &[StemInput]) -> f64 {
    stems
        .iter()
        .filter(|s| s.is_audible())
        .filter_map(|s| s.take.as_ref())
        .map(Take::corrected_duration)
        .fold(0.0, f64::max)
}

/// Build stems, click and count-in for a song at `sample_rate`
///
/// Takes recorded at another sample rate are skipped with a warning.
/// Without any audible take the stems buffer is stereo silence.
pub fn build_mix(
    tempo: &TempoMeter,
    stems: &[StemInput],
    options: &BuildOptions,
    sample_rate: u32,
) -> Result<MixResult> {
    let eligible: Vec<(&StemInput, &Take)> = stems
        .iter()
        .filter(|s| s.is_audible())
        .filter_map(|s| s.take.as_ref().map(|t| (s, t)))
        .filter(|(stem, take)| {
            let rate = take.buffer.sample_rate();
            if rate != sample_rate {
                log::warn!(
                    "Skipping {}: take is {}Hz but output is {}Hz",
                    stem.name,
                    rate,
                    sample_rate
                );
            }
            rate == sample_rate
        })
        .collect();

    let corrected: Vec<SampleBuffer> = eligible.par_iter().map(|(_, take)| take.corrected()).collect();
    let gains: Vec<f32> = eligible.iter().map(|(stem, _)| stem.volume.gain()).collect();

    let longest = corrected.iter().map(|b| b.duration_seconds()).fold(0.0, f64::max);
    let requested = options.duration.map(|d| d.as_seconds()).unwrap_or(0.0);
    let mut total_duration = longest.max(requested);
    if total_duration <= 0.0 {
        total_duration = DEFAULT_SONG_SECONDS;
    }

    let stems_buffer = if corrected.is_empty() {
        let frames = (total_duration * sample_rate as f64).ceil() as usize;
        SampleBuffer::silence(MIX_CHANNELS, frames, sample_rate)
    } else {
        let refs: Vec<&SampleBuffer> = corrected.iter().collect();
        mix(&refs, &gains, Some(total_duration))?
    };

    let synth = ClickSynth::new(sample_rate);
    let click = options
        .include_click
        .then(|| Arc::new(synth.click_track(tempo, total_duration)));
    let count_in = options
        .include_count_in
        .then(|| Arc::new(synth.count_in(tempo)));

    log::info!(
        "Built mix: {} of {} stems, {:.2}s at {}Hz (click: {}, count-in: {})",
        eligible.len(),
        stems.len(),
        total_duration,
        sample_rate,
        click.is_some(),
        count_in.is_some()
    );

    Ok(MixResult {
        stems: Arc::new(stems_buffer),
        click,
        count_in,
        total_duration,
    })
}

/// Preview of a single take while its offset is being edited
///
/// The stems buffer is the corrected take itself and the click track spans
/// its length. No count-in.
pub fn build_take_preview(tempo: &TempoMeter, take: &Take) -> MixResult {
    let corrected = take.corrected();
    let total_duration = corrected.duration_seconds();
    let click = ClickSynth::new(corrected.sample_rate()).click_track(tempo, total_duration);
    MixResult {
        stems: Arc::new(corrected),
        click: Some(Arc::new(click)),
        count_in: None,
        total_duration,
    }
}
