//! A loaded song: decoded takes plus the settings the mix is built from

use std::path::Path;

use anyhow::{bail, Context, Result};
use bandtake_core::audio_file::load_takes;
use bandtake_core::config::AppConfig;
use bandtake_core::engine::{
    build_mix, build_take_preview, longest_take_duration, BuildOptions, MixResult, StemInput, Volume,
};
use bandtake_core::music::TempoMeter;
use bandtake_core::offset::{OffsetRange, Take};
use bandtake_core::DEFAULT_SAMPLE_RATE;

use crate::manifest::SongManifest;

pub struct Song {
    pub title: String,
    pub tempo: TempoMeter,
    pub stems: Vec<StemInput>,
    pub options: BuildOptions,
    /// Rate every buffer is built at (the first decoded take's)
    pub sample_rate: u32,
    /// Range offset edits are clamped to
    pub offset_range: OffsetRange,
}

impl Song {
    /// Read a manifest and decode its takes
    ///
    /// Takes that fail to decode are left out of the mix with a warning.
    pub fn open(manifest_path: &Path, config: &AppConfig) -> Result<Self> {
        let manifest = SongManifest::load(manifest_path)?;
        let tempo = manifest.tempo()?;
        let base_dir = manifest_path.parent().unwrap_or_else(|| Path::new("."));
        let paths = manifest.stem_paths(base_dir);

        let stems: Vec<StemInput> = manifest
            .stems
            .iter()
            .zip(load_takes(&paths))
            .map(|(entry, decoded)| StemInput {
                name: entry.instrument.clone(),
                take: decoded.ok().map(|buffer| Take::new(buffer, entry.offset_seconds)),
                volume: entry.volume,
                muted: entry.muted,
            })
            .collect();

        let decoded = stems.iter().filter(|s| s.take.is_some()).count();
        log::info!("Loaded {}/{} takes for {:?}", decoded, stems.len(), manifest.title);

        let sample_rate = stems
            .iter()
            .find_map(|s| s.take.as_ref())
            .map(|t| t.buffer.sample_rate())
            .or(config.audio.sample_rate)
            .unwrap_or(DEFAULT_SAMPLE_RATE);

        let offset_range = manifest
            .stems
            .iter()
            .fold(OffsetRange::default(), |range, entry| range.widen_to_include(entry.offset_seconds));

        let longest = longest_take_duration(&stems);
        let options = BuildOptions {
            include_click: true,
            include_count_in: true,
            duration: manifest.duration.map(|d| d.at_least(longest)),
        };

        Ok(Self {
            title: manifest.title,
            tempo,
            stems,
            options,
            sample_rate,
            offset_range,
        })
    }

    pub fn build(&self) -> Result<MixResult> {
        build_mix(&self.tempo, &self.stems, &self.options, self.sample_rate).context("Failed to build mix")
    }

    /// Audition one take: the corrected take plus a click of the same length
    pub fn build_preview(&self, index: usize) -> Result<MixResult> {
        let stem = self.stem(index)?;
        let Some(take) = stem.take.as_ref() else {
            bail!("{} has no take to preview", stem.name);
        };
        if take.buffer.sample_rate() != self.sample_rate {
            bail!(
                "{} is {}Hz but the song plays at {}Hz",
                stem.name,
                take.buffer.sample_rate(),
                self.sample_rate
            );
        }
        Ok(build_take_preview(&self.tempo, take))
    }

    /// Move a take's offset, clamped to the offset range
    ///
    /// Returns how far the offset actually moved.
    pub fn set_offset(&mut self, index: usize, seconds: f64) -> Result<f64> {
        let range = self.offset_range;
        let stem = self.stem_mut(index)?;
        let Some(take) = stem.take.as_mut() else {
            bail!("{} has no take", stem.name);
        };
        let previous = take.offset_seconds;
        take.offset_seconds = range.clamp(seconds);
        Ok(take.offset_seconds - previous)
    }

    pub fn set_volume(&mut self, index: usize, units: u32) -> Result<Volume> {
        let stem = self.stem_mut(index)?;
        stem.volume = Volume::new(units);
        Ok(stem.volume)
    }

    /// Flip a stem's mute flag, returning the new state
    pub fn toggle_mute(&mut self, index: usize) -> Result<bool> {
        let stem = self.stem_mut(index)?;
        stem.muted = !stem.muted;
        Ok(stem.muted)
    }

    fn stem(&self, index: usize) -> Result<&StemInput> {
        self.stems
            .get(index)
            .with_context(|| format!("No stem {} (song has {})", index + 1, self.stems.len()))
    }

    fn stem_mut(&mut self, index: usize) -> Result<&mut StemInput> {
        let count = self.stems.len();
        match self.stems.get_mut(index) {
            Some(stem) => Ok(stem),
            None => bail!("No stem {} (song has {})", index + 1, count),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bandtake_core::audio_file::write_wav;
    use bandtake_core::SampleBuffer;

    fn write_song(dir: &Path) -> std::path::PathBuf {
        let take = SampleBuffer::from_channels(vec![vec![0.5; 22050]], 22050).unwrap();
        write_wav(&dir.join("bass.wav"), &take).unwrap();

        let manifest = "\
title: Test
bpm: 120
duration: { minutes: 0, seconds: 3 }
stems:
  - instrument: bass
    path: bass.wav
    volume: 50
  - instrument: keys
    path: missing.wav
";
        let path = dir.join("song.yaml");
        std::fs::write(&path, manifest).unwrap();
        path
    }

    #[test]
    fn test_open_skips_failed_takes() {
        let dir = tempfile::tempdir().unwrap();
        let song = Song::open(&write_song(dir.path()), &AppConfig::default()).unwrap();

        assert_eq!(song.stems.len(), 2);
        assert!(song.stems[0].take.is_some());
        assert!(song.stems[1].take.is_none());
        assert_eq!(song.sample_rate, 22050);

        let mix = song.build().unwrap();
        assert!((mix.total_duration - 3.0).abs() < 1e-9);
        assert!((mix.stems.channel(0)[100] - 0.25).abs() < 1e-6);
        assert!(mix.count_in.is_some());
    }

    #[test]
    fn test_stem_edits() {
        let dir = tempfile::tempdir().unwrap();
        let mut song = Song::open(&write_song(dir.path()), &AppConfig::default()).unwrap();

        assert_eq!(song.set_volume(0, 150).unwrap().units(), 100);
        assert!(song.toggle_mute(0).unwrap());
        assert!(song.set_volume(5, 10).is_err());

        let mix = song.build().unwrap();
        assert_eq!(mix.stems.peak(), 0.0);
    }

    #[test]
    fn test_set_offset_is_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let mut song = Song::open(&write_song(dir.path()), &AppConfig::default()).unwrap();
        assert_eq!(song.offset_range, OffsetRange::default());

        assert!((song.set_offset(0, 0.25).unwrap() - 0.25).abs() < 1e-12);
        assert!((song.set_offset(0, -40.0).unwrap() + 5.25).abs() < 1e-12);
        let take = song.stems[0].take.as_ref().unwrap();
        assert_eq!(take.offset_seconds, -5.0);

        // the missing take cannot be moved or previewed
        assert!(song.set_offset(1, 0.5).is_err());
        assert!(song.build_preview(1).is_err());
        assert!(song.set_offset(7, 0.5).is_err());
    }

    #[test]
    fn test_preview_follows_offset() {
        let dir = tempfile::tempdir().unwrap();
        let mut song = Song::open(&write_song(dir.path()), &AppConfig::default()).unwrap();
        song.set_offset(0, 0.5).unwrap();

        let preview = song.build_preview(0).unwrap();
        assert!((preview.total_duration - 0.5).abs() < 1e-9);
        assert!(preview.click.is_some());
        assert!(preview.count_in.is_none());
        // the take itself, not the volume-scaled mix
        assert!((preview.stems.channel(0)[0] - 0.5).abs() < 1e-6);
    }
}
