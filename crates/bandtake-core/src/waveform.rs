//! Waveform extraction for display
//!
//! Downsamples a buffer into one (min, max) pair per pixel column and derives
//! bar/beat gridline positions from the tempo. Everything here is pure: the
//! caller owns the actual drawing.

use crate::music::TempoMeter;
use crate::types::SampleBuffer;

/// Default display width in pixels
pub const DEFAULT_WIDTH: usize = 800;

/// Extract (min, max) peaks of channel 0, one pair per pixel column
///
/// Each column covers `step = ceil(frames / width)` consecutive frames.
/// Columns past the end of the buffer are `(0.0, 0.0)`.
pub fn extract_peaks(buffer: &SampleBuffer, width: usize) -> Vec<(f32, f32)> {
    if width == 0 {
        return Vec::new();
    }
    let data = buffer.channel(0);
    let step = data.len().div_ceil(width);

    (0..width)
        .map(|col| {
            let start = (col * step).min(data.len());
            let end = (start + step).min(data.len());
            if start == end {
                return (0.0, 0.0);
            }

            let mut min = f32::INFINITY;
            let mut max = f32::NEG_INFINITY;
            for &sample in &data[start..end] {
                min = min.min(sample);
                max = max.max(sample);
            }
            (min, max)
        })
        .collect()
}

/// Kind of gridline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridKind {
    /// Bar boundary (first beat of a bar)
    Bar,
    /// Any other beat
    Beat,
}

/// One vertical gridline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gridline {
    /// Bar or beat number, starting at 0
    pub index: u64,
    /// Position in seconds
    pub time: f64,
    /// Pixel column, `round(time / total × width)`
    pub x: usize,
    pub kind: GridKind,
}

/// Bar boundaries `k × seconds_per_bar` for every `k` with time ≤ `total_duration`
pub fn bar_gridlines(tempo: &TempoMeter, total_duration: f64, width: usize) -> Vec<Gridline> {
    if !total_duration.is_finite() || total_duration <= 0.0 {
        return Vec::new();
    }
    (0u64..)
        .map(|k| (k, tempo.bar_time(k)))
        .take_while(|&(_, t)| t <= total_duration)
        .map(|(index, time)| Gridline {
            index,
            time,
            x: time_to_x(time, total_duration, width),
            kind: GridKind::Bar,
        })
        .collect()
}

/// Every beat up to `total_duration`, downbeats marked as [`GridKind::Bar`]
pub fn beat_gridlines(tempo: &TempoMeter, total_duration: f64, width: usize) -> Vec<Gridline> {
    if !total_duration.is_finite() || total_duration <= 0.0 {
        return Vec::new();
    }
    let beats_per_bar = tempo.beats_per_bar() as u64;
    (0u64..)
        .map(|k| (k, tempo.beat_time(k)))
        .take_while(|&(_, t)| t <= total_duration)
        .map(|(index, time)| Gridline {
            index,
            time,
            x: time_to_x(time, total_duration, width),
            kind: if index % beats_per_bar == 0 {
                GridKind::Bar
            } else {
                GridKind::Beat
            },
        })
        .collect()
}

/// Pixel column of the playback indicator, clamped to `[0, width]`
pub fn indicator_x(elapsed: f64, total_duration: f64, width: usize) -> usize {
    if !total_duration.is_finite() || total_duration <= 0.0 || !elapsed.is_finite() {
        return 0;
    }
    time_to_x(elapsed.clamp(0.0, total_duration), total_duration, width)
}

fn time_to_x(time: f64, total_duration: f64, width: usize) -> usize {
    ((time / total_duration) * width as f64).round().max(0.0) as usize
}

/// Peaks plus optional gridlines, ready for a canvas
#[derive(Debug, Clone, PartialEq)]
pub struct WaveformView {
    pub width: usize,
    pub peaks: Vec<(f32, f32)>,
    pub gridlines: Vec<Gridline>,
}

impl WaveformView {
    /// Build the view of a buffer, with bar gridlines when a tempo is given
    pub fn new(buffer: &SampleBuffer, tempo: Option<&TempoMeter>, width: usize) -> Self {
        let gridlines = tempo
            .map(|t| bar_gridlines(t, buffer.duration_seconds(), width))
            .unwrap_or_default();
        Self {
            width,
            peaks: extract_peaks(buffer, width),
            gridlines,
        }
    }
}
