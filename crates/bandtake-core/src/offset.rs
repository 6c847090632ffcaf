//! Offset correction for recorded takes
//!
//! A take's offset aligns it to the song's beat grid:
//! - `offset > 0`: the take started early, trim that many seconds from the start
//! - `offset < 0`: the take started late, prepend that many seconds of silence

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{BandtakeError, Result};
use crate::types::SampleBuffer;

/// Largest offset magnitude the slider range accepts (one hour)
pub const MAX_OFFSET_SECONDS: f64 = 3600.0;

/// A decoded take and its alignment offset
#[derive(Debug, Clone)]
pub struct Take {
    pub buffer: Arc<SampleBuffer>,
    pub offset_seconds: f64,
}

impl Take {
    pub fn new(buffer: impl Into<Arc<SampleBuffer>>, offset_seconds: f64) -> Self {
        Self {
            buffer: buffer.into(),
            offset_seconds,
        }
    }

    /// The take shifted by its offset
    pub fn corrected(&self) -> SampleBuffer {
        apply_offset(&self.buffer, self.offset_seconds)
    }

    /// Length of the corrected take without rendering it
    pub fn corrected_duration(&self) -> f64 {
        let shift = crate::types::seconds_to_frames(self.offset_seconds.abs(), self.buffer.sample_rate()) as i64;
        let frames = self.buffer.frame_count() as i64;
        let corrected = if self.offset_seconds >= 0.0 {
            (frames - shift).max(0)
        } else {
            frames + shift
        };
        corrected as f64 / self.buffer.sample_rate() as f64
    }
}

/// Shift a take's samples by `offset_seconds`
pub fn apply_offset(buffer: &SampleBuffer, offset_seconds: f64) -> SampleBuffer {
    buffer.trim_or_pad(offset_seconds)
}

/// Range of the offset editing slider
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OffsetRange {
    min: f64,
    max: f64,
}

impl Default for OffsetRange {
    fn default() -> Self {
        Self { min: -5.0, max: 5.0 }
    }
}

impl OffsetRange {
    /// Validated range: finite, `min < max`, both within ±3600 seconds
    pub fn new(min: f64, max: f64) -> Result<Self> {
        let in_bounds = |v: f64| v.is_finite() && (-MAX_OFFSET_SECONDS..=MAX_OFFSET_SECONDS).contains(&v);
        if !in_bounds(min) || !in_bounds(max) || min >= max {
            return Err(BandtakeError::InvalidOffsetRange { min, max });
        }
        Ok(Self { min, max })
    }

    #[inline]
    pub fn min(&self) -> f64 {
        self.min
    }

    #[inline]
    pub fn max(&self) -> f64 {
        self.max
    }

    /// Pin an offset into the range
    pub fn clamp(&self, offset: f64) -> f64 {
        if offset.is_nan() {
            return 0.0_f64.clamp(self.min, self.max);
        }
        offset.clamp(self.min, self.max)
    }

    /// Grow the range so that it contains `offset` (used when loading a take)
    pub fn widen_to_include(self, offset: f64) -> Self {
        if !offset.is_finite() {
            return self;
        }
        let offset = offset.clamp(-MAX_OFFSET_SECONDS, MAX_OFFSET_SECONDS);
        Self {
            min: self.min.min(offset),
            max: self.max.max(offset),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn take(frames: usize, offset: f64) -> Take {
        Take::new(SampleBuffer::silence(1, frames, 1000), offset)
    }

    #[test]
    fn test_corrected_take() {
        let t = take(1000, 0.25);
        let corrected = t.corrected();
        assert_eq!(corrected.frame_count(), 750);
        assert!((t.corrected_duration() - 0.75).abs() < 1e-9);

        let late = take(1000, -0.5);
        assert_eq!(late.corrected().frame_count(), 1500);
        assert!((late.corrected_duration() - 1.5).abs() < 1e-9);

        let gone = take(1000, 3.0);
        assert_eq!(gone.corrected().frame_count(), 0);
        assert_eq!(gone.corrected_duration(), 0.0);
    }

    #[test]
    fn test_offset_range_validation() {
        assert!(OffsetRange::new(-5.0, 5.0).is_ok());
        assert!(OffsetRange::new(2.0, 2.0).is_err());
        assert!(OffsetRange::new(3.0, -3.0).is_err());
        assert!(OffsetRange::new(-3601.0, 0.0).is_err());
        assert!(OffsetRange::new(0.0, f64::INFINITY).is_err());
    }

    #[test]
    fn test_offset_range_clamp_and_widen() {
        let range = OffsetRange::default();
        assert_eq!(range.clamp(7.5), 5.0);
        assert_eq!(range.clamp(-0.3), -0.3);
        assert_eq!(range.clamp(f64::NAN), 0.0);

        let widened = range.widen_to_include(-12.0);
        assert_eq!(widened.min(), -12.0);
        assert_eq!(widened.max(), 5.0);
        assert_eq!(range.widen_to_include(1.0), range);
    }
}
