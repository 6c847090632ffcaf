//! Common types for Bandtake
//!
//! This module contains the fundamental audio types shared by the click
//! synthesizer, the offset corrector, the mixer and the playback engine:
//! the stereo frame type used on the audio thread and the immutable
//! planar `SampleBuffer` that every transform produces.

use crate::error::{BandtakeError, Result};

/// Sample rate used when neither a take nor the device dictates one
pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

/// Maximum channels kept per buffer (mono or stereo)
pub const MAX_CHANNELS: usize = 2;

/// Audio sample type (32-bit float throughout)
pub type Sample = f32;

/// A single stereo sample (left and right channels)
///
/// Uses `#[repr(C)]` to ensure predictable memory layout: [left, right].
/// This enables zero-copy conversion between `&[StereoSample]` and `&[f32]`
/// (interleaved format) using bytemuck.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct StereoSample {
    pub left: Sample,
    pub right: Sample,
}

impl StereoSample {
    /// Create a new stereo sample
    #[inline]
    pub fn new(left: Sample, right: Sample) -> Self {
        Self { left, right }
    }

    /// Create a silent stereo sample
    #[inline]
    pub fn silence() -> Self {
        Self::default()
    }

    /// Create a mono sample (same value in both channels)
    #[inline]
    pub fn mono(value: Sample) -> Self {
        Self { left: value, right: value }
    }

    /// Get the peak amplitude (max of abs(left), abs(right))
    #[inline]
    pub fn peak(&self) -> Sample {
        self.left.abs().max(self.right.abs())
    }
}

impl std::ops::Add for StereoSample {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Self {
            left: self.left + other.left,
            right: self.right + other.right,
        }
    }
}

impl std::ops::AddAssign for StereoSample {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.left += other.left;
        self.right += other.right;
    }
}

impl std::ops::Mul<Sample> for StereoSample {
    type Output = Self;

    #[inline]
    fn mul(self, factor: Sample) -> Self {
        Self {
            left: self.left * factor,
            right: self.right * factor,
        }
    }
}

/// Convert a time in seconds to a frame count, rounding to the nearest frame
///
/// Negative and non-finite inputs map to frame 0.
#[inline]
pub fn seconds_to_frames(seconds: f64, sample_rate: u32) -> u64 {
    if !seconds.is_finite() || seconds <= 0.0 {
        return 0;
    }
    (seconds * sample_rate as f64).round() as u64
}

/// Immutable multichannel audio buffer
///
/// Stores one `Vec<Sample>` per channel (planar), always 1 or 2 channels of
/// identical length. Every transform (trim, pad, mix) yields a new buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    sample_rate: u32,
    channels: Vec<Vec<Sample>>,
}

impl SampleBuffer {
    /// Create an all-zero buffer
    ///
    /// Panics if `channels` is not 1 or 2 or the sample rate is zero.
    pub fn silence(channels: usize, frames: usize, sample_rate: u32) -> Self {
        assert!(
            (1..=MAX_CHANNELS).contains(&channels),
            "SampleBuffer supports 1 or 2 channels, got {}",
            channels
        );
        assert!(sample_rate > 0, "Sample rate must be non-zero");
        Self {
            sample_rate,
            channels: vec![vec![0.0; frames]; channels],
        }
    }

    /// Create a buffer from planar channel data
    pub fn from_channels(channels: Vec<Vec<Sample>>, sample_rate: u32) -> Result<Self> {
        if !(1..=MAX_CHANNELS).contains(&channels.len()) {
            return Err(BandtakeError::InvalidChannelCount(channels.len()));
        }
        if sample_rate == 0 {
            return Err(BandtakeError::InvalidSampleRate(sample_rate));
        }
        let frames = channels[0].len();
        if channels.iter().any(|c| c.len() != frames) {
            return Err(BandtakeError::ChannelLengthMismatch);
        }
        Ok(Self { sample_rate, channels })
    }

    /// Create a buffer from interleaved samples
    ///
    /// Sources with more than two channels keep only the first two.
    /// A trailing partial frame is dropped.
    pub fn from_interleaved(samples: &[Sample], channels: usize, sample_rate: u32) -> Result<Self> {
        if channels == 0 {
            return Err(BandtakeError::InvalidChannelCount(channels));
        }
        let kept = channels.min(MAX_CHANNELS);
        let frames = samples.len() / channels;
        let mut planar = vec![Vec::with_capacity(frames); kept];
        for frame in samples.chunks_exact(channels) {
            for (ch, out) in planar.iter_mut().enumerate() {
                out.push(frame[ch]);
            }
        }
        Self::from_channels(planar, sample_rate)
    }

    /// Create a stereo buffer from rendered frames
    pub fn from_stereo_frames(frames: &[StereoSample], sample_rate: u32) -> Result<Self> {
        let left = frames.iter().map(|f| f.left).collect();
        let right = frames.iter().map(|f| f.right).collect();
        Self::from_channels(vec![left, right], sample_rate)
    }

    /// Build a buffer whose invariants the caller already upholds
    pub(crate) fn from_parts(channels: Vec<Vec<Sample>>, sample_rate: u32) -> Self {
        debug_assert!((1..=MAX_CHANNELS).contains(&channels.len()));
        debug_assert!(channels.iter().all(|c| c.len() == channels[0].len()));
        Self { sample_rate, channels }
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[inline]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Number of frames (samples per channel)
    #[inline]
    pub fn frame_count(&self) -> usize {
        self.channels[0].len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frame_count() == 0
    }

    /// Duration in seconds (frames / sample rate)
    pub fn duration_seconds(&self) -> f64 {
        self.frame_count() as f64 / self.sample_rate as f64
    }

    /// Get the samples of one channel
    ///
    /// Panics if `index >= channel_count()`.
    #[inline]
    pub fn channel(&self, index: usize) -> &[Sample] {
        &self.channels[index]
    }

    #[inline]
    pub(crate) fn channel_mut(&mut self, index: usize) -> &mut [Sample] {
        &mut self.channels[index]
    }

    /// Get one frame as a stereo sample (mono buffers are duplicated)
    #[inline]
    pub fn frame(&self, index: usize) -> StereoSample {
        match self.channels.as_slice() {
            [mono] => StereoSample::mono(mono[index]),
            [left, right, ..] => StereoSample::new(left[index], right[index]),
            [] => StereoSample::silence(),
        }
    }

    /// Interleaved copy of the samples [L, R, L, R, ...] (or mono as-is)
    pub fn to_interleaved(&self) -> Vec<Sample> {
        let channels = self.channel_count();
        let mut out = Vec::with_capacity(self.frame_count() * channels);
        for i in 0..self.frame_count() {
            for ch in &self.channels {
                out.push(ch[i]);
            }
        }
        out
    }

    /// Peak absolute amplitude across all channels
    pub fn peak(&self) -> Sample {
        self.channels
            .iter()
            .flat_map(|c| c.iter())
            .fold(0.0, |peak: Sample, s| peak.max(s.abs()))
    }

    /// Shift the buffer in time
    ///
    /// A positive offset drops `round(offset × sample_rate)` leading frames
    /// (the result may be empty). A negative offset prepends that many zero
    /// frames. Channel count and sample rate are always preserved.
    /// Non-finite offsets leave the content unchanged.
    pub fn trim_or_pad(&self, offset_seconds: f64) -> SampleBuffer {
        if !offset_seconds.is_finite() {
            log::warn!("trim_or_pad: ignoring non-finite offset {}", offset_seconds);
            return self.clone();
        }

        let shift = seconds_to_frames(offset_seconds.abs(), self.sample_rate) as usize;
        let channels = if offset_seconds >= 0.0 {
            self.channels
                .iter()
                .map(|c| c[shift.min(c.len())..].to_vec())
                .collect()
        } else {
            self.channels
                .iter()
                .map(|c| {
                    let mut padded = Vec::with_capacity(c.len() + shift);
                    padded.resize(shift, 0.0);
                    padded.extend_from_slice(c);
                    padded
                })
                .collect()
        };

        Self::from_parts(channels, self.sample_rate)
    }
}

/// Create an all-zero buffer (see [`SampleBuffer::silence`])
pub fn create_silence(channels: usize, frames: usize, sample_rate: u32) -> SampleBuffer {
    SampleBuffer::silence(channels, frames, sample_rate)
}

/// Shift a buffer in time (see [`SampleBuffer::trim_or_pad`])
pub fn trim_or_pad(buffer: &SampleBuffer, offset_seconds: f64) -> SampleBuffer {
    buffer.trim_or_pad(offset_seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(channels: usize, frames: usize, sample_rate: u32) -> SampleBuffer {
        let planar = (0..channels)
            .map(|ch| (0..frames).map(|i| i as f32 + ch as f32 * 1000.0).collect())
            .collect();
        SampleBuffer::from_channels(planar, sample_rate).unwrap()
    }

    #[test]
    fn test_stereo_sample_operations() {
        let a = StereoSample::new(0.5, -0.25);
        let b = StereoSample::mono(0.25);
        let sum = a + b;
        assert!((sum.left - 0.75).abs() < 1e-6);
        assert!((sum.right - 0.0).abs() < 1e-6);
        assert!(((a * 2.0).left - 1.0).abs() < 1e-6);
        assert!((a.peak() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_create_silence() {
        let buf = create_silence(2, 480, 48000);
        assert_eq!(buf.channel_count(), 2);
        assert_eq!(buf.frame_count(), 480);
        assert_eq!(buf.sample_rate(), 48000);
        assert!((buf.duration_seconds() - 0.01).abs() < 1e-9);
        assert_eq!(buf.peak(), 0.0);
    }

    #[test]
    fn test_from_channels_validation() {
        assert_eq!(
            SampleBuffer::from_channels(vec![], 48000),
            Err(BandtakeError::InvalidChannelCount(0))
        );
        assert_eq!(
            SampleBuffer::from_channels(vec![vec![0.0; 4], vec![0.0; 3]], 48000),
            Err(BandtakeError::ChannelLengthMismatch)
        );
        assert_eq!(
            SampleBuffer::from_channels(vec![vec![0.0; 4]], 0),
            Err(BandtakeError::InvalidSampleRate(0))
        );
    }

    #[test]
    fn test_from_interleaved_keeps_first_two_channels() {
        let interleaved = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let buf = SampleBuffer::from_interleaved(&interleaved, 3, 44100).unwrap();
        assert_eq!(buf.channel_count(), 2);
        assert_eq!(buf.channel(0), &[1.0, 4.0]);
        assert_eq!(buf.channel(1), &[2.0, 5.0]);
    }

    #[test]
    fn test_mono_frame_is_duplicated() {
        let buf = SampleBuffer::from_channels(vec![vec![0.1, 0.2]], 48000).unwrap();
        assert_eq!(buf.frame(1), StereoSample::new(0.2, 0.2));
        assert_eq!(buf.to_interleaved(), vec![0.1, 0.2]);
    }

    #[test]
    fn test_trim_drops_rounded_frames() {
        let buf = ramp(2, 100, 1000);
        // 0.0104s at 1kHz = 10.4 frames -> 10
        let trimmed = buf.trim_or_pad(0.0104);
        assert_eq!(trimmed.frame_count(), 90);
        assert_eq!(trimmed.channel(0)[0], 10.0);
        assert_eq!(trimmed.channel(1)[0], 1010.0);
        // 0.0106s -> 11 frames
        assert_eq!(buf.trim_or_pad(0.0106).frame_count(), 89);
    }

    #[test]
    fn test_trim_past_end_is_empty() {
        let buf = ramp(1, 100, 1000);
        let trimmed = buf.trim_or_pad(5.0);
        assert!(trimmed.is_empty());
        assert_eq!(trimmed.channel_count(), 1);
        assert_eq!(trimmed.sample_rate(), 1000);
    }

    #[test]
    fn test_pad_prepends_silence() {
        let buf = ramp(2, 10, 1000);
        let padded = buf.trim_or_pad(-0.005);
        assert_eq!(padded.frame_count(), 15);
        assert!(padded.channel(0)[..5].iter().all(|&s| s == 0.0));
        assert_eq!(&padded.channel(0)[5..], buf.channel(0));
        assert_eq!(&padded.channel(1)[5..], buf.channel(1));
    }

    #[test]
    fn test_trim_then_pad_restores_overlap() {
        let buf = ramp(2, 200, 8000);
        let x = 0.003; // 24 frames
        let restored = buf.trim_or_pad(x).trim_or_pad(-x);
        assert_eq!(restored.frame_count(), buf.frame_count());
        for ch in 0..2 {
            assert_eq!(&restored.channel(ch)[24..], &buf.channel(ch)[24..]);
        }
    }

    #[test]
    fn test_non_finite_offset_is_ignored() {
        let buf = ramp(1, 10, 1000);
        assert_eq!(buf.trim_or_pad(f64::NAN), buf);
        assert_eq!(buf.trim_or_pad(f64::NEG_INFINITY), buf);
    }

    #[test]
    fn test_seconds_to_frames() {
        assert_eq!(seconds_to_frames(0.5, 48000), 24000);
        assert_eq!(seconds_to_frames(-1.0, 48000), 0);
        assert_eq!(seconds_to_frames(f64::NAN, 48000), 0);
    }
}
