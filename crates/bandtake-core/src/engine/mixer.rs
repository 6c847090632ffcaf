//! Linear mixer for corrected takes
//!
//! Sums volume-scaled buffers into one stereo master buffer:
//!
//! ```text
//! out[ch][i] = Σ input[n][min(ch, channels(n) − 1)][i] × volume[n]
//! ```
//!
//! Mono inputs feed both output channels. Inputs shorter than the output
//! simply stop contributing. No clipping or limiting is applied, so the sum
//! can leave [-1, 1].

use rayon::prelude::*;

use crate::error::{BandtakeError, Result};
use crate::types::{Sample, SampleBuffer};

/// Output channel count of every mix
pub const MIX_CHANNELS: usize = 2;

/// Mix buffers with per-buffer volume
///
/// The output is `max(longest input, ceil(target × sample_rate))` frames long
/// and always stereo. Inputs with a volume of exactly zero are skipped
/// entirely, so their content is never read.
///
/// # Errors
/// - [`BandtakeError::MismatchedInputs`] if the slice lengths differ
/// - [`BandtakeError::NoInputs`] if there is nothing to mix
/// - [`BandtakeError::SampleRateMismatch`] if the inputs disagree on rate
pub fn mix(buffers: &[&SampleBuffer], volumes: &[f32], target_duration: Option<f64>) -> Result<SampleBuffer> {
    if buffers.len() != volumes.len() {
        return Err(BandtakeError::MismatchedInputs {
            buffers: buffers.len(),
            volumes: volumes.len(),
        });
    }
    let first = buffers.first().ok_or(BandtakeError::NoInputs)?;
    let sample_rate = first.sample_rate();
    if let Some(other) = buffers.iter().find(|b| b.sample_rate() != sample_rate) {
        return Err(BandtakeError::SampleRateMismatch {
            expected: sample_rate,
            found: other.sample_rate(),
        });
    }

    let longest = buffers.iter().map(|b| b.frame_count()).max().unwrap_or(0);
    let target = target_duration
        .filter(|t| t.is_finite() && *t > 0.0)
        .map(|t| (t * sample_rate as f64).ceil() as usize)
        .unwrap_or(0);
    let frames = longest.max(target);

    let channels: Vec<Vec<Sample>> = (0..MIX_CHANNELS)
        .into_par_iter()
        .map(|ch| {
            let mut out = vec![0.0; frames];
            for (buffer, &volume) in buffers.iter().zip(volumes) {
                if volume == 0.0 {
                    continue;
                }
                let source = buffer.channel(ch.min(buffer.channel_count() - 1));
                for (dst, &src) in out.iter_mut().zip(source) {
                    *dst += src * volume;
                }
            }
            out
        })
        .collect();

    log::debug!(
        "Mixed {} buffers into {} frames ({:.2}s)",
        buffers.len(),
        frames,
        frames as f64 / sample_rate as f64
    );

    Ok(SampleBuffer::from_parts(channels, sample_rate))
}
