//! Click track synthesizer
//!
//! Renders metronome buffers from a tempo/meter pair. Every click is a 50 ms
//! decaying sine burst:
//!
//! ```text
//! sample(t) = amplitude × e^(−30t) × sin(2π·freq·t)
//! ```
//!
//! | Beat       | Frequency | Amplitude |
//! |------------|-----------|-----------|
//! | Downbeat   | 1000 Hz   | 0.30      |
//! | Other beat | 800 Hz    | 0.20      |
//! | Count-in   | 1200 Hz   | 0.35      |
//!
//! Beat `k` starts at frame `floor(k × 60/bpm × sample_rate)`. Positions are
//! multiplied rather than accumulated so long tracks never drift. Bursts are
//! written (not summed) into both channels and truncated at the buffer end.
//!
//! The main track and the count-in are normally rendered as separate buffers
//! so the scheduler can play them back-to-back. Beat numbering starts at 0 in
//! every buffer.

use crate::music::TempoMeter;
use crate::types::{Sample, SampleBuffer};

/// Length of one click burst in seconds
pub const CLICK_LENGTH_SECONDS: f64 = 0.05;

/// Exponential decay rate of the click envelope
pub const CLICK_DECAY: f64 = 30.0;

/// Pitch and level of one kind of click
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClickVoice {
    pub frequency: f64,
    pub amplitude: f64,
}

impl ClickVoice {
    /// First beat of a bar
    pub const DOWNBEAT: ClickVoice = ClickVoice {
        frequency: 1000.0,
        amplitude: 0.3,
    };

    /// Any other beat of a bar
    pub const BEAT: ClickVoice = ClickVoice {
        frequency: 800.0,
        amplitude: 0.2,
    };

    /// Count-in beat, pitched above the downbeat to stay distinct
    pub const COUNT_IN: ClickVoice = ClickVoice {
        frequency: 1200.0,
        amplitude: 0.35,
    };
}

/// Metronome renderer bound to one sample rate
///
/// Caches the three click bursts so rendering a track is a series of copies.
#[derive(Debug, Clone)]
pub struct ClickSynth {
    sample_rate: u32,
    downbeat: Vec<Sample>,
    beat: Vec<Sample>,
    count_in: Vec<Sample>,
}

impl ClickSynth {
    /// Create a synthesizer for the given output rate
    ///
    /// Panics if `sample_rate` is zero.
    pub fn new(sample_rate: u32) -> Self {
        assert!(sample_rate > 0, "Sample rate must be non-zero");
        Self {
            sample_rate,
            downbeat: render_burst(ClickVoice::DOWNBEAT, sample_rate),
            beat: render_burst(ClickVoice::BEAT, sample_rate),
            count_in: render_burst(ClickVoice::COUNT_IN, sample_rate),
        }
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Render the main click track spanning `duration_seconds`
    pub fn click_track(&self, tempo: &TempoMeter, duration_seconds: f64) -> SampleBuffer {
        self.render(tempo, duration_seconds, false)
    }

    /// Render a standalone one-bar count-in
    ///
    /// Length is `ceil(beats_per_bar × 60/bpm × sample_rate)` frames, every
    /// beat at the count-in voice.
    pub fn count_in(&self, tempo: &TempoMeter) -> SampleBuffer {
        let duration = tempo.seconds_per_bar();
        let mut buffer = SampleBuffer::silence(2, self.frames_for(duration), self.sample_rate);
        for k in 0..tempo.beats_per_bar() as u64 {
            self.write_burst(&mut buffer, tempo.beat_time(k), &self.count_in);
        }
        buffer
    }

    /// Render a click track, optionally preceded by a count-in bar in the same buffer
    ///
    /// With `include_count_in` the buffer grows by one bar and the main beats
    /// start after it, numbered from 0 again.
    pub fn render(&self, tempo: &TempoMeter, duration_seconds: f64, include_count_in: bool) -> SampleBuffer {
        let duration = if duration_seconds.is_finite() {
            duration_seconds.max(0.0)
        } else {
            0.0
        };
        let lead = if include_count_in {
            tempo.seconds_per_bar()
        } else {
            0.0
        };
        let total = duration + lead;
        let mut buffer = SampleBuffer::silence(2, self.frames_for(total), self.sample_rate);

        if include_count_in {
            for k in 0..tempo.beats_per_bar() as u64 {
                self.write_burst(&mut buffer, tempo.beat_time(k), &self.count_in);
            }
        }

        let beats_per_bar = tempo.beats_per_bar() as u64;
        let mut k = 0u64;
        loop {
            let t = lead + tempo.beat_time(k);
            if t >= total {
                break;
            }
            let burst = if k % beats_per_bar == 0 {
                &self.downbeat
            } else {
                &self.beat
            };
            self.write_burst(&mut buffer, t, burst);
            k += 1;
        }

        log::debug!(
            "Rendered click track: {:.1} BPM, {} beats/bar, {:.2}s, {} beats{}",
            tempo.bpm(),
            beats_per_bar,
            duration,
            k,
            if include_count_in { " + count-in" } else { "" }
        );

        buffer
    }

    fn frames_for(&self, seconds: f64) -> usize {
        (seconds * self.sample_rate as f64).ceil() as usize
    }

    /// Overwrite a burst into both channels starting at `floor(t × sr)`
    fn write_burst(&self, buffer: &mut SampleBuffer, t: f64, burst: &[Sample]) {
        let start = (t * self.sample_rate as f64).floor() as usize;
        for ch in 0..buffer.channel_count() {
            let data = buffer.channel_mut(ch);
            if start >= data.len() {
                continue;
            }
            let end = (start + burst.len()).min(data.len());
            data[start..end].copy_from_slice(&burst[..end - start]);
        }
    }
}

/// One click burst at the given rate
fn render_burst(voice: ClickVoice, sample_rate: u32) -> Vec<Sample> {
    let sr = sample_rate as f64;
    let len = (CLICK_LENGTH_SECONDS * sr).ceil() as usize;
    (0..len)
        .map(|i| {
            let t = i as f64 / sr;
            let envelope = (-CLICK_DECAY * t).exp();
            (voice.amplitude * envelope * (2.0 * std::f64::consts::PI * voice.frequency * t).sin()) as Sample
        })
        .collect()
}
