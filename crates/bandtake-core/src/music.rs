//! Tempo, meter and song length
//!
//! Provides the validated tempo/meter pair every beat-grid computation starts
//! from, time signature parsing, the user-facing song duration, and the
//! `M:SS` time format used by the playback status line.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{BandtakeError, Result};

/// Highest tempo accepted (BPM)
pub const MAX_BPM: f64 = 300.0;

/// Highest numerator accepted in a time signature
pub const MAX_BEATS_PER_BAR: u32 = 32;

/// Note values accepted as a time signature denominator
pub const NOTE_VALUES: [u32; 6] = [1, 2, 4, 8, 16, 32];

/// Longest song duration the minutes field accepts
pub const MAX_DURATION_MINUTES: u32 = 60;

/// Highest value of the seconds field
pub const MAX_DURATION_SECONDS: u32 = 59;

// ═══════════════════════════════════════════════════════════════════════════════
// Time signature
// ═══════════════════════════════════════════════════════════════════════════════

/// Time signature such as 4/4, 7/8 or 3/4
///
/// Serialized as the string `"N/D"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeSignature {
    numerator: u32,
    denominator: u32,
}

impl TimeSignature {
    /// Common time (4/4)
    pub const COMMON: TimeSignature = TimeSignature {
        numerator: 4,
        denominator: 4,
    };

    /// Create a validated time signature
    pub fn new(numerator: u32, denominator: u32) -> Result<Self> {
        if numerator == 0 || numerator > MAX_BEATS_PER_BAR {
            return Err(BandtakeError::InvalidBeatsPerBar(numerator));
        }
        if !NOTE_VALUES.contains(&denominator) {
            return Err(BandtakeError::InvalidDenominator(denominator));
        }
        Ok(Self {
            numerator,
            denominator,
        })
    }

    /// Beats per bar
    #[inline]
    pub fn numerator(&self) -> u32 {
        self.numerator
    }

    /// Note value of one beat
    #[inline]
    pub fn denominator(&self) -> u32 {
        self.denominator
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::COMMON
    }
}

impl FromStr for TimeSignature {
    type Err = BandtakeError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || BandtakeError::InvalidTimeSignature(s.to_string());
        let (num, den) = s.trim().split_once('/').ok_or_else(invalid)?;
        let numerator = num.trim().parse::<u32>().map_err(|_| invalid())?;
        let denominator = den.trim().parse::<u32>().map_err(|_| invalid())?;
        Self::new(numerator, denominator)
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

impl TryFrom<String> for TimeSignature {
    type Error = BandtakeError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<TimeSignature> for String {
    fn from(value: TimeSignature) -> Self {
        value.to_string()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tempo + meter
// ═══════════════════════════════════════════════════════════════════════════════

/// Validated tempo and meter of a song
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempoMeter {
    bpm: f64,
    time_signature: TimeSignature,
}

impl TempoMeter {
    /// Create from raw values, validating all three
    pub fn new(bpm: f64, numerator: u32, denominator: u32) -> Result<Self> {
        Self::with_time_signature(bpm, TimeSignature::new(numerator, denominator)?)
    }

    /// Create from a tempo and an already validated time signature
    pub fn with_time_signature(bpm: f64, time_signature: TimeSignature) -> Result<Self> {
        if !bpm.is_finite() || bpm <= 0.0 || bpm > MAX_BPM {
            return Err(BandtakeError::InvalidTempo(bpm));
        }
        Ok(Self {
            bpm,
            time_signature,
        })
    }

    #[inline]
    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    #[inline]
    pub fn time_signature(&self) -> TimeSignature {
        self.time_signature
    }

    #[inline]
    pub fn beats_per_bar(&self) -> u32 {
        self.time_signature.numerator
    }

    /// 60 / bpm
    #[inline]
    pub fn seconds_per_beat(&self) -> f64 {
        60.0 / self.bpm
    }

    /// seconds_per_beat × beats_per_bar
    #[inline]
    pub fn seconds_per_bar(&self) -> f64 {
        self.seconds_per_beat() * self.beats_per_bar() as f64
    }

    /// Time of beat `k` (multiplied, never accumulated)
    #[inline]
    pub fn beat_time(&self, k: u64) -> f64 {
        k as f64 * self.seconds_per_beat()
    }

    /// Time of bar boundary `k`
    #[inline]
    pub fn bar_time(&self, k: u64) -> f64 {
        k as f64 * self.seconds_per_bar()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Song duration
// ═══════════════════════════════════════════════════════════════════════════════

/// User-specified minimum song length in whole minutes and seconds
///
/// Deserialized values are clamped the same way as [`SongDuration::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "RawSongDuration")]
pub struct SongDuration {
    pub minutes: u32,
    pub seconds: u32,
}

#[derive(Deserialize)]
struct RawSongDuration {
    #[serde(default)]
    minutes: u32,
    #[serde(default)]
    seconds: u32,
}

impl From<RawSongDuration> for SongDuration {
    fn from(raw: RawSongDuration) -> Self {
        Self::new(raw.minutes, raw.seconds)
    }
}

impl SongDuration {
    /// Create a duration, clamping each field to its maximum
    pub fn new(minutes: u32, seconds: u32) -> Self {
        Self {
            minutes: minutes.min(MAX_DURATION_MINUTES),
            seconds: seconds.min(MAX_DURATION_SECONDS),
        }
    }

    /// Smallest whole-second duration that covers `seconds`
    ///
    /// Fractional seconds round up; 60 seconds carry into the next minute.
    pub fn covering(seconds: f64) -> Self {
        if !seconds.is_finite() || seconds <= 0.0 {
            return Self::default();
        }
        let total = seconds.ceil() as u64;
        let minutes = (total / 60).min(MAX_DURATION_MINUTES as u64) as u32;
        Self::new(minutes, (total % 60) as u32)
    }

    /// Total length in seconds
    pub fn as_seconds(&self) -> f64 {
        self.minutes as f64 * 60.0 + self.seconds as f64
    }

    /// Replace a duration shorter than `minimum_seconds` with one that covers it
    pub fn at_least(self, minimum_seconds: f64) -> Self {
        if self.as_seconds() < minimum_seconds {
            Self::covering(minimum_seconds)
        } else {
            self
        }
    }
}

impl fmt::Display for SongDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:02}", self.minutes, self.seconds)
    }
}

/// Format seconds as `M:SS` (floor of both fields)
pub fn format_time(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    format!("{}:{:02}", total / 60, total % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tempo_derivations() {
        let tempo = TempoMeter::new(120.0, 4, 4).unwrap();
        assert!((tempo.seconds_per_beat() - 0.5).abs() < 1e-12);
        assert!((tempo.seconds_per_bar() - 2.0).abs() < 1e-12);
        assert!((tempo.bar_time(3) - 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_tempo_is_rejected() {
        assert_eq!(TempoMeter::new(0.0, 4, 4), Err(BandtakeError::InvalidTempo(0.0)));
        assert_eq!(TempoMeter::new(301.0, 4, 4), Err(BandtakeError::InvalidTempo(301.0)));
        assert!(TempoMeter::new(f64::NAN, 4, 4).is_err());
        assert_eq!(TempoMeter::new(90.0, 0, 4), Err(BandtakeError::InvalidBeatsPerBar(0)));
        assert_eq!(TempoMeter::new(90.0, 33, 4), Err(BandtakeError::InvalidBeatsPerBar(33)));
        assert_eq!(TempoMeter::new(90.0, 4, 3), Err(BandtakeError::InvalidDenominator(3)));
        assert!(TempoMeter::new(300.0, 32, 32).is_ok());
    }

    #[test]
    fn test_time_signature_parse() {
        let ts: TimeSignature = "7/8".parse().unwrap();
        assert_eq!(ts.numerator(), 7);
        assert_eq!(ts.denominator(), 8);
        assert_eq!(ts.to_string(), "7/8");
        assert_eq!(" 3 / 4 ".parse::<TimeSignature>().unwrap(), TimeSignature::new(3, 4).unwrap());
        assert!(matches!(
            "four/four".parse::<TimeSignature>(),
            Err(BandtakeError::InvalidTimeSignature(_))
        ));
        assert!("4".parse::<TimeSignature>().is_err());
        assert_eq!("5/6".parse::<TimeSignature>(), Err(BandtakeError::InvalidDenominator(6)));
    }

    #[test]
    fn test_time_signature_yaml() {
        let ts: TimeSignature = serde_yaml::from_str("\"6/8\"").unwrap();
        assert_eq!(ts, TimeSignature::new(6, 8).unwrap());
        assert!(serde_yaml::from_str::<TimeSignature>("\"6/7\"").is_err());
    }

    #[test]
    fn test_song_duration_covering() {
        assert_eq!(SongDuration::covering(59.2), SongDuration::new(1, 0));
        assert_eq!(SongDuration::covering(61.0), SongDuration::new(1, 1));
        assert_eq!(SongDuration::covering(125.4), SongDuration::new(2, 6));
        assert_eq!(SongDuration::covering(-3.0), SongDuration::default());
    }

    #[test]
    fn test_song_duration_at_least() {
        let requested = SongDuration::new(0, 30);
        assert_eq!(requested.at_least(20.0), requested);
        assert_eq!(requested.at_least(90.5), SongDuration::new(1, 31));
    }

    #[test]
    fn test_song_duration_clamps_fields() {
        let d = SongDuration::new(75, 80);
        assert_eq!(d.minutes, 60);
        assert_eq!(d.seconds, 59);
        assert_eq!(d.to_string(), "60:59");
    }

    #[test]
    fn test_song_duration_yaml_is_clamped() {
        let d: SongDuration = serde_yaml::from_str("{ minutes: 80000000, seconds: 4000 }").unwrap();
        assert_eq!(d, SongDuration::new(60, 59));
        assert!((d.as_seconds() - 3659.0).abs() < 1e-9);

        let d: SongDuration = serde_yaml::from_str("{ seconds: 12 }").unwrap();
        assert_eq!(d, SongDuration::new(0, 12));

        let unclamped = SongDuration {
            minutes: u32::MAX,
            seconds: 0,
        };
        assert!(unclamped.as_seconds() > 0.0);
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(0.0), "0:00");
        assert_eq!(format_time(5.9), "0:05");
        assert_eq!(format_time(65.0), "1:05");
        assert_eq!(format_time(600.2), "10:00");
        assert_eq!(format_time(-1.0), "0:00");
    }
}
