//! Playback scheduler
//!
//! Drives the stems, click and count-in buffers through an [`OutputDevice`]:
//!
//! ```text
//!           play                 count-in ends              pause
//!  Idle ─────────────► CountIn ──────────────► Playing ─────────────► Paused
//!   ▲   (from 0, with     │                    ▲   │                    │
//!   │    count-in)        │ pause              │   │ elapsed ≥ end      │ play
//!   │                     ▼                    │   ▼                    │
//!   └──── reset ──── Paused (at 0)             │  Ended                 │
//!                                              └────────────────────────┘
//! ```
//!
//! Elapsed time is always `now − origin` on the device clock. Source end
//! events only hint that something stopped: a natural end is declared once the
//! clock agrees, so sources stopped by pause or reset never end playback.
//!
//! All main sources of one start share a single `start_at`, which the output
//! renders on the same frame.

use std::sync::Arc;

use thiserror::Error;

use super::build::MixResult;
use crate::audio::{AudioError, EndReason, OutputDevice, OutputEvent, SourceId, SourceRequest};
use crate::music::format_time;
use crate::types::SampleBuffer;
use crate::waveform;

/// Distance from the end at which playback counts as finished (seconds)
pub const END_TOLERANCE_SECONDS: f64 = 0.1;

/// Label shown while the count-in plays
pub const COUNT_IN_LABEL: &str = "Count-in...";

/// Stopped sources remembered until their end event arrives
const MAX_RETIRED_SOURCES: usize = 64;

/// Playback errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlaybackError {
    #[error("Nothing to play: no stems or click track loaded")]
    NothingToPlay,

    #[error("Audio output error: {0}")]
    Audio(#[from] AudioError),
}

/// Result type for playback operations
pub type PlaybackResult<T> = Result<T, PlaybackError>;

/// Where the scheduler is in its state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackPhase {
    #[default]
    Idle,
    CountIn,
    Playing,
    Paused,
    Ended,
}

/// The buffers a session plays
#[derive(Debug, Clone, Default)]
pub struct PlaybackBuffers {
    pub stems: Option<Arc<SampleBuffer>>,
    pub click: Option<Arc<SampleBuffer>>,
    pub count_in: Option<Arc<SampleBuffer>>,
}

impl PlaybackBuffers {
    /// Length of the playback timeline: the stems, else the click track
    pub fn total_duration(&self) -> f64 {
        self.stems
            .as_ref()
            .or(self.click.as_ref())
            .map(|b| b.duration_seconds())
            .unwrap_or(0.0)
    }

    /// No main buffer to play
    pub fn is_empty(&self) -> bool {
        self.stems.is_none() && self.click.is_none()
    }

    /// Role whose natural end finishes playback
    fn primary(&self) -> Option<SourceRole> {
        if self.stems.is_some() {
            Some(SourceRole::Stems)
        } else if self.click.is_some() {
            Some(SourceRole::Click)
        } else {
            None
        }
    }
}

impl From<&MixResult> for PlaybackBuffers {
    fn from(mix: &MixResult) -> Self {
        Self {
            stems: Some(Arc::clone(&mix.stems)),
            click: mix.click.clone(),
            count_in: mix.count_in.clone(),
        }
    }
}

impl From<MixResult> for PlaybackBuffers {
    fn from(mix: MixResult) -> Self {
        Self {
            stems: Some(mix.stems),
            click: mix.click,
            count_in: mix.count_in,
        }
    }
}

/// What a scheduled source is playing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceRole {
    Stems,
    Click,
    CountIn,
}

/// A source started by the current session
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveSource {
    pub id: SourceId,
    pub role: SourceRole,
    /// Session generation the source belongs to
    pub generation: u64,
    /// Device time the source was scheduled at
    pub started_at: f64,
    pub gain: f32,
}

/// Live playback state
///
/// `generation` changes every time the session's sources are torn down.
/// Every source is tagged with the generation that started it, and an end
/// event only drives the state machine when its source's generation is the
/// current one.
#[derive(Debug, Clone, Default)]
pub struct PlaybackSession {
    phase: PlaybackPhase,
    generation: u64,
    /// Device time at which playback position 0 is (or would have been) heard
    origin: f64,
    paused_at: f64,
    count_in_origin: f64,
    sources: Vec<ActiveSource>,
    /// Stopped sources whose end event has not arrived yet
    retired: Vec<ActiveSource>,
}

impl PlaybackSession {
    #[inline]
    pub fn phase(&self) -> PlaybackPhase {
        self.phase
    }

    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[inline]
    pub fn origin(&self) -> f64 {
        self.origin
    }

    #[inline]
    pub fn paused_at(&self) -> f64 {
        self.paused_at
    }

    pub fn active_sources(&self) -> &[ActiveSource] {
        &self.sources
    }

    /// Remove the source an end event refers to, current or retired
    fn take_source(&mut self, id: SourceId) -> Option<ActiveSource> {
        if let Some(index) = self.sources.iter().position(|s| s.id == id) {
            return Some(self.sources.remove(index));
        }
        let index = self.retired.iter().position(|s| s.id == id)?;
        Some(self.retired.remove(index))
    }
}

/// Snapshot for the UI
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackStatus {
    pub phase: PlaybackPhase,
    /// Seconds into the song
    pub elapsed: f64,
    /// Seconds
    pub total: f64,
}

impl PlaybackStatus {
    /// `"Count-in..."` or `"M:SS / M:SS"`
    pub fn label(&self) -> String {
        match self.phase {
            PlaybackPhase::CountIn => COUNT_IN_LABEL.to_string(),
            _ => format!("{} / {}", format_time(self.elapsed), format_time(self.total)),
        }
    }

    /// Fraction of the song played, 0.0-1.0
    pub fn progress(&self) -> f64 {
        if self.total > 0.0 {
            (self.elapsed / self.total).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    /// Pixel column of the progress indicator on a `width` wide waveform
    pub fn indicator_x(&self, width: usize) -> usize {
        waveform::indicator_x(self.elapsed, self.total, width)
    }

    /// Whether the indicator needs redrawing every frame
    pub fn is_animating(&self) -> bool {
        matches!(self.phase, PlaybackPhase::CountIn | PlaybackPhase::Playing)
    }
}

/// Synchronized playback of stems, click and count-in on one output
///
/// Single-threaded: the owner calls [`tick`](Self::tick) from its UI loop to
/// process source end events.
pub struct PlaybackScheduler<D: OutputDevice> {
    device: D,
    buffers: PlaybackBuffers,
    session: PlaybackSession,
    click_muted: bool,
    count_in_enabled: bool,
}

impl<D: OutputDevice> PlaybackScheduler<D> {
    pub fn new(device: D) -> Self {
        Self {
            device,
            buffers: PlaybackBuffers::default(),
            session: PlaybackSession::default(),
            click_muted: false,
            count_in_enabled: false,
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn session(&self) -> &PlaybackSession {
        &self.session
    }

    #[inline]
    pub fn phase(&self) -> PlaybackPhase {
        self.session.phase
    }

    pub fn total_duration(&self) -> f64 {
        self.buffers.total_duration()
    }

    #[inline]
    pub fn paused_at(&self) -> f64 {
        self.session.paused_at
    }

    #[inline]
    pub fn click_muted(&self) -> bool {
        self.click_muted
    }

    #[inline]
    pub fn count_in_enabled(&self) -> bool {
        self.count_in_enabled
    }

    /// Current playback position in seconds
    ///
    /// Zero during the count-in, which is not part of the timeline.
    pub fn elapsed(&self) -> f64 {
        match self.session.phase {
            PlaybackPhase::Playing => (self.device.now() - self.session.origin).clamp(0.0, self.total_duration()),
            PlaybackPhase::CountIn => 0.0,
            _ => self.session.paused_at,
        }
    }

    pub fn status(&self) -> PlaybackStatus {
        PlaybackStatus {
            phase: self.session.phase,
            elapsed: self.elapsed(),
            total: self.total_duration(),
        }
    }

    /// Replace the buffers after a rebuild
    ///
    /// Running playback is stopped. A paused position survives unless the new
    /// timeline is shorter than it.
    pub fn load(&mut self, buffers: impl Into<PlaybackBuffers>) {
        let buffers = buffers.into();
        let total = buffers.total_duration();

        match self.session.phase {
            PlaybackPhase::CountIn | PlaybackPhase::Playing => {
                self.stop_all();
                self.set_position(0.0);
                log::info!("Playback stopped for rebuild");
            }
            PlaybackPhase::Paused if self.session.paused_at <= total => {}
            PlaybackPhase::Paused | PlaybackPhase::Ended => self.set_position(0.0),
            PlaybackPhase::Idle => {}
        }

        self.buffers = buffers;
    }

    /// Replace the buffers after a take's offset changed by `shift_seconds`
    ///
    /// Running playback is paused. A paused position moves by `-shift_seconds`
    /// so the same audio stays under the playhead, and falls back to 0 when
    /// that lands outside the new timeline.
    pub fn load_shifted(&mut self, buffers: impl Into<PlaybackBuffers>, shift_seconds: f64) {
        self.pause();
        let buffers = buffers.into();
        let total = buffers.total_duration();
        let previous = self.session.paused_at;
        self.buffers = buffers;

        let shifted = previous - shift_seconds;
        let position = if previous > 0.0 && (0.0..=total).contains(&shifted) {
            shifted
        } else {
            0.0
        };
        self.set_position(position);
        log::debug!(
            "Offset changed by {:+.3}s, position {} -> {}",
            shift_seconds,
            format_time(previous),
            format_time(position)
        );
    }

    /// Start or resume playback
    ///
    /// The count-in only plays when starting from position 0. Resuming with
    /// less than [`END_TOLERANCE_SECONDS`] left starts over from 0.
    ///
    /// On error no source is left running and the session is `Idle` or
    /// `Paused` at its previous position.
    pub fn play(&mut self) -> PlaybackResult<()> {
        if matches!(self.session.phase, PlaybackPhase::CountIn | PlaybackPhase::Playing) {
            return Ok(());
        }
        if self.buffers.is_empty() {
            return Err(PlaybackError::NothingToPlay);
        }
        self.device.resume()?;
        self.check_sample_rate()?;

        let mut position = self.session.paused_at;
        if self.total_duration() - position <= END_TOLERANCE_SECONDS {
            position = 0.0;
        }

        let now = self.device.now();
        match self.buffers.count_in.clone() {
            Some(count_in) if position <= 0.0 && self.count_in_enabled => {
                let id = match self.device.start_source(SourceRequest {
                    buffer: count_in,
                    start_at: now,
                    offset: 0.0,
                    gain: 1.0,
                }) {
                    Ok(id) => id,
                    Err(e) => {
                        self.abort(self.session.paused_at);
                        return Err(e.into());
                    }
                };
                self.session.sources.push(ActiveSource {
                    id,
                    role: SourceRole::CountIn,
                    generation: self.session.generation,
                    started_at: now,
                    gain: 1.0,
                });
                self.session.count_in_origin = now;
                self.session.paused_at = 0.0;
                self.session.phase = PlaybackPhase::CountIn;
                log::info!("Count-in started");
                Ok(())
            }
            _ => {
                let previous = self.session.paused_at;
                self.start_main(now, position, previous)?;
                if position > 0.0 {
                    log::info!("Playback resumed at {}", format_time(position));
                } else {
                    log::info!("Playback started");
                }
                Ok(())
            }
        }
    }

    /// Pause playback
    ///
    /// Pausing during the count-in discards it: the position stays at 0.
    pub fn pause(&mut self) {
        match self.session.phase {
            PlaybackPhase::CountIn => {
                self.stop_all();
                self.session.paused_at = 0.0;
                self.session.phase = PlaybackPhase::Paused;
                log::info!("Count-in cancelled");
            }
            PlaybackPhase::Playing => {
                let position = self.elapsed();
                self.stop_all();
                self.session.paused_at = position;
                self.session.phase = PlaybackPhase::Paused;
                log::info!("Playback paused at {}", format_time(position));
            }
            _ => {}
        }
    }

    /// Play/pause toggle
    pub fn toggle(&mut self) -> PlaybackResult<()> {
        if self.status().is_animating() {
            self.pause();
            Ok(())
        } else {
            self.play()
        }
    }

    /// Stop everything and return to the start
    pub fn reset(&mut self) {
        self.stop_all();
        self.session.paused_at = 0.0;
        self.session.phase = PlaybackPhase::Idle;
        log::info!("Playback reset");
    }

    /// Move the playback position, clamped to the song
    ///
    /// While playing, both main sources restart together at the new position.
    /// Otherwise the position is stored for the next [`play`](Self::play); a
    /// running count-in is abandoned.
    pub fn seek(&mut self, seconds: f64) -> PlaybackResult<()> {
        let target = if seconds.is_finite() {
            seconds.clamp(0.0, self.total_duration())
        } else {
            0.0
        };

        match self.session.phase {
            PlaybackPhase::Playing => {
                self.stop_all();
                let now = self.device.now();
                self.start_main(now, target, target)?;
                log::debug!("Seeked to {}", format_time(target));
            }
            _ => {
                self.stop_all();
                self.set_position(target);
            }
        }
        Ok(())
    }

    /// Mute or unmute the click track
    ///
    /// A running click source only has its gain changed; nothing restarts.
    pub fn set_click_muted(&mut self, muted: bool) {
        self.click_muted = muted;
        let gain = self.click_gain();
        if let Some(index) = self.session.sources.iter().position(|s| s.role == SourceRole::Click) {
            let source = &mut self.session.sources[index];
            source.gain = gain;
            self.device.set_gain(source.id, gain);
        }
    }

    /// Enable or disable the count-in for the next start from 0
    ///
    /// Disabling it while it plays pauses at position 0.
    pub fn set_count_in_enabled(&mut self, enabled: bool) {
        self.count_in_enabled = enabled;
        if !enabled && self.session.phase == PlaybackPhase::CountIn {
            self.pause();
        }
    }

    /// Process pending output events
    ///
    /// Call once per UI frame. Starts the main sources when the count-in ends
    /// and detects the natural end of playback. If the main sources cannot be
    /// started after a count-in, the session goes back to `Idle`.
    ///
    /// The end is also declared from the clock alone once the whole timeline
    /// has played, so a lost or dropped end event cannot keep playback running.
    pub fn tick(&mut self) -> PlaybackResult<()> {
        while let Some(event) = self.device.poll_event() {
            let OutputEvent::SourceEnded { id, reason } = event;

            let Some(source) = self.session.take_source(id) else {
                log::debug!("Ignoring end of unknown source {}", id);
                continue;
            };
            if source.generation != self.session.generation {
                log::debug!(
                    "Ignoring end of {:?} source {} from generation {} (now {})",
                    source.role,
                    id,
                    source.generation,
                    self.session.generation
                );
                continue;
            }

            match (self.session.phase, source.role) {
                (PlaybackPhase::CountIn, SourceRole::CountIn) if reason == EndReason::Finished => {
                    let start_at = self.session.count_in_origin + self.count_in_duration();
                    self.start_main(start_at, 0.0, 0.0)?;
                    log::info!("Count-in finished, playback started");
                }
                (PlaybackPhase::Playing, role) if Some(role) == self.buffers.primary() => {
                    let elapsed = self.device.now() - self.session.origin;
                    if elapsed >= self.total_duration() - END_TOLERANCE_SECONDS {
                        self.finish();
                    } else {
                        log::debug!("{:?} source stopped early at {:.3}s ({:?})", role, elapsed, reason);
                    }
                }
                (_, role) => {
                    log::debug!("{:?} source stopped early ({:?})", role, reason);
                }
            }
        }

        if self.session.phase == PlaybackPhase::Playing
            && self.device.now() - self.session.origin >= self.total_duration()
        {
            log::debug!("Timeline played out without an end event");
            self.finish();
        }
        Ok(())
    }

    /// Start stems and click so that `position` is heard at `start_at`
    ///
    /// On failure everything is stopped and the session is parked at
    /// `fallback_position`.
    fn start_main(&mut self, start_at: f64, position: f64, fallback_position: f64) -> PlaybackResult<()> {
        let click_gain = self.click_gain();
        let requests = [
            (SourceRole::Stems, self.buffers.stems.clone(), 1.0),
            (SourceRole::Click, self.buffers.click.clone(), click_gain),
        ];

        for (role, buffer, gain) in requests {
            let Some(buffer) = buffer else { continue };
            let request = SourceRequest {
                buffer,
                start_at,
                offset: position,
                gain,
            };
            match self.device.start_source(request) {
                Ok(id) => self.session.sources.push(ActiveSource {
                    id,
                    role,
                    generation: self.session.generation,
                    started_at: start_at,
                    gain,
                }),
                Err(e) => {
                    log::error!("Failed to start {:?} source: {}", role, e);
                    self.abort(fallback_position);
                    return Err(e.into());
                }
            }
        }

        self.session.origin = start_at - position;
        self.session.paused_at = position;
        self.session.phase = PlaybackPhase::Playing;
        Ok(())
    }

    /// Natural end: everything stops and the position sits at the end
    fn finish(&mut self) {
        let total = self.total_duration();
        self.stop_all();
        self.session.paused_at = total;
        self.session.phase = PlaybackPhase::Ended;
        log::info!("Playback ended at {}", format_time(total));
    }

    /// Every loaded buffer must run at the device rate
    fn check_sample_rate(&self) -> PlaybackResult<()> {
        let device = self.device.sample_rate();
        let buffers = [&self.buffers.stems, &self.buffers.click, &self.buffers.count_in];
        match buffers.into_iter().flatten().find(|b| b.sample_rate() != device) {
            Some(buffer) => {
                log::error!(
                    "Loaded buffers are at {}Hz but the output runs at {}Hz",
                    buffer.sample_rate(),
                    device
                );
                Err(AudioError::SampleRateMismatch {
                    buffer: buffer.sample_rate(),
                    device,
                }
                .into())
            }
            None => Ok(()),
        }
    }

    /// Tear down after a failed start, leaving no source behind
    fn abort(&mut self, position: f64) {
        self.stop_all();
        self.set_position(position);
    }

    /// Park the session at `position`: `Paused` when past the start, else `Idle`
    fn set_position(&mut self, position: f64) {
        self.session.paused_at = position;
        self.session.phase = if position > 0.0 {
            PlaybackPhase::Paused
        } else {
            PlaybackPhase::Idle
        };
    }

    fn stop_all(&mut self) {
        for source in self.session.sources.drain(..) {
            self.device.stop_source(source.id);
            self.session.retired.push(source);
        }
        let excess = self.session.retired.len().saturating_sub(MAX_RETIRED_SOURCES);
        self.session.retired.drain(..excess);
        self.session.generation += 1;
    }

    fn click_gain(&self) -> f32 {
        if self.click_muted {
            0.0
        } else {
            1.0
        }
    }

    fn count_in_duration(&self) -> f64 {
        self.buffers
            .count_in
            .as_ref()
            .map(|b| b.duration_seconds())
            .unwrap_or(0.0)
    }

    #[cfg(test)]
    fn source_id(&self, role: SourceRole) -> Option<SourceId> {
        self.session.sources.iter().find(|s| s.role == role).map(|s| s.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioResult, OfflineOutput, MAX_VOICES};
    use crate::types::StereoSample;

    const SR: u32 = 1000;

    fn constant(value: f32, frames: usize) -> Arc<SampleBuffer> {
        Arc::new(SampleBuffer::from_channels(vec![vec![value; frames]], SR).unwrap())
    }

    /// 3 s of stems at 0.5, 3 s of click at 0.25, 2 s of count-in at 0.1
    fn buffers() -> PlaybackBuffers {
        PlaybackBuffers {
            stems: Some(constant(0.5, 3000)),
            click: Some(constant(0.25, 3000)),
            count_in: Some(constant(0.1, 2000)),
        }
    }

    fn scheduler() -> PlaybackScheduler<OfflineOutput> {
        let mut scheduler = PlaybackScheduler::new(OfflineOutput::with_block_size(SR, 10));
        scheduler.load(buffers());
        scheduler
    }

    fn advance(scheduler: &mut PlaybackScheduler<OfflineOutput>, seconds: f64) {
        scheduler.device_mut().advance(seconds);
        scheduler.tick().unwrap();
    }

    fn heard(scheduler: &PlaybackScheduler<OfflineOutput>) -> StereoSample {
        scheduler.device().last_block()[0]
    }

    /// Offline output whose `start_source` fails after a number of successes
    struct FlakyOutput {
        inner: OfflineOutput,
        starts_left: usize,
    }

    impl OutputDevice for FlakyOutput {
        fn sample_rate(&self) -> u32 {
            self.inner.sample_rate()
        }

        fn now(&self) -> f64 {
            self.inner.now()
        }

        fn start_source(&mut self, request: SourceRequest) -> AudioResult<SourceId> {
            if self.starts_left == 0 {
                return Err(AudioError::CommandQueueFull);
            }
            self.starts_left -= 1;
            self.inner.start_source(request)
        }

        fn stop_source(&mut self, id: SourceId) {
            self.inner.stop_source(id)
        }

        fn set_gain(&mut self, id: SourceId, gain: f32) {
            self.inner.set_gain(id, gain)
        }

        fn poll_event(&mut self) -> Option<OutputEvent> {
            self.inner.poll_event()
        }
    }

    fn flaky(starts_left: usize) -> PlaybackScheduler<FlakyOutput> {
        let mut scheduler = PlaybackScheduler::new(FlakyOutput {
            inner: OfflineOutput::with_block_size(SR, 10),
            starts_left,
        });
        scheduler.load(buffers());
        scheduler
    }

    #[test]
    fn test_play_starts_stems_and_click_together() {
        let mut s = scheduler();
        s.play().unwrap();
        assert_eq!(s.phase(), PlaybackPhase::Playing);

        let voices = s.device().active_sources();
        assert_eq!(voices.len(), 2);
        assert_eq!(voices[0].start_frame, voices[1].start_frame);
        assert_eq!(voices[0].offset_frames, voices[1].offset_frames);

        advance(&mut s, 1.0);
        assert!((s.elapsed() - 1.0).abs() < 1e-9);
        assert_eq!(heard(&s), StereoSample::mono(0.75));
    }

    #[test]
    fn test_count_in_precedes_playback() {
        let mut s = scheduler();
        s.set_count_in_enabled(true);
        s.play().unwrap();
        assert_eq!(s.phase(), PlaybackPhase::CountIn);
        assert_eq!(s.status().label(), "Count-in...");
        assert!(s.status().is_animating());

        advance(&mut s, 1.99);
        assert_eq!(s.phase(), PlaybackPhase::CountIn);
        assert_eq!(s.elapsed(), 0.0);
        assert_eq!(heard(&s), StereoSample::mono(0.1));

        advance(&mut s, 0.01);
        assert_eq!(s.phase(), PlaybackPhase::Playing);
        assert!((s.session().origin() - 2.0).abs() < 1e-9);
        assert!(s.elapsed().abs() < 1e-9);

        advance(&mut s, 0.5);
        assert!((s.elapsed() - 0.5).abs() < 1e-9);
        assert_eq!(heard(&s), StereoSample::mono(0.75));
    }

    #[test]
    fn test_pause_during_count_in_keeps_position_at_zero() {
        let mut s = scheduler();
        s.set_count_in_enabled(true);
        s.play().unwrap();
        advance(&mut s, 1.0);
        s.pause();

        assert_eq!(s.phase(), PlaybackPhase::Paused);
        assert_eq!(s.paused_at(), 0.0);
        assert!(s.device().active_sources().is_empty());
        assert!(!s.status().is_animating());

        // the cancelled count-in's end event must not start playback
        advance(&mut s, 2.0);
        assert_eq!(s.phase(), PlaybackPhase::Paused);

        s.play().unwrap();
        assert_eq!(s.phase(), PlaybackPhase::CountIn);
    }

    #[test]
    fn test_resume_skips_count_in() {
        let mut s = scheduler();
        s.play().unwrap();
        advance(&mut s, 1.0);
        s.pause();
        assert!((s.paused_at() - 1.0).abs() < 1e-9);

        s.set_count_in_enabled(true);
        advance(&mut s, 0.5);
        s.play().unwrap();
        assert_eq!(s.phase(), PlaybackPhase::Playing);
        assert!((s.elapsed() - 1.0).abs() < 1e-9);
        for voice in s.device().active_sources() {
            assert_eq!(voice.offset_frames, 1000);
            assert_eq!(voice.start_frame, 1500);
        }

        advance(&mut s, 0.5);
        assert!((s.elapsed() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_natural_end_then_replay() {
        let mut s = scheduler();
        s.play().unwrap();
        advance(&mut s, 3.0);

        assert_eq!(s.phase(), PlaybackPhase::Ended);
        assert!((s.paused_at() - 3.0).abs() < 1e-9);
        assert!(s.session().active_sources().is_empty());
        assert_eq!(s.status().label(), "0:03 / 0:03");
        assert_eq!(s.status().progress(), 1.0);

        s.play().unwrap();
        assert_eq!(s.phase(), PlaybackPhase::Playing);
        assert!(s.elapsed().abs() < 1e-9);
    }

    #[test]
    fn test_resume_near_end_restarts() {
        let mut s = scheduler();
        s.play().unwrap();
        advance(&mut s, 2.95);
        s.pause();
        s.play().unwrap();
        assert!(s.elapsed().abs() < 1e-9);
    }

    #[test]
    fn test_click_mute_is_a_live_gain_change() {
        let mut s = scheduler();
        s.play().unwrap();
        advance(&mut s, 0.5);
        let before = s.device().active_sources();
        let generation = s.session().generation();

        s.set_click_muted(true);
        let after = s.device().active_sources();
        assert_eq!(before.len(), after.len());
        for (b, a) in before.iter().zip(&after) {
            assert_eq!(b.id, a.id);
            assert_eq!(b.start_frame, a.start_frame);
            assert_eq!(b.offset_frames, a.offset_frames);
        }
        let click = s.source_id(SourceRole::Click).unwrap();
        assert_eq!(after.iter().find(|v| v.id == click).map(|v| v.gain), Some(0.0));
        assert_eq!(s.session().generation(), generation);

        advance(&mut s, 0.5);
        assert_eq!(heard(&s), StereoSample::mono(0.5));
        assert!((s.elapsed() - 1.0).abs() < 1e-9);

        s.set_click_muted(false);
        advance(&mut s, 0.1);
        assert_eq!(heard(&s), StereoSample::mono(0.75));
    }

    #[test]
    fn test_muted_click_starts_silent() {
        let mut s = scheduler();
        s.set_click_muted(true);
        s.play().unwrap();
        advance(&mut s, 0.1);
        assert_eq!(heard(&s), StereoSample::mono(0.5));
    }

    #[test]
    fn test_stale_stop_events_are_ignored() {
        let mut s = scheduler();
        s.play().unwrap();
        let first_generation = s.session().generation();
        advance(&mut s, 0.5);
        s.pause();
        s.play().unwrap();
        assert_eq!(s.session().retired.len(), 2);
        assert!(s.session().retired.iter().all(|r| r.generation == first_generation));
        assert!(s
            .session()
            .active_sources()
            .iter()
            .all(|a| a.generation == s.session().generation() && a.generation > first_generation));

        // the pause queued Stopped events for the previous sources
        advance(&mut s, 0.1);
        assert_eq!(s.phase(), PlaybackPhase::Playing);
        assert_eq!(s.device().active_sources().len(), 2);
        assert!(s.session().retired.is_empty());
    }

    #[test]
    fn test_end_detected_without_end_event() {
        let mut s = scheduler();
        let filler = constant(0.0, 20_000);
        for _ in 0..MAX_VOICES {
            s.device_mut()
                .start_source(SourceRequest {
                    buffer: Arc::clone(&filler),
                    start_at: 0.0,
                    offset: 0.0,
                    gain: 1.0,
                })
                .unwrap();
        }

        // the full voice pool drops both main sources straight away
        s.play().unwrap();
        advance(&mut s, 0.1);
        assert_eq!(s.phase(), PlaybackPhase::Playing);
        assert!(s.session().active_sources().is_empty());

        advance(&mut s, 2.8);
        assert_eq!(s.phase(), PlaybackPhase::Playing);

        advance(&mut s, 0.1);
        assert_eq!(s.phase(), PlaybackPhase::Ended);
        assert!((s.paused_at() - 3.0).abs() < 1e-9);
        assert!(!s.status().is_animating());
    }

    #[test]
    fn test_click_mute_during_count_in() {
        for muted_at_handoff in [true, false] {
            let mut s = scheduler();
            s.set_count_in_enabled(true);
            s.play().unwrap();
            advance(&mut s, 0.5);
            let count_in = s.device().active_sources();
            assert_eq!(count_in.len(), 1);

            s.set_click_muted(true);
            assert_eq!(s.phase(), PlaybackPhase::CountIn);
            assert_eq!(s.device().active_sources(), count_in);
            advance(&mut s, 0.5);
            assert_eq!(heard(&s), StereoSample::mono(0.1));

            s.set_click_muted(muted_at_handoff);
            assert_eq!(s.device().active_sources(), count_in);
            assert_eq!(s.session().active_sources()[0].gain, 1.0);

            advance(&mut s, 1.0);
            assert_eq!(s.phase(), PlaybackPhase::Playing);
            let click = s.source_id(SourceRole::Click).unwrap();
            let expected_gain = if muted_at_handoff { 0.0 } else { 1.0 };
            let voices = s.device().active_sources();
            assert_eq!(voices.iter().find(|v| v.id == click).map(|v| v.gain), Some(expected_gain));

            advance(&mut s, 0.1);
            let expected = if muted_at_handoff { 0.5 } else { 0.75 };
            assert_eq!(heard(&s), StereoSample::mono(expected));
        }
    }

    #[test]
    fn test_load_shifted_moves_paused_position() {
        let mut s = scheduler();
        s.play().unwrap();
        advance(&mut s, 1.0);
        s.pause();

        // later offset trims the take, so the same audio is heard earlier
        s.load_shifted(buffers(), 0.25);
        assert_eq!(s.phase(), PlaybackPhase::Paused);
        assert!((s.paused_at() - 0.75).abs() < 1e-9);

        s.load_shifted(buffers(), -0.5);
        assert!((s.paused_at() - 1.25).abs() < 1e-9);

        // playing: paused first, then shifted
        s.play().unwrap();
        advance(&mut s, 0.5);
        s.load_shifted(buffers(), 1.0);
        assert_eq!(s.phase(), PlaybackPhase::Paused);
        assert!((s.paused_at() - 0.75).abs() < 1e-9);
        assert!(s.device().active_sources().is_empty());
    }

    #[test]
    fn test_load_shifted_outside_timeline_resets() {
        let mut s = scheduler();
        s.seek(1.0).unwrap();
        s.load_shifted(buffers(), 2.0);
        assert_eq!(s.phase(), PlaybackPhase::Idle);
        assert_eq!(s.paused_at(), 0.0);

        s.seek(1.0).unwrap();
        s.load_shifted(buffers(), -2.5);
        assert_eq!(s.phase(), PlaybackPhase::Idle);
        assert_eq!(s.paused_at(), 0.0);

        // nothing to move from the start
        s.load_shifted(buffers(), -1.0);
        assert_eq!(s.phase(), PlaybackPhase::Idle);
        assert_eq!(s.paused_at(), 0.0);
    }

    #[test]
    fn test_sample_rate_mismatch_starts_nothing() {
        let mut s = PlaybackScheduler::new(OfflineOutput::with_block_size(2 * SR, 10));
        s.load(buffers());
        let result = s.play();
        assert_eq!(
            result,
            Err(PlaybackError::Audio(AudioError::SampleRateMismatch {
                buffer: SR,
                device: 2 * SR,
            }))
        );
        assert_eq!(s.phase(), PlaybackPhase::Idle);
        assert!(s.device().active_sources().is_empty());
    }

    #[test]
    fn test_reset_returns_to_start() {
        let mut s = scheduler();
        s.play().unwrap();
        advance(&mut s, 1.2);
        s.reset();
        assert_eq!(s.phase(), PlaybackPhase::Idle);
        assert_eq!(s.paused_at(), 0.0);
        assert_eq!(s.status().indicator_x(300), 0);
        assert!(s.device().active_sources().is_empty());
    }

    #[test]
    fn test_load_while_paused() {
        let mut s = scheduler();
        s.play().unwrap();
        advance(&mut s, 1.0);
        s.pause();

        s.load(buffers());
        assert_eq!(s.phase(), PlaybackPhase::Paused);
        assert!((s.paused_at() - 1.0).abs() < 1e-9);

        s.load(PlaybackBuffers {
            stems: Some(constant(0.5, 500)),
            ..Default::default()
        });
        assert_eq!(s.phase(), PlaybackPhase::Idle);
        assert_eq!(s.paused_at(), 0.0);
    }

    #[test]
    fn test_load_while_playing_stops() {
        let mut s = scheduler();
        s.play().unwrap();
        advance(&mut s, 1.0);
        s.load(buffers());
        assert_eq!(s.phase(), PlaybackPhase::Idle);
        assert!(s.device().active_sources().is_empty());
    }

    #[test]
    fn test_seek() {
        let mut s = scheduler();
        s.seek(1.5).unwrap();
        assert_eq!(s.phase(), PlaybackPhase::Paused);
        assert!((s.paused_at() - 1.5).abs() < 1e-9);

        s.seek(-3.0).unwrap();
        assert_eq!(s.phase(), PlaybackPhase::Idle);
        s.seek(99.0).unwrap();
        assert!((s.paused_at() - 3.0).abs() < 1e-9);

        s.seek(0.0).unwrap();
        s.play().unwrap();
        advance(&mut s, 0.5);
        s.seek(2.0).unwrap();
        assert_eq!(s.phase(), PlaybackPhase::Playing);
        assert!((s.elapsed() - 2.0).abs() < 1e-9);
        let voices = s.device().active_sources();
        assert_eq!(voices.len(), 2);
        assert!(voices.iter().all(|v| v.offset_frames == 2000 && v.start_frame == 500));
    }

    #[test]
    fn test_disabling_count_in_while_counting_pauses() {
        let mut s = scheduler();
        s.set_count_in_enabled(true);
        s.play().unwrap();
        s.set_count_in_enabled(false);
        assert_eq!(s.phase(), PlaybackPhase::Paused);
        assert_eq!(s.paused_at(), 0.0);
        s.play().unwrap();
        assert_eq!(s.phase(), PlaybackPhase::Playing);
    }

    #[test]
    fn test_click_only_playback_ends() {
        let mut s = PlaybackScheduler::new(OfflineOutput::with_block_size(SR, 10));
        s.load(PlaybackBuffers {
            click: Some(constant(0.25, 1000)),
            ..Default::default()
        });
        s.play().unwrap();
        advance(&mut s, 1.0);
        assert_eq!(s.phase(), PlaybackPhase::Ended);
    }

    #[test]
    fn test_nothing_to_play() {
        let mut s = PlaybackScheduler::new(OfflineOutput::new(SR));
        assert_eq!(s.play(), Err(PlaybackError::NothingToPlay));
        assert_eq!(s.phase(), PlaybackPhase::Idle);
    }

    #[test]
    fn test_failed_start_leaves_no_sources() {
        let mut s = flaky(1);
        let result = s.play();
        assert_eq!(result, Err(PlaybackError::Audio(AudioError::CommandQueueFull)));
        assert_eq!(s.phase(), PlaybackPhase::Idle);
        assert!(s.session().active_sources().is_empty());
        assert!(s.device().inner.active_sources().is_empty());
    }

    #[test]
    fn test_failed_start_after_count_in_goes_idle() {
        let mut s = flaky(1);
        s.set_count_in_enabled(true);
        s.play().unwrap();
        s.device_mut().inner.advance(2.0);
        assert!(s.tick().is_err());
        assert_eq!(s.phase(), PlaybackPhase::Idle);
        assert!(s.device().inner.active_sources().is_empty());
    }

    #[test]
    fn test_status_label() {
        let status = PlaybackStatus {
            phase: PlaybackPhase::Paused,
            elapsed: 65.7,
            total: 125.0,
        };
        assert_eq!(status.label(), "1:05 / 2:05");
        assert!((status.progress() - 65.7 / 125.0).abs() < 1e-12);
        assert_eq!(status.indicator_x(125), 66);
        assert!(!status.is_animating());
    }
}
