//! Output device abstraction used by the playback scheduler
//!
//! An output device exposes a monotonic clock and plays any number of
//! buffer "sources", each starting at an absolute device time with an
//! offset into its buffer. Sources with the same `start_at` and `offset`
//! begin on the same output frame.
//!
//! Every source reports exactly one [`OutputEvent::SourceEnded`], either when
//! it runs off the end of its buffer or when it is stopped. The two are told
//! apart by [`EndReason`], but the scheduler still checks its own clock before
//! trusting a natural end.

use std::sync::Arc;

use super::error::AudioResult;
use crate::types::SampleBuffer;

/// Handle of a started source, unique per device
pub type SourceId = u64;

/// A buffer to schedule on the output
#[derive(Debug, Clone)]
pub struct SourceRequest {
    pub buffer: Arc<SampleBuffer>,
    /// Device time (seconds) at which the buffer's `offset` is heard.
    /// A time in the past starts the source part-way in, as if it had
    /// started on time.
    pub start_at: f64,
    /// Position in the buffer (seconds) heard at `start_at`
    pub offset: f64,
    /// Linear gain, changeable while the source plays
    pub gain: f32,
}

/// Why a source stopped producing audio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// Ran past the end of its buffer
    Finished,
    /// Stopped by request (or dropped because the voice pool was full)
    Stopped,
}

/// Notifications from the output back to the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputEvent {
    SourceEnded { id: SourceId, reason: EndReason },
}

/// An audio output the scheduler can drive
pub trait OutputDevice {
    /// Output sample rate; buffers must match it
    fn sample_rate(&self) -> u32;

    /// Current device clock in seconds
    fn now(&self) -> f64;

    /// Make sure audio is flowing (first user interaction)
    fn resume(&mut self) -> AudioResult<()> {
        Ok(())
    }

    /// Schedule a buffer
    fn start_source(&mut self, request: SourceRequest) -> AudioResult<SourceId>;

    /// Stop a source immediately; stopping an ended or unknown source is a no-op
    fn stop_source(&mut self, id: SourceId);

    /// Change a playing source's gain from the next audio block on
    fn set_gain(&mut self, id: SourceId, gain: f32);

    /// Next pending event, if any
    fn poll_event(&mut self) -> Option<OutputEvent>;
}
