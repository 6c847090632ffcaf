//! Offline output device
//!
//! Runs the same [`OutputRenderer`] as the realtime backend, but the clock only
//! moves when the caller renders frames. Used to render a playback session to
//! a file and to exercise the scheduler deterministically.

use std::collections::VecDeque;

use basedrop::Shared;

use super::error::{AudioError, AudioResult};
use super::gc::gc_handle;
use super::output::{OutputDevice, OutputEvent, SourceId, SourceRequest};
use super::renderer::{OutputRenderer, RendererCommand, VoiceInfo};
use crate::types::{seconds_to_frames, StereoSample};

/// Block size used when none is given (frames)
pub const DEFAULT_OFFLINE_BLOCK: usize = 512;

/// Output device driven by explicit rendering calls
pub struct OfflineOutput {
    sample_rate: u32,
    renderer: OutputRenderer,
    events: VecDeque<OutputEvent>,
    next_id: SourceId,
    block: Vec<StereoSample>,
    captured: Option<Vec<StereoSample>>,
}

impl OfflineOutput {
    pub fn new(sample_rate: u32) -> Self {
        Self::with_block_size(sample_rate, DEFAULT_OFFLINE_BLOCK)
    }

    /// Render in blocks of `block_size` frames (events surface per block)
    pub fn with_block_size(sample_rate: u32, block_size: usize) -> Self {
        assert!(sample_rate > 0, "Sample rate must be non-zero");
        Self {
            sample_rate,
            renderer: OutputRenderer::new(),
            events: VecDeque::new(),
            next_id: 1,
            block: vec![StereoSample::silence(); block_size.max(1)],
            captured: None,
        }
    }

    /// Keep every rendered frame for [`take_captured`](Self::take_captured)
    pub fn capturing(mut self) -> Self {
        self.captured = Some(Vec::new());
        self
    }

    /// Render at least `frames` frames, rounded up to whole blocks
    pub fn render_frames(&mut self, frames: usize) {
        let block_size = self.block.len();
        let mut remaining = frames;
        while remaining > 0 {
            let events = &mut self.events;
            self.renderer
                .render(&mut self.block, &mut |event| events.push_back(event));
            if let Some(captured) = self.captured.as_mut() {
                captured.extend_from_slice(&self.block);
            }
            remaining = remaining.saturating_sub(block_size);
        }
    }

    /// Advance the clock by `seconds` (rounded up to whole blocks)
    pub fn advance(&mut self, seconds: f64) {
        self.render_frames(seconds_to_frames(seconds, self.sample_rate) as usize);
    }

    /// Output of the most recent block
    pub fn last_block(&self) -> &[StereoSample] {
        &self.block
    }

    /// Frames rendered so far
    pub fn frames_rendered(&self) -> u64 {
        self.renderer.clock()
    }

    /// Currently playing sources
    pub fn active_sources(&self) -> Vec<VoiceInfo> {
        self.renderer.voices().collect()
    }

    /// Everything rendered since capturing started
    pub fn take_captured(&mut self) -> Vec<StereoSample> {
        self.captured.as_mut().map(std::mem::take).unwrap_or_default()
    }

    fn apply(&mut self, command: RendererCommand) {
        let events = &mut self.events;
        self.renderer.apply(command, &mut |event| events.push_back(event));
    }
}

impl OutputDevice for OfflineOutput {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn now(&self) -> f64 {
        self.renderer.clock() as f64 / self.sample_rate as f64
    }

    fn start_source(&mut self, request: SourceRequest) -> AudioResult<SourceId> {
        if request.buffer.sample_rate() != self.sample_rate {
            return Err(AudioError::SampleRateMismatch {
                buffer: request.buffer.sample_rate(),
                device: self.sample_rate,
            });
        }

        let id = self.next_id;
        self.next_id += 1;
        self.apply(RendererCommand::Start {
            id,
            buffer: Shared::new(&gc_handle(), request.buffer),
            start_frame: seconds_to_frames(request.start_at, self.sample_rate),
            offset_frames: seconds_to_frames(request.offset, self.sample_rate),
            gain: request.gain,
        });
        Ok(id)
    }

    fn stop_source(&mut self, id: SourceId) {
        self.apply(RendererCommand::Stop { id });
    }

    fn set_gain(&mut self, id: SourceId, gain: f32) {
        self.apply(RendererCommand::SetGain { id, gain });
    }

    fn poll_event(&mut self) -> Option<OutputEvent> {
        self.events.pop_front()
    }
}
