//! Sample-accurate source renderer
//!
//! The mixing core shared by every output device. It owns a fixed pool of
//! voices and a frame clock, applies commands at block boundaries and sums
//! the active voices into a stereo block.
//!
//! A voice started at `start_frame` with `offset_frames` plays buffer frame
//! `offset_frames + (clock − start_frame)` at output frame `clock`. A start
//! frame that already passed therefore skips ahead instead of starting late,
//! which keeps every voice that shares a start frame in lock-step.
//!
//! Nothing here allocates or frees: the voice pool is pre-allocated and the
//! buffers are `basedrop::Shared`, so the last drop happens on the GC thread.

use std::sync::Arc;

use basedrop::Shared;

use super::output::{EndReason, OutputEvent, SourceId};
use crate::types::{SampleBuffer, StereoSample};

/// Maximum simultaneously playing sources
pub const MAX_VOICES: usize = 16;

/// Commands applied by the renderer at the start of a block
pub enum RendererCommand {
    /// Begin playing a buffer
    Start {
        id: SourceId,
        buffer: Shared<Arc<SampleBuffer>>,
        start_frame: u64,
        offset_frames: u64,
        gain: f32,
    },
    /// Stop a source now (no-op if it already ended)
    Stop { id: SourceId },
    /// Change a source's gain
    SetGain { id: SourceId, gain: f32 },
}

struct Voice {
    id: SourceId,
    buffer: Shared<Arc<SampleBuffer>>,
    start_frame: u64,
    offset_frames: u64,
    gain: f32,
}

/// Snapshot of a playing voice
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceInfo {
    pub id: SourceId,
    pub start_frame: u64,
    pub offset_frames: u64,
    pub gain: f32,
}

/// Voice pool plus frame clock
pub struct OutputRenderer {
    voices: Vec<Voice>,
    clock: u64,
}

impl Default for OutputRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputRenderer {
    pub fn new() -> Self {
        Self {
            voices: Vec::with_capacity(MAX_VOICES),
            clock: 0,
        }
    }

    /// Frames rendered so far (the output frame of the next block)
    #[inline]
    pub fn clock(&self) -> u64 {
        self.clock
    }

    #[inline]
    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    /// Currently playing voices
    pub fn voices(&self) -> impl Iterator<Item = VoiceInfo> + '_ {
        self.voices.iter().map(|v| VoiceInfo {
            id: v.id,
            start_frame: v.start_frame,
            offset_frames: v.offset_frames,
            gain: v.gain,
        })
    }

    /// Apply one command
    pub fn apply<F: FnMut(OutputEvent)>(&mut self, command: RendererCommand, emit: &mut F) {
        match command {
            RendererCommand::Start {
                id,
                buffer,
                start_frame,
                offset_frames,
                gain,
            } => {
                if self.voices.len() >= MAX_VOICES {
                    emit(OutputEvent::SourceEnded {
                        id,
                        reason: EndReason::Stopped,
                    });
                    return;
                }
                self.voices.push(Voice {
                    id,
                    buffer,
                    start_frame,
                    offset_frames,
                    gain,
                });
            }
            RendererCommand::Stop { id } => {
                if let Some(index) = self.voices.iter().position(|v| v.id == id) {
                    self.voices.swap_remove(index);
                    emit(OutputEvent::SourceEnded {
                        id,
                        reason: EndReason::Stopped,
                    });
                }
            }
            RendererCommand::SetGain { id, gain } => {
                if let Some(voice) = self.voices.iter_mut().find(|v| v.id == id) {
                    voice.gain = gain;
                }
            }
        }
    }

    /// Render one block into `out` (overwritten) and advance the clock
    pub fn render<F: FnMut(OutputEvent)>(&mut self, out: &mut [StereoSample], emit: &mut F) {
        out.fill(StereoSample::silence());
        let block_start = self.clock;

        let mut i = 0;
        while i < self.voices.len() {
            if render_voice(&self.voices[i], out, block_start) {
                let voice = self.voices.swap_remove(i);
                emit(OutputEvent::SourceEnded {
                    id: voice.id,
                    reason: EndReason::Finished,
                });
            } else {
                i += 1;
            }
        }

        self.clock += out.len() as u64;
    }
}

/// Add one voice into the block; returns true once the voice has run out
fn render_voice(voice: &Voice, out: &mut [StereoSample], block_start: u64) -> bool {
    let block_end = block_start + out.len() as u64;
    if block_end <= voice.start_frame {
        return false;
    }

    let buffer: &SampleBuffer = &voice.buffer;
    let len = buffer.frame_count() as u64;
    let first = voice.start_frame.saturating_sub(block_start) as usize;
    let mut position = voice.offset_frames + block_start.saturating_sub(voice.start_frame);

    for slot in &mut out[first..] {
        if position >= len {
            break;
        }
        *slot += buffer.frame(position as usize) * voice.gain;
        position += 1;
    }

    position >= len
}
