//! CPAL output backend
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐   RendererCommand   ┌─────────────────────┐
//! │ PlaybackScheduler│───push()───────────►│   Command Queue     │
//! │   (UI thread)    │                     │  (lock-free SPSC)   │
//! └──────────────────┘                     └──────────┬──────────┘
//!     ▲         ▲                                     │ pop()
//!     │ events  │ Relaxed atomics                     ▼
//! ┌───┴─────────┴────┐                     ┌─────────────────────┐
//! │ Event Queue +    │◄────────────────────│  CPAL Audio Thread  │
//! │ OutputAtomics    │   push() / store()  │ (owns OutputRenderer│
//! └──────────────────┘                     └─────────────────────┘
//! ```
//!
//! The stream is built paused and only starts on [`OutputDevice::resume`].
//! The device clock is the number of frames the callback has rendered.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use basedrop::{Handle, Shared};
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig};

use super::config::{AudioConfig, MAX_BUFFER_SIZE};
use super::device::{default_output_device, find_device_by_id};
use super::error::{AudioError, AudioResult};
use super::gc::gc_handle;
use super::output::{OutputDevice, OutputEvent, SourceId, SourceRequest};
use super::renderer::{OutputRenderer, RendererCommand};
use crate::types::{seconds_to_frames, StereoSample, DEFAULT_SAMPLE_RATE};

/// Capacity of the UI → audio command queue
const COMMAND_QUEUE_CAPACITY: usize = 256;

/// Capacity of the audio → UI event queue
const EVENT_QUEUE_CAPACITY: usize = 256;

/// Lock-free state the UI reads from the audio thread
pub struct OutputAtomics {
    /// Frames rendered by the callback so far
    pub frames_rendered: AtomicU64,
    /// Events lost because the event queue was full
    pub events_dropped: AtomicU64,
}

impl OutputAtomics {
    fn new() -> Self {
        Self {
            frames_rendered: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn events_dropped(&self) -> u64 {
        self.events_dropped.load(Ordering::Relaxed)
    }
}

/// Command sender for the UI thread
struct CommandSender {
    producer: rtrb::Producer<RendererCommand>,
}

impl CommandSender {
    /// Send a command to the audio thread
    ///
    /// Returns the command back if the queue is full
    fn send(&mut self, cmd: RendererCommand) -> Result<(), RendererCommand> {
        self.producer.push(cmd).map_err(|e| match e {
            rtrb::PushError::Full(value) => value,
        })
    }
}

/// State owned by the output callback
struct CallbackState {
    renderer: OutputRenderer,
    command_rx: rtrb::Consumer<RendererCommand>,
    event_tx: rtrb::Producer<OutputEvent>,
    atomics: Arc<OutputAtomics>,
    /// Pre-allocated render buffer
    block: Vec<StereoSample>,
}

impl CallbackState {
    /// Apply pending commands, then render `n_frames` into the block buffer
    fn process(&mut self, n_frames: usize) -> &[StereoSample] {
        let Self {
            renderer,
            command_rx,
            event_tx,
            atomics,
            block,
        } = self;
        let mut emit = |event: OutputEvent| {
            if event_tx.push(event).is_err() {
                atomics.events_dropped.fetch_add(1, Ordering::Relaxed);
            }
        };

        while let Ok(cmd) = command_rx.pop() {
            renderer.apply(cmd, &mut emit);
        }

        let out = &mut block[..n_frames];
        renderer.render(out, &mut emit);
        atomics.frames_rendered.store(renderer.clock(), Ordering::Relaxed);
        out
    }
}

/// Realtime output on a cpal device
pub struct CpalOutput {
    stream: Stream,
    commands: CommandSender,
    events: rtrb::Consumer<OutputEvent>,
    atomics: Arc<OutputAtomics>,
    gc: Handle,
    sample_rate: u32,
    buffer_size: u32,
    next_id: SourceId,
    playing: bool,
    /// Dropped-event count last reported
    dropped_seen: u64,
}

impl CpalOutput {
    /// Open the configured device and build a paused stream on it
    pub fn open(config: &AudioConfig) -> AudioResult<Self> {
        let device = match &config.device {
            Some(id) => find_device_by_id(id)?,
            None => default_output_device()?,
        };
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        log::info!("Using audio device: {}", device_name);

        let supported = get_output_config(&device, config)?;
        let sample_rate = supported.sample_rate().0;
        let buffer_size = config.buffer_size.frames();
        let stream_config = StreamConfig {
            channels: supported.channels(),
            sample_rate: supported.sample_rate(),
            buffer_size: cpal::BufferSize::Fixed(buffer_size),
        };

        log::info!(
            "Audio config: {} channels, {}Hz, {} frames (~{:.1}ms latency)",
            stream_config.channels,
            sample_rate,
            buffer_size,
            config.buffer_size.latency_ms(sample_rate)
        );

        let (command_tx, command_rx) = rtrb::RingBuffer::new(COMMAND_QUEUE_CAPACITY);
        let (event_tx, event_rx) = rtrb::RingBuffer::new(EVENT_QUEUE_CAPACITY);
        let atomics = Arc::new(OutputAtomics::new());

        let state = CallbackState {
            renderer: OutputRenderer::new(),
            command_rx,
            event_tx,
            atomics: Arc::clone(&atomics),
            block: vec![StereoSample::silence(); MAX_BUFFER_SIZE],
        };

        let stream = build_output_stream(&device, &stream_config, state)?;
        // Some hosts start streams on creation
        if let Err(e) = stream.pause() {
            log::debug!("Could not pause new stream: {}", e);
        }

        Ok(Self {
            stream,
            commands: CommandSender { producer: command_tx },
            events: event_rx,
            atomics,
            gc: gc_handle(),
            sample_rate,
            buffer_size,
            next_id: 1,
            playing: false,
            dropped_seen: 0,
        })
    }

    /// Requested buffer size in frames
    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }

    fn send(&mut self, cmd: RendererCommand) -> AudioResult<()> {
        self.commands.send(cmd).map_err(|_| AudioError::CommandQueueFull)
    }
}

impl OutputDevice for CpalOutput {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn now(&self) -> f64 {
        self.atomics.frames_rendered() as f64 / self.sample_rate as f64
    }

    fn resume(&mut self) -> AudioResult<()> {
        if !self.playing {
            self.stream
                .play()
                .map_err(|e| AudioError::StreamPlayError(e.to_string()))?;
            self.playing = true;
            log::info!("Audio stream started");
        }
        Ok(())
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
        let command = RendererCommand::Start {
            id,
            buffer: Shared::new(&self.gc, request.buffer),
            start_frame: seconds_to_frames(request.start_at, self.sample_rate),
            offset_frames: seconds_to_frames(request.offset, self.sample_rate),
            gain: request.gain,
        };
        self.send(command)?;
        Ok(id)
    }

    fn stop_source(&mut self, id: SourceId) {
        if let Err(e) = self.send(RendererCommand::Stop { id }) {
            log::error!("Failed to stop source {}: {}", id, e);
        }
    }

    fn set_gain(&mut self, id: SourceId, gain: f32) {
        if let Err(e) = self.send(RendererCommand::SetGain { id, gain }) {
            log::error!("Failed to set gain of source {}: {}", id, e);
        }
    }

    fn poll_event(&mut self) -> Option<OutputEvent> {
        let event = self.events.pop().ok();
        if event.is_none() {
            let dropped = self.atomics.events_dropped();
            if dropped > self.dropped_seen {
                log::warn!("Audio thread dropped {} output event(s)", dropped - self.dropped_seen);
                self.dropped_seen = dropped;
            }
        }
        event
    }
}

/// Get the best output configuration for a device
///
/// Prefers f32, at least two channels, and the requested rate (48kHz by
/// default). Falls back to the device's maximum rate when unsupported.
fn get_output_config(device: &cpal::Device, config: &AudioConfig) -> AudioResult<cpal::SupportedStreamConfig> {
    let supported_configs: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| AudioError::ConfigError(e.to_string()))?
        .collect();

    let target_sample_rate = config.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE);
    let supports_target =
        |c: &cpal::SupportedStreamConfigRange| (c.min_sample_rate().0..=c.max_sample_rate().0).contains(&target_sample_rate);

    let best_config = supported_configs
        .iter()
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .filter(|c| c.channels() >= 2)
        .find(|c| supports_target(*c))
        .or_else(|| {
            supported_configs
                .iter()
                .find(|c| c.sample_format() == SampleFormat::F32 && c.channels() >= 2)
        })
        .or_else(|| supported_configs.iter().find(|c| c.sample_format() == SampleFormat::F32))
        .ok_or_else(|| AudioError::UnsupportedFormat("device offers no f32 output".to_string()))?;

    let sample_rate = if supports_target(best_config) {
        cpal::SampleRate(target_sample_rate)
    } else {
        let fallback = best_config.max_sample_rate();
        log::warn!(
            "Audio device doesn't support {}Hz, falling back to {}Hz",
            target_sample_rate,
            fallback.0
        );
        fallback
    };

    Ok(best_config.clone().with_sample_rate(sample_rate))
}

/// Build the output stream around the callback state
fn build_output_stream(device: &cpal::Device, config: &StreamConfig, mut state: CallbackState) -> AudioResult<Stream> {
    let channels = config.channels as usize;

    device
        .build_output_stream(
            config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                for chunk in data.chunks_mut(MAX_BUFFER_SIZE * channels) {
                    let n_frames = chunk.len() / channels;
                    let samples = state.process(n_frames);

                    for (frame, sample) in chunk.chunks_mut(channels).zip(samples) {
                        frame[0] = sample.left;
                        if channels > 1 {
                            frame[1] = sample.right;
                        }
                        // Fill additional channels with silence
                        for ch in frame.iter_mut().skip(2) {
                            *ch = 0.0;
                        }
                    }
                }
            },
            move |err| {
                log::error!("Audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))
}
