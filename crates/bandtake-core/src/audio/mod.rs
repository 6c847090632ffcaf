//! Audio output for synchronized playback
//!
//! # Architecture
//!
//! The scheduler talks to any [`OutputDevice`]. Both implementations share
//! one [`OutputRenderer`], so realtime and offline playback produce the same
//! frames:
//!
//! - **CpalOutput**: realtime output. Commands travel to the audio thread over
//!   a lock-free ringbuffer, source-ended events come back over another one,
//!   and the device clock is read from a relaxed atomic.
//! - **OfflineOutput**: the clock advances only when the caller renders, for
//!   file export and deterministic tests.
//! - **OutputContext**: wraps a device that is opened lazily on first use and
//!   then only ever resumed.
//!
//! # Example Usage
//!
//! ```ignore
//! use bandtake_core::audio::{AudioConfig, OutputContext};
//! use bandtake_core::engine::PlaybackScheduler;
//!
//! let output = OutputContext::cpal(AudioConfig::default());
//! let mut scheduler = PlaybackScheduler::new(output);
//! scheduler.load(buffers);
//! scheduler.play()?;            // opens and resumes the device
//! scheduler.tick()?;            // once per UI frame
//! ```

mod config;
mod context;
mod cpal_backend;
mod device;
mod error;
mod gc;
mod offline;
mod output;
mod renderer;

pub use config::{AudioConfig, BufferSize, DeviceId, DEFAULT_BUFFER_SIZE, MAX_BUFFER_SIZE};
pub use context::OutputContext;
pub use cpal_backend::{CpalOutput, OutputAtomics};
pub use device::{list_output_devices, AudioDevice};
pub use error::{AudioError, AudioResult};
pub use offline::OfflineOutput;
pub use output::{EndReason, OutputDevice, OutputEvent, SourceId, SourceRequest};
pub use renderer::{OutputRenderer, RendererCommand, VoiceInfo, MAX_VOICES};
