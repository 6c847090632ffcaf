//! Process-wide lazily opened output
//!
//! The output device is not touched until playback is first requested. The
//! first call that needs the device opens it exactly once; later calls reuse
//! it and only resume the stream, never recreate it.

use super::config::AudioConfig;
use super::cpal_backend::CpalOutput;
use super::error::AudioResult;
use super::output::{OutputDevice, OutputEvent, SourceId, SourceRequest};
use crate::types::DEFAULT_SAMPLE_RATE;

type Opener<D> = Box<dyn FnMut() -> AudioResult<D> + Send>;

/// An output device that is opened on first use
pub struct OutputContext<D: OutputDevice = CpalOutput> {
    opener: Opener<D>,
    device: Option<D>,
    expected_sample_rate: u32,
}

impl OutputContext<CpalOutput> {
    /// Lazily open the cpal device described by `config`
    pub fn cpal(config: AudioConfig) -> Self {
        let expected_sample_rate = config.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE);
        Self::with_opener(expected_sample_rate, move || CpalOutput::open(&config))
    }
}

impl<D: OutputDevice> OutputContext<D> {
    /// Lazily open a device with a custom opener
    ///
    /// `expected_sample_rate` is reported until the device is open.
    pub fn with_opener<F>(expected_sample_rate: u32, opener: F) -> Self
    where
        F: FnMut() -> AudioResult<D> + Send + 'static,
    {
        Self {
            opener: Box::new(opener),
            device: None,
            expected_sample_rate,
        }
    }

    /// Whether the device has been opened
    pub fn is_open(&self) -> bool {
        self.device.is_some()
    }

    /// Open the device if needed and return it
    pub fn device(&mut self) -> AudioResult<&mut D> {
        let device = match self.device.take() {
            Some(device) => device,
            None => {
                let device = (self.opener)()?;
                log::info!("Audio output opened at {}Hz", device.sample_rate());
                device
            }
        };
        Ok(self.device.insert(device))
    }
}

impl<D: OutputDevice> OutputDevice for OutputContext<D> {
    fn sample_rate(&self) -> u32 {
        self.device
            .as_ref()
            .map(|d| d.sample_rate())
            .unwrap_or(self.expected_sample_rate)
    }

    fn now(&self) -> f64 {
        self.device.as_ref().map(|d| d.now()).unwrap_or(0.0)
    }

    fn resume(&mut self) -> AudioResult<()> {
        self.device()?.resume()
    }

    fn start_source(&mut self, request: SourceRequest) -> AudioResult<SourceId> {
        self.device()?.start_source(request)
    }

    fn stop_source(&mut self, id: SourceId) {
        if let Some(device) = self.device.as_mut() {
            device.stop_source(id);
        }
    }

    fn set_gain(&mut self, id: SourceId, gain: f32) {
        if let Some(device) = self.device.as_mut() {
            device.set_gain(id, gain);
        }
    }

    fn poll_event(&mut self) -> Option<OutputEvent> {
        self.device.as_mut().and_then(|d| d.poll_event())
    }
}
