//! Audio output contexts

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{SampleRate, StreamConfig};

use super::device::DeviceThread;
use super::mixer::{Mixer, SourceId};
use super::pcm::{AudioBuffer, OUTPUT_SAMPLE_RATE};
use crate::{Error, Result};

/// An output clock that sources can be scheduled against
pub trait AudioOutput: Send {
    /// Current time on the output clock, in seconds
    fn current_time(&self) -> f64;

    /// Schedule `buffer` to start at `when` with a playback-rate multiplier
    fn start_source(&mut self, buffer: Arc<AudioBuffer>, when: f64, playback_rate: f32)
    -> SourceId;

    /// Stop a source immediately
    fn stop_source(&mut self, id: SourceId);

    /// Move the master gain toward `target` with an exponential time constant
    fn set_gain(&mut self, target: f32, time_constant: f64);

    /// Sources that finished playing naturally since the last call
    fn drain_finished(&mut self) -> Vec<SourceId>;
}

/// A mixer-backed output context, optionally attached to a sound device
pub struct OutputContext {
    mixer: Arc<Mutex<Mixer>>,
    channels: usize,
    device: Option<DeviceThread>,
}

impl std::fmt::Debug for OutputContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputContext")
            .field("channels", &self.channels)
            .field("device", &self.device.is_some())
            .finish_non_exhaustive()
    }
}

impl OutputContext {
    /// Create a context with no device; its clock advances only through [`Self::render`]
    #[must_use]
    pub fn offline(sample_rate: u32) -> Self {
        Self {
            mixer: Arc::new(Mutex::new(Mixer::new(sample_rate))),
            channels: 1,
            device: None,
        }
    }

    /// Open the default output device
    ///
    /// # Errors
    ///
    /// Returns error if no output device or suitable config is available
    pub fn open_default() -> Result<Self> {
        let (device, (mixer, channels)) = DeviceThread::spawn("audio-output", || {
            let host = cpal::default_host();
            let device = host
                .default_output_device()
                .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

            let config = output_config(&device)?;
            let channels = usize::from(config.channels);
            let mixer = Arc::new(Mutex::new(Mixer::new(config.sample_rate.0)));
            let callback_mixer = Arc::clone(&mixer);

            let stream = device
                .build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        if let Ok(mut mixer) = callback_mixer.lock() {
                            mixer.render(data, channels);
                        } else {
                            data.fill(0.0);
                        }
                    },
                    |err| {
                        tracing::error!(error = %err, "audio playback error");
                    },
                    None,
                )
                .map_err(|e| Error::Audio(e.to_string()))?;

            tracing::debug!(
                device = device.name().unwrap_or_default(),
                sample_rate = config.sample_rate.0,
                channels,
                "audio output initialized"
            );

            Ok((stream, (mixer, channels)))
        })?;

        Ok(Self {
            mixer,
            channels,
            device: Some(device),
        })
    }

    /// Render `frames` frames of output without a device, advancing the clock
    pub fn render(&self, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0; frames * self.channels];
        self.mixer().render(&mut out, self.channels);
        out
    }

    /// Output sample rate
    #[must_use]
    pub fn sample_rate(&self) -> u32 {
        self.mixer().sample_rate()
    }

    /// Shared handle for rendering from another owner
    #[must_use]
    pub fn handle(&self) -> OutputHandle {
        OutputHandle {
            mixer: Arc::clone(&self.mixer),
            channels: self.channels,
        }
    }

    fn mixer(&self) -> MutexGuard<'_, Mixer> {
        self.mixer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AudioOutput for OutputContext {
    fn current_time(&self) -> f64 {
        self.mixer().current_time()
    }

    fn start_source(
        &mut self,
        buffer: Arc<AudioBuffer>,
        when: f64,
        playback_rate: f32,
    ) -> SourceId {
        self.mixer().start(buffer, when, playback_rate)
    }

    fn stop_source(&mut self, id: SourceId) {
        self.mixer().stop(id);
    }

    fn set_gain(&mut self, target: f32, time_constant: f64) {
        self.mixer().set_gain_target(target, time_constant);
    }

    fn drain_finished(&mut self) -> Vec<SourceId> {
        self.mixer().drain_finished()
    }
}

/// Renders an [`OutputContext`] that has been moved elsewhere
#[derive(Clone)]
pub struct OutputHandle {
    mixer: Arc<Mutex<Mixer>>,
    channels: usize,
}

impl OutputHandle {
    /// Render `frames` frames, advancing the clock
    pub fn render(&self, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0; frames * self.channels];
        self.mixer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .render(&mut out, self.channels);
        out
    }

    /// Current time on the output clock
    #[must_use]
    pub fn current_time(&self) -> f64 {
        self.mixer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .current_time()
    }
}

/// Pick an output config, preferring the backend's native rate
fn output_config(device: &cpal::Device) -> Result<StreamConfig> {
    let rate = SampleRate(OUTPUT_SAMPLE_RATE);
    let supports = |channels: u16| {
        device.supported_output_configs().ok().and_then(|mut configs| {
            configs.find(|c| {
                c.channels() == channels && c.min_sample_rate() <= rate && c.max_sample_rate() >= rate
            })
        })
    };

    if let Some(supported) = supports(1).or_else(|| supports(2)) {
        return Ok(supported.with_sample_rate(rate).config());
    }

    // Fallback: device default, mixer resamples
    device
        .default_output_config()
        .map(|c| c.config())
        .map_err(|e| Error::Audio(format!("no suitable output config found: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offline_context_schedules() {
        let mut ctx = OutputContext::offline(1000);
        let buffer = Arc::new(AudioBuffer::new(vec![0.5; 10], 1000));

        let id = ctx.start_source(buffer, 0.0, 1.0);
        let out = ctx.render(10);

        assert!(out.iter().all(|&s| (s - 0.5).abs() < 1e-6));
        assert_eq!(ctx.drain_finished(), vec![id]);
        assert!((ctx.current_time() - 0.01).abs() < 1e-9);
    }

    #[test]
    fn test_handle_shares_clock() {
        let ctx = OutputContext::offline(1000);
        let handle = ctx.handle();

        handle.render(250);

        assert!((ctx.current_time() - 0.25).abs() < 1e-9);
        assert_eq!(ctx.sample_rate(), 1000);
    }
}
