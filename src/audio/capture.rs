//! Audio capture from microphone

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{SampleRate, StreamConfig};
use tokio::sync::mpsc;

use super::device::DeviceThread;
use super::pcm::INPUT_SAMPLE_RATE;
use crate::{Error, Result};

/// Samples per frame delivered to the live session
pub const FRAME_SIZE: usize = 4096;

/// Frames buffered between the capture thread and the session
const FRAME_QUEUE: usize = 32;

/// A source of fixed-size 16 kHz mono frames
pub trait Microphone: Send {
    /// Start capturing
    ///
    /// Frames of [`FRAME_SIZE`] samples at 16 kHz arrive on the returned
    /// channel in capture order.
    ///
    /// # Errors
    ///
    /// Returns `MicAccessDenied` if the device is missing or permission is refused
    fn open(&mut self) -> Result<mpsc::Receiver<Vec<f32>>>;

    /// Stop capturing; the frame channel closes. Safe to call repeatedly.
    fn close(&mut self);
}

/// Splits a continuous sample stream into fixed-size frames
#[derive(Debug)]
pub struct FrameAssembler {
    frame_size: usize,
    pending: Vec<f32>,
}

impl FrameAssembler {
    /// Create an assembler producing frames of `frame_size` samples
    #[must_use]
    pub fn new(frame_size: usize) -> Self {
        let frame_size = frame_size.max(1);
        Self {
            frame_size,
            pending: Vec::with_capacity(frame_size),
        }
    }

    /// Add samples and return every frame completed by them
    pub fn push(&mut self, samples: &[f32]) -> Vec<Vec<f32>> {
        self.pending.extend_from_slice(samples);

        let complete = self.pending.len() / self.frame_size;
        let mut frames = Vec::with_capacity(complete);
        for _ in 0..complete {
            let rest = self.pending.split_off(self.frame_size);
            frames.push(std::mem::replace(&mut self.pending, rest));
        }
        frames
    }

    /// Samples waiting for a full frame
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

/// Average interleaved channels down to mono
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn downmix(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    data.chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Streaming resampler from the device rate to 16 kHz
struct StreamResampler {
    inner: rubato::FftFixedIn<f64>,
    pending: Vec<f64>,
}

impl StreamResampler {
    fn new(from_rate: u32, to_rate: u32) -> Result<Self> {
        let inner = rubato::FftFixedIn::<f64>::new(from_rate as usize, to_rate as usize, 1024, 2, 1)
            .map_err(|e| Error::Audio(format!("resampler init failed: {e}")))?;
        Ok(Self {
            inner,
            pending: Vec::new(),
        })
    }

    #[allow(clippy::cast_possible_truncation)]
    fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        use rubato::Resampler;

        self.pending.extend(samples.iter().map(|&s| f64::from(s)));

        let mut output = Vec::new();
        loop {
            let needed = self.inner.input_frames_next();
            if self.pending.len() < needed {
                break;
            }
            let chunk: Vec<f64> = self.pending.drain(..needed).collect();
            match self.inner.process(&[chunk], None) {
                Ok(result) => output.extend(result[0].iter().map(|&s| s as f32)),
                Err(e) => {
                    tracing::warn!(error = %e, "resample failed, dropping chunk");
                }
            }
        }
        output
    }
}

/// Captures the default input device through `cpal`
#[derive(Debug, Default)]
pub struct CpalMicrophone {
    device: Option<DeviceThread>,
}

impl CpalMicrophone {
    /// Create an unopened microphone
    #[must_use]
    pub const fn new() -> Self {
        Self { device: None }
    }

    /// Check if currently capturing
    #[must_use]
    pub const fn is_capturing(&self) -> bool {
        self.device.is_some()
    }
}

impl Microphone for CpalMicrophone {
    fn open(&mut self) -> Result<mpsc::Receiver<Vec<f32>>> {
        self.close();

        let (tx, rx) = mpsc::channel(FRAME_QUEUE);

        let (device, ()) = DeviceThread::spawn("mic-capture", move || {
            let host = cpal::default_host();
            let device = host
                .default_input_device()
                .ok_or_else(|| Error::MicAccessDenied("no input device available".to_string()))?;

            let config = input_config(&device)?;
            let channels = usize::from(config.channels);
            let device_rate = config.sample_rate.0;

            let mut resampler = if device_rate == INPUT_SAMPLE_RATE {
                None
            } else {
                Some(StreamResampler::new(device_rate, INPUT_SAMPLE_RATE)?)
            };
            let mut framer = FrameAssembler::new(FRAME_SIZE);

            let stream = device
                .build_input_stream(
                    &config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        let mono = downmix(data, channels);
                        let samples = match resampler.as_mut() {
                            Some(r) => r.process(&mono),
                            None => mono,
                        };
                        for frame in framer.push(&samples) {
                            // Full or closed queue: the frame is dropped, never resent
                            if tx.try_send(frame).is_err() {
                                tracing::trace!("dropping microphone frame");
                            }
                        }
                    },
                    |err| {
                        tracing::error!(error = %err, "audio capture error");
                    },
                    None,
                )
                .map_err(map_build_error)?;

            tracing::debug!(
                device = device.name().unwrap_or_default(),
                sample_rate = device_rate,
                channels,
                "audio capture initialized"
            );

            Ok((stream, ()))
        })?;

        self.device = Some(device);
        tracing::debug!("audio capture started");
        Ok(rx)
    }

    fn close(&mut self) {
        if let Some(mut device) = self.device.take() {
            device.stop();
            tracing::debug!("audio capture stopped");
        }
    }
}

/// Prefer mono at 16 kHz, otherwise take the device default and resample
fn input_config(device: &cpal::Device) -> Result<StreamConfig> {
    let rate = SampleRate(INPUT_SAMPLE_RATE);
    let native = device
        .supported_input_configs()
        .map_err(|e| Error::MicAccessDenied(e.to_string()))?
        .find(|c| c.channels() == 1 && c.min_sample_rate() <= rate && c.max_sample_rate() >= rate);

    if let Some(supported) = native {
        return Ok(supported.with_sample_rate(rate).config());
    }

    device
        .default_input_config()
        .map(|c| c.config())
        .map_err(|e| Error::MicAccessDenied(e.to_string()))
}

fn map_build_error(err: cpal::BuildStreamError) -> Error {
    match err {
        cpal::BuildStreamError::DeviceNotAvailable => {
            Error::MicAccessDenied("input device not available".to_string())
        }
        other => {
            let message = other.to_string();
            if message.to_lowercase().contains("permission") {
                Error::MicAccessDenied(message)
            } else {
                Error::Audio(message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_assembler_splits() {
        let mut framer = FrameAssembler::new(4);

        assert!(framer.push(&[0.1, 0.2, 0.3]).is_empty());
        assert_eq!(framer.pending(), 3);

        let frames = framer.push(&[0.4, 0.5, 0.6, 0.7, 0.8, 0.9]);
        assert_eq!(frames, vec![vec![0.1, 0.2, 0.3, 0.4], vec![0.5, 0.6, 0.7, 0.8]]);
        assert_eq!(framer.pending(), 1);
    }

    #[test]
    fn test_downmix_stereo() {
        assert_eq!(downmix(&[0.25, 0.75, -1.0, 1.0], 2), vec![0.5, 0.0]);
        assert_eq!(downmix(&[0.5, 0.25], 1), vec![0.5, 0.25]);
    }

    #[test]
    fn test_resampler_halves_rate() {
        let mut resampler = StreamResampler::new(32_000, 16_000).unwrap();

        let out = resampler.process(&vec![0.0; 4096]);

        // Whole input chunks only; output is roughly half the consumed input
        assert!(!out.is_empty());
        assert!(out.len() <= 2048);
    }
}
