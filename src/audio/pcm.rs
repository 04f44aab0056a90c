//! PCM wire codec
//!
//! The live API exchanges raw 16-bit signed little-endian mono PCM,
//! base64-encoded inside JSON messages.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;

use crate::{Error, Result};

/// Sample rate of microphone audio sent to the backend
pub const INPUT_SAMPLE_RATE: u32 = 16_000;

/// Sample rate of audio returned by the backend
pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;

/// MIME type of outbound microphone frames
pub const INPUT_MIME_TYPE: &str = "audio/pcm;rate=16000";

/// Decoded mono audio ready for scheduling
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioBuffer {
    /// Create a buffer from samples at the given rate
    #[must_use]
    pub const fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Decode raw PCM16 LE bytes at [`OUTPUT_SAMPLE_RATE`]
    #[must_use]
    pub fn from_pcm16(bytes: &[u8]) -> Self {
        Self::new(pcm16_to_f32(bytes), OUTPUT_SAMPLE_RATE)
    }

    /// Duration in seconds at normal speed
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / f64::from(self.sample_rate)
    }

    /// Whether the buffer holds no samples
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Convert f32 samples in [-1, 1] to PCM16 LE bytes, clamping out-of-range input
#[must_use]
pub fn f32_to_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        #[allow(clippy::cast_possible_truncation)]
        let value = (sample.clamp(-1.0, 1.0) * 32767.0) as i16;
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Convert PCM16 LE bytes to f32 samples; a trailing odd byte is ignored
#[must_use]
pub fn pcm16_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32768.0)
        .collect()
}

/// Encode f32 samples as base64 PCM16 for the wire
#[must_use]
pub fn encode_frame(samples: &[f32]) -> String {
    B64.encode(f32_to_pcm16(samples))
}

/// Decode a base64 payload into raw bytes
///
/// # Errors
///
/// Returns error if the payload is not valid base64
pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
    B64.decode(data)
        .map_err(|e| Error::Audio(format!("invalid base64 audio: {e}")))
}

/// Convert f32 samples to WAV bytes
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample.clamp(-1.0, 1.0) * 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}
