//! # WAV Container Encoding
//!
//! Wraps normalized float samples in a self-describing WAV container so the
//! transcription provider (or any standard reader) can consume them directly.
//!
//! ## Supported Layouts:
//! - **float32**: IEEE float samples, 32 bits each (lossless for decoded PCM16)
//! - **pcm16**: Signed 16-bit integer samples (the classic "audio/wav" layout)
//!
//! Both are always single-channel.

use crate::audio::decoder::PCM16_SCALE;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Cursor;

/// Sample layout written into the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    #[default]
    Float32,
    Pcm16,
}

impl ContainerFormat {
    /// Bits per sample written for this layout.
    pub fn bits_per_sample(&self) -> u16 {
        match self {
            ContainerFormat::Float32 => 32,
            ContainerFormat::Pcm16 => 16,
        }
    }

    fn sample_format(&self) -> hound::SampleFormat {
        match self {
            ContainerFormat::Float32 => hound::SampleFormat::Float,
            ContainerFormat::Pcm16 => hound::SampleFormat::Int,
        }
    }
}

impl fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerFormat::Float32 => write!(f, "float32"),
            ContainerFormat::Pcm16 => write!(f, "pcm16"),
        }
    }
}

/// Encodes sample windows into WAV containers.
///
/// ## Thread Safety:
/// The encoder is a plain `Copy` value with no internal state, so every
/// pipeline run can hold its own copy.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContainerEncoder {
    format: ContainerFormat,
}

impl ContainerEncoder {
    pub fn new(format: ContainerFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> ContainerFormat {
        self.format
    }

    /// Encode mono samples at `sample_rate` into a complete WAV file.
    ///
    /// ## Parameters:
    /// - **samples**: Normalized samples in `[-1.0, 1.0]`
    /// - **sample_rate**: Samples per second written into the header
    ///
    /// ## Returns:
    /// The full container bytes (RIFF header + fmt chunk + data chunk). An
    /// empty sample slice still yields a valid container with an empty data
    /// chunk. Errors only surface from the underlying writer.
    pub fn encode(&self, samples: &[f32], sample_rate: u32) -> hound::Result<Vec<u8>> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: self.format.bits_per_sample(),
            sample_format: self.format.sample_format(),
        };

        // WavWriter seeks back to patch chunk lengths on finalize
        let mut cursor = Cursor::new(Vec::with_capacity(64 + samples.len() * 4));
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        match self.format {
            ContainerFormat::Float32 => {
                for &sample in samples {
                    writer.write_sample(sample)?;
                }
            }
            ContainerFormat::Pcm16 => {
                for &sample in samples {
                    writer.write_sample(float_to_pcm16(sample))?;
                }
            }
        }
        writer.finalize()?;

        Ok(cursor.into_inner())
    }
}

/// Convert a normalized float back to 16-bit PCM, clamping out-of-range values.
fn float_to_pcm16(sample: f32) -> i16 {
    (sample * PCM16_SCALE).round().clamp(-32768.0, 32767.0) as i16
}
