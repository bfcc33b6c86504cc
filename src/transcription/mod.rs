//! # Transcription Module
//!
//! Adapters around the external speech-to-text provider. The provider is an
//! opaque, slow, fallible dependency: WAV bytes in, text out.
//!
//! ## Key Components:
//! - **SpeechToText**: The provider seam (one implementation per vendor)
//! - **OpenAiTranscriber**: Whisper via the OpenAI-compatible HTTP API
//! - **TranscriptionClient**: Wraps a provider with deadline handling and
//!   failure classification, producing a `TranscriptionOutcome`
//!
//! ## Retry Policy:
//! None. Exactly one provider call is made per flushed window; the caller
//! decides what to do with a failure.

pub mod client;   // Deadline + classification wrapper
pub mod openai;   // OpenAI Whisper HTTP provider

pub use client::TranscriptionClient;
pub use openai::OpenAiTranscriber;

use async_trait::async_trait;
use std::fmt;

/// Container format identifier passed to the provider alongside the bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Wav,
}

impl AudioFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            AudioFormat::Wav => "audio/wav",
        }
    }

    pub fn file_extension(&self) -> &'static str {
        match self {
            AudioFormat::Wav => "wav",
        }
    }
}

/// Why a transcription attempt produced no text.
#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptionFailure {
    /// The request never reached the provider or the connection broke mid-way
    Transport(String),

    /// The provider answered with an error
    Provider { status: Option<u16>, message: String },

    /// Nothing to transcribe, or the provider recognized no speech
    EmptyAudio,

    /// The configured deadline elapsed before the provider answered
    Timeout { after_secs: u64 },
}

impl fmt::Display for TranscriptionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranscriptionFailure::Transport(msg) => write!(f, "network failure: {}", msg),
            TranscriptionFailure::Provider { status: Some(status), message } => {
                write!(f, "provider error ({}): {}", status, message)
            }
            TranscriptionFailure::Provider { status: None, message } => {
                write!(f, "provider error: {}", message)
            }
            TranscriptionFailure::EmptyAudio => write!(f, "no speech recognized in audio"),
            TranscriptionFailure::Timeout { after_secs } => {
                write!(f, "provider did not answer within {}s", after_secs)
            }
        }
    }
}

impl std::error::Error for TranscriptionFailure {}

/// Result of one transcription attempt for one flushed window.
#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptionOutcome {
    Success(String),
    Failure(TranscriptionFailure),
}

/// An external speech-to-text provider.
///
/// ## Thread Safety:
/// Providers are constructed once at startup and shared (`Arc<dyn SpeechToText>`)
/// by every connection, so they must be `Send + Sync`.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Short provider name for logs.
    fn name(&self) -> &str;

    /// Transcribe one encoded audio container.
    async fn transcribe(
        &self,
        container: Vec<u8>,
        format: AudioFormat,
    ) -> Result<String, TranscriptionFailure>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_reasons_name_the_cause() {
        let transport = TranscriptionFailure::Transport("connection refused".into());
        assert!(transport.to_string().starts_with("network failure"));

        let provider = TranscriptionFailure::Provider {
            status: Some(500),
            message: "overloaded".into(),
        };
        assert_eq!(provider.to_string(), "provider error (500): overloaded");

        assert_eq!(
            TranscriptionFailure::Timeout { after_secs: 5 }.to_string(),
            "provider did not answer within 5s"
        );
    }

    #[test]
    fn test_audio_format_metadata() {
        assert_eq!(AudioFormat::Wav.mime_type(), "audio/wav");
        assert_eq!(AudioFormat::Wav.file_extension(), "wav");
    }
}
