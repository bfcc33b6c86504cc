//! # OpenAI Whisper Provider
//!
//! Sends WAV windows to an OpenAI-compatible `/audio/transcriptions` endpoint
//! as a multipart upload and reads back the recognized text.

use crate::transcription::{AudioFormat, SpeechToText, TranscriptionFailure};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

/// Successful transcription body (`response_format=json`).
#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// OpenAI error envelope: `{"error": {"message": "...", "type": "..."}}`.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Whisper over HTTP.
pub struct OpenAiTranscriber {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    language: Option<String>,
}

impl OpenAiTranscriber {
    /// Create a provider talking to `base_url` (e.g. `https://api.openai.com/v1`).
    ///
    /// The HTTP client carries no request timeout of its own; deadlines are
    /// applied by `TranscriptionClient`.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        language: Option<String>,
    ) -> reqwest::Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("transcript-relay/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            language,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/audio/transcriptions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl SpeechToText for OpenAiTranscriber {
    fn name(&self) -> &str {
        "openai"
    }

    async fn transcribe(
        &self,
        container: Vec<u8>,
        format: AudioFormat,
    ) -> Result<String, TranscriptionFailure> {
        let size = container.len();
        let file = Part::bytes(container)
            .file_name(format!("window.{}", format.file_extension()))
            .mime_str(format.mime_type())
            .map_err(|e| TranscriptionFailure::Provider {
                status: None,
                message: format!("invalid upload part: {}", e),
            })?;

        let mut form = Form::new()
            .text("model", self.model.clone())
            .text("response_format", "json")
            .part("file", file);
        if let Some(language) = &self.language {
            form = form.text("language", language.clone());
        }

        debug!(endpoint = %self.endpoint(), bytes = size, model = %self.model, "Sending window to provider");

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(classify_request_error)?;

        let status = response.status();
        let body = response.text().await.map_err(classify_request_error)?;

        if !status.is_success() {
            return Err(provider_error(status, &body));
        }

        parse_transcription(&body)
    }
}

fn classify_request_error(err: reqwest::Error) -> TranscriptionFailure {
    if err.is_connect() {
        return TranscriptionFailure::Transport(format!("could not reach provider: {}", err));
    }
    TranscriptionFailure::Transport(err.to_string())
}

/// Build a provider failure from a non-2xx answer, preferring the message
/// from the OpenAI error envelope when the body carries one.
fn provider_error(status: StatusCode, body: &str) -> TranscriptionFailure {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|envelope| envelope.error.message)
        .unwrap_or_else(|_| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                status.canonical_reason().unwrap_or("unknown error").to_string()
            } else {
                trimmed.chars().take(200).collect()
            }
        });

    TranscriptionFailure::Provider {
        status: Some(status.as_u16()),
        message,
    }
}

fn parse_transcription(body: &str) -> Result<String, TranscriptionFailure> {
    serde_json::from_str::<TranscriptionResponse>(body)
        .map(|response| response.text)
        .map_err(|e| TranscriptionFailure::Provider {
            status: None,
            message: format!("unreadable provider response: {}", e),
        })
}
