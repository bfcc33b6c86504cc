//! # Flush Pipeline
//!
//! Turns one drained window into a reply:
//!
//! ```text
//! PCM16 bytes → decode → f32 samples → encode → WAV → transcribe → persist → reply
//! ```
//!
//! A pipeline run owns its `FlushJob` and shares nothing mutable with the
//! connection, so it can outlive the connection that started it. The
//! transcript is persisted whether or not the client is still there to
//! receive the reply.

use crate::audio::{decode_pcm16, ContainerEncoder};
use crate::error::RelayError;
use crate::relay::message::OutboundMessage;
use crate::relay::session::FlushJob;
use crate::store::{SessionStore, TranscriptRecord};
use crate::transcription::{TranscriptionClient, TranscriptionOutcome};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// What happened during one flush.
#[derive(Debug, Clone, PartialEq)]
pub struct FlushReport {
    pub window_seq: u64,
    pub session_id: String,
    pub speaker_id: String,
    /// Frame to send back to the client
    pub reply: OutboundMessage,
    pub transcribed: bool,
    pub persisted: bool,
    /// Set when the transcript was produced but the store append failed
    pub persistence_error: Option<RelayError>,
    pub elapsed: Duration,
}

impl FlushReport {
    pub fn persistence_failed(&self) -> bool {
        self.persistence_error.is_some()
    }
}

/// Shared, immutable flush machinery. One instance serves every connection.
#[derive(Clone)]
pub struct Pipeline {
    client: TranscriptionClient,
    store: Arc<dyn SessionStore>,
    encoder: ContainerEncoder,
}

impl Pipeline {
    pub fn new(client: TranscriptionClient, store: Arc<dyn SessionStore>, encoder: ContainerEncoder) -> Self {
        Self { client, store, encoder }
    }

    pub fn client(&self) -> &TranscriptionClient {
        &self.client
    }

    pub fn store_name(&self) -> &str {
        self.store.name()
    }

    pub fn encoder(&self) -> ContainerEncoder {
        self.encoder
    }

    /// Process one window end to end.
    ///
    /// ## Failure Handling:
    /// - **Transcription failure**: reply with `transcription_error`; nothing is persisted
    /// - **Persistence failure**: logged; the transcript is still replied
    pub async fn run(&self, job: FlushJob) -> FlushReport {
        let start_time = Instant::now();
        let FlushJob {
            window_seq,
            session_id,
            speaker_id,
            chunk_count,
            pcm,
            sample_rate,
        } = job;

        let samples = decode_pcm16(&pcm);
        drop(pcm);

        debug!(
            session_id = %session_id,
            window_seq,
            chunk_count,
            samples = samples.len(),
            duration_secs = samples.len() as f64 / sample_rate as f64,
            "Decoded window"
        );

        let mut report = FlushReport {
            window_seq,
            session_id,
            speaker_id,
            reply: OutboundMessage::transcript(""),
            transcribed: false,
            persisted: false,
            persistence_error: None,
            elapsed: Duration::ZERO,
        };

        let container = match self.encoder.encode(&samples, sample_rate) {
            Ok(container) => container,
            Err(e) => {
                error!(session_id = %report.session_id, window_seq, "WAV encoding failed: {}", e);
                let err = RelayError::Transcription(format!("could not encode audio window: {}", e));
                report.reply = OutboundMessage::from(err);
                report.elapsed = start_time.elapsed();
                return report;
            }
        };

        let text = match self.client.transcribe(container).await {
            TranscriptionOutcome::Success(text) => text,
            TranscriptionOutcome::Failure(failure) => {
                warn!(
                    session_id = %report.session_id,
                    speaker_id = %report.speaker_id,
                    window_seq,
                    provider = %self.client.provider_name(),
                    "Transcription failed: {}",
                    failure
                );
                report.reply = OutboundMessage::from(RelayError::Transcription(failure.to_string()));
                report.elapsed = start_time.elapsed();
                return report;
            }
        };
        report.transcribed = true;

        let record = TranscriptRecord::new(report.session_id.clone(), report.speaker_id.clone(), text.clone());
        match self.store.append(&report.session_id, record).await {
            Ok(()) => report.persisted = true,
            Err(e) => {
                let err = RelayError::Persistence(e.to_string());
                error!(
                    session_id = %report.session_id,
                    window_seq,
                    store = %self.store.name(),
                    "{}",
                    err
                );
                report.persistence_error = Some(err);
            }
        }

        report.reply = OutboundMessage::transcript(text);
        report.elapsed = start_time.elapsed();

        info!(
            session_id = %report.session_id,
            speaker_id = %report.speaker_id,
            window_seq,
            persisted = report.persisted,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Window transcribed"
        );
        report
    }
}
