//! # Transcription Client
//!
//! Wraps a `SpeechToText` provider with the policy the relay needs around it:
//! empty-audio short-circuit, an optional deadline, text clean-up, and
//! performance tracking. The provider call is the one suspension point of the
//! pipeline and may take arbitrarily long unless a deadline is configured.

use crate::transcription::{AudioFormat, SpeechToText, TranscriptionFailure, TranscriptionOutcome};
use std::io::Cursor;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Performance tracking across every call made through this client.
#[derive(Debug, Default)]
struct ClientMetrics {
    total_requests: u64,
    failed_requests: u64,
    timed_out_requests: u64,
    total_processing_time_ms: u64,
}

/// Snapshot of client metrics for the `/metrics` endpoint.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ClientPerformanceStats {
    pub total_requests: u64,
    pub failed_requests: u64,
    pub timed_out_requests: u64,
    pub average_processing_time_ms: u64,
}

/// Shared handle to the transcription provider.
///
/// ## Thread Safety:
/// Cloning is cheap (two `Arc`s), and every clone talks to the same provider
/// and the same metrics.
#[derive(Clone)]
pub struct TranscriptionClient {
    provider: Arc<dyn SpeechToText>,
    deadline: Option<Duration>,
    metrics: Arc<RwLock<ClientMetrics>>,
}

impl TranscriptionClient {
    /// Create a client. `deadline` of `None` means wait for the provider forever.
    pub fn new(provider: Arc<dyn SpeechToText>, deadline: Option<Duration>) -> Self {
        Self {
            provider,
            deadline,
            metrics: Arc::new(RwLock::new(ClientMetrics::default())),
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    /// Transcribe one WAV container.
    ///
    /// ## Process:
    /// 1. Containers holding no samples (or that don't parse as WAV) are reported as `EmptyAudio`
    ///    without calling the provider
    /// 2. The provider is called once, bounded by the deadline if one is set
    /// 3. Returned text is trimmed; blank text becomes `EmptyAudio`
    pub async fn transcribe(&self, container: Vec<u8>) -> TranscriptionOutcome {
        if sample_count(&container) == 0 {
            debug!(provider = %self.provider.name(), "Skipping provider call for empty audio");
            return TranscriptionOutcome::Failure(TranscriptionFailure::EmptyAudio);
        }

        let start_time = Instant::now();
        let call = self.provider.transcribe(container, AudioFormat::Wav);

        let result = match self.deadline {
            Some(deadline) => match tokio::time::timeout(deadline, call).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(
                        provider = %self.provider.name(),
                        deadline_secs = deadline.as_secs(),
                        "Transcription deadline elapsed"
                    );
                    Err(TranscriptionFailure::Timeout {
                        after_secs: deadline.as_secs(),
                    })
                }
            },
            None => call.await,
        };

        let outcome = match result {
            Ok(text) => {
                let text = text.trim();
                if text.is_empty() {
                    TranscriptionOutcome::Failure(TranscriptionFailure::EmptyAudio)
                } else {
                    TranscriptionOutcome::Success(text.to_string())
                }
            }
            Err(failure) => TranscriptionOutcome::Failure(failure),
        };

        self.record(&outcome, start_time.elapsed()).await;
        outcome
    }

    async fn record(&self, outcome: &TranscriptionOutcome, elapsed: Duration) {
        let mut metrics = self.metrics.write().await;
        metrics.total_requests += 1;
        metrics.total_processing_time_ms += elapsed.as_millis() as u64;

        if let TranscriptionOutcome::Failure(failure) = outcome {
            metrics.failed_requests += 1;
            if matches!(failure, TranscriptionFailure::Timeout { .. }) {
                metrics.timed_out_requests += 1;
            }
        }
    }

    pub async fn performance_stats(&self) -> ClientPerformanceStats {
        let metrics = self.metrics.read().await;
        ClientPerformanceStats {
            total_requests: metrics.total_requests,
            failed_requests: metrics.failed_requests,
            timed_out_requests: metrics.timed_out_requests,
            average_processing_time_ms: if metrics.total_requests > 0 {
                metrics.total_processing_time_ms / metrics.total_requests
            } else {
                0
            },
        }
    }
}

/// Samples in a WAV container; anything that doesn't parse counts as none.
fn sample_count(container: &[u8]) -> u32 {
    hound::WavReader::new(Cursor::new(container))
        .map(|reader| reader.len())
        .unwrap_or(0)
}
