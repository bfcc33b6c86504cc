//! # Application State Management
//!
//! Shared state handed to every HTTP handler and WebSocket actor.
//!
//! ## Sharing Pattern:
//! - **config**: Immutable after startup, so a plain `Arc` is enough
//! - **metrics**: `Arc<RwLock<T>>`, updated by connections and flush tasks
//! - **pipeline**: Cheap to clone; every clone shares the same provider
//!   client and session store
//!
//! Nothing here is per-connection. Buffered audio lives inside each
//! connection's actor and is never shared.

use crate::config::AppConfig;
use crate::relay::{FlushReport, Pipeline, SessionLimits};
use serde::Serialize;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

/// Process-wide state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,

    /// Relay counters, updated by actors and flush tasks
    pub metrics: Arc<RwLock<RelayMetrics>>,

    /// Shared flush machinery (transcription client + session store)
    pub pipeline: Pipeline,

    /// When the server started
    pub start_time: Instant,
}

/// Counters exposed on `/metrics`.
#[derive(Debug, Default, Clone, Serialize)]
pub struct RelayMetrics {
    /// WebSocket connections currently open
    pub active_connections: u32,
    pub total_connections: u64,

    pub chunks_received: u64,
    pub validation_rejections: u64,
    pub backpressure_rejections: u64,

    pub windows_flushed: u64,
    /// Windows the provider turned into text, whether or not the reply got out
    pub windows_transcribed: u64,
    pub transcription_failures: u64,
    pub persistence_failures: u64,

    /// Flush results written back to a still-open connection
    pub replies_delivered: u64,
    /// Flush results whose connection had already closed
    pub replies_discarded: u64,

    pub total_flush_time_ms: u64,
}

impl RelayMetrics {
    pub fn average_flush_time_ms(&self) -> f64 {
        if self.windows_flushed > 0 {
            self.total_flush_time_ms as f64 / self.windows_flushed as f64
        } else {
            0.0
        }
    }
}

impl AppState {
    pub fn new(config: AppConfig, pipeline: Pipeline) -> Self {
        Self {
            config: Arc::new(config),
            metrics: Arc::new(RwLock::new(RelayMetrics::default())),
            pipeline,
            start_time: Instant::now(),
        }
    }

    /// Windowing limits applied to each new connection.
    pub fn session_limits(&self) -> SessionLimits {
        SessionLimits {
            flush_threshold: self.config.audio.flush_threshold,
            max_buffered_chunks: self.config.audio.max_buffered_chunks,
        }
    }

    // Counters only; a poisoned lock still holds usable values
    fn metrics_mut(&self) -> RwLockWriteGuard<'_, RelayMetrics> {
        self.metrics.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn metrics_ref(&self) -> RwLockReadGuard<'_, RelayMetrics> {
        self.metrics.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn connection_opened(&self) {
        let mut metrics = self.metrics_mut();
        metrics.active_connections += 1;
        metrics.total_connections += 1;
    }

    /// Includes an underflow check in case close is reported twice.
    pub fn connection_closed(&self) {
        let mut metrics = self.metrics_mut();
        if metrics.active_connections > 0 {
            metrics.active_connections -= 1;
        }
    }

    pub fn record_chunk(&self) {
        self.metrics_mut().chunks_received += 1;
    }

    pub fn record_validation_rejection(&self) {
        self.metrics_mut().validation_rejections += 1;
    }

    pub fn record_backpressure(&self) {
        self.metrics_mut().backpressure_rejections += 1;
    }

    /// Fold one finished flush into the counters.
    pub fn record_flush(&self, report: &FlushReport) {
        let mut metrics = self.metrics_mut();
        metrics.windows_flushed += 1;
        metrics.total_flush_time_ms += report.elapsed.as_millis() as u64;

        if report.transcribed {
            metrics.windows_transcribed += 1;
        } else {
            metrics.transcription_failures += 1;
        }
        if report.persistence_failed() {
            metrics.persistence_failures += 1;
        }
    }

    pub fn record_delivered_reply(&self) {
        self.metrics_mut().replies_delivered += 1;
    }

    pub fn record_discarded_reply(&self) {
        self.metrics_mut().replies_discarded += 1;
    }

    pub fn metrics_snapshot(&self) -> RelayMetrics {
        self.metrics_ref().clone()
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
