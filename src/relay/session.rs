//! # Connection Session State Machine
//!
//! Tracks one client connection's buffering state. The session itself does
//! no I/O: every event handler returns the action the transport layer should
//! carry out (send a reply, or run a flush in the background).
//!
//! ## States:
//! - **Idle**: Window empty or partially filled; no flush in flight
//! - **Flushing**: A drained window is being decoded, encoded, transcribed and
//!   persisted. New chunks keep landing in the fresh window meanwhile.
//! - **Closed**: Connection ended. Buffered audio is dropped, and a flush that
//!   is still in flight completes without its result being delivered.
//!
//! ## Transitions:
//! ```text
//! Idle     --valid chunk, window full-->   Flushing  (emit Flush)
//! Flushing --flush complete, window full--> Flushing  (emit next Flush)
//! Flushing --flush complete-->              Idle
//! any      --malformed message-->           same      (emit error Reply)
//! any      --close-->                       Closed
//! ```
//!
//! At most one flush is in flight per connection.

use crate::audio::ChunkWindow;
use crate::error::RelayError;
use crate::relay::message::{IncomingChunkMessage, OutboundMessage};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Flushing,
    Closed,
}

/// A drained window handed to the pipeline. Owns its bytes outright, so the
/// session can keep appending to its new window while this is processed.
#[derive(Debug, Clone, PartialEq)]
pub struct FlushJob {
    /// Per-connection sequence number, starting at 1
    pub window_seq: u64,
    pub session_id: String,
    pub speaker_id: String,
    pub chunk_count: usize,
    /// Concatenated PCM16 little-endian bytes
    pub pcm: Vec<u8>,
    pub sample_rate: u32,
}

/// What the transport should do in response to an event.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionAction {
    Reply(OutboundMessage),
    Flush(FlushJob),
}

/// Limits applied to every connection.
#[derive(Debug, Clone, Copy)]
pub struct SessionLimits {
    /// Chunks per window
    pub flush_threshold: usize,
    /// Chunks allowed to pile up while a flush is in flight
    pub max_buffered_chunks: usize,
}

pub struct ConnectionSession {
    connection_id: String,
    state: SessionState,
    window: ChunkWindow,
    max_buffered_chunks: usize,

    /// Attribution for the buffered window: ids of the most recent chunk
    current_ids: Option<(String, String)>,

    windows_started: u64,
    chunks_received: u64,
}

impl ConnectionSession {
    pub fn new(connection_id: impl Into<String>, limits: SessionLimits) -> Self {
        let window = ChunkWindow::new(limits.flush_threshold);
        let max_buffered_chunks = limits.max_buffered_chunks.max(window.threshold());

        Self {
            connection_id: connection_id.into(),
            state: SessionState::Idle,
            window,
            max_buffered_chunks,
            current_ids: None,
            windows_started: 0,
            chunks_received: 0,
        }
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn buffered_chunks(&self) -> usize {
        self.window.len()
    }

    pub fn windows_started(&self) -> u64 {
        self.windows_started
    }

    pub fn chunks_received(&self) -> u64 {
        self.chunks_received
    }

    /// Handle one inbound text frame.
    pub fn on_text(&mut self, text: &str) -> Option<SessionAction> {
        if self.state == SessionState::Closed {
            return None;
        }

        match IncomingChunkMessage::parse(text) {
            Ok(chunk) => self.on_chunk(chunk),
            Err(err) => {
                debug!(connection_id = %self.connection_id, error = %err, "Rejected inbound message");
                Some(SessionAction::Reply(OutboundMessage::from(err)))
            }
        }
    }

    /// Handle a binary frame. The protocol is JSON-only, so these are rejected.
    pub fn on_binary(&mut self, len: usize) -> Option<SessionAction> {
        if self.state == SessionState::Closed {
            return None;
        }

        let err = RelayError::Validation(format!(
            "binary frames are not supported ({} bytes); send JSON text frames with base64 audio",
            len
        ));
        Some(SessionAction::Reply(OutboundMessage::from(err)))
    }

    /// Handle an already-validated chunk.
    pub fn on_chunk(&mut self, chunk: IncomingChunkMessage) -> Option<SessionAction> {
        if self.state == SessionState::Closed {
            return None;
        }

        if self.window.len() >= self.max_buffered_chunks {
            warn!(
                connection_id = %self.connection_id,
                buffered_chunks = self.window.len(),
                "Dropping chunk, flush still in flight"
            );
            let err = RelayError::Backpressure(format!(
                "{} chunks already buffered while a window is being transcribed",
                self.window.len()
            ));
            return Some(SessionAction::Reply(OutboundMessage::from(err)));
        }

        self.chunks_received += 1;
        self.window.append(chunk.audio);
        self.current_ids = Some((chunk.session_id, chunk.speaker_id));

        if self.state == SessionState::Idle && self.window.is_full() {
            return self.start_flush();
        }
        None
    }

    /// The in-flight flush finished (successfully or not).
    ///
    /// Starts the next flush straight away if enough audio piled up meanwhile.
    pub fn on_flush_complete(&mut self) -> Option<SessionAction> {
        match self.state {
            SessionState::Closed => None,
            SessionState::Idle => {
                warn!(connection_id = %self.connection_id, "Flush completion without a flush in flight");
                None
            }
            SessionState::Flushing => {
                self.state = SessionState::Idle;
                if self.window.is_full() {
                    self.start_flush()
                } else {
                    None
                }
            }
        }
    }

    /// Transport closed. Partial audio below the threshold is dropped.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }

        let dropped_chunks = self.window.len();
        let dropped_bytes = self.window.buffered_bytes();
        if !self.window.is_empty() {
            debug!(
                connection_id = %self.connection_id,
                duration_secs = self.window.duration_seconds(),
                "Dropping partial window below the flush threshold"
            );
        }
        self.window.drain_all();
        let was_flushing = self.state == SessionState::Flushing;
        self.state = SessionState::Closed;

        info!(
            connection_id = %self.connection_id,
            dropped_chunks,
            dropped_bytes,
            flush_in_flight = was_flushing,
            windows = self.windows_started,
            "Connection session closed"
        );
    }

    fn start_flush(&mut self) -> Option<SessionAction> {
        let (session_id, speaker_id) = self.current_ids.clone()?;
        let chunk_count = self.window.len();
        let sample_rate = self.window.sample_rate();
        let duration_secs = self.window.duration_seconds();
        let pcm = self.window.drain_all();

        self.windows_started += 1;
        self.state = SessionState::Flushing;

        debug!(
            connection_id = %self.connection_id,
            window_seq = self.windows_started,
            chunk_count,
            bytes = pcm.len(),
            duration_secs,
            "Window full, starting flush"
        );

        Some(SessionAction::Flush(FlushJob {
            window_seq: self.windows_started,
            session_id,
            speaker_id,
            chunk_count,
            pcm,
            sample_rate,
        }))
    }
}
