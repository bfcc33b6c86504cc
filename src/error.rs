//! # Error Handling
//!
//! Two families of errors live here:
//!
//! - **RelayError**: failures inside the per-connection audio pipeline. None of
//!   them are fatal; each is either reported back to the sender as a
//!   structured error frame or logged and swallowed.
//! - **AppError**: failures on the plain HTTP surface, converted to JSON
//!   responses through actix's `ResponseError` trait.
//!
//! ## Relay Error Codes:
//! Every relay error carries a stable machine-readable code that goes into the
//! `error` field of the outbound frame:
//! - `validation_error`: malformed or incomplete inbound message
//! - `transcription_error`: provider call failed or returned no usable text
//! - `persistence_error`: store append failed (logged, never replied)
//! - `transport_error`: reply could not be delivered (connection gone)
//! - `backpressure`: the connection is sending faster than windows drain

use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

/// Errors raised while relaying audio for one connection.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayError {
    /// Inbound message was missing fields or carried an undecodable payload
    Validation(String),

    /// The transcription provider failed or produced no text
    Transcription(String),

    /// Appending the transcript to the session store failed
    Persistence(String),

    /// The reply couldn't be delivered because the connection closed
    Transport(String),

    /// Too many chunks buffered while a flush is still in flight
    Backpressure(String),
}

impl RelayError {
    /// Stable code used in outbound error frames.
    pub fn code(&self) -> &'static str {
        match self {
            RelayError::Validation(_) => "validation_error",
            RelayError::Transcription(_) => "transcription_error",
            RelayError::Persistence(_) => "persistence_error",
            RelayError::Transport(_) => "transport_error",
            RelayError::Backpressure(_) => "backpressure",
        }
    }

    /// Human-readable detail without the category prefix.
    pub fn details(&self) -> &str {
        match self {
            RelayError::Validation(msg)
            | RelayError::Transcription(msg)
            | RelayError::Persistence(msg)
            | RelayError::Transport(msg)
            | RelayError::Backpressure(msg) => msg,
        }
    }
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayError::Validation(msg) => write!(f, "Validation error: {}", msg),
            RelayError::Transcription(msg) => write!(f, "Transcription error: {}", msg),
            RelayError::Persistence(msg) => write!(f, "Persistence error: {}", msg),
            RelayError::Transport(msg) => write!(f, "Transport error: {}", msg),
            RelayError::Backpressure(msg) => write!(f, "Backpressure: {}", msg),
        }
    }
}

impl std::error::Error for RelayError {}

/// Errors returned from HTTP handlers.
///
/// The only HTTP failure the relay produces is a rejected WebSocket
/// handshake, answered with a 400.
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

/// Converts errors into JSON HTTP responses.
///
/// ## JSON Response Format:
/// ```json
/// {
///   "error": {
///     "type": "bad_request",
///     "message": "WebSocket handshake failed",
///     "timestamp": "2025-01-01T12:00:00Z"
///   }
/// }
/// ```
impl ResponseError for AppError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        match self {
            AppError::BadRequest(_) => actix_web::http::StatusCode::BAD_REQUEST,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let (error_type, message) = match self {
            AppError::BadRequest(msg) => ("bad_request", msg),
        };

        HttpResponse::build(self.status_code()).json(json!({
            "error": {
                "type": error_type,
                "message": message,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

/// Shorthand for `Result<T, AppError>`.
pub type AppResult<T> = Result<T, AppError>;
