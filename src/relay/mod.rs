//! # Relay Core
//!
//! Protocol-agnostic relay logic. The WebSocket actor feeds frames into a
//! `ConnectionSession` and executes the actions it returns; flushes run
//! through the shared `Pipeline`.
//!
//! ## Key Components:
//! - **message**: Inbound chunk validation and outbound reply frames
//! - **session**: Per-connection buffering state machine
//! - **pipeline**: decode → encode → transcribe → persist for one window

pub mod message;
pub mod pipeline;
pub mod session;

pub use message::OutboundMessage;
pub use pipeline::{FlushReport, Pipeline};
pub use session::{ConnectionSession, FlushJob, SessionAction, SessionLimits};
