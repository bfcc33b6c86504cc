//! # Audio Processing Module
//!
//! Everything the relay does to audio between the WebSocket and the
//! transcription provider.
//!
//! ## Key Components:
//! - **Chunk Window**: Per-connection accumulator that drains into one window
//! - **Decoder**: PCM16 little-endian bytes → normalized float samples
//! - **Encoder**: Float samples → WAV container for the provider
//!
//! ## Audio Format Requirements:
//! - **Sample Rate**: 16kHz (16,000 Hz)
//! - **Bit Depth**: 16-bit PCM
//! - **Channels**: Mono (1 channel)
//! - **Encoding**: Little-endian signed integers

pub mod decoder;   // PCM16 → f32 conversion
pub mod encoder;   // f32 → WAV container
pub mod window;    // Chunk accumulation and draining

pub use decoder::decode_pcm16;
pub use encoder::{ContainerEncoder, ContainerFormat};
pub use window::ChunkWindow;

/// Fixed sample rate of all inbound audio.
pub const SAMPLE_RATE: u32 = 16_000;
