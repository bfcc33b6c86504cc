//! # Configuration Management
//!
//! Loads relay settings from multiple sources:
//! - Default values (built into the code)
//! - TOML configuration file (config.toml)
//! - Environment variables (with APP_ prefix)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Provider key and deployment shortcuts (`OPENAI_API_KEY`, `OPENAI_KEY`, `HOST`, `PORT`)
//! 2. Environment variables (`APP_SERVER__PORT`, `APP_AUDIO__FLUSH_THRESHOLD`, etc.)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)

use crate::audio::window::DEFAULT_FLUSH_THRESHOLD;
use crate::audio::ContainerFormat;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub audio: AudioConfig,
    pub transcription: TranscriptionConfig,
    pub storage: StorageConfig,
}

/// Server-specific configuration settings.
///
/// ## Common values:
/// - `host = "127.0.0.1"`: Only accept connections from localhost (development)
/// - `host = "0.0.0.0"`: Accept connections from any IP address (production)
///
/// `max_frame_bytes` caps a single WebSocket message, including one
/// reassembled from continuation fragments. Base64 inflates audio by a third,
/// so the default leaves room for roughly three minutes of 16 kHz PCM16.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

/// Default WebSocket message cap: 8 MiB.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 8 * 1024 * 1024;

fn default_max_frame_bytes() -> usize {
    DEFAULT_MAX_FRAME_BYTES
}

/// Chunk windowing settings.
///
/// ## Fields:
/// - `flush_threshold`: Chunks per window; reaching it triggers a flush
/// - `max_buffered_chunks`: Chunks a connection may buffer while a flush is
///   in flight before further chunks are refused with `backpressure`
/// - `container_format`: Sample layout of the WAV sent to the provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    pub flush_threshold: usize,
    pub max_buffered_chunks: usize,
    pub container_format: ContainerFormat,
}

/// Speech-to-text provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,

    /// ISO-639-1 language hint passed to the provider
    #[serde(default)]
    pub language: Option<String>,

    /// Upper bound on one provider call. Absent means wait indefinitely.
    #[serde(default)]
    pub deadline_secs: Option<u64>,
}

impl TranscriptionConfig {
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Jsonl,
    Memory,
}

/// Transcript persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub data_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 5000,
                max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            },
            audio: AudioConfig {
                flush_threshold: DEFAULT_FLUSH_THRESHOLD,
                max_buffered_chunks: 200,
                container_format: ContainerFormat::Float32,
            },
            transcription: TranscriptionConfig {
                base_url: "https://api.openai.com/v1".to_string(),
                api_key: String::new(), // must come from config.toml or the environment
                model: "whisper-1".to_string(),
                language: None,
                deadline_secs: None,
            },
            storage: StorageConfig {
                backend: StorageBackend::Jsonl,
                data_dir: PathBuf::from("data"),
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from every source in priority order.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__HOST=0.0.0.0`: Override server host
    /// - `APP_AUDIO__FLUSH_THRESHOLD=40`: Larger windows
    /// - `APP_STORAGE__BACKEND=memory`: Keep transcripts in memory only
    /// - `OPENAI_API_KEY=sk-...`: Provider credential
    /// - `PORT=3000`: Special case for deployment platforms
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        if let Some(key) = provider_key_from_env() {
            settings = settings.set_override("transcription.api_key", key)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// Any failure here stops the process at startup.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.server.max_frame_bytes == 0 {
            return Err(anyhow::anyhow!("max_frame_bytes must be greater than 0"));
        }

        if self.audio.flush_threshold == 0 {
            return Err(anyhow::anyhow!("Flush threshold must be greater than 0"));
        }

        if self.audio.max_buffered_chunks < self.audio.flush_threshold {
            return Err(anyhow::anyhow!(
                "max_buffered_chunks ({}) cannot be below flush_threshold ({})",
                self.audio.max_buffered_chunks,
                self.audio.flush_threshold
            ));
        }

        if self.transcription.api_key.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "Transcription API key is not set (OPENAI_API_KEY or transcription.api_key)"
            ));
        }

        if self.transcription.base_url.trim().is_empty() {
            return Err(anyhow::anyhow!("Transcription base_url cannot be empty"));
        }

        if self.transcription.deadline_secs == Some(0) {
            return Err(anyhow::anyhow!("Transcription deadline must be greater than 0 seconds"));
        }

        Ok(())
    }
}

/// `OPENAI_API_KEY` wins over the older `OPENAI_KEY` name.
fn provider_key_from_env() -> Option<String> {
    ["OPENAI_API_KEY", "OPENAI_KEY"]
        .iter()
        .filter_map(|name| env::var(name).ok())
        .find(|value| !value.trim().is_empty())
}
