//! # Transcript Relay - Main Application Entry Point
//!
//! A WebSocket relay that turns streamed PCM16 audio chunks into text.
//! Clients push base64 chunks; every full window is decoded, wrapped in a WAV
//! container, sent to a speech-to-text provider, persisted per session, and
//! the transcript is sent back over the same connection.
//!
//! ## Application Architecture:
//! - **config**: Application configuration (TOML file + environment variables)
//! - **state**: Shared state, metrics and the flush pipeline
//! - **audio**: Chunk windowing, PCM16 decoding, WAV encoding
//! - **transcription**: Speech-to-text provider seam and OpenAI adapter
//! - **store**: Append-only transcript persistence
//! - **relay**: Wire messages, per-connection state machine, flush pipeline
//! - **websocket**: Actor that binds a connection to the relay core
//! - **health**: Readiness, health and metrics endpoints
//! - **error**: Relay error codes and HTTP error responses

mod audio;
mod config;
mod error;
mod health;
mod relay;
mod state;
mod store;
mod transcription;
mod websocket;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use audio::ContainerEncoder;
use config::{AppConfig, StorageBackend};
use relay::Pipeline;
use state::AppState;
use std::sync::Arc;
use store::{JsonlSessionStore, MemorySessionStore, SessionStore};
use tracing::{error, info, warn};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transcription::{OpenAiTranscriber, TranscriptionClient};

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting transcript-relay v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {}:{}", config.server.host, config.server.port);

    let pipeline = build_pipeline(&config).await?;
    let app_state = AppState::new(config.clone(), pipeline);
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(cors)
            .wrap(TracingLogger::default())
            .configure(configure_routes)
    })
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task error: {}", e),
                Ok(Ok(())) => {}
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Route table shared by the server and the tests.
pub(crate) fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(websocket::index_or_upgrade))
        .route("/ws", web::get().to(websocket::relay_websocket))
        .route("/health", web::get().to(health::health_check))
        .route("/metrics", web::get().to(health::relay_metrics));
}

/// Construct the provider client and session store once for the whole process.
async fn build_pipeline(config: &AppConfig) -> Result<Pipeline> {
    let transcription = &config.transcription;
    let provider = OpenAiTranscriber::new(
        transcription.base_url.clone(),
        transcription.api_key.clone(),
        transcription.model.clone(),
        transcription.language.clone(),
    )
    .context("failed to build transcription HTTP client")?;
    let client = TranscriptionClient::new(Arc::new(provider), transcription.deadline());

    let store: Arc<dyn SessionStore> = match config.storage.backend {
        StorageBackend::Jsonl => {
            let store = JsonlSessionStore::open(&config.storage.data_dir)
                .await
                .with_context(|| format!("failed to open data dir {}", config.storage.data_dir.display()))?;
            info!("Persisting transcripts under {}", store.root().display());
            Arc::new(store)
        }
        StorageBackend::Memory => {
            warn!("Using in-memory transcript store; transcripts are lost on restart");
            Arc::new(MemorySessionStore::new())
        }
    };

    info!(
        provider = %client.provider_name(),
        model = %transcription.model,
        store = %store.name(),
        flush_threshold = config.audio.flush_threshold,
        container_format = %config.audio.container_format,
        "Relay pipeline ready"
    );

    Ok(Pipeline::new(
        client,
        store,
        ContainerEncoder::new(config.audio.container_format),
    ))
}

/// Initialize tracing.
///
/// `RUST_LOG` controls the filter; defaults to
/// `transcript_relay=debug,actix_web=info`.
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "transcript_relay=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

/// Resolve on SIGINT (Ctrl+C) or SIGTERM.
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
