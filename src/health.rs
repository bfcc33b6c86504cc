//! Plain HTTP endpoints: readiness text, health JSON and relay metrics.

use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;

/// Text body served on `GET /` when the request is not a WebSocket upgrade.
pub const READY_TEXT: &str = "Transcript relay is running. Connect over WebSocket to stream audio.";

pub async fn index() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body(READY_TEXT)
}

pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let config = &state.config;

    HttpResponse::Ok().json(json!({
        "status": "ready",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": state.uptime_seconds(),
        "service": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "host": config.server.host,
            "port": config.server.port,
            "max_frame_bytes": config.server.max_frame_bytes
        },
        "relay": {
            "flush_threshold": config.audio.flush_threshold,
            "container_format": state.pipeline.encoder().format().to_string(),
            "provider": state.pipeline.client().provider_name(),
            "deadline_secs": state.pipeline.client().deadline().map(|d| d.as_secs()),
            "store": state.pipeline.store_name()
        }
    }))
}

pub async fn relay_metrics(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.metrics_snapshot();
    let provider = state.pipeline.client().performance_stats().await;

    HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": state.uptime_seconds(),
        "connections": {
            "active": metrics.active_connections,
            "total": metrics.total_connections
        },
        "chunks": {
            "received": metrics.chunks_received,
            "validation_rejections": metrics.validation_rejections,
            "backpressure_rejections": metrics.backpressure_rejections
        },
        "windows": {
            "flushed": metrics.windows_flushed,
            "transcribed": metrics.windows_transcribed,
            "transcription_failures": metrics.transcription_failures,
            "persistence_failures": metrics.persistence_failures,
            "replies_delivered": metrics.replies_delivered,
            "replies_discarded": metrics.replies_discarded,
            "average_flush_time_ms": metrics.average_flush_time_ms()
        },
        "provider": provider
    }))
}
