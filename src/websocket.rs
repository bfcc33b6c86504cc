//! # WebSocket Relay Handler
//!
//! Each connection is an independent actor that owns one `ConnectionSession`.
//! Text frames carry base64 PCM16 chunks; once a window fills, it is handed to
//! the shared `Pipeline` on a background task and the transcript (or error)
//! comes back as a text frame.
//!
//! ## WebSocket Protocol:
//! 1. **Connection**: Client connects to `/` or `/ws`
//! 2. **Audio Streaming**: Client sends `{"sessionId","speakerId","audio"}` text frames
//! 3. **Replies**: Server sends `{"text": ...}` per flushed window, or
//!    `{"error": ..., "details": ...}` for rejected frames and failed windows
//! 4. **Heartbeat**: Server pings every 30s and drops clients silent for 60s
//!
//! ## Frame Size:
//! A message may be at most `server.max_frame_bytes` long, whether it arrives
//! as one frame or as continuation fragments. Anything larger is answered
//! with a `validation_error` and the connection stays open.
//!
//! ## Lifetime:
//! Flush tasks are not tied to the actor. If the client disconnects
//! mid-flush, the window is still transcribed and persisted and only the
//! reply is discarded.

use crate::error::{AppError, AppResult, RelayError};
use crate::relay::{ConnectionSession, FlushJob, FlushReport, OutboundMessage, SessionAction};
use crate::state::AppState;

use actix::prelude::*;
use actix_http::ws::Item;
use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

/// WebSocket actor for one relay connection.
pub struct RelayWebSocket {
    session: ConnectionSession,

    /// Shared state (pipeline, metrics)
    state: AppState,

    /// Last time the client showed signs of life
    last_heartbeat: Instant,

    /// Message being reassembled from continuation frames
    fragments: Option<Fragments>,
}

/// Partial message collected from continuation frames.
struct Fragments {
    text: bool,
    data: Vec<u8>,
    /// Set once the message outgrew the limit; the rest is skipped
    oversized: bool,
}

impl Fragments {
    fn new(text: bool) -> Self {
        Self {
            text,
            data: Vec::new(),
            oversized: false,
        }
    }
}

/// Result of a background flush, delivered back to the connection actor.
#[derive(Message)]
#[rtype(result = "()")]
struct FlushFinished(FlushReport);

impl RelayWebSocket {
    pub fn new(state: AppState) -> Self {
        let connection_id = uuid::Uuid::new_v4().to_string();
        Self {
            session: ConnectionSession::new(connection_id, state.session_limits()),
            state,
            last_heartbeat: Instant::now(),
            fragments: None,
        }
    }

    fn max_frame_bytes(&self) -> usize {
        self.state.config.server.max_frame_bytes
    }

    fn connection_id(&self) -> &str {
        self.session.connection_id()
    }

    /// Carry out whatever the session asked for.
    fn execute(&mut self, action: Option<SessionAction>, ctx: &mut ws::WebsocketContext<Self>) {
        match action {
            Some(SessionAction::Reply(message)) => {
                if let OutboundMessage::Error { error, .. } = &message {
                    match error.as_str() {
                        "validation_error" => self.state.record_validation_rejection(),
                        "backpressure" => self.state.record_backpressure(),
                        _ => {}
                    }
                }
                self.send_frame(&message, ctx);
            }
            Some(SessionAction::Flush(job)) => self.spawn_flush(job, ctx),
            None => {}
        }
    }

    fn on_text_message(&mut self, text: &str, ctx: &mut ws::WebsocketContext<Self>) {
        let before = self.session.chunks_received();
        let action = self.session.on_text(text);
        if self.session.chunks_received() > before {
            self.state.record_chunk();
        }
        self.execute(action, ctx);
    }

    /// Answer a frame that never reached the session.
    fn reject_frame(&mut self, details: String, ctx: &mut ws::WebsocketContext<Self>) {
        warn!(connection_id = %self.connection_id(), "Rejected frame: {}", details);
        let reply = OutboundMessage::from(RelayError::Validation(details));
        self.execute(Some(SessionAction::Reply(reply)), ctx);
    }

    fn oversized_details(&self) -> String {
        format!("message exceeds the {} byte limit", self.max_frame_bytes())
    }

    /// Collect continuation frames and dispatch the message once the last one arrives.
    fn on_fragment(&mut self, item: Item, ctx: &mut ws::WebsocketContext<Self>) {
        let (first, data, last) = match item {
            Item::FirstText(data) => (Some(true), data, false),
            Item::FirstBinary(data) => (Some(false), data, false),
            Item::Continue(data) => (None, data, false),
            Item::Last(data) => (None, data, true),
        };

        if let Some(text) = first {
            if self.fragments.replace(Fragments::new(text)).is_some() {
                self.reject_frame("fragmented message interrupted by a new one".into(), ctx);
            }
        }

        let max_frame_bytes = self.max_frame_bytes();
        let Some(fragments) = self.fragments.as_mut() else {
            self.reject_frame("continuation frame without a first fragment".into(), ctx);
            return;
        };

        let overflowed = !fragments.oversized && fragments.data.len() + data.len() > max_frame_bytes;
        if overflowed {
            fragments.oversized = true;
            fragments.data = Vec::new();
        } else if !fragments.oversized {
            fragments.data.extend_from_slice(&data);
        }

        if overflowed {
            let details = self.oversized_details();
            self.reject_frame(details, ctx);
        }
        if !last {
            return;
        }

        match self.fragments.take() {
            Some(Fragments { oversized: true, .. }) | None => {}
            Some(Fragments { text: true, data, .. }) => match String::from_utf8(data) {
                Ok(text) => self.on_text_message(&text, ctx),
                Err(_) => self.reject_frame("fragmented text message is not valid UTF-8".into(), ctx),
            },
            Some(Fragments { text: false, data, .. }) => {
                let action = self.session.on_binary(data.len());
                self.execute(action, ctx);
            }
        }
    }

    fn send_frame(&self, message: &OutboundMessage, ctx: &mut ws::WebsocketContext<Self>) {
        match message.to_json() {
            Ok(json) => ctx.text(json),
            Err(e) => error!(connection_id = %self.connection_id(), "Failed to serialize reply: {}", e),
        }
    }

    /// Run the pipeline for `job` off the actor.
    fn spawn_flush(&self, job: FlushJob, ctx: &mut ws::WebsocketContext<Self>) {
        let pipeline = self.state.pipeline.clone();
        let state = self.state.clone();
        let addr = ctx.address();
        let connection_id = self.connection_id().to_string();

        tokio::spawn(async move {
            let report = pipeline.run(job).await;
            state.record_flush(&report);

            let window_seq = report.window_seq;
            if let Err(e) = addr.send(FlushFinished(report)).await {
                let err = RelayError::Transport(format!("connection closed before reply: {}", e));
                state.record_discarded_reply();
                debug!(connection_id = %connection_id, window_seq, "{}", err);
            }
        });
    }

    fn check_heartbeat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        if Instant::now().duration_since(self.last_heartbeat) > CLIENT_TIMEOUT {
            warn!(connection_id = %self.connection_id(), "WebSocket heartbeat timeout, closing connection");
            ctx.stop();
        } else {
            ctx.ping(b"");
        }
    }
}

impl Actor for RelayWebSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.state.connection_opened();
        info!(connection_id = %self.connection_id(), "WebSocket connection started");

        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| act.check_heartbeat(ctx));
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        debug!(
            connection_id = %self.connection_id(),
            state = ?self.session.state(),
            buffered_chunks = self.session.buffered_chunks(),
            "Closing relay session"
        );
        self.session.close();
        self.state.connection_closed();
        info!(
            connection_id = %self.connection_id(),
            chunks = self.session.chunks_received(),
            windows = self.session.windows_started(),
            "WebSocket connection stopped"
        );
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for RelayWebSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => {
                self.last_heartbeat = Instant::now();
                self.on_text_message(&text, ctx);
            }
            Ok(ws::Message::Binary(data)) => {
                self.last_heartbeat = Instant::now();
                let action = self.session.on_binary(data.len());
                self.execute(action, ctx);
            }
            Ok(ws::Message::Ping(data)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&data);
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                debug!(connection_id = %self.connection_id(), ?reason, "Client closed connection");
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(item)) => {
                self.last_heartbeat = Instant::now();
                self.on_fragment(item, ctx);
            }
            Ok(ws::Message::Nop) => {}
            // The codec has already skipped the oversized payload
            Err(ws::ProtocolError::Overflow) => {
                self.last_heartbeat = Instant::now();
                let details = self.oversized_details();
                self.reject_frame(details, ctx);
            }
            Err(e) => {
                warn!(connection_id = %self.connection_id(), "WebSocket protocol error: {}", e);
                ctx.stop();
            }
        }
    }
}

impl Handler<FlushFinished> for RelayWebSocket {
    type Result = ();

    fn handle(&mut self, msg: FlushFinished, ctx: &mut Self::Context) {
        let report = msg.0;
        self.send_frame(&report.reply, ctx);
        self.state.record_delivered_reply();

        let next = self.session.on_flush_complete();
        self.execute(next, ctx);
    }
}

/// WebSocket endpoint handler for `/ws`.
pub async fn relay_websocket(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    debug!("New WebSocket connection request from: {:?}", req.connection_info().peer_addr());
    let max_frame_bytes = state.config.server.max_frame_bytes;
    ws::WsResponseBuilder::new(RelayWebSocket::new(state.get_ref().clone()), &req, stream)
        .frame_size(max_frame_bytes)
        .start()
        .map_err(|e| AppError::BadRequest(format!("WebSocket handshake failed: {}", e)))
}

/// `GET /`: upgrade to the relay when asked to, otherwise report readiness.
pub async fn index_or_upgrade(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    if wants_websocket(&req) {
        relay_websocket(req, stream, state).await
    } else {
        Ok(crate::health::index().await)
    }
}

fn wants_websocket(req: &HttpRequest) -> bool {
    req.headers()
        .get(header::UPGRADE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{ContainerEncoder, ContainerFormat};
    use crate::config::{AppConfig, DEFAULT_MAX_FRAME_BYTES};
    use crate::relay::Pipeline;
    use crate::store::MemorySessionStore;
    use crate::transcription::{AudioFormat, SpeechToText, TranscriptionClient, TranscriptionFailure};
    use actix_web::{test, App, HttpServer};
    use async_trait::async_trait;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;
    use futures_util::{SinkExt, StreamExt};
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::{Data, OpCode};
    use tokio_tungstenite::tungstenite::protocol::frame::Frame;
    use tokio_tungstenite::tungstenite::Message;

    /// Provider that answers "hello world" after an optional delay.
    struct FakeProvider {
        delay: Duration,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SpeechToText for FakeProvider {
        fn name(&self) -> &str {
            "fake"
        }

        async fn transcribe(
            &self,
            _container: Vec<u8>,
            _format: AudioFormat,
        ) -> Result<String, TranscriptionFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            Ok("hello world".to_string())
        }
    }

    struct Harness {
        addr: SocketAddr,
        state: AppState,
        store: MemorySessionStore,
        provider: Arc<FakeProvider>,
    }

    fn test_state(delay: Duration, max_frame_bytes: usize) -> (AppState, MemorySessionStore, Arc<FakeProvider>) {
        let provider = Arc::new(FakeProvider {
            delay,
            calls: AtomicUsize::new(0),
        });
        let store = MemorySessionStore::new();
        let pipeline = Pipeline::new(
            TranscriptionClient::new(provider.clone(), None),
            Arc::new(store.clone()),
            ContainerEncoder::new(ContainerFormat::Float32),
        );

        let mut config = AppConfig::default();
        config.transcription.api_key = "sk-test".to_string();
        config.server.max_frame_bytes = max_frame_bytes;
        (AppState::new(config, pipeline), store, provider)
    }

    fn start_server(delay: Duration) -> Harness {
        start_server_with_frame_limit(delay, DEFAULT_MAX_FRAME_BYTES)
    }

    fn start_server_with_frame_limit(delay: Duration, max_frame_bytes: usize) -> Harness {
        let (state, store, provider) = test_state(delay, max_frame_bytes);
        let data = web::Data::new(state.clone());

        let server = HttpServer::new(move || App::new().app_data(data.clone()).configure(crate::configure_routes))
            .workers(1)
            .bind(("127.0.0.1", 0))
            .unwrap();
        let addr = server.addrs()[0];
        actix_web::rt::spawn(server.run());

        Harness {
            addr,
            state,
            store,
            provider,
        }
    }

    fn chunk_json(session: &str, speaker: &str, pcm_bytes: usize) -> String {
        let audio = BASE64.encode(vec![0u8; pcm_bytes]);
        format!(
            r#"{{"sessionId":"{}","speakerId":"{}","audio":"{}"}}"#,
            session, speaker, audio
        )
    }

    fn chunk_frame(session: &str, speaker: &str) -> Message {
        Message::Text(chunk_json(session, speaker, 320))
    }

    async fn next_text<S>(ws: &mut S) -> serde_json::Value
    where
        S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
                .await
                .expect("no reply within 5s")
                .expect("stream ended")
                .expect("websocket error");
            if let Message::Text(text) = frame {
                return serde_json::from_str(&text).unwrap();
            }
        }
    }

    #[actix_web::test]
    async fn test_full_window_is_transcribed_and_persisted() {
        let harness = start_server(Duration::ZERO);
        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", harness.addr))
            .await
            .unwrap();

        for _ in 0..20 {
            ws.send(chunk_frame("m1", "u1")).await.unwrap();
        }

        let reply = next_text(&mut ws).await;
        assert_eq!(reply, serde_json::json!({"text": "hello world"}));

        let records = harness.store.records("m1");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].speaker_id, "u1");
        assert_eq!(records[0].text, "hello world");
        assert_eq!(harness.provider.calls.load(Ordering::SeqCst), 1);

        let metrics = harness.state.metrics_snapshot();
        assert_eq!(metrics.windows_transcribed, 1);
        assert_eq!(metrics.replies_delivered, 1);
    }

    #[actix_web::test]
    async fn test_malformed_frame_gets_validation_error() {
        let harness = start_server(Duration::ZERO);
        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/", harness.addr))
            .await
            .unwrap();

        ws.send(Message::Text(r#"{"sessionId":"m1"}"#.to_string())).await.unwrap();
        let reply = next_text(&mut ws).await;
        assert_eq!(reply["error"], "validation_error");

        // Connection stays usable afterwards
        for _ in 0..20 {
            ws.send(chunk_frame("m1", "u1")).await.unwrap();
        }
        assert_eq!(next_text(&mut ws).await["text"], "hello world");
        assert_eq!(harness.state.metrics_snapshot().validation_rejections, 1);
    }

    #[actix_web::test]
    async fn test_partial_window_dropped_on_disconnect() {
        let harness = start_server(Duration::ZERO);
        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", harness.addr))
            .await
            .unwrap();

        for _ in 0..19 {
            ws.send(chunk_frame("m1", "u1")).await.unwrap();
        }
        ws.close(None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(harness.provider.calls.load(Ordering::SeqCst), 0);
        assert_eq!(harness.store.total_records(), 0);
    }

    #[actix_web::test]
    async fn test_flush_completes_after_disconnect() {
        let harness = start_server(Duration::from_millis(200));
        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", harness.addr))
            .await
            .unwrap();

        for _ in 0..20 {
            ws.send(chunk_frame("m1", "u1")).await.unwrap();
        }
        // Give the server time to start the flush before hanging up
        tokio::time::sleep(Duration::from_millis(50)).await;
        ws.close(None).await.unwrap();
        drop(ws);

        tokio::time::sleep(Duration::from_millis(600)).await;

        assert_eq!(harness.store.records("m1").len(), 1);
        let metrics = harness.state.metrics_snapshot();
        assert_eq!(metrics.windows_flushed, 1);
        assert_eq!(metrics.windows_transcribed, 1);
        assert_eq!(metrics.replies_delivered, 0);
        assert_eq!(metrics.replies_discarded, 1);
        assert_eq!(metrics.active_connections, 0);
    }

    #[actix_web::test]
    async fn test_chunk_frame_larger_than_64k_is_accepted() {
        let harness = start_server(Duration::ZERO);
        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", harness.addr))
            .await
            .unwrap();

        // 1.6 s of audio; the base64 frame is well past 64 KiB
        let large = chunk_json("m1", "u1", 51_200);
        assert!(large.len() > 64 * 1024);
        ws.send(Message::Text(large)).await.unwrap();
        for _ in 0..19 {
            ws.send(chunk_frame("m1", "u1")).await.unwrap();
        }

        assert_eq!(next_text(&mut ws).await, serde_json::json!({"text": "hello world"}));
        let metrics = harness.state.metrics_snapshot();
        assert_eq!(metrics.active_connections, 1);
        assert_eq!(metrics.chunks_received, 20);
        assert_eq!(metrics.validation_rejections, 0);
    }

    #[actix_web::test]
    async fn test_frame_over_limit_gets_validation_error_and_connection_survives() {
        let harness = start_server_with_frame_limit(Duration::ZERO, 2048);
        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", harness.addr))
            .await
            .unwrap();

        ws.send(Message::Text(chunk_json("m1", "u1", 4096))).await.unwrap();
        let reply = next_text(&mut ws).await;
        assert_eq!(reply["error"], "validation_error");
        assert!(reply["details"].as_str().unwrap().contains("2048"));

        for _ in 0..20 {
            ws.send(chunk_frame("m1", "u1")).await.unwrap();
        }
        assert_eq!(next_text(&mut ws).await["text"], "hello world");

        let metrics = harness.state.metrics_snapshot();
        assert_eq!(metrics.active_connections, 1);
        assert_eq!(metrics.chunks_received, 20);
        assert_eq!(metrics.validation_rejections, 1);
    }

    #[actix_web::test]
    async fn test_fragmented_chunk_is_reassembled() {
        let harness = start_server(Duration::ZERO);
        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", harness.addr))
            .await
            .unwrap();

        let bytes = chunk_json("m1", "u1", 320).into_bytes();
        let (head, rest) = bytes.split_at(20);
        let (middle, tail) = rest.split_at(rest.len() / 2);
        ws.send(Message::Frame(Frame::message(head.to_vec(), OpCode::Data(Data::Text), false)))
            .await
            .unwrap();
        ws.send(Message::Frame(Frame::message(middle.to_vec(), OpCode::Data(Data::Continue), false)))
            .await
            .unwrap();
        ws.send(Message::Frame(Frame::message(tail.to_vec(), OpCode::Data(Data::Continue), true)))
            .await
            .unwrap();
        for _ in 0..19 {
            ws.send(chunk_frame("m1", "u1")).await.unwrap();
        }

        assert_eq!(next_text(&mut ws).await, serde_json::json!({"text": "hello world"}));
        assert_eq!(harness.store.records("m1").len(), 1);
        assert_eq!(harness.state.metrics_snapshot().chunks_received, 20);
    }

    #[actix_web::test]
    async fn test_fragmented_message_over_limit_is_rejected_once() {
        let harness = start_server_with_frame_limit(Duration::ZERO, 2048);
        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", harness.addr))
            .await
            .unwrap();

        // Each fragment fits, the whole message does not
        let bytes = chunk_json("m1", "u1", 4096).into_bytes();
        let mut fragments = bytes.chunks(1024).peekable();
        let mut opcode = OpCode::Data(Data::Text);
        while let Some(fragment) = fragments.next() {
            let last = fragments.peek().is_none();
            ws.send(Message::Frame(Frame::message(fragment.to_vec(), opcode, last)))
                .await
                .unwrap();
            opcode = OpCode::Data(Data::Continue);
        }

        let reply = next_text(&mut ws).await;
        assert_eq!(reply["error"], "validation_error");

        for _ in 0..20 {
            ws.send(chunk_frame("m1", "u1")).await.unwrap();
        }
        assert_eq!(next_text(&mut ws).await["text"], "hello world");
        assert_eq!(harness.state.metrics_snapshot().validation_rejections, 1);
    }

    #[actix_web::test]
    async fn test_plain_get_on_root_reports_ready() {
        let (state, _, _) = test_state(Duration::ZERO, DEFAULT_MAX_FRAME_BYTES);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(crate::configure_routes),
        )
        .await;

        let req = test::TestRequest::get().uri("/").to_request();
        let body = test::call_and_read_body(&app, req).await;
        assert_eq!(body, crate::health::READY_TEXT.as_bytes());
    }

    #[actix_web::test]
    async fn test_ws_route_without_upgrade_is_bad_request() {
        let (state, _, _) = test_state(Duration::ZERO, DEFAULT_MAX_FRAME_BYTES);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(crate::configure_routes),
        )
        .await;

        let req = test::TestRequest::get().uri("/ws").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::BAD_REQUEST);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["type"], "bad_request");
    }
}
