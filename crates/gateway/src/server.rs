//! Router construction and server lifecycle.

use std::sync::Arc;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::Instrument;

use docent_core::snapshot::ConfigStore;
use docent_core::types::Utterance;
use docent_core::{Error, Result};
use docent_synthesis::SynthesisOrchestrator;

use crate::pipeline::{ChatPipeline, ChatRequest};
use crate::ws;

/// Gateway surface toggles, resolved from static config at startup.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    /// Origins allowed by CORS; `"*"` (or an empty list) allows any.
    pub allowed_origins: Vec<String>,
    pub enable_cors: bool,
    pub enable_tracing: bool,
    pub enable_metrics: bool,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
            enable_cors: true,
            enable_tracing: true,
            enable_metrics: false,
        }
    }
}

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ChatPipeline>,
    pub synthesis: Arc<SynthesisOrchestrator>,
    pub config: ConfigStore,
}

/// Build the gateway router.
pub fn build_router(state: AppState, settings: &GatewaySettings) -> Router {
    let mut router = Router::new()
        .route("/health", get(health))
        .route("/v1/chat", post(chat))
        .route("/v1/chat/stream", post(chat_stream))
        .route("/v1/tts/ws", get(ws::tts_ws));

    if settings.enable_metrics {
        let handle = metrics_exporter_prometheus::PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| tracing::error!(error = %e, "Prometheus recorder install failed"))
            .ok();
        if let Some(handle) = handle {
            router = router.route("/metrics", get(move || std::future::ready(handle.render())));
        }
    }

    let mut router = router.with_state(state);

    if settings.enable_cors {
        let wildcard = settings.allowed_origins.is_empty()
            || settings.allowed_origins.iter().any(|origin| origin == "*");
        let origins = if wildcard {
            AllowOrigin::any()
        } else {
            AllowOrigin::list(
                settings
                    .allowed_origins
                    .iter()
                    .filter_map(|origin| origin.parse::<axum::http::HeaderValue>().ok()),
            )
        };
        router = router.layer(
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }
    if settings.enable_tracing {
        router = router.layer(TraceLayer::new_for_http());
    }
    router
}

/// Bind and serve until the process is stopped.
pub async fn run(host: &str, port: u16, router: Router) -> Result<()> {
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| Error::internal(format!("bind {addr}: {e}")))?;
    tracing::info!(%addr, "Gateway listening");

    axum::serve(listener, router)
        .await
        .map_err(|e| Error::internal(format!("serve: {e}")))
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> impl IntoResponse {
    let request_id = uuid::Uuid::new_v4();
    let session = request.session_id.clone().unwrap_or_default();
    let span = tracing::info_span!("chat", %request_id, %session);

    async move {
        if request.message.trim().is_empty() {
            return Err((
                axum::http::StatusCode::BAD_REQUEST,
                Json(json!({ "error": "message is required" })),
            ));
        }

        metrics::counter!("docent_requests_total", "endpoint" => "chat").increment(1);

        match state
            .pipeline
            .answer(Utterance::typed(request.message), request.history)
            .await
        {
            Ok(answer) => Ok(Json(answer)),
            Err(e) => {
                tracing::error!(error = %e, "Chat request failed");
                Err((
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": e.to_string() })),
                ))
            }
        }
    }
    .instrument(span)
    .await
}

async fn chat_stream(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> axum::response::Response {
    if request.message.trim().is_empty() {
        return (
            axum::http::StatusCode::BAD_REQUEST,
            Json(json!({ "error": "message is required" })),
        )
            .into_response();
    }

    metrics::counter!("docent_requests_total", "endpoint" => "chat_stream").increment(1);

    let rx = state
        .pipeline
        .stream(Utterance::typed(request.message), request.history);

    let stream = ReceiverStream::new(rx).map(|event| Event::default().json_data(&event));
    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use docent_core::mocks::{MockLlmTier, MockModeration, MockTtsTier, MockVectorSearch};
    use docent_core::snapshot::ConfigSnapshot;
    use docent_core::traits::{LlmTier, TtsTier};
    use docent_generation::GenerationOrchestrator;
    use docent_retrieval::Retriever;
    use docent_safety::SafetyGate;

    fn test_state() -> AppState {
        let gate = Arc::new(SafetyGate::new(500, Arc::new(MockModeration::allowing())));
        let retriever = Arc::new(Retriever::new(Arc::new(MockVectorSearch::with_hits(Vec::new())), 5));
        let generation = Arc::new(GenerationOrchestrator::new(
            Some(Arc::new(MockLlmTier::streaming("local", &["Hello there."])) as Arc<dyn LlmTier>),
            None,
            Duration::from_millis(100),
            Duration::from_millis(100),
        ));
        let synthesis = Arc::new(SynthesisOrchestrator::new(
            Some(Arc::new(MockTtsTier::ok("kokoro")) as Arc<dyn TtsTier>),
            None,
            None,
            3,
            Duration::from_millis(500),
        ));
        let config = ConfigStore::fixed(ConfigSnapshot::default());
        AppState {
            pipeline: Arc::new(ChatPipeline::new(
                gate,
                retriever,
                generation.clone(),
                synthesis.clone(),
                config.clone(),
            )),
            synthesis,
            config,
        }
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let router = build_router(test_state(), &GatewaySettings::default());
        let response = router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn chat_answers_a_message() {
        let router = build_router(test_state(), &GatewaySettings::default());
        let response = router
            .oneshot(
                Request::post("/v1/chat")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"message": "hi"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), 1 << 20).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["reply"], "Hello there.");
    }

    #[tokio::test]
    async fn chat_rejects_empty_message() {
        let router = build_router(test_state(), &GatewaySettings::default());
        let response = router
            .oneshot(
                Request::post("/v1/chat")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"message": "  "}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn chat_stream_rejects_empty_message() {
        let router = build_router(test_state(), &GatewaySettings::default());
        let response = router
            .oneshot(
                Request::post("/v1/chat/stream")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"message": "  "}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn cors_honors_configured_origins() {
        let settings = GatewaySettings {
            allowed_origins: vec!["http://localhost:3000".to_string()],
            ..GatewaySettings::default()
        };

        let router = build_router(test_state(), &settings);
        let response = router
            .oneshot(
                Request::get("/health")
                    .header("origin", "http://localhost:3000")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "http://localhost:3000"
        );

        let router = build_router(test_state(), &settings);
        let response = router
            .oneshot(
                Request::get("/health")
                    .header("origin", "http://elsewhere.example")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(response.headers().get("access-control-allow-origin").is_none());
    }

    #[tokio::test]
    async fn chat_stream_emits_sse() {
        let router = build_router(test_state(), &GatewaySettings::default());
        let response = router
            .oneshot(
                Request::post("/v1/chat/stream")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"message": "hi"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "text/event-stream"
        );

        let body = axum::body::to_bytes(response.into_body(), 1 << 20).await.unwrap();
        let text = String::from_utf8_lossy(&body);
        assert!(text.contains(r#""type":"text""#));
        assert!(text.contains(r#""type":"done""#));
    }
}
