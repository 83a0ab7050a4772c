//! HTTP surface: chat UI, `/chat` turn endpoint, health, generated audio.

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, ConnectInfo, State},
    http::{HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::services::ServeDir;
use yuki_core::{Emotion, Motion, TurnProcessor, TurnRejected, DEFAULT_SESSION_ID};

const SESSION_HEADER: &str = "x-session-id";

#[derive(Clone)]
pub struct AppState {
    pub processor: Arc<TurnProcessor>,
    /// URL prefix the audio cache is served under (e.g. `/static/rvc_audio_cache`).
    pub audio_url_prefix: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    response: String,
    emotion: Emotion,
    motion: Motion,
    audio_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rvc_error_message: Option<String>,
}

pub fn router(state: AppState, static_dir: PathBuf) -> Router {
    Router::new()
        .route("/", get(serve_chat_ui))
        .route("/health", get(health))
        .route("/chat", post(chat_handler))
        .nest_service("/static", ServeDir::new(static_dir))
        .with_state(state)
        .layer(axum::middleware::from_fn(log_requests))
}

async fn log_requests(
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let peer = connect_info
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "local".to_string());
    tracing::info!(target: "yuki::http", "{} {} from {}", request.method(), request.uri().path(), peer);
    next.run(request).await
}

async fn health() -> &'static str {
    "OK"
}

/// Chat UI: avatar stage, transcript, and input bar.
async fn serve_chat_ui() -> Html<&'static str> {
    const INDEX: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/static/index.html"));
    Html(INDEX)
}

/// POST /chat: one conversation turn. Blank or unreadable input is a 400.
async fn chat_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let body = match body {
        Ok(Json(b)) => b,
        Err(e) => {
            tracing::warn!(target: "yuki::http", "Unreadable chat body: {}", e);
            ChatRequest::default()
        }
    };

    let session_id = session_id(body.session_id.as_deref(), &headers);

    match state.processor.handle(&session_id, body.message.as_deref()).await {
        Ok(reply) => {
            let audio_url = reply
                .audio_file
                .as_ref()
                .map(|f| format!("{}/{}", state.audio_url_prefix, f));
            if let Some(ref url) = audio_url {
                tracing::info!(target: "yuki::http", "Serving voice audio from {}", url);
            }
            Json(ChatResponse {
                response: reply.text,
                emotion: reply.emotion,
                motion: reply.motion,
                audio_url,
                rvc_error_message: reply.audio_error,
            })
            .into_response()
        }
        Err(rejected @ TurnRejected::EmptyMessage) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": rejected.to_string() })),
        )
            .into_response(),
    }
}

/// Body `session_id`, then the `x-session-id` header, then the default.
/// Blank values at either level fall through.
fn session_id(from_body: Option<&str>, headers: &HeaderMap) -> String {
    let from_header = headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok());
    [from_body, from_header]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|id| !id.is_empty())
        .unwrap_or(DEFAULT_SESSION_ID)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;
    use yuki_core::config::ConversionConfig;
    use yuki_core::{
        AudioCache, AudioPipeline, ChatAdapter, ChatBackend, ConversionParams, ConversionRequest,
        SessionStore, SpeechBackend, TagParser, Turn, VoiceConversionBackend, YukiError, YukiResult,
    };

    struct CountingChat {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ChatBackend for CountingChat {
        async fn complete(&self, _turns: &[Turn]) -> YukiResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("Welcome back! *giggles* *[emotion: happy; motion: wave]*".to_string())
        }
    }

    struct FileSpeech;

    #[async_trait]
    impl SpeechBackend for FileSpeech {
        async fn synthesize(&self, _text: &str, _voice: &str, dest: &Path) -> YukiResult<()> {
            tokio::fs::write(dest, b"RIFF").await?;
            Ok(())
        }
    }

    struct Converter {
        fail: bool,
    }

    #[async_trait]
    impl VoiceConversionBackend for Converter {
        async fn convert(&self, request: ConversionRequest<'_>) -> YukiResult<()> {
            if self.fail {
                return Err(YukiError::Conversion("inference crashed".into()));
            }
            tokio::fs::copy(request.input, request.output).await?;
            Ok(())
        }
    }

    struct TestApp {
        app: Router,
        chat: Arc<CountingChat>,
        processor: Arc<TurnProcessor>,
        cache_dir: PathBuf,
        _root: tempfile::TempDir,
    }

    fn test_app(conversion_fails: bool) -> TestApp {
        let root = tempfile::tempdir().unwrap();
        let cache_dir = root.path().join("rvc_audio_cache");
        std::fs::create_dir_all(&cache_dir).unwrap();
        let chat = Arc::new(CountingChat { calls: AtomicUsize::new(0) });
        let audio = AudioPipeline::new(
            Arc::new(FileSpeech),
            Arc::new(Converter { fail: conversion_fails }),
            AudioCache::new(&cache_dir, "yuki_rvc_output"),
            "en-US-AnaNeural",
            ConversionParams::from(&ConversionConfig::default()),
        );
        let processor = TurnProcessor::new(
            ChatAdapter::new(chat.clone(), TagParser::default()),
            audio,
            Arc::new(SessionStore::new("You are Yuki.")),
            "Yuki",
        );
        let processor = Arc::new(processor);
        let state = AppState {
            processor: processor.clone(),
            audio_url_prefix: "/static/rvc_audio_cache".to_string(),
        };
        TestApp {
            app: router(state, root.path().to_path_buf()),
            chat,
            processor,
            cache_dir,
            _root: root,
        }
    }

    fn post_chat(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/chat")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(res: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn empty_message_is_bad_request_without_backend_calls() {
        let t = test_app(false);
        let res = t.app.clone().oneshot(post_chat(r#"{"message": ""}"#)).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(res).await, serde_json::json!({ "error": "No message received" }));
        assert_eq!(t.chat.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_or_malformed_body_is_bad_request() {
        let t = test_app(false);
        for body in ["{}", "not json", r#"{"message": 42}"#] {
            let res = t.app.clone().oneshot(post_chat(body)).await.unwrap();
            assert_eq!(res.status(), StatusCode::BAD_REQUEST, "body: {body}");
        }
        assert_eq!(t.chat.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn chat_returns_parsed_reply_with_audio_url() {
        let t = test_app(false);
        let res = t.app.clone().oneshot(post_chat(r#"{"message": "hi"}"#)).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let json = json_body(res).await;
        assert_eq!(json["response"], "Welcome back!");
        assert_eq!(json["emotion"], "happy");
        assert_eq!(json["motion"], "wave");
        assert!(json.get("rvc_error_message").is_none());

        let url = json["audio_url"].as_str().unwrap();
        let name = url.strip_prefix("/static/rvc_audio_cache/").unwrap();
        assert!(t.cache_dir.join(name).is_file());

        let audio = t
            .app
            .clone()
            .oneshot(Request::builder().uri(url).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(audio.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn conversion_failure_returns_null_audio_and_error_message() {
        let t = test_app(true);
        let res = t.app.clone().oneshot(post_chat(r#"{"message": "hi"}"#)).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let json = json_body(res).await;
        assert_eq!(json["response"], "Welcome back!");
        assert!(json["audio_url"].is_null());
        assert_eq!(json["rvc_error_message"], "Yuki's RVC voice generation failed.");
        assert_eq!(std::fs::read_dir(&t.cache_dir).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn session_header_selects_history() {
        let t = test_app(false);
        let req = Request::builder()
            .method("POST")
            .uri("/chat")
            .header("content-type", "application/json")
            .header(SESSION_HEADER, "tab-2")
            .body(Body::from(r#"{"message": "hi"}"#))
            .unwrap();
        let res = t.app.clone().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let sessions = t.processor.sessions();
        assert!(sessions.get("tab-2").is_some());
        assert!(sessions.get(DEFAULT_SESSION_ID).is_none());

        let res = t
            .app
            .clone()
            .oneshot(post_chat(r#"{"message": "again", "session_id": "tab-3"}"#))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(sessions.get("tab-3").is_some());
        assert_eq!(sessions.count(), 2);
    }

    #[tokio::test]
    async fn blank_body_session_id_falls_back_to_header() {
        let t = test_app(false);
        let req = Request::builder()
            .method("POST")
            .uri("/chat")
            .header("content-type", "application/json")
            .header(SESSION_HEADER, "tab-9")
            .body(Body::from(r#"{"message": "hi", "session_id": "  "}"#))
            .unwrap();
        let res = t.app.clone().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let sessions = t.processor.sessions();
        assert!(sessions.get("tab-9").is_some());
        assert_eq!(sessions.count(), 1);
    }

    #[test]
    fn session_id_resolution_order() {
        let mut headers = HeaderMap::new();
        assert_eq!(session_id(None, &headers), DEFAULT_SESSION_ID);
        assert_eq!(session_id(Some(""), &headers), DEFAULT_SESSION_ID);

        headers.insert(SESSION_HEADER, "from-header".parse().unwrap());
        assert_eq!(session_id(Some("from-body"), &headers), "from-body");
        assert_eq!(session_id(Some(""), &headers), "from-header");
        assert_eq!(session_id(None, &headers), "from-header");
    }

    #[test]
    fn chat_response_uses_wire_field_names() {
        let body = ChatResponse {
            response: "hi".into(),
            emotion: Emotion::ShyBlush,
            motion: Motion::idle(),
            audio_url: None,
            rvc_error_message: Some("Yuki's RVC voice generation failed.".into()),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["response"], "hi");
        assert_eq!(json["emotion"], "shy_blush");
        assert_eq!(json["motion"], "Idle");
        assert!(json["audio_url"].is_null());
        assert_eq!(json["rvc_error_message"], "Yuki's RVC voice generation failed.");

        let ok = ChatResponse {
            rvc_error_message: None,
            audio_url: Some("/static/rvc_audio_cache/a.wav".into()),
            ..body
        };
        let json = serde_json::to_value(&ok).unwrap();
        assert!(json.get("rvc_error_message").is_none());
        assert_eq!(json["audio_url"], "/static/rvc_audio_cache/a.wav");
    }

    #[tokio::test]
    async fn index_and_health_are_served() {
        let t = test_app(false);
        let res = t
            .app
            .clone()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&bytes).contains("/chat"));

        let res = t
            .app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }
}
