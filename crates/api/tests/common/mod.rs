//! Shared fixtures for API integration tests.
//!
//! Mirrors the router construction in `main.rs` so tests exercise the
//! same middleware stack (CORS, request ID, timeout, panic recovery)
//! that production uses, with the generation backend replaced by an
//! in-process fake served on an ephemeral port.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, Method, Request, Response, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use http_body_util::BodyExt;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;

use backdrop_api::config::ServerConfig;
use backdrop_api::routes;
use backdrop_api::state::AppState;
use backdrop_comfyui::api::ComfyUIApi;
use backdrop_comfyui::workflow::{SlotBindings, WorkflowTemplate};

/// Scriptable in-process generation backend.
#[derive(Default)]
pub struct FakeComfyUI {
    /// Captured body of the last `/prompt` request.
    submitted: Mutex<Option<serde_json::Value>>,
    /// Scripted `/prompt` response; default accepts the job.
    submit_response: Mutex<Option<(u16, String)>>,
    /// Scripted history bodies; the last entry repeats.
    history: Mutex<VecDeque<String>>,
    /// Bytes served by `/view`.
    view_bytes: Mutex<Vec<u8>>,
    /// Name returned by `/upload/image`.
    upload_name: Mutex<String>,
}

impl FakeComfyUI {
    pub fn new() -> Arc<Self> {
        let fake = Self::default();
        *fake.upload_name.lock().unwrap() = "uploaded_input.png".to_string();
        Arc::new(fake)
    }

    pub fn push_history(&self, body: serde_json::Value) {
        self.history.lock().unwrap().push_back(body.to_string());
    }

    pub fn set_submit_response(&self, status: u16, body: serde_json::Value) {
        *self.submit_response.lock().unwrap() = Some((status, body.to_string()));
    }

    pub fn set_view_bytes(&self, bytes: Vec<u8>) {
        *self.view_bytes.lock().unwrap() = bytes;
    }

    /// The workflow document submitted via `/prompt`, if any.
    pub fn submitted_workflow(&self) -> Option<serde_json::Value> {
        self.submitted
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|body| body.get("prompt").cloned())
    }
}

async fn fake_prompt(
    State(fake): State<Arc<FakeComfyUI>>,
    Json(body): Json<serde_json::Value>,
) -> Response<Body> {
    *fake.submitted.lock().unwrap() = Some(body);
    let (status, body) = fake
        .submit_response
        .lock()
        .unwrap()
        .clone()
        .unwrap_or((200, r#"{"prompt_id":"itest-prompt","number":1}"#.to_string()));
    (StatusCode::from_u16(status).unwrap(), body).into_response()
}

async fn fake_history(State(fake): State<Arc<FakeComfyUI>>) -> String {
    let mut queue = fake.history.lock().unwrap();
    match queue.len() {
        0 => "{}".to_string(),
        1 => queue.front().cloned().unwrap(),
        _ => queue.pop_front().unwrap(),
    }
}

async fn fake_view(State(fake): State<Arc<FakeComfyUI>>) -> Vec<u8> {
    fake.view_bytes.lock().unwrap().clone()
}

async fn fake_upload(State(fake): State<Arc<FakeComfyUI>>) -> String {
    format!(r#"{{"name":"{}"}}"#, fake.upload_name.lock().unwrap())
}

/// Serve the fake backend on an ephemeral port, returning its base URL.
pub async fn spawn_fake_backend(fake: Arc<FakeComfyUI>) -> String {
    let app = Router::new()
        .route("/prompt", post(fake_prompt))
        .route("/history/{prompt_id}", get(fake_history))
        .route("/view", get(fake_view))
        .route("/upload/image", post(fake_upload))
        .with_state(fake);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// A base URL nothing is listening on.
pub async fn unreachable_backend() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

/// Build a test `ServerConfig` with fast polling so tests stay quick.
pub fn test_config(comfyui_url: String) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        comfyui_url,
        comfyui_accept_invalid_certs: false,
        template_path: "unused-in-tests".to_string(),
        poll_interval_ms: 10,
        poll_timeout_secs: 1,
        bindings: SlotBindings::default(),
    }
}

/// A template containing every default slot.
pub fn test_template() -> WorkflowTemplate {
    WorkflowTemplate::from_value(serde_json::json!({
        "555": { "class_type": "CLIPTextEncode", "inputs": { "text": "" } },
        "563": { "class_type": "CLIPTextEncode", "inputs": { "text": "" } },
        "204": { "class_type": "GroundingDino", "inputs": { "prompt": "" } },
        "621": { "class_type": "LoadImageFromUrl", "inputs": { "url": "" } },
        "156": { "class_type": "LoadImage", "inputs": { "image": "" } },
        "607": { "class_type": "KSampler", "inputs": { "seed": 0 } },
        "619": { "class_type": "SaveImage", "inputs": {} },
    }))
    .unwrap()
}

/// Build the full application router with all middleware layers,
/// pointed at the given backend URL.
pub fn build_test_app(comfyui_url: String) -> Router {
    let config = test_config(comfyui_url.clone());

    let state = AppState {
        config: Arc::new(config),
        template: Arc::new(test_template()),
        comfyui: Arc::new(ComfyUIApi::new(comfyui_url)),
        shutdown: CancellationToken::new(),
    };

    let request_id_header = HeaderName::from_static("x-request-id");

    let cors = CorsLayer::new()
        .allow_origin(["http://localhost:5173".parse().unwrap()])
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(true);

    Router::new()
        .merge(routes::health::router())
        .nest("/api/v1", routes::api_routes())
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(30),
        ))
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .layer(cors)
        .with_state(state)
}

/// Issue a GET request against the in-memory router.
pub async fn get_request(app: Router, uri: &str) -> Response<Body> {
    app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

/// Issue a POST request with a JSON body against the in-memory router.
pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    app.oneshot(
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
    .unwrap()
}

/// Collect a response body as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
