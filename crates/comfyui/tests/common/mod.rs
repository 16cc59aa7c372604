//! In-process stand-in for a ComfyUI server.
//!
//! Tests script the responses each endpoint should return and assert
//! on the number of history queries the poller issued. The backend is
//! a real axum server on an ephemeral port, so the client code under
//! test exercises its full HTTP path.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;

/// Scripted responses plus call counters.
#[derive(Default)]
pub struct ScriptedBackend {
    /// `(status, body)` pairs served per history query. The last entry
    /// keeps repeating once the queue is down to one, so a test can
    /// script "always running" with a single entry.
    history: Mutex<VecDeque<(u16, String)>>,
    history_calls: AtomicU32,
    submit: Mutex<Option<(u16, String)>>,
    upload: Mutex<Option<(u16, String)>>,
    view: Mutex<Option<Vec<u8>>>,
}

impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_history(&self, body: serde_json::Value) {
        self.push_history_raw(200, &body.to_string());
    }

    pub fn push_history_raw(&self, status: u16, body: &str) {
        self.history
            .lock()
            .unwrap()
            .push_back((status, body.to_string()));
    }

    pub fn set_submit(&self, status: u16, body: serde_json::Value) {
        *self.submit.lock().unwrap() = Some((status, body.to_string()));
    }

    pub fn set_upload(&self, status: u16, body: serde_json::Value) {
        *self.upload.lock().unwrap() = Some((status, body.to_string()));
    }

    pub fn set_view_bytes(&self, bytes: Vec<u8>) {
        *self.view.lock().unwrap() = Some(bytes);
    }

    pub fn history_calls(&self) -> u32 {
        self.history_calls.load(Ordering::SeqCst)
    }

    fn next_history(&self) -> (u16, String) {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        let mut queue = self.history.lock().unwrap();
        match queue.len() {
            0 => (200, "{}".to_string()),
            1 => queue.front().cloned().unwrap(),
            _ => queue.pop_front().unwrap(),
        }
    }
}

fn scripted_response(status: u16, body: String) -> Response {
    (StatusCode::from_u16(status).unwrap(), body).into_response()
}

async fn prompt(State(backend): State<Arc<ScriptedBackend>>) -> Response {
    let (status, body) = backend
        .submit
        .lock()
        .unwrap()
        .clone()
        .unwrap_or((200, r#"{"prompt_id":"test-prompt","number":1}"#.to_string()));
    scripted_response(status, body)
}

async fn history(State(backend): State<Arc<ScriptedBackend>>) -> Response {
    let (status, body) = backend.next_history();
    scripted_response(status, body)
}

async fn view(State(backend): State<Arc<ScriptedBackend>>) -> Response {
    match backend.view.lock().unwrap().clone() {
        Some(bytes) => bytes.into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn upload(State(backend): State<Arc<ScriptedBackend>>) -> Response {
    let (status, body) = backend
        .upload
        .lock()
        .unwrap()
        .clone()
        .unwrap_or((200, r#"{"name":"upload.png"}"#.to_string()));
    scripted_response(status, body)
}

/// Serve the scripted backend on an ephemeral port, returning its base URL.
pub async fn spawn_backend(backend: Arc<ScriptedBackend>) -> String {
    let app = Router::new()
        .route("/prompt", post(prompt))
        .route("/history/{prompt_id}", get(history))
        .route("/view", get(view))
        .route("/upload/image", post(upload))
        .with_state(backend);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// A base URL nothing is listening on (bound once, then released).
pub async fn unreachable_backend() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}
