use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use backdrop_comfyui::api::ComfyUIApi;
use backdrop_comfyui::workflow::WorkflowTemplate;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`). Nothing in
/// here is mutable: the template is read-only and compiled into a
/// per-request copy, and the HTTP client pools connections internally.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration, including slot bindings and poll tuning.
    pub config: Arc<ServerConfig>,
    /// Workflow template, validated against the bindings at startup.
    pub template: Arc<WorkflowTemplate>,
    /// Generation backend client.
    pub comfyui: Arc<ComfyUIApi>,
    /// Process-wide shutdown token; interrupts in-flight polling.
    pub shutdown: CancellationToken,
}
