use std::time::Duration;

use backdrop_comfyui::poller::PollConfig;
use backdrop_comfyui::workflow::{Slot, SlotBindings};

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `5000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `180`). Must exceed
    /// the polling timeout so a slow generation produces a 504 from
    /// the poller rather than a generic 408 from the middleware.
    pub request_timeout_secs: u64,
    /// Base HTTP URL of the generation backend.
    pub comfyui_url: String,
    /// Disable TLS certificate verification for the backend client.
    /// Off by default; only for controlled environments with
    /// self-signed certificates.
    pub comfyui_accept_invalid_certs: bool,
    /// Path to the workflow template JSON file.
    pub template_path: String,
    /// Delay between history queries in milliseconds (default: `1000`).
    pub poll_interval_ms: u64,
    /// Wall-clock budget per generation job in seconds (default: `120`).
    pub poll_timeout_secs: u64,
    /// Node ids and output shape of the deployed workflow.
    pub bindings: SlotBindings,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                        | Default                 |
    /// |--------------------------------|-------------------------|
    /// | `HOST`                         | `0.0.0.0`               |
    /// | `PORT`                         | `5000`                  |
    /// | `CORS_ORIGINS`                 | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`         | `180`                   |
    /// | `COMFYUI_URL`                  | `http://127.0.0.1:8188` |
    /// | `COMFYUI_ACCEPT_INVALID_CERTS` | `false`                 |
    /// | `WORKFLOW_TEMPLATE_PATH`       | `config/bg_workflow.json` |
    /// | `POLL_INTERVAL_MS`             | `1000`                  |
    /// | `POLL_TIMEOUT_SECS`            | `120`                   |
    ///
    /// Slot bindings are overridable per node: `WORKFLOW_NODE_STYLE`,
    /// `WORKFLOW_NODE_MAIN`, `WORKFLOW_NODE_TOKEN`,
    /// `WORKFLOW_NODE_IMAGE_URL`, `WORKFLOW_NODE_IMAGE`,
    /// `WORKFLOW_NODE_SEED`, `WORKFLOW_NODE_PREFIX` (unset disables the
    /// prefix slot), `WORKFLOW_OUTPUT_NODE`, and `WORKFLOW_OUTPUT_SHAPE`
    /// (`reference` or `inline`). A binding value is either a node id
    /// (`"607"`) or a node id with an explicit input name (`"607:seed"`).
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "5000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "180".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let comfyui_url = std::env::var("COMFYUI_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:8188".into())
            .trim_end_matches('/')
            .to_string();

        let comfyui_accept_invalid_certs: bool = std::env::var("COMFYUI_ACCEPT_INVALID_CERTS")
            .unwrap_or_else(|_| "false".into())
            .parse()
            .expect("COMFYUI_ACCEPT_INVALID_CERTS must be true or false");

        let template_path = std::env::var("WORKFLOW_TEMPLATE_PATH")
            .unwrap_or_else(|_| "config/bg_workflow.json".into());

        let poll_interval_ms: u64 = std::env::var("POLL_INTERVAL_MS")
            .unwrap_or_else(|_| "1000".into())
            .parse()
            .expect("POLL_INTERVAL_MS must be a valid u64");

        let poll_timeout_secs: u64 = std::env::var("POLL_TIMEOUT_SECS")
            .unwrap_or_else(|_| "120".into())
            .parse()
            .expect("POLL_TIMEOUT_SECS must be a valid u64");

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            comfyui_url,
            comfyui_accept_invalid_certs,
            template_path,
            poll_interval_ms,
            poll_timeout_secs,
            bindings: bindings_from_env(),
        }
    }

    /// Polling parameters derived from this configuration.
    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            interval: Duration::from_millis(self.poll_interval_ms),
            timeout: Duration::from_secs(self.poll_timeout_secs),
        }
    }
}

/// Build slot bindings from env vars, falling back to the defaults of
/// the deployed background-replacement workflow.
fn bindings_from_env() -> SlotBindings {
    let defaults = SlotBindings::default();

    let artifact_shape = match std::env::var("WORKFLOW_OUTPUT_SHAPE") {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|e| panic!("Invalid WORKFLOW_OUTPUT_SHAPE: {e}")),
        Err(_) => defaults.artifact_shape,
    };

    SlotBindings {
        style_text: slot_env("WORKFLOW_NODE_STYLE", defaults.style_text),
        main_text: slot_env("WORKFLOW_NODE_MAIN", defaults.main_text),
        classification_token: slot_env("WORKFLOW_NODE_TOKEN", defaults.classification_token),
        image_url: slot_env("WORKFLOW_NODE_IMAGE_URL", defaults.image_url),
        image_name: slot_env("WORKFLOW_NODE_IMAGE", defaults.image_name),
        seed: slot_env("WORKFLOW_NODE_SEED", defaults.seed),
        filename_prefix: std::env::var("WORKFLOW_NODE_PREFIX")
            .ok()
            .filter(|raw| !raw.trim().is_empty())
            .map(|raw| parse_slot(&raw, "filename_prefix")),
        output_node: std::env::var("WORKFLOW_OUTPUT_NODE").unwrap_or(defaults.output_node),
        artifact_shape,
    }
}

/// Read one slot binding env var, keeping the default when unset.
fn slot_env(name: &str, default: Slot) -> Slot {
    match std::env::var(name) {
        Ok(raw) => parse_slot(&raw, &default.input),
        Err(_) => default,
    }
}

/// Parse `"<node_id>"` or `"<node_id>:<input>"`.
fn parse_slot(raw: &str, default_input: &str) -> Slot {
    match raw.split_once(':') {
        Some((node_id, input)) => Slot::new(node_id.trim(), input.trim()),
        None => Slot::new(raw.trim(), default_input),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_slot_with_bare_node_id_keeps_default_input() {
        let slot = parse_slot("777", "seed");
        assert_eq!(slot, Slot::new("777", "seed"));
    }

    #[test]
    fn parse_slot_with_explicit_input() {
        let slot = parse_slot("777:noise_seed", "seed");
        assert_eq!(slot, Slot::new("777", "noise_seed"));
    }
}
