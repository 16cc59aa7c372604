//! REST client for the ComfyUI HTTP endpoints.
//!
//! Wraps the four endpoints this service uses -- workflow submission,
//! history retrieval, artifact download, and image upload -- over a
//! shared [`reqwest::Client`]. Each operation has its own error enum
//! so a transport failure, a backend rejection, and a malformed
//! response stay distinguishable all the way up to the HTTP layer.

use serde::Deserialize;

use crate::history::{History, StoredRef};
use crate::workflow::BoundWorkflow;

/// HTTP client for a single ComfyUI instance.
///
/// Construct once at startup and share; submission is deliberately not
/// retried here because every submission consumes a fresh seed and
/// enqueues backend work.
pub struct ComfyUIApi {
    client: reqwest::Client,
    api_url: String,
}

/// Response returned by `/prompt` after successfully queuing a workflow.
#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    /// Server-assigned identifier used to poll for completion.
    pub prompt_id: String,
    /// Position in the execution queue, when reported.
    pub number: Option<i64>,
}

/// Raw `/prompt` response body before interpretation.
#[derive(Debug, Deserialize)]
struct SubmitBody {
    prompt_id: Option<String>,
    number: Option<i64>,
    error: Option<serde_json::Value>,
}

/// Raw `/upload/image` response body.
#[derive(Debug, Deserialize)]
struct UploadBody {
    name: Option<String>,
}

/// Errors from workflow submission.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("Submission request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The backend accepted the HTTP request but rejected the job,
    /// either with a non-2xx status or an `error` field in the body.
    #[error("Backend rejected the job (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    /// A 2xx response without a usable `prompt_id`.
    #[error("Malformed submission response: {0}")]
    MalformedResponse(String),
}

/// Errors from a single history query.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    /// The HTTP request itself failed.
    #[error("Status request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The backend answered with a non-2xx status code.
    #[error("Status request returned HTTP {status}: {body}")]
    BadStatus { status: u16, body: String },

    /// The response body is not a history document.
    #[error("Unparseable status payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Errors from fetching a stored artifact via `/view`.
#[derive(Debug, thiserror::Error)]
pub enum ViewError {
    /// The HTTP request itself failed.
    #[error("Artifact fetch failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The backend answered with a non-2xx status code.
    #[error("Artifact fetch returned HTTP {status}: {body}")]
    BadStatus { status: u16, body: String },
}

/// Errors from uploading an input image via `/upload/image`.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// The HTTP request itself failed.
    #[error("Image upload failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The backend answered with a non-2xx status code.
    #[error("Image upload returned HTTP {status}: {body}")]
    BadStatus { status: u16, body: String },

    /// A 2xx response without the assigned file name.
    #[error("Malformed upload response: {0}")]
    MalformedResponse(String),
}

impl ComfyUIApi {
    /// Create an API client with a default [`reqwest::Client`].
    pub fn new(api_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url,
        }
    }

    /// Create an API client reusing an existing [`reqwest::Client`]
    /// (connection pooling, TLS settings, timeouts).
    pub fn with_client(client: reqwest::Client, api_url: String) -> Self {
        Self { client, api_url }
    }

    /// Base HTTP URL of the instance (e.g. `http://host:8188`).
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Submit a bound workflow for execution.
    ///
    /// Sends `POST /prompt` with the workflow document and a fresh
    /// client id. Not retried: each attempt consumes a seed and may
    /// enqueue work, so retrying is a caller decision.
    pub async fn submit_workflow(
        &self,
        workflow: &BoundWorkflow,
    ) -> Result<SubmitResponse, SubmitError> {
        let client_id = uuid::Uuid::new_v4().to_string();
        let body = serde_json::json!({
            "prompt": workflow.document(),
            "client_id": client_id,
        });

        let response = self
            .client
            .post(format!("{}/prompt", self.api_url))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(SubmitError::Rejected {
                status: status.as_u16(),
                message: text,
            });
        }

        let body: SubmitBody = serde_json::from_str(&text)
            .map_err(|e| SubmitError::MalformedResponse(e.to_string()))?;

        if let Some(error) = body.error {
            return Err(SubmitError::Rejected {
                status: status.as_u16(),
                message: error.to_string(),
            });
        }

        let prompt_id = body
            .prompt_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| SubmitError::MalformedResponse("response has no prompt_id".into()))?;

        tracing::info!(
            prompt_id = %prompt_id,
            seed = workflow.seed(),
            queue_position = body.number,
            "Workflow submitted",
        );

        Ok(SubmitResponse {
            prompt_id,
            number: body.number,
        })
    }

    /// Retrieve execution history for a specific prompt.
    ///
    /// Sends `GET /history/{prompt_id}`. The body is empty (`{}`)
    /// until the prompt shows up in the server's history view.
    pub async fn get_history(&self, prompt_id: &str) -> Result<History, HistoryError> {
        let response = self
            .client
            .get(format!("{}/history/{}", self.api_url, prompt_id))
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(HistoryError::BadStatus {
                status: status.as_u16(),
                body: text,
            });
        }

        Ok(serde_json::from_str(&text)?)
    }

    /// Download the bytes of a stored artifact.
    ///
    /// Sends `GET /view?filename=&subfolder=&type=`.
    pub async fn fetch_image(&self, artifact: &StoredRef) -> Result<Vec<u8>, ViewError> {
        let response = self
            .client
            .get(format!("{}/view", self.api_url))
            .query(&[
                ("filename", artifact.filename.as_str()),
                ("subfolder", artifact.subfolder.as_str()),
                ("type", artifact.folder_type.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ViewError::BadStatus {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.bytes().await?.to_vec())
    }

    /// Upload an input image and return the server-assigned name.
    ///
    /// Sends a multipart `POST /upload/image`. The returned name is
    /// what load-image nodes expect in their `image` input.
    pub async fn upload_image(&self, bytes: Vec<u8>, name: &str) -> Result<String, UploadError> {
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(name.to_string())
            .mime_str("image/png")?;
        let form = reqwest::multipart::Form::new().part("image", part);

        let response = self
            .client
            .post(format!("{}/upload/image", self.api_url))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(UploadError::BadStatus {
                status: status.as_u16(),
                body: text,
            });
        }

        let body: UploadBody = serde_json::from_str(&text)
            .map_err(|e| UploadError::MalformedResponse(e.to_string()))?;

        body.name
            .filter(|name| !name.is_empty())
            .ok_or_else(|| UploadError::MalformedResponse("response has no name".into()))
    }
}
