//! Handler for the synchronous background-replacement endpoint.
//!
//! This is where the whole pipeline runs end to end: validate the
//! request, resolve the input image, compile the caller's parameters
//! into a workflow copy, submit it, block on the poller, and return
//! the artifact inline. The handler holds its caller for the entire
//! generation, bounded by the configured polling timeout.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use backdrop_comfyui::history::ArtifactRef;
use backdrop_comfyui::poller::await_completion;
use backdrop_comfyui::workflow::compile;
use backdrop_core::encoding;
use backdrop_core::error::CoreError;
use backdrop_core::types::{ImageInput, JobParameters};

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// POST /api/v1/background/replace request body.
#[derive(Debug, Deserialize)]
pub struct ReplaceBackgroundRequest {
    /// Style description for the new background.
    #[serde(default)]
    pub prompt_style: String,
    /// Main subject description.
    #[serde(default)]
    pub prompt_main: String,
    /// Segmentation token identifying the subject to keep.
    #[serde(default)]
    pub classification_token: String,
    /// URL of the input image, fetched by the backend itself.
    pub url: Option<String>,
    /// Inline base64 input image, uploaded to the backend first.
    /// Mutually exclusive with `url`.
    pub image: Option<String>,
}

/// Successful response payload.
#[derive(Debug, Serialize)]
pub struct ReplaceBackgroundResponse {
    /// Base64-encoded output image.
    pub image: String,
    /// Seed bound into this job, for reproducing a result by hand.
    pub seed: u32,
}

/// POST /api/v1/background/replace
///
/// Blocks until the generation finishes, fails, or times out.
pub async fn replace_background(
    State(state): State<AppState>,
    Json(input): Json<ReplaceBackgroundRequest>,
) -> AppResult<impl IntoResponse> {
    let image_field = validate(&input)?;
    let image = resolve_image(&state, image_field).await?;

    let params = JobParameters {
        style_text: input.prompt_style,
        main_text: input.prompt_main,
        classification_token: input.classification_token,
        image,
    };

    let bound = compile(&state.template, &state.config.bindings, &params)?;
    let submitted = state.comfyui.submit_workflow(&bound).await?;

    let artifact = await_completion(
        &state.comfyui,
        &submitted.prompt_id,
        &state.config.bindings,
        &state.config.poll_config(),
        &state.shutdown,
    )
    .await?;

    let image = match artifact {
        ArtifactRef::Inline(payload) => payload,
        ArtifactRef::Stored(stored) => {
            let bytes = state.comfyui.fetch_image(&stored).await?;
            encoding::encode_image(&bytes)
        }
    };

    Ok(Json(DataResponse {
        data: ReplaceBackgroundResponse {
            image,
            seed: bound.seed(),
        },
    }))
}

/// The input image exactly as the caller supplied it.
enum ImageField<'a> {
    Url(&'a str),
    Inline(&'a str),
}

/// Check required fields and that exactly one image source is present.
///
/// The classification token may be empty -- the segmentation node then
/// falls back to its own default behaviour.
fn validate(input: &ReplaceBackgroundRequest) -> Result<ImageField<'_>, AppError> {
    if input.prompt_style.trim().is_empty() {
        return Err(CoreError::Validation("prompt_style must not be empty".into()).into());
    }
    if input.prompt_main.trim().is_empty() {
        return Err(CoreError::Validation("prompt_main must not be empty".into()).into());
    }

    let url = input.url.as_deref().map(str::trim).filter(|u| !u.is_empty());
    let inline = input
        .image
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty());

    match (url, inline) {
        (Some(url), None) => Ok(ImageField::Url(url)),
        (None, Some(payload)) => Ok(ImageField::Inline(payload)),
        (Some(_), Some(_)) => {
            Err(CoreError::Validation("url and image are mutually exclusive".into()).into())
        }
        (None, None) => {
            Err(CoreError::Validation("either url or image must be provided".into()).into())
        }
    }
}

/// Turn the caller's image field into a compiler-ready [`ImageInput`].
///
/// A URL passes straight through. An inline payload is decoded and
/// uploaded under a unique name, so concurrent requests can never
/// clobber each other's input files on the backend.
async fn resolve_image(state: &AppState, field: ImageField<'_>) -> AppResult<ImageInput> {
    match field {
        ImageField::Url(url) => Ok(ImageInput::Url(url.to_string())),
        ImageField::Inline(payload) => {
            let bytes = encoding::decode_image(payload)?;
            let name = format!("backdrop_input_{}.png", uuid::Uuid::new_v4());
            let name = state.comfyui.upload_image(bytes, &name).await?;
            tracing::debug!(name = %name, "Uploaded inline input image");
            Ok(ImageInput::Uploaded(name))
        }
    }
}
