//! Request-scoped job parameter types.

use serde::{Deserialize, Serialize};

/// Where the input image for a job comes from.
///
/// A URL is written into the workflow as-is and fetched by the backend
/// itself. An inline payload is uploaded to the backend ahead of
/// compilation, after which only the server-assigned name travels in
/// the workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageInput {
    /// A URL the generation backend can fetch directly.
    Url(String),
    /// The name the backend assigned to an already-uploaded image file.
    Uploaded(String),
}

/// Caller-supplied parameters for one generation job.
///
/// Constructed once at request intake and never mutated afterwards;
/// the compiler reads from this struct but writes only into its own
/// workflow copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobParameters {
    /// Style description written into the style prompt node.
    pub style_text: String,
    /// Main subject description written into the subject prompt node.
    pub main_text: String,
    /// Classification token for the segmentation node.
    pub classification_token: String,
    /// The input image to transform.
    pub image: ImageInput,
}
