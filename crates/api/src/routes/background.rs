//! Route definitions for the background-replacement pipeline.

use axum::routing::post;
use axum::Router;

use crate::handlers::background;
use crate::state::AppState;

/// Routes merged into the `/api/v1` nest.
///
/// ```text
/// POST /background/replace
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/background/replace", post(background::replace_background))
}
