pub mod background;
pub mod health;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /background/replace    POST    synchronous background replacement
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().merge(background::router())
}
