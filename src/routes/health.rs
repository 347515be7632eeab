use axum::routing::get;
use axum::Router;
use tracing::debug;

use crate::state::AppState;

/// Liveness only. Does not touch the price source, the writer or the sandbox.
pub fn router() -> Router<AppState> {
    Router::new().route("/", get(health))
}

async fn health() -> &'static str {
    debug!("GET /health");
    "OK"
}
