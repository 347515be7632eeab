use axum::http::{header, HeaderValue, Method};
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::warn;

use crate::routes::{health, stocks};
use crate::state::AppState;

pub fn create_app(state: AppState) -> Router {
    let settings = state.settings.clone();
    Router::<AppState>::new()
        .nest("/health", health::router())
        .nest(&format!("{}/stocks", settings.api_v1_str), stocks::router())
        .nest_service("/static", ServeDir::new(&settings.static_dir))
        .layer(cors_layer(&settings.cors_origins))
        .with_state(state)
}

/// `*` allows any origin without credentials; an explicit list allows credentials.
fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
        .allow_credentials(true)
}
