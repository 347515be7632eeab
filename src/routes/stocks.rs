use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use tracing::{error, info, warn};

use crate::errors::AppError;
use crate::models::{MarketSentiment, StockAnalysisResponse, StockRequest};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/analysis", post(analyze_stocks))
        .route("/sentiment", post(get_market_sentiment))
        .route("/plot/:filename", get(get_plot))
}

pub async fn analyze_stocks(
    State(state): State<AppState>,
    Json(request): Json<StockRequest>,
) -> Result<Json<StockAnalysisResponse>, AppError> {
    info!("POST /stocks/analysis - Analyzing {:?}", request.symbols);
    let response = state.stock_service.analyze_stocks(&request.symbols).await
        .map_err(|e| {
            error!("Failed to analyze stocks {:?}: {}", request.symbols, e);
            e
        })?;
    Ok(Json(response))
}

pub async fn get_market_sentiment(
    State(state): State<AppState>,
    Json(request): Json<StockRequest>,
) -> Result<Json<MarketSentiment>, AppError> {
    info!("POST /stocks/sentiment - Market sentiment for {:?}", request.symbols);
    let sentiment = state.stock_service.get_market_sentiment(&request.symbols).await
        .map_err(|e| {
            error!("Failed to get market sentiment for {:?}: {}", request.symbols, e);
            e
        })?;
    Ok(Json(sentiment))
}

pub async fn get_plot(
    Path(filename): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    info!("GET /stocks/plot/{} - Serving plot", filename);
    let not_found = || AppError::NotFound(format!("Plot file '{}' not found", filename));

    // Only bare file names inside the plot directory are served
    if filename.is_empty() || filename.contains(['/', '\\']) || filename.contains("..") {
        warn!("Rejected plot file name: {}", filename);
        return Err(not_found());
    }

    let path = state.settings.plot_dir.join(&filename);
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(not_found()),
        Err(e) => {
            error!("Failed to read plot {}: {}", path.display(), e);
            return Err(e.into());
        }
    };

    Ok((
        [
            (header::CONTENT_TYPE, "image/png".to_string()),
            (header::CONTENT_DISPOSITION, format!("inline; filename=\"{}\"", filename)),
        ],
        bytes,
    ))
}
