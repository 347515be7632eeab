use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use futures::future::join_all;
use tracing::{error, info, warn};

use crate::errors::AppError;
use crate::external::price_provider::{ExternalPricePoint, PriceProvider, PriceProviderError};
use crate::services::failure_cache::{FailureCache, FailureType};
use crate::services::plot_service::{ytd_plot_filename, PlotRenderer};

/// Daily closes for one symbol, ascending by date.
#[derive(Debug, Clone)]
pub struct PriceSeries {
    pub symbol: String,
    pub points: Vec<ExternalPricePoint>,
}

/// Numeric half of an analysis response.
#[derive(Debug, Clone)]
pub struct YtdStockData {
    pub ytd_returns: BTreeMap<String, f64>,
    pub plot_path: String,
    pub last_updated: DateTime<Utc>,
    pub data_errors: BTreeMap<String, String>,
}

/// Jan 1 of `today`'s year through `today`.
pub fn ytd_window(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start = NaiveDate::from_ymd_opt(today.year(), 1, 1).unwrap_or(today);
    (start, today)
}

/// Percent change from the first to the last close.
pub fn ytd_return(points: &[ExternalPricePoint]) -> Option<f64> {
    let first = points.first()?.close;
    let last = points.last()?.close;
    if first == 0.0 {
        return None;
    }
    Some(((last / first) - 1.0) * 100.0)
}

/// Trims, upper-cases and de-duplicates symbols, keeping request order.
pub fn normalize_symbols(symbols: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(symbols.len());
    for symbol in symbols {
        let symbol = symbol.trim().to_uppercase();
        if !symbol.is_empty() && !out.contains(&symbol) {
            out.push(symbol);
        }
    }
    out
}

async fn fetch_one(
    provider: &dyn PriceProvider,
    failure_cache: &FailureCache,
    symbol: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<PriceSeries, String> {
    if let Some(failure) = failure_cache.get(symbol) {
        info!("⏭️ Skipping {} (recent failure: {})", symbol, failure.reason);
        return Err(failure.reason);
    }

    match provider.fetch_daily_range(symbol, start, end).await {
        Ok(points) if !points.is_empty() => {
            failure_cache.clear(symbol);
            Ok(PriceSeries {
                symbol: symbol.to_string(),
                points,
            })
        }
        Ok(_) => {
            let reason = PriceProviderError::NoData(symbol.to_string()).to_string();
            failure_cache.record(symbol, FailureType::NotFound, reason.clone());
            Err(reason)
        }
        Err(PriceProviderError::RateLimited) => {
            warn!("Rate limited fetching {}", symbol);
            let reason = PriceProviderError::RateLimited.to_string();
            failure_cache.record(symbol, FailureType::RateLimited, reason.clone());
            Err(reason)
        }
        Err(e @ (PriceProviderError::NoData(_) | PriceProviderError::BadResponse(_))) => {
            warn!("No usable data for {}: {}", symbol, e);
            failure_cache.record(symbol, FailureType::NotFound, e.to_string());
            Err(e.to_string())
        }
        Err(e) => {
            // Network and parse errors are not cached
            error!("Failed to fetch prices for {}: {}", symbol, e);
            Err(e.to_string())
        }
    }
}

/// Fetches every symbol concurrently. Failures are returned per symbol
/// rather than failing the whole batch.
pub async fn fetch_ytd_series(
    provider: &dyn PriceProvider,
    failure_cache: &FailureCache,
    symbols: &[String],
    today: NaiveDate,
) -> (Vec<PriceSeries>, BTreeMap<String, String>) {
    let (start, end) = ytd_window(today);
    let results = join_all(
        symbols
            .iter()
            .map(|symbol| fetch_one(provider, failure_cache, symbol, start, end)),
    )
    .await;

    let mut series = Vec::new();
    let mut errors = BTreeMap::new();
    for (symbol, result) in symbols.iter().zip(results) {
        match result {
            Ok(s) => series.push(s),
            Err(reason) => {
                errors.insert(symbol.clone(), reason);
            }
        }
    }
    (series, errors)
}

/// YTD returns for `symbols` plus a rendered comparison chart.
///
/// Fails with `DataFetch` only when no symbol produced data.
pub async fn get_ytd_stock_data(
    provider: &dyn PriceProvider,
    renderer: Arc<dyn PlotRenderer>,
    failure_cache: &FailureCache,
    symbols: &[String],
) -> Result<YtdStockData, AppError> {
    let today = Utc::now().date_naive();
    let (series, mut data_errors) = fetch_ytd_series(provider, failure_cache, symbols, today).await;

    let mut ytd_returns = BTreeMap::new();
    for s in &series {
        match ytd_return(&s.points) {
            Some(ret) => {
                ytd_returns.insert(s.symbol.clone(), ret);
            }
            None => {
                data_errors.insert(s.symbol.clone(), "first close is zero".to_string());
            }
        }
    }

    if ytd_returns.is_empty() {
        let detail = data_errors
            .iter()
            .map(|(symbol, reason)| format!("{}: {}", symbol, reason))
            .collect::<Vec<_>>()
            .join("; ");
        error!("No price data for any requested symbol: {}", detail);
        return Err(AppError::DataFetch(format!(
            "No price data available for requested symbols ({})",
            detail
        )));
    }

    let plotted: Vec<PriceSeries> = series
        .into_iter()
        .filter(|s| ytd_returns.contains_key(&s.symbol))
        .collect();
    let filename = ytd_plot_filename();
    let plot_path = tokio::task::spawn_blocking(move || renderer.render(&plotted, &filename))
        .await
        .map_err(|e| AppError::Internal(format!("plot task failed: {}", e)))?
        .map_err(|e| {
            error!("Failed to render plot: {}", e);
            AppError::Internal(e.to_string())
        })?;

    info!(
        "📊 YTD data ready for {} symbols ({} failed), plot {}",
        ytd_returns.len(),
        data_errors.len(),
        plot_path
    );

    Ok(YtdStockData {
        ytd_returns,
        plot_path,
        last_updated: Utc::now(),
        data_errors,
    })
}
