use std::time::Duration;

use crate::external::price_provider::{ExternalPricePoint, PriceProvider, PriceProviderError};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use serde::Deserialize;
use tracing::debug;

const CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";

pub struct YahooProvider {
    client: reqwest::Client,
    base_url: String,
}

impl YahooProvider {
    pub fn new() -> Result<Self, PriceProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            // Yahoo rejects requests without a browser-like agent
            .user_agent("Mozilla/5.0 (compatible; stock-analyst/0.1)")
            .build()
            .map_err(|e| PriceProviderError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: CHART_URL.to_string(),
        })
    }
}

// Minimal response structs (only what we need)
#[derive(Debug, Deserialize)]
struct YahooChartResponse {
    chart: YahooChart,
}

#[derive(Debug, Deserialize)]
struct YahooChart {
    result: Option<Vec<YahooResult>>,
    error: Option<YahooChartError>,
}

#[derive(Debug, Deserialize)]
struct YahooChartError {
    code: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct YahooResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: YahooIndicators,
}

#[derive(Debug, Deserialize)]
struct YahooIndicators {
    quote: Vec<YahooQuote>,
}

#[derive(Debug, Deserialize)]
struct YahooQuote {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

#[async_trait]
impl PriceProvider for YahooProvider {
    async fn fetch_daily_range(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ExternalPricePoint>, PriceProviderError> {
        let period1 = start
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp())
            .ok_or_else(|| PriceProviderError::Parse("bad start date".into()))?;
        // period2 is exclusive upstream, so push it to the end of `end`
        let period2 = end
            .and_hms_opt(23, 59, 59)
            .map(|dt| dt.and_utc().timestamp())
            .ok_or_else(|| PriceProviderError::Parse("bad end date".into()))?;

        let url = format!(
            "{}/{ticker}?period1={period1}&period2={period2}&interval=1d",
            self.base_url
        );
        debug!("Fetching Yahoo chart for {} ({} to {})", ticker, start, end);

        let resp = self.client
            .get(url)
            .send()
            .await
            .map_err(|e| PriceProviderError::Network(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(PriceProviderError::RateLimited);
        }

        let body = resp
            .json::<YahooChartResponse>()
            .await
            .map_err(|e| PriceProviderError::Parse(e.to_string()))?;

        parse_chart(ticker, body)
    }
}

fn parse_chart(ticker: &str, body: YahooChartResponse) -> Result<Vec<ExternalPricePoint>, PriceProviderError> {
    if let Some(err) = body.chart.error {
        return Err(PriceProviderError::BadResponse(format!(
            "{}: {}",
            err.code.unwrap_or_else(|| "error".into()),
            err.description.unwrap_or_default()
        )));
    }

    let result = body.chart.result
        .and_then(|mut r| r.pop())
        .ok_or_else(|| PriceProviderError::BadResponse("missing result".into()))?;

    // timestamp aligns with close list by index
    let closes = result.indicators.quote
        .first()
        .map(|q| q.close.clone())
        .unwrap_or_default();

    let mut out = Vec::new();

    for (i, ts) in result.timestamp.iter().enumerate() {
        let Some(close) = closes.get(i).and_then(|v| *v) else { continue };

        let dt = DateTime::from_timestamp(*ts, 0)
            .ok_or_else(|| PriceProviderError::Parse("bad timestamp".into()))?;

        out.push(ExternalPricePoint {
            date: dt.date_naive(),
            close,
        });
    }

    if out.is_empty() {
        return Err(PriceProviderError::NoData(ticker.to_string()));
    }

    out.sort_by_key(|p| p.date);

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chart_skips_missing_closes() {
        let body: YahooChartResponse = serde_json::from_str(
            r#"{"chart":{"result":[{"timestamp":[1704205800,1704292200,1704378600],
            "indicators":{"quote":[{"close":[185.6,null,181.9]}]}}],"error":null}}"#,
        )
        .unwrap();

        let points = parse_chart("AAPL", body).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].close, 185.6);
        assert_eq!(points[1].close, 181.9);
        assert!(points[0].date < points[1].date);
    }

    #[test]
    fn test_parse_chart_maps_upstream_error() {
        let body: YahooChartResponse = serde_json::from_str(
            r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#,
        )
        .unwrap();

        let err = parse_chart("ZZZZ", body).unwrap_err();
        assert!(matches!(err, PriceProviderError::BadResponse(msg) if msg.contains("delisted")));
    }

    #[test]
    fn test_parse_chart_without_points_is_no_data() {
        let body: YahooChartResponse = serde_json::from_str(
            r#"{"chart":{"result":[{"indicators":{"quote":[{}]}}],"error":null}}"#,
        )
        .unwrap();

        assert!(matches!(parse_chart("AAPL", body), Err(PriceProviderError::NoData(_))));
    }
}
