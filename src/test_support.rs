//! Stub role handles and state shared by the route tests.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::config::Settings;
use crate::dialogue::{CodeExecutor, DialogueError, ExecutorFactory, Message, ReplyWriter, Role, Transcript};
use crate::external::price_provider::{ExternalPricePoint, PriceProvider, PriceProviderError};
use crate::services::plot_service::{PlotError, PlotRenderer};
use crate::services::price_service::PriceSeries;
use crate::services::stock_service::StockService;
use crate::state::AppState;

/// AAPL goes 100 -> 112.5; everything else has no data.
pub struct StubProvider;

#[async_trait]
impl PriceProvider for StubProvider {
    async fn fetch_daily_range(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ExternalPricePoint>, PriceProviderError> {
        match ticker {
            "AAPL" => Ok(vec![
                ExternalPricePoint { date: start, close: 100.0 },
                ExternalPricePoint { date: end, close: 112.5 },
            ]),
            _ => Err(PriceProviderError::NoData(ticker.to_string())),
        }
    }
}

pub struct StubRenderer;

impl PlotRenderer for StubRenderer {
    fn render(&self, _: &[PriceSeries], filename: &str) -> Result<String, PlotError> {
        Ok(filename.to_string())
    }
}

pub struct TerminatingWriter;

#[async_trait]
impl ReplyWriter for TerminatingWriter {
    async fn produce_reply(&self, _: &Transcript) -> Result<Message, DialogueError> {
        Ok(Message::new(Role::Writer, "Analysis complete. TERMINATE"))
    }
}

pub struct EchoExecutor;

#[async_trait]
impl CodeExecutor for EchoExecutor {
    async fn execute(&self, _: &Message) -> Result<Message, DialogueError> {
        Ok(Message::new(Role::Executor, "exitcode: 0 (execution succeeded)\nCode output: "))
    }
}

pub struct EchoExecutorFactory;

impl ExecutorFactory for EchoExecutorFactory {
    fn create(&self) -> Result<Box<dyn CodeExecutor>, DialogueError> {
        Ok(Box::new(EchoExecutor))
    }
}

/// App state rooted at `dir`, with static files in `dir/static`.
pub fn test_state(dir: &Path) -> AppState {
    let static_dir = dir.join("static");
    let work_dir = dir.join("coding");
    let settings = Settings::from_lookup(|key| match key {
        "OPENAI_API_KEY" => Some("sk-test".to_string()),
        "STATIC_DIR" => Some(static_dir.display().to_string()),
        "CODE_WORK_DIR" => Some(work_dir.display().to_string()),
        _ => None,
    })
    .unwrap();
    settings.ensure_dirs().unwrap();

    let stock_service = StockService::new(
        Arc::new(StubProvider),
        Arc::new(StubRenderer),
        Arc::new(TerminatingWriter),
        Arc::new(EchoExecutorFactory),
        settings.max_consecutive_auto_reply,
    );

    AppState {
        settings: Arc::new(settings),
        stock_service: Arc::new(stock_service),
    }
}
