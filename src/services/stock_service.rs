use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::{error, info, warn};

use crate::dialogue::{
    DialogueConfig, DialogueEngine, DialogueError, DialogueOutcome, DialogueStatus, ExecutorFactory, ReplyWriter,
    DEFAULT_TERMINATION_KEYWORD,
};
use crate::errors::AppError;
use crate::external::price_provider::PriceProvider;
use crate::models::{AiAnalysis, AiAnalysisBody, MarketSentiment, SentimentBody, StockAnalysisResponse};
use crate::services::failure_cache::FailureCache;
use crate::services::plot_service::PlotRenderer;
use crate::services::price_service::{self, normalize_symbols};

pub const ANALYSIS_MAX_TURNS: usize = 10;
pub const SENTIMENT_MAX_TURNS: usize = 5;

pub fn analysis_prompt(symbols: &[String], today: NaiveDate) -> String {
    format!(
        "Analyze the following stocks: {}
Current date: {}

Tasks:
1. Calculate and explain YTD Performance
2. Generate key technical indicators (RSI, MACD, Moving Averages)
3. Analyze market sentiment

Requirements:
- Put all code in markdown code blocks
- Save any plots to files
- Provide clear explanations
- When finished, reply with '{}'",
        symbols.join(", "),
        today,
        DEFAULT_TERMINATION_KEYWORD
    )
}

pub fn sentiment_prompt(symbols: &[String]) -> String {
    format!(
        "Analyze market sentiment for: {}

Tasks:
1. Analyze recent news sentiment (last 7 days)
2. Check social media trends
3. Review analyst recommendations

Requirements:
- Provide sentiment scores (0-100)
- Include source citations
- When analysis is complete, reply with '{}'",
        symbols.join(", "),
        DEFAULT_TERMINATION_KEYWORD
    )
}

/// Combines the price pipeline with writer/executor dialogues.
///
/// Shared across requests. Everything a dialogue mutates (config,
/// transcript, executor sandbox) is created inside each call.
pub struct StockService {
    price_provider: Arc<dyn PriceProvider>,
    plot_renderer: Arc<dyn PlotRenderer>,
    failure_cache: FailureCache,
    writer: Arc<dyn ReplyWriter>,
    executor_factory: Arc<dyn ExecutorFactory>,
    engine: DialogueEngine,
    executor_auto_reply_cap: usize,
}

impl StockService {
    pub fn new(
        price_provider: Arc<dyn PriceProvider>,
        plot_renderer: Arc<dyn PlotRenderer>,
        writer: Arc<dyn ReplyWriter>,
        executor_factory: Arc<dyn ExecutorFactory>,
        executor_auto_reply_cap: usize,
    ) -> Self {
        Self {
            price_provider,
            plot_renderer,
            failure_cache: FailureCache::new(),
            writer,
            executor_factory,
            engine: DialogueEngine::new(),
            executor_auto_reply_cap,
        }
    }

    fn dialogue_config(&self, max_turns: usize) -> DialogueConfig {
        DialogueConfig {
            executor_auto_reply_cap: Some(self.executor_auto_reply_cap),
            ..DialogueConfig::with_max_turns(max_turns)
        }
    }

    async fn run_dialogue(&self, prompt: &str, max_turns: usize) -> Result<DialogueOutcome, DialogueError> {
        let config = self.dialogue_config(max_turns);
        // Dropped at the end of this call, which removes its sandbox directory
        let executor = self.executor_factory.create()?;
        Ok(self
            .engine
            .run(prompt, &config, self.writer.as_ref(), executor.as_ref())
            .await)
    }

    pub async fn analyze_stocks(&self, symbols: &[String]) -> Result<StockAnalysisResponse, AppError> {
        let symbols = normalize_symbols(symbols);
        if symbols.is_empty() {
            return Err(AppError::Validation("At least one stock symbol is required".to_string()));
        }
        info!("📊 Analyzing stocks: {}", symbols.join(", "));

        let numeric = price_service::get_ytd_stock_data(
            self.price_provider.as_ref(),
            self.plot_renderer.clone(),
            &self.failure_cache,
            &symbols,
        )
        .await?;

        let prompt = analysis_prompt(&symbols, Utc::now().date_naive());
        let ai_analysis = match self.run_dialogue(&prompt, ANALYSIS_MAX_TURNS).await {
            Ok(outcome) => {
                if outcome.is_failed() {
                    warn!(
                        "AI analysis for {} failed after {} messages: {}",
                        symbols.join(", "),
                        outcome.transcript.len(),
                        outcome.error.as_deref().unwrap_or_default()
                    );
                }
                AiAnalysis::from_outcome(&outcome)
            }
            Err(e) => {
                error!("Could not start AI analysis for {}: {}", symbols.join(", "), e);
                AiAnalysis {
                    body: AiAnalysisBody::Error(e.to_string()),
                    status: DialogueStatus::Failed,
                    timestamp: Utc::now(),
                }
            }
        };

        Ok(StockAnalysisResponse {
            ytd_returns: numeric.ytd_returns,
            plot_path: numeric.plot_path,
            last_updated: numeric.last_updated,
            data_errors: numeric.data_errors,
            ai_analysis: Some(ai_analysis),
        })
    }

    pub async fn get_market_sentiment(&self, symbols: &[String]) -> Result<MarketSentiment, AppError> {
        let symbols = normalize_symbols(symbols);
        info!("📰 Market sentiment for: [{}]", symbols.join(", "));

        let prompt = sentiment_prompt(&symbols);
        let sentiment = match self.run_dialogue(&prompt, SENTIMENT_MAX_TURNS).await {
            Ok(outcome) => MarketSentiment::from_outcome(symbols, &outcome),
            Err(e) => {
                error!("Could not start sentiment analysis: {}", e);
                MarketSentiment {
                    symbols,
                    body: SentimentBody::Error(e.to_string()),
                    status: DialogueStatus::Failed,
                    timestamp: Utc::now(),
                }
            }
        };

        Ok(sentiment)
    }
}
