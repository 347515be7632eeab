mod app;
mod config;
mod dialogue;
mod errors;
mod external;
mod logging;
mod models;
mod routes;
mod services;
mod state;
#[cfg(test)]
mod test_support;

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;

use crate::config::Settings;
use crate::external::yahoo::YahooProvider;
use crate::logging::{init_logging, LoggingConfig};
use crate::services::code_executor::SandboxExecutorFactory;
use crate::services::llm_service::{LlmConfig, OpenAiWriter};
use crate::services::plot_service::PngPlotRenderer;
use crate::services::stock_service::StockService;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env().context("invalid configuration")?;
    init_logging(LoggingConfig::from_settings(&settings)).map_err(|e| anyhow::anyhow!(e))?;
    settings.ensure_dirs()?;
    tracing::info!(
        "🔧 {} ({}) using model {}",
        settings.project_name,
        settings.environment,
        settings.openai_model
    );

    let price_provider = Arc::new(YahooProvider::new()?);
    let plot_renderer = Arc::new(PngPlotRenderer::new(settings.plot_dir.clone()));
    let writer = Arc::new(OpenAiWriter::new(LlmConfig::from_settings(&settings))?);
    let executor_factory = Arc::new(SandboxExecutorFactory::new(
        settings.code_work_dir.clone(),
        settings.execution_timeout,
    ));

    let stock_service = StockService::new(
        price_provider,
        plot_renderer,
        writer,
        executor_factory,
        settings.max_consecutive_auto_reply,
    );

    let addr = format!("{}:{}", settings.host, settings.port);
    let state = AppState {
        settings: Arc::new(settings),
        stock_service: Arc::new(stock_service),
    };
    let app = app::create_app(state);

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("🚀 Stock analysis backend running at http://{}/", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
