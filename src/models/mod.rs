mod agent_message;
mod stock;

pub use stock::{
    AiAnalysis, AiAnalysisBody, MarketSentiment, SentimentBody, StockAnalysisResponse, StockRequest,
};
