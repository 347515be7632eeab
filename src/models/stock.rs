use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::agent_message::{format_transcript, AgentMessage};
use crate::dialogue::{DialogueOutcome, DialogueStatus};

/// Request body shared by the analysis and sentiment endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockRequest {
    pub symbols: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockAnalysisResponse {
    /// YTD return in percent per symbol
    pub ytd_returns: BTreeMap<String, f64>,
    /// File name of the rendered chart under the plot folder
    pub plot_path: String,
    pub last_updated: DateTime<Utc>,
    /// Symbols that returned no usable price data, with the reason
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data_errors: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_analysis: Option<AiAnalysis>,
}

/// Either the dialogue transcript or the reason it failed, never both.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiAnalysisBody {
    ChatResult(Vec<AgentMessage>),
    Error(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiAnalysis {
    #[serde(flatten)]
    pub body: AiAnalysisBody,
    pub status: DialogueStatus,
    pub timestamp: DateTime<Utc>,
}

impl AiAnalysis {
    pub fn from_outcome(outcome: &DialogueOutcome) -> Self {
        let body = match &outcome.error {
            Some(error) => AiAnalysisBody::Error(error.clone()),
            None => AiAnalysisBody::ChatResult(format_transcript(&outcome.transcript)),
        };
        Self {
            body,
            status: outcome.status,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentMessages {
    pub messages: Vec<AgentMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentimentBody {
    SentimentAnalysis(SentimentMessages),
    Error(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSentiment {
    pub symbols: Vec<String>,
    #[serde(flatten)]
    pub body: SentimentBody,
    pub status: DialogueStatus,
    pub timestamp: DateTime<Utc>,
}

impl MarketSentiment {
    pub fn from_outcome(symbols: Vec<String>, outcome: &DialogueOutcome) -> Self {
        let body = match &outcome.error {
            Some(error) => SentimentBody::Error(error.clone()),
            None => SentimentBody::SentimentAnalysis(SentimentMessages {
                messages: format_transcript(&outcome.transcript),
            }),
        };
        Self {
            symbols,
            body,
            status: outcome.status,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ai_analysis_serializes_only_chat_result() {
        let analysis = AiAnalysis {
            body: AiAnalysisBody::ChatResult(vec![]),
            status: DialogueStatus::Completed,
            timestamp: Utc::now(),
        };
        let value = serde_json::to_value(&analysis).unwrap();

        assert!(value.get("chat_result").unwrap().is_array());
        assert!(value.get("error").is_none());
        assert_eq!(value["status"], "completed");
        assert!(value.get("timestamp").is_some());
    }

    #[test]
    fn test_ai_analysis_serializes_only_error() {
        let analysis = AiAnalysis {
            body: AiAnalysisBody::Error("code execution timed out".to_string()),
            status: DialogueStatus::Failed,
            timestamp: Utc::now(),
        };
        let value = serde_json::to_value(&analysis).unwrap();

        assert_eq!(value["error"], "code execution timed out");
        assert!(value.get("chat_result").is_none());
        assert_eq!(value["status"], "failed");
    }

    #[test]
    fn test_sentiment_wraps_messages() {
        let sentiment = MarketSentiment {
            symbols: vec!["TSLA".to_string()],
            body: SentimentBody::SentimentAnalysis(SentimentMessages { messages: vec![] }),
            status: DialogueStatus::TurnLimitReached,
            timestamp: Utc::now(),
        };
        let value = serde_json::to_value(&sentiment).unwrap();

        assert!(value["sentiment_analysis"]["messages"].is_array());
        assert!(value.get("error").is_none());
        assert_eq!(value["status"], "turn_limit_reached");
    }

    #[test]
    fn test_empty_data_errors_are_omitted() {
        let response = StockAnalysisResponse {
            ytd_returns: BTreeMap::from([("AAPL".to_string(), 12.5)]),
            plot_path: "stock_prices_YTD.png".to_string(),
            last_updated: Utc::now(),
            data_errors: BTreeMap::new(),
            ai_analysis: None,
        };
        let value = serde_json::to_value(&response).unwrap();

        assert!(value.get("data_errors").is_none());
        assert!(value.get("ai_analysis").is_none());
        assert_eq!(value["ytd_returns"]["AAPL"], 12.5);
    }
}
