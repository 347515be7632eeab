use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::Settings;
use crate::dialogue::{DialogueError, Message, ReplyWriter, Role, Transcript, KIND_TEXT};
use crate::errors::LlmError;

pub const WRITER_SYSTEM_PROMPT: &str = "I am a code writer agent. I will:
1. Write clear, efficient Python code
2. Put code in markdown code blocks
3. Ensure code is complete and ready to execute
4. Respond to feedback from the executor agent
5. Signal completion with 'TERMINATE'";

/// Configuration for the chat completions client
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
    pub request_timeout: Duration,
    pub max_retries: u32,
}

impl LlmConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            api_key: settings.openai_api_key.clone(),
            model: settings.openai_model.clone(),
            base_url: settings.openai_base_url.trim_end_matches('/').to_string(),
            temperature: settings.llm_temperature,
            request_timeout: Duration::from_secs(120),
            max_retries: 3,
        }
    }
}

/// OpenAI API request/response structures
#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
struct OpenAiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

/// Writer role backed by an OpenAI-compatible chat completions endpoint.
///
/// Holds no conversation state: every call sends the whole transcript, so a
/// single instance is shared by all concurrent dialogues.
pub struct OpenAiWriter {
    config: LlmConfig,
    system_prompt: String,
    client: Client,
}

impl OpenAiWriter {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| LlmError::NetworkError(e.to_string()))?;

        info!("Initializing writer with model {} at {}", config.model, config.base_url);

        Ok(Self {
            config,
            system_prompt: WRITER_SYSTEM_PROMPT.to_string(),
            client,
        })
    }

    async fn call_openai_with_retry(&self, request: OpenAiRequest) -> Result<OpenAiResponse, LlmError> {
        let mut retry_count = 0;
        let mut delay = Duration::from_secs(1);

        loop {
            match self.call_openai(&request).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    retry_count += 1;
                    if retry_count >= self.config.max_retries {
                        error!("OpenAI API call failed after {} attempts: {}", retry_count, e);
                        return Err(e);
                    }

                    warn!("OpenAI API call failed (attempt {}/{}): {}. Retrying in {:?}...",
                          retry_count, self.config.max_retries, e, delay);
                    tokio::time::sleep(delay).await;
                    delay *= 2; // 1s, 2s, 4s
                }
            }
        }
    }

    async fn call_openai(&self, request: &OpenAiRequest) -> Result<OpenAiResponse, LlmError> {
        let response = self.client
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout
                } else {
                    LlmError::NetworkError(e.to_string())
                }
            })?;

        let status = response.status();

        if status == 429 {
            return Err(LlmError::RateLimited);
        }

        if !status.is_success() {
            let error_text = response.text().await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(LlmError::ApiError(format!("HTTP {}: {}", status, error_text)));
        }

        response.json::<OpenAiResponse>()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))
    }

    async fn complete(&self, transcript: &Transcript) -> Result<Message, LlmError> {
        let request = OpenAiRequest {
            model: self.config.model.clone(),
            messages: transcript_to_chat(&self.system_prompt, transcript),
            temperature: self.config.temperature,
        };

        let response = self.call_openai_with_retry(request).await?;
        reply_from_response(response, &self.config.model)
    }
}

#[async_trait]
impl ReplyWriter for OpenAiWriter {
    async fn produce_reply(&self, transcript: &Transcript) -> Result<Message, DialogueError> {
        if transcript.is_empty() {
            return Err(DialogueError::Generation("nothing to reply to".to_string()));
        }
        info!("Generating writer reply (model: {}, history: {} messages)", self.config.model, transcript.len());
        self.complete(transcript)
            .await
            .map_err(|e| DialogueError::Generation(e.to_string()))
    }
}

/// The writer's own turns become `assistant` messages, everything else `user`.
fn transcript_to_chat(system_prompt: &str, transcript: &Transcript) -> Vec<OpenAiMessage> {
    let mut messages = Vec::with_capacity(transcript.len() + 1);
    messages.push(OpenAiMessage {
        role: "system".to_string(),
        content: system_prompt.to_string(),
    });
    for message in transcript.messages() {
        let role = match message.role {
            Role::Writer => "assistant",
            Role::Executor => "user",
        };
        messages.push(OpenAiMessage {
            role: role.to_string(),
            content: message.text().to_string(),
        });
    }
    messages
}

fn reply_from_response(response: OpenAiResponse, model: &str) -> Result<Message, LlmError> {
    let content = response.choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::InvalidResponse("No choices in response".to_string()))?
        .message
        .content
        .unwrap_or_default();

    let mut reply = Message::new(Role::Writer, content)
        .with_kind(KIND_TEXT)
        .with_metadata("model", model.to_string());

    if let Some(usage) = response.usage {
        info!("Writer reply generated. Tokens: {} prompt + {} completion = {} total",
              usage.prompt_tokens, usage.completion_tokens, usage.total_tokens);
        reply = reply
            .with_metadata("prompt_tokens", usage.prompt_tokens)
            .with_metadata("completion_tokens", usage.completion_tokens)
            .with_metadata("total_tokens", usage.total_tokens);
    }

    Ok(reply)
}
