//! Anthropic Messages API worker

use crate::capability::{UnitInputs, Worker, WorkerError, WorkerResult};
use crate::prompt::{check_contract, extract_json, system_prompt, user_prompt};
use reqwest::Client;
use rivalscope_core::{UnitOutput, WorkUnit};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error};

pub const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-sonnet-4-5";
const DEFAULT_MAX_TOKENS: u32 = 4096;

pub struct AnthropicWorker {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicWorker {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: ANTHROPIC_API_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait::async_trait]
impl Worker for AnthropicWorker {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn invoke(&self, unit: &WorkUnit, inputs: &UnitInputs) -> WorkerResult<UnitOutput> {
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system: system_prompt(unit.capability),
            messages: vec![Message {
                role: "user",
                content: user_prompt(unit, inputs),
            }],
        };

        debug!(unit = %unit.id, target = %unit.target, model = %self.model, "Anthropic request");

        let response = self
            .client
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Anthropic error {}: {}", status, error_text);
            return Err(match status.as_u16() {
                401 => WorkerError::AuthFailed(error_text),
                429 => WorkerError::RateLimited {
                    retry_after_ms: 60000,
                },
                _ => WorkerError::failed(format!("{}: {}", status, error_text)),
            });
        }

        let reply: MessagesResponse = response.json().await?;
        let text: String = reply
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                ContentBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("");

        let content = match &unit.expected_output {
            Some(contract) => {
                let value = extract_json(&text).ok_or_else(|| {
                    WorkerError::contract(contract.as_str(), "reply contains no JSON object")
                })?;
                check_contract(contract, &value)?;
                value
            }
            None => json!({ "text": text }),
        };

        Ok(UnitOutput::new(unit, content))
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<Message>,
}

#[derive(Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}
