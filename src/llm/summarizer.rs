//! Narrative summarization seam. Analyzers talk to a `Summarizer` trait;
//! the OpenAI-compatible HTTP implementation lives behind it.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::config::EpiscopeConfig;
use crate::core::error::{EpiscopeError, Result};
use crate::llm::tokens::TokenUsage;

const SYSTEM_PROMPT: &str = "Du bist ein erfahrener Projektmanagement-Analyst. \
Du fasst Terminverschiebungen in agilen Grossprojekten praezise und sachlich \
auf Deutsch zusammen.";

/// Turns an analysis prompt into a short narrative text.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, prompt: &str) -> Result<String>;

    fn name(&self) -> &str;
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
    max_completion_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

/// Summarizer backed by an OpenAI-compatible chat completions endpoint.
pub struct HttpSummarizer {
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: f64,
    max_tokens: u32,
    client: Client,
    usage: Arc<TokenUsage>,
}

impl HttpSummarizer {
    pub fn new(config: &EpiscopeConfig, usage: Arc<TokenUsage>) -> Self {
        info!(
            "HTTP summarizer initialized (model={}, base_url={})",
            config.llm_model, config.llm_base_url
        );
        Self {
            base_url: config.llm_base_url.trim_end_matches('/').to_string(),
            model: config.llm_model.clone(),
            api_key: config.llm_api_key.clone(),
            temperature: config.llm_temperature,
            max_tokens: config.llm_max_tokens,
            client: Client::new(),
            usage,
        }
    }
}

#[async_trait]
impl Summarizer for HttpSummarizer {
    async fn summarize(&self, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            temperature: self.temperature,
            max_completion_tokens: self.max_tokens,
        };

        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = builder
            .send()
            .await?
            .error_for_status()?
            .json::<ChatResponse>()
            .await?;

        if let Some(usage) = &response.usage {
            self.usage.record(
                &self.model,
                "summary",
                usage.prompt_tokens,
                usage.completion_tokens,
            );
        }

        let content = response
            .choices
            .first()
            .map(|c| c.message.content.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| {
                EpiscopeError::Summarizer("Empty completion response".to_string())
            })?;

        debug!(chars = content.len(), "summary generated");
        Ok(content)
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Canned-reply summarizer for offline runs and tests.
pub struct StaticSummarizer {
    reply: String,
}

impl StaticSummarizer {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
        }
    }
}

#[async_trait]
impl Summarizer for StaticSummarizer {
    async fn summarize(&self, _prompt: &str) -> Result<String> {
        Ok(self.reply.clone())
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// Summarizer whose every call fails. Lets tests exercise the analyzer
/// fallback path without a network.
pub struct FailingSummarizer;

#[async_trait]
impl Summarizer for FailingSummarizer {
    async fn summarize(&self, _prompt: &str) -> Result<String> {
        Err(EpiscopeError::Summarizer(
            "summarizer unavailable".to_string(),
        ))
    }

    fn name(&self) -> &str {
        "failing"
    }
}
