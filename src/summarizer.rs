//! Optional transcript summarization
//!
//! A summarizer returns `Some(text)` or nothing; it never fails the item.
//! The shipped implementation talks to any OpenAI-compatible chat
//! completions endpoint, which covers hosted APIs and a local Ollama.

use crate::config::SummarizerConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

/// Transcripts shorter than this are not worth summarizing
const MIN_INPUT_CHARS: usize = 100;

const SUMMARY_PROMPT: &str = "You are an expert summarizer for educational video content. \
Given a transcript, produce a short TL;DR section that includes:\n\
1. 3-5 bullet points summarizing key ideas.\n\
2. 1 short quote or striking insight (if any).\n\
3. Stay objective, concise, and factual.\n\
Output only Markdown text, no preambles.\n\nTranscript:\n";

#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Summarizes `payload`; `None` means no summary, not an error
    async fn summarize(&self, payload: &str) -> Option<String>;
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Summarizer backed by a chat completions endpoint
pub struct ChatSummarizer {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    max_input_chars: usize,
}

impl ChatSummarizer {
    pub fn from_config(config: &SummarizerConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key: config.resolve_key(),
            max_input_chars: config.max_input_chars,
        })
    }

    async fn request(&self, snippet: &str) -> Result<Option<String>, reqwest::Error> {
        let mut request = self.client.post(&self.endpoint).json(&json!({
            "model": self.model,
            "temperature": 0.2,
            "max_tokens": 350,
            "messages": [
                {"role": "user", "content": format!("{}{}", SUMMARY_PROMPT, snippet)}
            ],
        }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let reply: ChatReply = request.send().await?.error_for_status()?.json().await?;
        Ok(reply
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty()))
    }
}

/// Truncates `text` to at most `max_chars` characters
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[async_trait]
impl Summarizer for ChatSummarizer {
    async fn summarize(&self, payload: &str) -> Option<String> {
        if payload.trim().chars().count() < MIN_INPUT_CHARS {
            tracing::debug!("Transcript too short to summarize");
            return None;
        }

        let snippet = truncate_chars(payload, self.max_input_chars);
        match self.request(snippet).await {
            Ok(summary) => summary,
            Err(e) => {
                tracing::warn!(error = %e, model = %self.model, "Summarization failed");
                None
            }
        }
    }
}
