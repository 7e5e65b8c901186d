//! HTTP client for the downstream text-generation backend.
//!
//! The backend speaks an OpenAI-style chat-completions API: one request per
//! dispatch, a model id plus a single user message, text and a token count
//! back. Deadlines are enforced by the caller ([`crate::agents`]), not here.

use serde::Deserialize;
use serde_json::json;
use url::Url;

const MAX_TOKENS: u32 = 2000;
const TEMPERATURE: f64 = 0.7;

/// Result of one completions call.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub tokens_used: u64,
}

/// Failure of one completions call.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("Upstream transport failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Upstream returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Upstream response carried no completion choices")]
    MalformedResponse,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    total_tokens: u64,
}

/// Thin client over the completions endpoint.
#[derive(Debug, Clone)]
pub struct CompletionsClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: String,
}

impl CompletionsClient {
    pub fn new(mut base_url: Url, api_key: String) -> Self {
        // `Url::join` treats the last path segment as a file unless the base
        // ends with a slash.
        if !base_url.path().ends_with('/') {
            base_url.set_path(&format!("{}/", base_url.path()));
        }
        Self {
            http: reqwest::Client::new(),
            base_url,
            api_key,
        }
    }

    /// Performs exactly one chat-completions call. Never retries.
    pub async fn complete(&self, model: &str, prompt: &str) -> Result<Completion, UpstreamError> {
        let url = self
            .base_url
            .join("chat/completions")
            .expect("base url accepts relative path");
        let body = json!({
            "model": model,
            "messages": [{"role": "user", "content": prompt}],
            "max_tokens": MAX_TOKENS,
            "temperature": TEMPERATURE,
        });
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response.json().await?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or(UpstreamError::MalformedResponse)?;
        let tokens_used = parsed.usage.map(|u| u.total_tokens).unwrap_or(0);
        Ok(Completion { text, tokens_used })
    }
}
