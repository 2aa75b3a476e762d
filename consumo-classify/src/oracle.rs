//! The classification oracle: text prompt in, free text out.
//!
//! Providers speak to hosted generative models over reqwest. Every failure
//! is a typed [`OracleError`]; [`classify_raw`] turns those into synthetic
//! `ERROR|...` responses so one bad call never aborts a batch.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::normalize::ResponseShape;

/// Sampling settings for one oracle call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            max_output_tokens: 100,
        }
    }
}

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("authentication rejected ({status}): {body}")]
    Auth { status: u16, body: String },
    #[error("quota exceeded: {0}")]
    Quota(String),
    #[error("oracle returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed oracle response: {0}")]
    Malformed(String),
    #[error("missing credentials: set {0}")]
    MissingCredentials(String),
}

impl OracleError {
    /// Transport hiccups and rate limits are worth another attempt; nothing else is.
    pub fn is_retryable(&self) -> bool {
        match self {
            OracleError::Transport(_) | OracleError::Quota(_) => true,
            OracleError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for OracleError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            OracleError::Malformed(e.to_string())
        } else {
            OracleError::Transport(e.to_string())
        }
    }
}

fn status_error(status: StatusCode, body: String) -> OracleError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => OracleError::Auth {
            status: status.as_u16(),
            body,
        },
        StatusCode::TOO_MANY_REQUESTS => OracleError::Quota(body),
        _ => OracleError::Status {
            status: status.as_u16(),
            body,
        },
    }
}

#[async_trait]
pub trait Oracle: Send + Sync {
    async fn invoke(&self, prompt: &str, config: &GenerationConfig) -> Result<String, OracleError>;
}

#[async_trait]
impl<T: Oracle + ?Sized> Oracle for Arc<T> {
    async fn invoke(&self, prompt: &str, config: &GenerationConfig) -> Result<String, OracleError> {
        (**self).invoke(prompt, config).await
    }
}

/// Invoke the oracle, replacing any failure with the shape's error sentinel.
pub async fn classify_raw(
    oracle: &dyn Oracle,
    prompt: &str,
    config: &GenerationConfig,
    shape: ResponseShape,
) -> String {
    match oracle.invoke(prompt, config).await {
        Ok(text) => text.trim().to_string(),
        Err(e) => {
            warn!(error = %e, "oracle call failed");
            shape.error_response(&e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Providers

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Gemini,
    OpenAi,
    Anthropic,
}

impl ProviderKind {
    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => "gemini-1.5-flash",
            ProviderKind::OpenAi => "gpt-4o-mini",
            ProviderKind::Anthropic => "claude-3-5-haiku-latest",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => "https://generativelanguage.googleapis.com",
            ProviderKind::OpenAi => "https://api.openai.com",
            ProviderKind::Anthropic => "https://api.anthropic.com",
        }
    }

    pub fn default_api_key_env(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => "GEMINI_API_KEY",
            ProviderKind::OpenAi => "OPENAI_API_KEY",
            ProviderKind::Anthropic => "ANTHROPIC_API_KEY",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" | "google" => Ok(ProviderKind::Gemini),
            "openai" | "open-ai" => Ok(ProviderKind::OpenAi),
            "anthropic" | "claude" => Ok(ProviderKind::Anthropic),
            other => anyhow::bail!("unknown oracle provider: {other}"),
        }
    }
}

/// Everything needed to construct a provider, as read from `[oracle]` in config.toml.
///
/// Unset `model`, `base_url` and `api_key_env` resolve to the provider's defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleSettings {
    pub provider: ProviderKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Environment variable holding the API key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    /// Extra attempts for retryable failures; 0 disables the retry decorator.
    pub retries: u32,
    pub retry_base_delay_ms: u64,
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            model: None,
            base_url: None,
            api_key_env: None,
            temperature: None,
            max_output_tokens: None,
            retries: 0,
            retry_base_delay_ms: 500,
        }
    }
}

impl OracleSettings {
    pub fn model(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.provider.default_model())
    }

    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.provider.default_base_url())
            .trim_end_matches('/')
    }

    pub fn api_key_env(&self) -> &str {
        self.api_key_env
            .as_deref()
            .unwrap_or_else(|| self.provider.default_api_key_env())
    }

    /// Apply configured sampling overrides on top of a profile's defaults.
    pub fn generation(&self, base: GenerationConfig) -> GenerationConfig {
        GenerationConfig {
            temperature: self.temperature.unwrap_or(base.temperature),
            max_output_tokens: self.max_output_tokens.unwrap_or(base.max_output_tokens),
        }
    }
}

/// Build the configured provider, wrapped in [`Retry`] when retries are enabled.
pub fn build_oracle(settings: &OracleSettings) -> Result<Arc<dyn Oracle>, OracleError> {
    let key_env = settings.api_key_env();
    let key = std::env::var(key_env)
        .ok()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| OracleError::MissingCredentials(key_env.to_string()))?;

    let base_url = settings.base_url().to_string();
    let model = settings.model().to_string();

    let oracle: Arc<dyn Oracle> = match settings.provider {
        ProviderKind::Gemini => Arc::new(Gemini::new(base_url, model, key)),
        ProviderKind::OpenAi => Arc::new(OpenAi::new(base_url, model, key)),
        ProviderKind::Anthropic => Arc::new(Anthropic::new(base_url, model, key)),
    };

    if settings.retries == 0 {
        return Ok(oracle);
    }
    Ok(Arc::new(Retry::new(
        oracle,
        settings.retries,
        Duration::from_millis(settings.retry_base_delay_ms),
    )))
}

async fn read_failure(resp: reqwest::Response) -> OracleError {
    let status = resp.status();
    let txt = resp.text().await.unwrap_or_default();
    status_error(status, txt)
}

/// Google Generative Language `generateContent`.
pub struct Gemini {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl Gemini {
    pub fn new(base_url: String, model: String, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            model,
            api_key,
        }
    }
}

#[async_trait]
impl Oracle for Gemini {
    async fn invoke(&self, prompt: &str, config: &GenerationConfig) -> Result<String, OracleError> {
        #[derive(Serialize)]
        struct Part<'a> {
            text: &'a str,
        }

        #[derive(Serialize)]
        struct Content<'a> {
            parts: Vec<Part<'a>>,
        }

        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct GenCfg {
            temperature: f32,
            max_output_tokens: u32,
        }

        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Req<'a> {
            contents: Vec<Content<'a>>,
            generation_config: GenCfg,
        }

        #[derive(Deserialize)]
        struct Resp {
            #[serde(default)]
            candidates: Vec<Candidate>,
        }

        #[derive(Deserialize)]
        struct Candidate {
            content: Option<RespContent>,
        }

        #[derive(Deserialize)]
        struct RespContent {
            #[serde(default)]
            parts: Vec<RespPart>,
        }

        #[derive(Deserialize)]
        struct RespPart {
            text: Option<String>,
        }

        let body = Req {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenCfg {
                temperature: config.temperature,
                max_output_tokens: config.max_output_tokens,
            },
        };

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        let resp = self
            .client
            .post(url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(read_failure(resp).await);
        }

        let out: Resp = resp.json().await?;
        let text: String = out
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .ok_or_else(|| OracleError::Malformed("no candidates in response".to_string()))?;
        Ok(text.trim().to_string())
    }
}

/// OpenAI-compatible chat completions.
pub struct OpenAi {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl OpenAi {
    pub fn new(base_url: String, model: String, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            model,
            api_key,
        }
    }
}

#[async_trait]
impl Oracle for OpenAi {
    async fn invoke(&self, prompt: &str, config: &GenerationConfig) -> Result<String, OracleError> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }

        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
            max_tokens: u32,
        }

        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }

        #[derive(Deserialize)]
        struct Choice {
            message: MsgOut,
        }

        #[derive(Deserialize)]
        struct MsgOut {
            content: Option<String>,
        }

        let body = Req {
            model: &self.model,
            messages: vec![Msg {
                role: "user",
                content: prompt,
            }],
            temperature: config.temperature,
            max_tokens: config.max_output_tokens,
        };

        let resp = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(read_failure(resp).await);
        }

        let out: Resp = resp.json().await?;
        let text = out
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| OracleError::Malformed("no choices in response".to_string()))?;
        Ok(text.trim().to_string())
    }
}

/// Anthropic messages API.
pub struct Anthropic {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl Anthropic {
    pub fn new(base_url: String, model: String, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            model,
            api_key,
        }
    }
}

#[async_trait]
impl Oracle for Anthropic {
    async fn invoke(&self, prompt: &str, config: &GenerationConfig) -> Result<String, OracleError> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }

        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            max_tokens: u32,
            temperature: f32,
            messages: Vec<Msg<'a>>,
        }

        #[derive(Deserialize)]
        struct Resp {
            content: Vec<ContentBlock>,
        }

        #[derive(Deserialize)]
        struct ContentBlock {
            #[serde(rename = "type")]
            t: String,
            text: Option<String>,
        }

        let body = Req {
            model: &self.model,
            max_tokens: config.max_output_tokens,
            temperature: config.temperature,
            messages: vec![Msg {
                role: "user",
                content: prompt,
            }],
        };

        let resp = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(read_failure(resp).await);
        }

        let out: Resp = resp.json().await?;
        let mut s = String::new();
        for b in out.content {
            if b.t == "text" {
                if let Some(t) = b.text {
                    s.push_str(&t);
                }
            }
        }
        if s.trim().is_empty() {
            return Err(OracleError::Malformed("no text blocks in response".to_string()));
        }
        Ok(s.trim().to_string())
    }
}

// ---------------------------------------------------------------------------
// Retry decorator

/// Retries retryable failures with exponential backoff: `base`, `2 * base`, `4 * base`...
pub struct Retry<O> {
    inner: O,
    retries: u32,
    base_delay: Duration,
}

impl<O: Oracle> Retry<O> {
    pub fn new(inner: O, retries: u32, base_delay: Duration) -> Self {
        Self {
            inner,
            retries,
            base_delay,
        }
    }
}

#[async_trait]
impl<O: Oracle> Oracle for Retry<O> {
    async fn invoke(&self, prompt: &str, config: &GenerationConfig) -> Result<String, OracleError> {
        let mut attempt = 0;
        loop {
            match self.inner.invoke(prompt, config).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() && attempt < self.retries => {
                    let delay = self.base_delay * 2u32.saturating_pow(attempt);
                    debug!(attempt, ?delay, error = %e, "retrying oracle call");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
