//! Model provider capability and the bundled OpenAI-compatible adapter.
//!
//! The pipeline only ever sees [`ModelProvider`]: "given a prompt, produce one
//! completion at a temperature". Everything provider specific (request
//! shape, model families, status codes) stays inside the adapter below.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Settings;
use crate::config_loader::ProviderConfig;
use crate::errors::{GateError, GateResult};

/// Model-family hints passed through untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SamplingHints {
    pub verbosity: Option<String>,
    pub reasoning_effort: Option<String>,
}

/// One completion call
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub prompt: String,
    pub model: String,
    pub temperature: f64,
    pub hints: SamplingHints,
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    /// Sampling request for `prompt` under the given settings
    pub fn for_settings(prompt: impl Into<String>, settings: &Settings) -> Self {
        Self {
            prompt: prompt.into(),
            model: settings.model.clone(),
            temperature: settings.temperature,
            hints: SamplingHints {
                verbosity: Some(settings.verbosity.clone()),
                reasoning_effort: Some(settings.reasoning_effort.clone()),
            },
            max_tokens: None,
        }
    }
}

/// Raw completion text plus the provider's log-probability, when exposed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub text: String,
    pub logprob: Option<f64>,
}

impl Completion {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            logprob: None,
        }
    }
}

/// Failures a provider may report for a single completion call
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    #[error("completion timed out")]
    Timeout,
    #[error("rate limited by provider")]
    RateLimited,
    #[error("invalid model '{model}'")]
    InvalidModel { model: String },
    #[error("provider server error {status}: {message}")]
    Server { status: u16, message: String },
    #[error("provider rejected request {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("transport failure: {message}")]
    Transport { message: String },
    #[error("malformed provider response: {message}")]
    Malformed { message: String },
}

impl ProviderError {
    /// Whether retrying the same call can reasonably succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::Timeout
                | ProviderError::RateLimited
                | ProviderError::Server { .. }
                | ProviderError::Transport { .. }
        )
    }
}

/// The single capability the evaluation core consumes
#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError>;
}

/// Adapter for OpenAI-compatible `chat/completions` endpoints
pub struct OpenAiProvider {
    http: Client,
    base_url: String,
    api_key: String,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl OpenAiProvider {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> GateResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GateError::network("build provider client", e))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    /// Build from service configuration, reading the API key from the environment
    pub fn from_config(config: &ProviderConfig) -> GateResult<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            GateError::configuration(format!(
                "provider API key is required; set {}",
                config.api_key_env
            ))
        })?;
        if api_key.trim().is_empty() {
            return Err(GateError::configuration(format!(
                "{} cannot be empty",
                config.api_key_env
            )));
        }
        Self::new(
            config.base_url.clone(),
            api_key,
            Duration::from_secs(config.request_timeout_secs),
        )
    }
}

/// Reasoning-family models take effort hints and reject custom temperatures.
fn is_reasoning_model(model: &str) -> bool {
    model.starts_with("gpt-5")
}

fn request_body(request: &CompletionRequest) -> serde_json::Value {
    let mut body = serde_json::json!({
        "model": request.model,
        "messages": [{ "role": "user", "content": request.prompt }],
        "n": 1,
    });
    if is_reasoning_model(&request.model) {
        if let Some(verbosity) = &request.hints.verbosity {
            body["verbosity"] = serde_json::json!(verbosity);
        }
        if let Some(effort) = &request.hints.reasoning_effort {
            body["reasoning_effort"] = serde_json::json!(effort);
        }
        if let Some(max) = request.max_tokens {
            body["max_completion_tokens"] = serde_json::json!(max);
        }
    } else {
        body["temperature"] = serde_json::json!(request.temperature);
        body["logprobs"] = serde_json::json!(true);
        if let Some(max) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max);
        }
    }
    body
}

fn classify_status(status: StatusCode, body: &str, model: &str) -> ProviderError {
    let message: String = body.chars().take(200).collect();
    match status.as_u16() {
        408 => ProviderError::Timeout,
        429 => ProviderError::RateLimited,
        404 => ProviderError::InvalidModel {
            model: model.to_string(),
        },
        400 if body.contains("model_not_found") || body.contains("does not exist") => {
            ProviderError::InvalidModel {
                model: model.to_string(),
            }
        }
        code if status.is_server_error() => ProviderError::Server {
            status: code,
            message,
        },
        code => ProviderError::Rejected {
            status: code,
            message,
        },
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    #[serde(default)]
    logprobs: Option<ChoiceLogprobs>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceLogprobs {
    #[serde(default)]
    content: Option<Vec<TokenLogprob>>,
}

#[derive(Debug, Deserialize)]
struct TokenLogprob {
    logprob: f64,
}

fn parse_completion(response: ChatResponse) -> Result<Completion, ProviderError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::Malformed {
            message: "response has no choices".into(),
        })?;
    let logprob = choice
        .logprobs
        .and_then(|lp| lp.content)
        .filter(|tokens| !tokens.is_empty())
        .map(|tokens| tokens.iter().map(|t| t.logprob).sum());
    Ok(Completion {
        text: choice.message.content.unwrap_or_default().trim().to_string(),
        logprob,
    })
}

#[async_trait]
impl ModelProvider for OpenAiProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let resp = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&request_body(request))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout
                } else {
                    ProviderError::Transport {
                        message: e.to_string(),
                    }
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_status(status, &body, &request.model));
        }

        let parsed: ChatResponse = resp.json().await.map_err(|e| ProviderError::Malformed {
            message: e.to_string(),
        })?;
        parse_completion(parsed)
    }
}
