//! Completion collaborator used by the query-generation and planning tools.
//!
//! Callers construct a [`CompletionModel`] and hand it to the toolkit; the
//! toolkit never builds one on its own.

use std::{error::Error, fmt};

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3.2";

pub type CompletionFuture<'a> = BoxFuture<'a, Result<String, CompletionError>>;

/// Text completion backend.
pub trait CompletionModel: Send + Sync {
    /// Completes `prompt` and returns the raw model text.
    fn complete<'a>(&'a self, prompt: &'a str) -> CompletionFuture<'a>;
}

#[derive(Debug)]
pub enum CompletionError {
    Transport(String),
    Status { status: u16, body: String },
    Decode(String),
}

impl fmt::Display for CompletionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(message) => write!(f, "completion request failed: {message}"),
            Self::Status { status, body } => {
                write!(f, "completion request failed with status {status}: {body}")
            }
            Self::Decode(message) => write!(f, "invalid completion response: {message}"),
        }
    }
}

impl Error for CompletionError {}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Completion over Ollama's `/api/generate` endpoint, non-streaming.
#[derive(Debug, Clone)]
pub struct OllamaCompletion {
    base_url: String,
    model: String,
    temperature: f32,
    client: reqwest::Client,
}

impl OllamaCompletion {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            temperature: 0.0,
            client: reqwest::Client::new(),
        }
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, CompletionError> {
        let endpoint = format!("{}/api/generate", self.base_url.trim_end_matches('/'));
        debug!(model = %self.model, prompt_len = prompt.len(), "requesting completion");

        let response = self
            .client
            .post(&endpoint)
            .json(&GenerateRequest {
                model: &self.model,
                prompt,
                stream: false,
                options: GenerateOptions {
                    temperature: self.temperature,
                },
            })
            .send()
            .await
            .map_err(|err| CompletionError::Transport(err.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| CompletionError::Transport(err.to_string()))?;
        if !status.is_success() {
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let decoded: GenerateResponse = serde_json::from_str(&body)
            .map_err(|err| CompletionError::Decode(err.to_string()))?;
        Ok(decoded.response)
    }
}

impl CompletionModel for OllamaCompletion {
    fn complete<'a>(&'a self, prompt: &'a str) -> CompletionFuture<'a> {
        Box::pin(self.generate(prompt))
    }
}
