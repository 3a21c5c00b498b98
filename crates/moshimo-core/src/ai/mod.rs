//! Boundary to the remote text-generation services.
//!
//! Every backend implements [`CompletionClient`]. Clients are stateless: they
//! get a fully built [`CompletionRequest`] and return a [`CompletionResult`].
//! Failures come back as values with an [`ErrorKind`]; nothing here retries.

pub mod claude;
pub mod openai;

#[cfg(test)]
mod test_server;

pub use claude::ClaudeClient;
pub use openai::OpenAIClient;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::ResolvedBackend;
use crate::generation::{GenerationConfig, GenerationError};
use crate::provider::Provider;
use crate::session::Turn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Generation parameters out of range; caught before any network call.
    InvalidConfig,
    /// Credential rejected by the service.
    Authentication,
    /// Quota exhausted or backoff requested.
    RateLimit,
    /// Connectivity failure or timeout.
    Network,
    /// Malformed or empty payload.
    InvalidResponse,
    /// Any other non-success status from the service.
    Service,
}

impl ErrorKind {
    pub fn label(&self) -> &'static str {
        match self {
            ErrorKind::InvalidConfig => "Invalid settings",
            ErrorKind::Authentication => "Authentication failed",
            ErrorKind::RateLimit => "Rate limited",
            ErrorKind::Network => "Network error",
            ErrorKind::InvalidResponse => "Invalid response",
            ErrorKind::Service => "Service error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}: {}", .kind.label(), .detail)]
pub struct CompletionError {
    kind: ErrorKind,
    detail: String,
}

impl CompletionError {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }
}

impl From<GenerationError> for CompletionError {
    fn from(err: GenerationError) -> Self {
        Self::new(ErrorKind::InvalidConfig, err.to_string())
    }
}

pub type CompletionResult = Result<String, CompletionError>;

/// Messages (system turn first, then history) plus sampling parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    messages: Vec<Turn>,
    config: GenerationConfig,
}

impl CompletionRequest {
    pub fn new(messages: Vec<Turn>, config: GenerationConfig) -> Self {
        Self { messages, config }
    }

    pub fn messages(&self) -> &[Turn] {
        &self.messages
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn generate(&self, request: &CompletionRequest) -> CompletionResult;

    /// Model identifier sent with every request.
    fn model(&self) -> &str;
}

/// Optional overrides shared by the HTTP clients.
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    /// API-compatible alternative endpoint.
    pub base_url: Option<String>,
    pub model: Option<String>,
    /// Bound on a single call; expiry is reported as [`ErrorKind::Network`].
    pub timeout: Option<Duration>,
}

/// Build the client for a resolved backend.
pub fn connect(backend: &ResolvedBackend) -> Arc<dyn CompletionClient> {
    let options = ClientOptions {
        base_url: backend.base_url.clone(),
        model: Some(backend.model.clone()),
        timeout: backend.timeout,
    };

    match backend.provider {
        Provider::OpenAI => Arc::new(OpenAIClient::with_options(&backend.api_key, options)),
        Provider::Claude => Arc::new(ClaudeClient::with_options(&backend.api_key, options)),
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

const DETAIL_LIMIT: usize = 300;

/// Map a non-success HTTP status (and its body) onto the error taxonomy.
pub(crate) fn error_from_status(status: StatusCode, body: &str) -> CompletionError {
    // Both OpenAI and Anthropic wrap errors as {"error": {"message": ...}}
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|envelope| envelope.error.message)
        .unwrap_or_else(|_| truncate(body.trim(), DETAIL_LIMIT));
    let detail = if message.is_empty() {
        status.to_string()
    } else {
        format!("{}: {}", status, message)
    };

    let kind = match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ErrorKind::Authentication,
        StatusCode::TOO_MANY_REQUESTS => ErrorKind::RateLimit,
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => ErrorKind::Network,
        _ => ErrorKind::Service,
    };
    CompletionError::new(kind, detail)
}

pub(crate) fn error_from_transport(err: reqwest::Error) -> CompletionError {
    if err.is_timeout() {
        CompletionError::new(ErrorKind::Network, format!("request timed out: {}", err))
    } else if err.is_decode() {
        CompletionError::new(ErrorKind::InvalidResponse, err.to_string())
    } else {
        CompletionError::new(ErrorKind::Network, err.to_string())
    }
}

/// Reject blank completions; the service answered but said nothing usable.
pub(crate) fn non_empty(content: Option<String>) -> CompletionResult {
    match content {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(CompletionError::new(
            ErrorKind::InvalidResponse,
            "service returned no content",
        )),
    }
}

pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path)
}

fn truncate(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}
