use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{
    endpoint, error_from_status, error_from_transport, non_empty, ClientOptions, CompletionClient,
    CompletionError, CompletionRequest, CompletionResult, ErrorKind,
};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Serialize)]
struct OpenAIMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAIMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

/// Chat completions client for OpenAI and API-compatible backends.
#[derive(Clone)]
pub struct OpenAIClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    timeout: Option<Duration>,
}

impl OpenAIClient {
    pub fn new(api_key: &str) -> Self {
        Self::with_options(api_key, ClientOptions::default())
    }

    pub fn with_options(api_key: &str, options: ClientOptions) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            base_url: options
                .base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: options.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            timeout: options.timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn body<'a>(&'a self, request: &'a CompletionRequest) -> OpenAIRequest<'a> {
        OpenAIRequest {
            model: &self.model,
            messages: request
                .messages()
                .iter()
                .map(|turn| OpenAIMessage {
                    role: turn.role.as_str(),
                    content: &turn.content,
                })
                .collect(),
            temperature: request.config().temperature(),
            max_tokens: request.config().max_output_tokens(),
        }
    }
}

pub(crate) fn parse_response(body: &str) -> CompletionResult {
    let response: OpenAIResponse = serde_json::from_str(body).map_err(|e| {
        CompletionError::new(ErrorKind::InvalidResponse, format!("undecodable body: {}", e))
    })?;
    non_empty(
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content),
    )
}

#[async_trait]
impl CompletionClient for OpenAIClient {
    async fn generate(&self, request: &CompletionRequest) -> CompletionResult {
        request.config().validate()?;

        let url = endpoint(&self.base_url, "chat/completions");
        tracing::debug!(
            model = %self.model,
            messages = request.messages().len(),
            "sending chat completion request"
        );

        let mut builder = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&self.body(request));
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(error_from_transport)?;
        let status = response.status();
        let text = response.text().await.map_err(error_from_transport)?;

        if !status.is_success() {
            return Err(error_from_status(status, &text));
        }

        parse_response(&text)
    }

    fn model(&self) -> &str {
        &self.model
    }
}
