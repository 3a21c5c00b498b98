use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{
    endpoint, error_from_status, error_from_transport, non_empty, ClientOptions, CompletionClient,
    CompletionError, CompletionRequest, CompletionResult, ErrorKind,
};
use crate::session::Role;

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
pub const DEFAULT_MODEL: &str = "claude-3-5-haiku-20241022";
const API_VERSION: &str = "2023-06-01";
/// The Messages API rejects temperatures above 1.0.
const MAX_TEMPERATURE: f32 = 1.0;

#[derive(Serialize)]
struct ClaudeMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ClaudeRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<ClaudeMessage<'a>>,
}

#[derive(Deserialize)]
struct ClaudeContent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct ClaudeResponse {
    content: Vec<ClaudeContent>,
}

/// Anthropic Messages API client.
///
/// The Messages API takes the system prompt as a top-level field rather than as
/// a message, so system turns are lifted out of the message list.
#[derive(Clone)]
pub struct ClaudeClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    timeout: Option<Duration>,
}

impl ClaudeClient {
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

    fn body<'a>(&'a self, request: &'a CompletionRequest) -> ClaudeRequest<'a> {
        let system: Vec<&str> = request
            .messages()
            .iter()
            .filter(|turn| turn.role == Role::System)
            .map(|turn| turn.content.as_str())
            .collect();

        let requested = request.config().temperature();
        let temperature = requested.min(MAX_TEMPERATURE);
        if temperature < requested {
            tracing::debug!(requested, sent = temperature, "clamped temperature for messages API");
        }

        ClaudeRequest {
            model: &self.model,
            max_tokens: request.config().max_output_tokens(),
            temperature,
            system: (!system.is_empty()).then(|| system.join("\n\n")),
            messages: request
                .messages()
                .iter()
                .filter(|turn| turn.role != Role::System)
                .map(|turn| ClaudeMessage {
                    role: turn.role.as_str(),
                    content: &turn.content,
                })
                .collect(),
        }
    }
}

pub(crate) fn parse_response(body: &str) -> CompletionResult {
    let response: ClaudeResponse = serde_json::from_str(body).map_err(|e| {
        CompletionError::new(ErrorKind::InvalidResponse, format!("undecodable body: {}", e))
    })?;

    let text: Vec<String> = response
        .content
        .into_iter()
        .filter(|block| block.kind == "text")
        .filter_map(|block| block.text)
        .collect();
    non_empty((!text.is_empty()).then(|| text.concat()))
}

#[async_trait]
impl CompletionClient for ClaudeClient {
    async fn generate(&self, request: &CompletionRequest) -> CompletionResult {
        request.config().validate()?;

        let url = endpoint(&self.base_url, "messages");
        tracing::debug!(
            model = %self.model,
            messages = request.messages().len(),
            "sending messages request"
        );

        let mut builder = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::test_server;
    use crate::generation::GenerationConfig;
    use crate::session::Turn;

    fn client_for(base_url: &str) -> ClaudeClient {
        ClaudeClient::with_options(
            "sk-ant-test",
            ClientOptions {
                base_url: Some(base_url.to_string()),
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_parse_response_joins_text_blocks() {
        let body = r#"{"content":[{"type":"text","text":"Why "},{"type":"text","text":"do you ask?"}]}"#;
        assert_eq!(parse_response(body), Ok("Why do you ask?".to_string()));

        let empty = r#"{"content":[]}"#;
        assert_eq!(
            parse_response(empty).unwrap_err().kind(),
            ErrorKind::InvalidResponse
        );
        assert_eq!(
            parse_response("{").unwrap_err().kind(),
            ErrorKind::InvalidResponse
        );
    }

    #[tokio::test]
    async fn test_lifts_system_turn_out_of_messages() {
        let server = test_server::respond(
            200,
            r#"{"content":[{"type":"text","text":"Arr."}]}"#,
        )
        .await;
        let request = CompletionRequest::new(
            vec![
                Turn::system("talk like a pirate"),
                Turn::user("hello"),
                Turn::assistant("Ahoy"),
                Turn::user("where is the treasure?"),
            ],
            GenerationConfig::default(),
        );

        let content = client_for(&server.base_url).generate(&request).await.unwrap();
        assert_eq!(content, "Arr.");

        let captured = server.request().await;
        assert!(captured.head.starts_with("POST /messages"));
        assert!(captured.head.to_lowercase().contains("x-api-key: sk-ant-test"));

        let body: serde_json::Value = serde_json::from_str(&captured.body).unwrap();
        assert_eq!(body["model"], DEFAULT_MODEL);
        assert_eq!(body["system"], "talk like a pirate");
        assert_eq!(body["max_tokens"], 512);
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[1]["role"], "assistant");
    }

    #[tokio::test]
    async fn test_temperature_clamped_to_api_range() {
        let server = test_server::respond(
            200,
            r#"{"content":[{"type":"text","text":"Arr."}]}"#,
        )
        .await;
        let request = CompletionRequest::new(
            vec![Turn::user("hello")],
            GenerationConfig::new(1.5, 512).unwrap(),
        );

        client_for(&server.base_url).generate(&request).await.unwrap();

        let captured = server.request().await;
        let body: serde_json::Value = serde_json::from_str(&captured.body).unwrap();
        assert_eq!(body["temperature"], 1.0);
    }

    #[test]
    fn test_temperature_in_range_passes_through() {
        let client = client_for("http://unused");
        let request = CompletionRequest::new(
            vec![Turn::user("hello")],
            GenerationConfig::new(0.5, 512).unwrap(),
        );
        assert_eq!(client.body(&request).temperature, 0.5);
    }

    #[tokio::test]
    async fn test_rate_limit_status() {
        let server = test_server::respond(
            429,
            r#"{"type":"error","error":{"type":"rate_limit_error","message":"slow down"}}"#,
        )
        .await;
        let request = CompletionRequest::new(vec![Turn::user("hi")], GenerationConfig::default());

        let err = client_for(&server.base_url)
            .generate(&request)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RateLimit);
        assert!(err.detail().contains("slow down"));
    }
}
