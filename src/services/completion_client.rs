// src/services/completion_client.rs
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::Config;
use crate::message::{CompletionRequest, CompletionResult, ErrorKind};

const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";

/// Sends one prompt to a remote model and normalizes the outcome.
///
/// Implementations never return an error or panic on remote failures: every
/// failure is folded into [`CompletionResult::Failure`]. No retries happen here.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest, timeout: Duration) -> CompletionResult;
}

#[derive(Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ApiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ApiResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChoiceMessage>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for the OpenAI chat completions API (and compatible servers).
#[derive(Clone)]
pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    url: String,
}

impl OpenAiClient {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        let base: String = base_url.into();
        let url = format!("{}{CHAT_COMPLETIONS_PATH}", base.trim_end_matches('/'));
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            url,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.openai_api_key.clone(),
            config.model.clone(),
            config.openai_base_url.clone(),
        )
    }

    async fn request_completion(&self, request: &CompletionRequest) -> CompletionResult {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system_instruction.as_deref() {
            messages.push(ApiMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ApiMessage {
            role: "user",
            content: &request.user_text,
        });

        let body = ApiRequest {
            model: &self.model,
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let response = match self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                return CompletionResult::failure(
                    ErrorKind::RemoteError,
                    format!("request failed: {}", e.without_url()),
                );
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(%status, body = %body, "completion API returned an error status");
            return CompletionResult::failure(
                ErrorKind::RemoteError,
                format!("API returned {status}"),
            );
        }

        let parsed: ApiResponse = match response.json().await {
            Ok(parsed) => parsed,
            Err(e) => {
                return CompletionResult::failure(
                    ErrorKind::RemoteError,
                    format!("failed to parse response: {}", e.without_url()),
                );
            }
        };

        let Some(first) = parsed.choices.into_iter().next() else {
            return CompletionResult::failure(ErrorKind::EmptyResponse, "response has no choices");
        };

        CompletionResult::from_candidate(first.message.as_ref().and_then(|m| m.content.as_deref()))
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, request: CompletionRequest, timeout: Duration) -> CompletionResult {
        if request.user_text.trim().is_empty() {
            return CompletionResult::failure(ErrorKind::InvalidRequest, "user text is empty");
        }

        debug!(model = %self.model, chars = request.user_text.chars().count(), "requesting completion");

        // Dropping the in-flight request on expiry releases the connection;
        // the provider has no cancel primitive.
        match tokio::time::timeout(timeout, self.request_completion(&request)).await {
            Ok(result) => result,
            Err(_) => CompletionResult::failure(
                ErrorKind::Timeout,
                format!("no response within {}ms", timeout.as_millis()),
            ),
        }
    }
}
