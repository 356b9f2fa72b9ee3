// src/message.rs
use std::fmt;

use serde::{Deserialize, Serialize};

/// One text event received from the chat platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub sender_id: String,
    pub conversation_id: String,
    pub text: String,
}

impl InboundMessage {
    pub fn new(
        sender_id: impl Into<String>,
        conversation_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            sender_id: sender_id.into(),
            conversation_id: conversation_id.into(),
            text: text.into(),
        }
    }

    /// True for `/start` and the group form `/start@SomeBot`, with or without a payload.
    pub fn is_start_command(&self) -> bool {
        let first = self.text.split_whitespace().next().unwrap_or_default();
        first == "/start" || first.starts_with("/start@")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system_instruction: Option<String>,
    pub user_text: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    pub fn new(user_text: impl Into<String>, temperature: f32) -> Self {
        Self {
            system_instruction: None,
            user_text: user_text.into(),
            temperature,
            max_tokens: None,
        }
    }

    pub fn with_system_instruction(mut self, instruction: Option<String>) -> Self {
        self.system_instruction = instruction;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The remote call did not resolve within its budget.
    Timeout,
    /// Transport, HTTP or API-level failure, including undecodable bodies.
    RemoteError,
    /// Well-formed response without usable text.
    EmptyResponse,
    /// The request was rejected before any network call (empty user text).
    InvalidRequest,
    /// A fault caught at the dispatcher boundary.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::RemoteError => "remote_error",
            ErrorKind::EmptyResponse => "empty_response",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::Internal => "internal",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionResult {
    Success { text: String },
    Failure { cause: ErrorKind, detail: String },
}

impl CompletionResult {
    pub fn failure(cause: ErrorKind, detail: impl Into<String>) -> Self {
        CompletionResult::Failure {
            cause,
            detail: detail.into(),
        }
    }

    /// Trims the candidate text; missing or blank text becomes `EmptyResponse`.
    pub fn from_candidate(text: Option<&str>) -> Self {
        match text.map(str::trim) {
            Some(trimmed) if !trimmed.is_empty() => CompletionResult::Success {
                text: trimmed.to_string(),
            },
            Some(_) => Self::failure(ErrorKind::EmptyResponse, "candidate text is blank"),
            None => Self::failure(ErrorKind::EmptyResponse, "candidate has no text"),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CompletionResult::Success { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
}

impl HealthStatus {
    pub fn running() -> Self {
        Self {
            status: "running".to_string(),
        }
    }
}
