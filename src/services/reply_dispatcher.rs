// src/services/reply_dispatcher.rs
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::config::{Config, Notices};
use crate::message::{CompletionRequest, CompletionResult, ErrorKind, InboundMessage};
use crate::services::completion_client::CompletionClient;
use crate::services::transport::ChatTransport;

/// Extra time granted to a client past its own budget before the dispatcher gives up on it.
pub const TIMEOUT_GRACE: Duration = Duration::from_millis(500);

/// Per-message behavior, copied out of [`Config`] once at startup.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub system_instruction: Option<String>,
    pub completion_timeout: Duration,
    pub send_typing: bool,
    pub notices: Notices,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            temperature: crate::config::DEFAULT_TEMPERATURE,
            max_tokens: None,
            system_instruction: Some(crate::config::DEFAULT_SYSTEM_PROMPT.to_string()),
            completion_timeout: crate::config::DEFAULT_COMPLETION_TIMEOUT,
            send_typing: true,
            notices: Notices::default(),
        }
    }
}

impl From<&Config> for DispatchSettings {
    fn from(config: &Config) -> Self {
        Self {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            system_instruction: config.system_instruction.clone(),
            completion_timeout: config.completion_timeout,
            send_typing: true,
            notices: config.notices.clone(),
        }
    }
}

/// Turns one inbound message into exactly one outbound message.
///
/// Cheap to clone and holds no mutable state, so every message can be
/// handled on its own task.
#[derive(Clone)]
pub struct ReplyDispatcher {
    completion: Arc<dyn CompletionClient>,
    transport: Arc<dyn ChatTransport>,
    settings: Arc<DispatchSettings>,
}

impl ReplyDispatcher {
    pub fn new(
        completion: Arc<dyn CompletionClient>,
        transport: Arc<dyn ChatTransport>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            completion,
            transport,
            settings: Arc::new(settings),
        }
    }

    pub async fn handle(&self, message: InboundMessage) {
        let span = info_span!(
            "dispatch",
            request_id = %Uuid::new_v4(),
            conversation = %message.conversation_id,
            sender = %message.sender_id
        );
        self.handle_inner(message).instrument(span).await
    }

    async fn handle_inner(&self, message: InboundMessage) {
        if message.is_start_command() {
            debug!("answering /start with the greeting");
            let greeting = self.settings.notices.greeting.clone();
            self.deliver(&message.conversation_id, &greeting).await;
            return;
        }

        let typing = self
            .settings
            .send_typing
            .then(|| self.spawn_typing(&message.conversation_id));

        let reply = match self.complete(&message).await {
            CompletionResult::Success { text } => {
                info!(chars = text.chars().count(), "completion succeeded");
                text
            }
            CompletionResult::Failure { cause, detail } => {
                error!(%cause, detail = %detail, "completion failed, sending fallback notice");
                self.settings.notices.for_failure(cause).to_string()
            }
        };

        // A typing action that lands after the reply would show a stale indicator.
        if let Some(typing) = typing {
            typing.abort();
        }
        self.deliver(&message.conversation_id, &reply).await;
    }

    /// Runs the client on its own task so a panic inside it surfaces here as a
    /// `JoinError` instead of unwinding through the intake loop.
    async fn complete(&self, message: &InboundMessage) -> CompletionResult {
        let request = CompletionRequest::new(message.text.clone(), self.settings.temperature)
            .with_system_instruction(self.settings.system_instruction.clone())
            .with_max_tokens(self.settings.max_tokens);

        let budget = self.settings.completion_timeout;
        let client = Arc::clone(&self.completion);
        let mut task = tokio::spawn(async move { client.complete(request, budget).await });

        match tokio::time::timeout(budget + TIMEOUT_GRACE, &mut task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => {
                CompletionResult::failure(ErrorKind::Internal, format!("completion task failed: {join_error}"))
            }
            Err(_) => {
                task.abort();
                CompletionResult::failure(
                    ErrorKind::Timeout,
                    format!("client ignored its {}ms budget", budget.as_millis()),
                )
            }
        }
    }

    /// Never awaited by the reply path; the handle only lets it be cancelled.
    fn spawn_typing(&self, conversation_id: &str) -> JoinHandle<()> {
        let transport = Arc::clone(&self.transport);
        let conversation_id = conversation_id.to_string();
        tokio::spawn(
            async move {
                if let Err(e) = transport.send_typing(&conversation_id).await {
                    debug!(error = %e, "typing indicator failed");
                }
            }
            .in_current_span(),
        )
    }

    async fn deliver(&self, conversation_id: &str, text: &str) {
        if let Err(e) = self.transport.send_text(conversation_id, text).await {
            // Nobody left to notify when delivery itself is broken.
            warn!(error = %e, "failed to deliver reply");
        }
    }
}
