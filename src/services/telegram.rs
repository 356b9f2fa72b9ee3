// src/services/telegram.rs
//! Telegram Bot API transport: getUpdates long-poll intake, sendMessage and sendChatAction.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::TransportError;
use crate::message::InboundMessage;
use crate::services::transport::ChatTransport;

pub const LONG_POLL_TIMEOUT_SECS: u64 = 30;
/// sendMessage rejects longer texts with "message is too long". Telegram
/// counts UTF-16 code units.
pub const MAX_MESSAGE_CHARS: usize = 4096;
const POLL_BACKOFF: Duration = Duration::from_secs(2);

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BotUser {
    id: i64,
    #[serde(default)]
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<TelegramMessage>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramMessage {
    pub chat: TelegramChat,
    #[serde(default)]
    pub from: Option<TelegramUser>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
}

impl TelegramUpdate {
    /// Plain text and `/start` become inbound messages; other commands and
    /// non-text updates are dropped here.
    pub fn into_inbound(self) -> Option<InboundMessage> {
        let message = self.message?;
        let text = message.text?;
        if text.trim().is_empty() {
            return None;
        }

        let chat_id = message.chat.id.to_string();
        let sender_id = message
            .from
            .map(|user| user.id.to_string())
            .unwrap_or_else(|| chat_id.clone());
        let inbound = InboundMessage::new(sender_id, chat_id, text);

        if inbound.text.trim_start().starts_with('/') && !inbound.is_start_command() {
            return None;
        }
        Some(inbound)
    }
}

pub struct TelegramTransport {
    token: String,
    api_base: String,
    poll_timeout_secs: u64,
    client: reqwest::Client,
}

impl TelegramTransport {
    pub fn new(token: impl Into<String>, api_base: impl Into<String>) -> Self {
        Self::with_poll_timeout(token, api_base, LONG_POLL_TIMEOUT_SECS)
    }

    pub fn with_poll_timeout(
        token: impl Into<String>,
        api_base: impl Into<String>,
        poll_timeout_secs: u64,
    ) -> Self {
        let api_base: String = api_base.into();
        Self {
            token: token.into(),
            api_base: api_base.trim_end_matches('/').to_string(),
            poll_timeout_secs,
            // Must outlive the server-side long-poll window.
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(poll_timeout_secs + 10))
                .build()
                .unwrap_or_default(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.telegram_token.clone(), config.telegram_api_base.clone())
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &'static str,
        body: serde_json::Value,
    ) -> Result<T, TransportError> {
        let url = format!("{}/bot{}/{}", self.api_base, self.token, method);
        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| TransportError::Request(e.without_url()))?;

        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                method,
                status,
                body,
            });
        }

        let envelope: ApiEnvelope<T> = res
            .json()
            .await
            .map_err(|e| TransportError::Request(e.without_url()))?;
        match envelope {
            ApiEnvelope {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            ApiEnvelope { description, .. } => Err(TransportError::Rejected {
                method,
                description: description.unwrap_or_else(|| "no description".to_string()),
            }),
        }
    }

    async fn get_updates(&self, offset: Option<i64>) -> Result<Vec<TelegramUpdate>, TransportError> {
        let mut body = json!({
            "timeout": self.poll_timeout_secs,
            "allowed_updates": ["message"],
        });
        if let Some(offset) = offset {
            body["offset"] = json!(offset);
        }
        self.call("getUpdates", body).await
    }
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    async fn connect(&self) -> Result<String, TransportError> {
        let me: BotUser = self.call("getMe", json!({})).await?;
        Ok(me
            .username
            .map(|name| format!("@{name}"))
            .unwrap_or_else(|| me.id.to_string()))
    }

    fn start_intake(self: Arc<Self>, inbound_tx: mpsc::Sender<InboundMessage>) -> JoinHandle<()> {
        info!("telegram: starting getUpdates long-poll loop");
        tokio::spawn(run_intake_loop(self, inbound_tx))
    }

    async fn send_text(&self, conversation_id: &str, text: &str) -> Result<(), TransportError> {
        let clamped = clamp_message(text);
        if clamped.len() < text.len() {
            warn!(
                chars = text.chars().count(),
                kept = clamped.chars().count(),
                "reply exceeds the Telegram message limit, truncating"
            );
        }
        let text = clamped;
        let _: IgnoredAny = self
            .call("sendMessage", json!({ "chat_id": conversation_id, "text": text }))
            .await?;
        Ok(())
    }

    async fn send_typing(&self, conversation_id: &str) -> Result<(), TransportError> {
        let _: IgnoredAny = self
            .call(
                "sendChatAction",
                json!({ "chat_id": conversation_id, "action": "typing" }),
            )
            .await?;
        Ok(())
    }
}

/// Cuts `text` at a char boundary so it fits in a single sendMessage.
pub fn clamp_message(text: &str) -> &str {
    let mut units = 0;
    for (idx, c) in text.char_indices() {
        units += c.len_utf16();
        if units > MAX_MESSAGE_CHARS {
            return &text[..idx];
        }
    }
    text
}

async fn run_intake_loop(transport: Arc<TelegramTransport>, inbound_tx: mpsc::Sender<InboundMessage>) {
    let mut offset: Option<i64> = None;
    while !inbound_tx.is_closed() {
        match transport.get_updates(offset).await {
            Ok(updates) => {
                for update in updates {
                    offset = Some(update.update_id + 1);
                    let update_id = update.update_id;
                    let Some(inbound) = update.into_inbound() else {
                        debug!(update_id, "telegram: skipping non-text or command update");
                        continue;
                    };
                    if inbound_tx.send(inbound).await.is_err() {
                        break;
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "telegram: getUpdates failed, backing off");
                tokio::time::sleep(POLL_BACKOFF).await;
            }
        }
    }
    info!("telegram: inbound queue closed, getUpdates loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(raw: &str) -> TelegramUpdate {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn text_message_becomes_inbound() {
        let inbound = update(
            r#"{"update_id": 10, "message": {"message_id": 1, "chat": {"id": -100}, "from": {"id": 42, "is_bot": false}, "text": "What is the capital of France?"}}"#,
        )
        .into_inbound()
        .unwrap();
        assert_eq!(inbound.sender_id, "42");
        assert_eq!(inbound.conversation_id, "-100");
        assert_eq!(inbound.text, "What is the capital of France?");
    }

    #[test]
    fn sender_falls_back_to_chat() {
        let inbound = update(r#"{"update_id": 11, "message": {"chat": {"id": 7}, "text": "hi"}}"#)
            .into_inbound()
            .unwrap();
        assert_eq!(inbound.sender_id, "7");
    }

    #[test]
    fn start_is_kept_other_commands_are_dropped() {
        assert!(
            update(r#"{"update_id": 1, "message": {"chat": {"id": 7}, "text": "/start"}}"#)
                .into_inbound()
                .is_some()
        );
        assert!(
            update(r#"{"update_id": 2, "message": {"chat": {"id": 7}, "text": "/help"}}"#)
                .into_inbound()
                .is_none()
        );
    }

    #[test]
    fn long_text_is_clamped_on_a_char_boundary() {
        let short = "Paris.";
        assert_eq!(clamp_message(short), short);

        let exact = "a".repeat(MAX_MESSAGE_CHARS);
        assert_eq!(clamp_message(&exact), exact);

        let bengali = "আ".repeat(MAX_MESSAGE_CHARS + 10);
        let clamped = clamp_message(&bengali);
        assert_eq!(clamped.chars().count(), MAX_MESSAGE_CHARS);
        assert!(bengali.starts_with(clamped));

        // Astral-plane emoji take two UTF-16 units each.
        let emoji = "😓".repeat(MAX_MESSAGE_CHARS);
        assert_eq!(clamp_message(&emoji).chars().count(), MAX_MESSAGE_CHARS / 2);
    }

    #[test]
    fn non_text_updates_are_dropped() {
        assert!(update(r#"{"update_id": 3}"#).into_inbound().is_none());
        assert!(
            update(r#"{"update_id": 4, "message": {"chat": {"id": 7}, "sticker": {}}}"#)
                .into_inbound()
                .is_none()
        );
        assert!(
            update(r#"{"update_id": 5, "message": {"chat": {"id": 7}, "text": "   "}}"#)
                .into_inbound()
                .is_none()
        );
    }
}
