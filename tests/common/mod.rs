#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use gpt_relay_bot::config::Config;
use gpt_relay_bot::error::TransportError;
use gpt_relay_bot::message::{CompletionRequest, CompletionResult, InboundMessage};
use gpt_relay_bot::services::completion_client::CompletionClient;
use gpt_relay_bot::services::transport::ChatTransport;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local_addr").port()
}

pub fn test_config(extra: &[(&str, &str)]) -> Config {
    let mut vars: HashMap<String, String> = HashMap::from([
        ("TELEGRAM_TOKEN".to_string(), "123:test".to_string()),
        ("OPENAI_API_KEY".to_string(), "sk-test".to_string()),
    ]);
    for (k, v) in extra {
        vars.insert(k.to_string(), v.to_string());
    }
    Config::from_lookup(|key: &str| vars.get(key).cloned()).expect("valid test config")
}

/// Chat transport that records every outbound call.
#[derive(Default)]
pub struct RecordingTransport {
    pub sent: Mutex<Vec<(String, String)>>,
    pub typing: Mutex<Vec<String>>,
    pub queued: Mutex<Vec<InboundMessage>>,
    pub fail_connect: bool,
    pub fail_typing: bool,
    pub fail_send: bool,
    /// How long `send_typing` takes before the call is recorded.
    pub typing_delay: Duration,
    /// Drop the inbound sender after the queued messages, ending the intake.
    pub end_intake: bool,
}

impl RecordingTransport {
    pub fn with_queued(messages: Vec<InboundMessage>) -> Self {
        Self {
            queued: Mutex::new(messages),
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn typing(&self) -> Vec<String> {
        self.typing.lock().unwrap().clone()
    }

    pub async fn wait_for_sends(&self, count: usize, within: Duration) -> Vec<(String, String)> {
        let deadline = tokio::time::Instant::now() + within;
        loop {
            let sent = self.sent();
            if sent.len() >= count || tokio::time::Instant::now() >= deadline {
                return sent;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn connect(&self) -> Result<String, TransportError> {
        if self.fail_connect {
            return Err(TransportError::Rejected {
                method: "getMe",
                description: "Unauthorized".to_string(),
            });
        }
        Ok("@stub_bot".to_string())
    }

    fn start_intake(self: Arc<Self>, inbound_tx: mpsc::Sender<InboundMessage>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let queued: Vec<InboundMessage> = self.queued.lock().unwrap().drain(..).collect();
            for message in queued {
                if inbound_tx.send(message).await.is_err() {
                    return;
                }
            }
            if !self.end_intake {
                inbound_tx.closed().await;
            }
        })
    }

    async fn send_text(&self, conversation_id: &str, text: &str) -> Result<(), TransportError> {
        self.sent
            .lock()
            .unwrap()
            .push((conversation_id.to_string(), text.to_string()));
        if self.fail_send {
            return Err(TransportError::Rejected {
                method: "sendMessage",
                description: "chat not found".to_string(),
            });
        }
        Ok(())
    }

    async fn send_typing(&self, conversation_id: &str) -> Result<(), TransportError> {
        if !self.typing_delay.is_zero() {
            tokio::time::sleep(self.typing_delay).await;
        }
        self.typing.lock().unwrap().push(conversation_id.to_string());
        if self.fail_typing {
            return Err(TransportError::Rejected {
                method: "sendChatAction",
                description: "flood control".to_string(),
            });
        }
        Ok(())
    }
}

type Script = dyn Fn(&CompletionRequest) -> (Duration, CompletionResult) + Send + Sync;

/// Completion client whose delay and outcome are decided per request.
pub struct StubCompletion {
    script: Box<Script>,
    pub requests: Mutex<Vec<CompletionRequest>>,
}

impl StubCompletion {
    pub fn new(
        script: impl Fn(&CompletionRequest) -> (Duration, CompletionResult) + Send + Sync + 'static,
    ) -> Self {
        Self {
            script: Box::new(script),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(result: CompletionResult) -> Self {
        Self::new(move |_| (Duration::ZERO, result.clone()))
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionClient for StubCompletion {
    async fn complete(&self, request: CompletionRequest, _timeout: Duration) -> CompletionResult {
        self.requests.lock().unwrap().push(request.clone());
        let (delay, result) = (self.script)(&request);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        result
    }
}

pub fn success(text: &str) -> CompletionResult {
    CompletionResult::Success {
        text: text.to_string(),
    }
}
