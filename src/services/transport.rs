// src/services/transport.rs
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::TransportError;
use crate::message::InboundMessage;

/// The chat platform as seen by the bridge: a stream of inbound text events
/// plus outbound text and typing indicators.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Verify credentials before the intake starts. Returns a display name for logs.
    async fn connect(&self) -> Result<String, TransportError>;

    /// Spawn the receive loop. It forwards every inbound text event to
    /// `inbound_tx` and stops once the receiver is dropped.
    fn start_intake(self: Arc<Self>, inbound_tx: mpsc::Sender<InboundMessage>) -> JoinHandle<()>;

    async fn send_text(&self, conversation_id: &str, text: &str) -> Result<(), TransportError>;

    /// Best-effort "typing..." indicator.
    async fn send_typing(&self, conversation_id: &str) -> Result<(), TransportError>;
}
