use crate::blockchain::provider::ChainTable;
use crate::models::Notification;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("notification sink closed")]
    Closed,
}

/// Consumer of finished notifications. Rendering and delivery retries are the
/// sink's business.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, notification: Notification) -> Result<(), SinkError>;
}

/// Hands finished notifications to the sink, unchanged.
pub struct NotificationAssembler {
    sink: Arc<dyn NotificationSink>,
}

impl NotificationAssembler {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self { sink }
    }

    pub async fn finish(&self, notification: Notification) -> Result<(), SinkError> {
        debug!(
            chain = %notification.chain_key,
            user_id = notification.user_id,
            tx = %notification.tx_hash,
            "Notification ready"
        );
        self.sink.deliver(notification).await
    }
}

/// Emits each notification as a JSON log event with its explorer link.
pub struct LogSink {
    chains: ChainTable,
}

impl LogSink {
    pub fn new(chains: ChainTable) -> Self {
        Self { chains }
    }
}

#[async_trait]
impl NotificationSink for LogSink {
    async fn deliver(&self, notification: Notification) -> Result<(), SinkError> {
        if notification.is_content_free() {
            debug!(tx = %notification.tx_hash, "Nothing to report, dropping notification");
            return Ok(());
        }

        let link = self
            .chains
            .get(&notification.chain_key)
            .map(|provider| provider.scan_tx_link(&notification.tx_hash))
            .unwrap_or_default();

        match serde_json::to_string(&notification) {
            Ok(body) => info!(
                chain = %notification.chain_key,
                user_id = notification.user_id,
                link = %link,
                "Notification: {}", body
            ),
            Err(e) => warn!(tx = %notification.tx_hash, "Failed to serialize notification: {}", e),
        }
        Ok(())
    }
}

/// Forwards notifications into an mpsc channel.
pub struct ChannelSink {
    sender: mpsc::Sender<Notification>,
}

impl ChannelSink {
    pub fn new(sender: mpsc::Sender<Notification>) -> Self {
        Self { sender }
    }

    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Notification>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self::new(sender), receiver)
    }
}

#[async_trait]
impl NotificationSink for ChannelSink {
    async fn deliver(&self, notification: Notification) -> Result<(), SinkError> {
        self.sender
            .send(notification)
            .await
            .map_err(|_| SinkError::Closed)
    }
}
