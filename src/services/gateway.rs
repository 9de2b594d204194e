//! Messaging gateway seam. The core never touches platform transport details;
//! it asks the gateway to deliver, to notify, and for the next inbound event.
//! Correlation keys are the message ids the gateway returns, never values the
//! core makes up.

use crate::error::{DeliverError, NotifyError};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

/// One inbound event from the chat platform.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    /// A direct message from a citizen: free text and/or a photo reference.
    UserMessage {
        user_id: i64,
        display_name: String,
        text: Option<String>,
        photo: Option<String>,
    },
    /// An explicit menu selection by a citizen (category pick, skip-photo).
    UserSelection { user_id: i64, data: String },
    /// A staff member replied to an earlier message in a channel.
    ChannelReply {
        channel_id: i64,
        replied_to: i64,
        body: String,
        responder_id: i64,
        responder_label: String,
    },
    /// A non-reply command posted in a channel.
    ChannelCommand {
        channel_id: i64,
        sender_id: i64,
        command: String,
    },
}

#[async_trait::async_trait]
pub trait MessagingGateway: Send + Sync {
    /// Posts a notice to a channel, returning the platform message id.
    async fn deliver(
        &self,
        channel_id: i64,
        text: &str,
        image: Option<&str>,
    ) -> Result<i64, DeliverError>;

    /// Posts a file to a channel.
    async fn deliver_document(
        &self,
        channel_id: i64,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<i64, DeliverError>;

    /// Sends a direct message to a citizen.
    async fn notify_user(&self, user_id: i64, text: &str) -> Result<(), NotifyError>;

    /// Next inbound event; `None` means the stream is closed.
    async fn next_event(&self) -> Option<GatewayEvent>;
}

/// No gateway call may block indefinitely; a timeout counts as failure.
pub async fn deliver_with_timeout(
    gateway: &dyn MessagingGateway,
    timeout: Duration,
    channel_id: i64,
    text: &str,
    image: Option<&str>,
) -> Result<i64, DeliverError> {
    match tokio::time::timeout(timeout, gateway.deliver(channel_id, text, image)).await {
        Ok(result) => result,
        Err(_) => Err(DeliverError::Timeout(timeout)),
    }
}

pub async fn notify_with_timeout(
    gateway: &dyn MessagingGateway,
    timeout: Duration,
    user_id: i64,
    text: &str,
) -> Result<(), NotifyError> {
    match tokio::time::timeout(timeout, gateway.notify_user(user_id, text)).await {
        Ok(result) => result,
        Err(_) => Err(NotifyError::Other(format!(
            "gateway timed out after {timeout:?}"
        ))),
    }
}

/// Transportless gateway for local operation: logs every outbound message and
/// allocates sequential message ids.
pub struct DryRunGateway {
    next_message_id: AtomicI64,
}

impl DryRunGateway {
    pub fn new() -> Self {
        Self {
            next_message_id: AtomicI64::new(1),
        }
    }
}

impl Default for DryRunGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl MessagingGateway for DryRunGateway {
    async fn deliver(
        &self,
        channel_id: i64,
        text: &str,
        image: Option<&str>,
    ) -> Result<i64, DeliverError> {
        let message_id = self.next_message_id.fetch_add(1, Ordering::SeqCst);
        tracing::info!(channel_id, message_id, image, text, "dry-run: deliver");
        Ok(message_id)
    }

    async fn deliver_document(
        &self,
        channel_id: i64,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<i64, DeliverError> {
        let message_id = self.next_message_id.fetch_add(1, Ordering::SeqCst);
        tracing::info!(
            channel_id,
            message_id,
            filename,
            size = bytes.len(),
            "dry-run: deliver document"
        );
        Ok(message_id)
    }

    async fn notify_user(&self, user_id: i64, text: &str) -> Result<(), NotifyError> {
        tracing::info!(user_id, text, "dry-run: notify user");
        Ok(())
    }

    async fn next_event(&self) -> Option<GatewayEvent> {
        // no transport, no events; park until shutdown
        std::future::pending().await
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    struct StalledGateway;

    #[async_trait::async_trait]
    impl MessagingGateway for StalledGateway {
        async fn deliver(&self, _: i64, _: &str, _: Option<&str>) -> Result<i64, DeliverError> {
            std::future::pending().await
        }

        async fn deliver_document(
            &self,
            _: i64,
            _: &str,
            _: Vec<u8>,
        ) -> Result<i64, DeliverError> {
            std::future::pending().await
        }

        async fn notify_user(&self, _: i64, _: &str) -> Result<(), NotifyError> {
            std::future::pending().await
        }

        async fn next_event(&self) -> Option<GatewayEvent> {
            None
        }
    }

    #[tokio::test]
    async fn stalled_delivery_fails_with_timeout() {
        let timeout = Duration::from_millis(10);
        let result = deliver_with_timeout(&StalledGateway, timeout, -1, "hello", None).await;
        assert_eq!(result, Err(DeliverError::Timeout(timeout)));
    }

    #[tokio::test]
    async fn stalled_notification_fails_as_other() {
        let result =
            notify_with_timeout(&StalledGateway, Duration::from_millis(10), 1, "hello").await;
        assert!(matches!(result, Err(NotifyError::Other(_))));
    }

    #[tokio::test]
    async fn dry_run_allocates_increasing_message_ids() {
        let gateway = DryRunGateway::new();
        let first = gateway.deliver(-1, "a", None).await.unwrap();
        let second = gateway.deliver(-1, "b", None).await.unwrap();
        assert!(second > first);
    }
}
