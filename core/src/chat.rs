use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("failed to write to the chat gateway: {0}")]
    Transport(String),
    #[error("chat gateway rejected the message ({code}): {message}")]
    Rejected { code: i32, message: String },
    #[error("chat gateway closed before acknowledging the message")]
    Closed,
}

/// Outbound side of the chat connection.
#[async_trait]
pub trait ChatChannel: Send + Sync {
    /// Post `text` to `channel_id`. Single attempt, no retry.
    async fn send(&self, channel_id: &str, text: &str) -> Result<(), DeliveryError>;
}
