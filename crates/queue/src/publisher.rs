use async_trait::async_trait;

use crate::error::QueueError;

/// Sends outbound envelopes to the response queue.
#[async_trait]
pub trait QueuePublisher: Send + Sync {
    /// Publish one JSON body. Returns once the provider has accepted it.
    async fn publish(&self, body: &str) -> Result<(), QueueError>;
}
