//! The inbound side of the queue pair.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::QueueError;

/// One delivery from the inbound request queue, body still undecoded.
#[derive(Debug, Clone)]
pub struct QueueMessage {
    pub id: String,
    pub body: String,
    pub receipt_handle: String,
    /// Producer send time; becomes the request's sent time.
    pub sent_at: DateTime<Utc>,
}

/// Reachability of the inbound queue, reported on `/health`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStatus {
    pub reachable: bool,
    /// Approximate number of requests still waiting.
    pub depth: Option<u64>,
}

/// Request source with manual commit. A delivery is redelivered unless it is
/// acked, and ingestion acks only after the request has been routed.
#[async_trait]
pub trait QueueConsumer: Send + Sync {
    /// Up to `max_messages` deliveries; empty when the queue is idle.
    async fn poll_batch(&self, max_messages: u32) -> Result<Vec<QueueMessage>, QueueError>;

    async fn ack(&self, receipt_handle: &str) -> Result<(), QueueError>;

    async fn status(&self) -> Result<QueueStatus, QueueError>;
}
