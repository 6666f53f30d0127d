//! In-process queue pair for local runs and tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::consumer::{QueueConsumer, QueueMessage, QueueStatus};
use crate::error::QueueError;
use crate::publisher::QueuePublisher;

#[derive(Debug, Default)]
struct QueueState {
    ready: VecDeque<QueueMessage>,
    in_flight: HashMap<String, QueueMessage>,
    acked: Vec<String>,
}

/// Manual-commit in-memory consumer. Polled messages stay in flight until
/// acked.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    state: Mutex<QueueState>,
    next_id: AtomicU64,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a body sent now.
    pub async fn push(&self, body: impl Into<String>) {
        self.push_sent_at(body, Utc::now()).await;
    }

    /// Enqueue a body with an explicit producer send time.
    pub async fn push_sent_at(&self, body: impl Into<String>, sent_at: DateTime<Utc>) {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        let message = QueueMessage {
            id: format!("mem-{n}"),
            body: body.into(),
            receipt_handle: format!("receipt-{n}"),
            sent_at,
        };
        self.state.lock().await.ready.push_back(message);
    }

    /// Ids of acked messages, in ack order.
    pub async fn acked(&self) -> Vec<String> {
        self.state.lock().await.acked.clone()
    }

    /// Messages waiting for delivery.
    pub async fn pending(&self) -> usize {
        self.state.lock().await.ready.len()
    }

    pub async fn in_flight(&self) -> usize {
        self.state.lock().await.in_flight.len()
    }
}

#[async_trait]
impl QueueConsumer for MemoryQueue {
    async fn poll_batch(&self, max_messages: u32) -> Result<Vec<QueueMessage>, QueueError> {
        let mut state = self.state.lock().await;
        let take = (max_messages as usize).min(state.ready.len());
        let batch: Vec<QueueMessage> = state.ready.drain(..take).collect();
        for message in &batch {
            state
                .in_flight
                .insert(message.receipt_handle.clone(), message.clone());
        }
        Ok(batch)
    }

    async fn ack(&self, receipt_handle: &str) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        let message = state
            .in_flight
            .remove(receipt_handle)
            .ok_or_else(|| QueueError::Ack(format!("unknown receipt {receipt_handle}")))?;
        state.acked.push(message.id);
        Ok(())
    }

    async fn status(&self) -> Result<QueueStatus, QueueError> {
        Ok(QueueStatus {
            reachable: true,
            depth: Some(self.pending().await as u64),
        })
    }
}

/// Records published bodies. Can be switched into a failing mode.
#[derive(Debug, Default)]
pub struct MemoryPublisher {
    published: Mutex<Vec<String>>,
    failing: AtomicBool,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn published(&self) -> Vec<String> {
        self.published.lock().await.clone()
    }

    /// While set, every publish fails with [`QueueError::Publish`].
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl QueuePublisher for MemoryPublisher {
    async fn publish(&self, body: &str) -> Result<(), QueueError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(QueueError::Publish("publisher unavailable".into()));
        }
        self.published.lock().await.push(body.to_string());
        Ok(())
    }
}
