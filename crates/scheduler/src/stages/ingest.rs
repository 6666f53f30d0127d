//! Reads the inbound queue, persists each message as a request and routes
//! it onwards. Startup replays unused requests before polling.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use herald_core::{Failure, Request};
use herald_queue::{parse_message, QueueConsumer, QueueMessage};
use herald_store::RequestStore;

use super::{forward, FailureTx, RequestTx};
use crate::metrics::PipelineMetrics;

/// Upper bound for the poll-error backoff.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

pub struct IngestStage {
    pub consumer: Arc<dyn QueueConsumer>,
    pub requests: Arc<dyn RequestStore>,
    pub batch_size: u32,
    pub poll_interval: Duration,
    pub to_command: RequestTx,
    pub failures: FailureTx,
    pub metrics: Arc<PipelineMetrics>,
}

impl IngestStage {
    pub async fn run(self) {
        self.replay_unused().await;

        let mut consecutive_errors: u32 = 0;
        loop {
            if self.to_command.is_closed() {
                info!("command stage closed, ingest stopping");
                break;
            }
            match self.consumer.poll_batch(self.batch_size).await {
                Ok(batch) if batch.is_empty() => {
                    consecutive_errors = 0;
                    tokio::time::sleep(self.poll_interval).await;
                }
                Ok(batch) => {
                    consecutive_errors = 0;
                    debug!(count = batch.len(), "received inbound batch");
                    for message in batch {
                        self.handle(message).await;
                    }
                }
                Err(e) => {
                    consecutive_errors += 1;
                    let backoff = self
                        .poll_interval
                        .saturating_mul(2u32.pow(consecutive_errors.min(5)))
                        .min(MAX_BACKOFF);
                    warn!(
                        error = %e,
                        consecutive_errors,
                        backoff_ms = backoff.as_millis() as u64,
                        "inbound poll failed"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    /// Resubmit every request a previous run left unused, in id order.
    async fn replay_unused(&self) {
        match self.requests.load_unused().await {
            Ok(pending) => {
                if !pending.is_empty() {
                    info!(count = pending.len(), "replaying unused requests");
                }
                for request in pending {
                    PipelineMetrics::incr(&self.metrics.requests_replayed);
                    self.route(request);
                }
            }
            Err(e) => error!(error = %e, "failed to load unused requests"),
        }
    }

    async fn handle(&self, message: QueueMessage) {
        PipelineMetrics::incr(&self.metrics.requests_received);

        match parse_message(&message) {
            Ok(parsed) => match self.requests.save(&parsed).await {
                Ok(request) => self.route(request),
                Err(e) => {
                    warn!(error = %e, message_id = %message.id, "failed to save request");
                    forward("ingest", &self.failures, Failure::RequestSave { message: parsed });
                }
            },
            Err(e) => {
                PipelineMetrics::incr(&self.metrics.parse_failures);
                warn!(error = %e, message_id = %message.id, "invalid inbound payload");
                forward(
                    "ingest",
                    &self.failures,
                    Failure::InvalidPayload {
                        payload: message.body.clone(),
                    },
                );
            }
        }

        // Every delivery is settled here; failures are reported downstream.
        if let Err(e) = self.consumer.ack(&message.receipt_handle).await {
            warn!(error = %e, message_id = %message.id, "failed to ack inbound message");
        }
    }

    fn route(&self, request: Request) {
        if request.is_expired() {
            info!(
                request_id = request.id(),
                key = %request.key(),
                action = request.action(),
                "request expired before arrival"
            );
            forward("ingest", &self.failures, Failure::RequestExpired { request });
        } else {
            forward("ingest", &self.to_command, request);
        }
    }
}
