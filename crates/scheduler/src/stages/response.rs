//! Publishes notifications and error envelopes to the outbound queue.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use herald_core::{Failure, Response, Task};
use herald_queue::QueuePublisher;

use super::{forward, FailureRx, MarkTx, TaskRx, TaskTx};
use crate::metrics::PipelineMetrics;

pub struct ResponseStage {
    pub publisher: Arc<dyn QueuePublisher>,
    pub tasks: TaskRx,
    pub failures: FailureRx,
    pub to_deactivate: TaskTx,
    pub to_mark: MarkTx,
    pub metrics: Arc<PipelineMetrics>,
}

impl ResponseStage {
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                Some(task) = self.tasks.recv() => self.notify(task).await,
                Some(failure) = self.failures.recv() => self.report(failure).await,
                else => break,
            }
        }
        debug!("response stage stopped");
    }

    async fn publish(&self, response: &Response) -> bool {
        let body = match serde_json::to_string(response) {
            Ok(body) => body,
            Err(e) => {
                error!(error = %e, "failed to encode response");
                return false;
            }
        };
        match self.publisher.publish(&body).await {
            Ok(()) => true,
            Err(e) => {
                PipelineMetrics::incr(&self.metrics.publish_failures);
                warn!(error = %e, "failed to publish response");
                false
            }
        }
    }

    /// A task stays active until its notification is out, so a failed publish
    /// is retried by the next load.
    async fn notify(&self, task: Task) {
        if self.publish(&Response::from(&task)).await {
            PipelineMetrics::incr(&self.metrics.notifications_published);
            info!(request_id = task.request_id, key = %task.key, launch_time = %task.launch_time, "task launched");
            forward("response", &self.to_deactivate, task);
        }
    }

    async fn report(&self, failure: Failure) {
        if self.publish(&Response::from(&failure)).await {
            PipelineMetrics::incr(&self.metrics.errors_published);
            debug!(code = failure.code(), "published error response");
        }
        if let Some(mark) = failure.terminal_request() {
            forward("response", &self.to_mark, mark);
        }
    }
}
