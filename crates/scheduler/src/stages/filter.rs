//! Drops released tasks whose key is no longer active.

use std::sync::Arc;

use tracing::{debug, error};

use herald_store::TaskStore;

use super::{forward, BatchRx, TaskTx};
use crate::metrics::PipelineMetrics;

pub struct FilterStage {
    pub tasks: Arc<dyn TaskStore>,
    pub batches: BatchRx,
    pub to_response: TaskTx,
    pub metrics: Arc<PipelineMetrics>,
}

impl FilterStage {
    pub async fn run(mut self) {
        while let Some(batch) = self.batches.recv().await {
            for task in batch {
                match self.tasks.exists(&task.key).await {
                    Ok(true) => {
                        PipelineMetrics::incr(&self.metrics.tasks_dispatched);
                        forward("filter", &self.to_response, task);
                    }
                    Ok(false) => {
                        PipelineMetrics::incr(&self.metrics.tasks_filtered_out);
                        debug!(request_id = task.request_id, key = %task.key, "task no longer active");
                    }
                    Err(e) => {
                        error!(error = %e, request_id = task.request_id, key = %task.key, "existence check failed, dropping task")
                    }
                }
            }
        }
        debug!("filter stage stopped");
    }
}
