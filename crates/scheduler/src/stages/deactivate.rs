use std::sync::Arc;

use tracing::{debug, error, warn};

use herald_store::{StoreError, TaskStore};

use super::TaskRx;
use crate::metrics::PipelineMetrics;

/// Retires tasks whose notification has been published.
pub struct DeactivateStage {
    pub tasks: Arc<dyn TaskStore>,
    pub dispatched: TaskRx,
    pub metrics: Arc<PipelineMetrics>,
}

impl DeactivateStage {
    pub async fn run(mut self) {
        while let Some(task) = self.dispatched.recv().await {
            match self.tasks.deactivate(&task.key).await {
                Ok(()) => {
                    PipelineMetrics::incr(&self.metrics.deactivations);
                    debug!(request_id = task.request_id, key = %task.key, "task deactivated");
                }
                Err(StoreError::TaskNotFound(key)) => {
                    warn!(request_id = task.request_id, key = %key, "task was no longer active")
                }
                Err(e) => error!(error = %e, request_id = task.request_id, "failed to deactivate task"),
            }
        }
        debug!("deactivate stage stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_core::{now_utc, Key, Task};
    use herald_store::MemoryStore;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn stale_instance_retires_its_replacement() {
        let store = Arc::new(MemoryStore::new());
        let original = Task {
            request_id: 1,
            key: Key::new("o", "p"),
            launch_time: now_utc(),
            meta_data: "old".into(),
        };
        TaskStore::save(&*store, &original).await.unwrap();
        let replacement = Task {
            request_id: 2,
            meta_data: "new".into(),
            ..original.clone()
        };
        store.replace(&replacement).await.unwrap();

        let (tx, dispatched) = mpsc::unbounded_channel();
        let metrics = Arc::new(PipelineMetrics::new());
        let stage = DeactivateStage {
            tasks: store.clone(),
            dispatched,
            metrics: metrics.clone(),
        };
        // The cache released the pre-replace instance.
        tx.send(original.clone()).unwrap();
        tx.send(original).unwrap();
        drop(tx);
        stage.run().await;

        assert!(store.is_deactivated(2).await);
        assert!(store.active_tasks().await.is_empty());
        assert_eq!(metrics.snapshot().deactivations, 1);
    }
}
