use std::sync::Arc;

use tracing::{debug, error, warn};

use herald_store::{RequestStore, StoreError};

use super::MarkRx;
use crate::metrics::PipelineMetrics;

/// Consumes requests that ended in a terminal failure so startup replay
/// skips them.
pub struct MarkStage {
    pub requests: Arc<dyn RequestStore>,
    pub marks: MarkRx,
    pub metrics: Arc<PipelineMetrics>,
}

impl MarkStage {
    pub async fn run(mut self) {
        while let Some(mark) = self.marks.recv().await {
            match self.requests.mark_used(mark.request_id, &mark.key).await {
                Ok(()) => {
                    PipelineMetrics::incr(&self.metrics.requests_marked);
                    debug!(request_id = mark.request_id, key = %mark.key, "request marked used");
                }
                Err(StoreError::RequestNotFound(id)) => {
                    warn!(request_id = id, key = %mark.key, "request missing or already used")
                }
                Err(e) => error!(error = %e, request_id = mark.request_id, "failed to mark request"),
            }
        }
        debug!("mark stage stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_core::{now_utc, Key, MarkRequest, Message, MessageBody};
    use herald_store::MemoryStore;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn marks_request_used() {
        let store = Arc::new(MemoryStore::new());
        let now = now_utc();
        let request = RequestStore::save(
            &*store,
            &Message {
                body: MessageBody::Cancel {
                    ocid: "o".into(),
                    phase: "p".into(),
                },
                sent_time: now,
                received_time: now,
            },
        )
        .await
        .unwrap();

        let (tx, marks) = mpsc::unbounded_channel();
        let metrics = Arc::new(PipelineMetrics::new());
        let stage = MarkStage {
            requests: store.clone(),
            marks,
            metrics: metrics.clone(),
        };
        let mark = MarkRequest {
            request_id: request.id(),
            key: Key::new("o", "p"),
        };
        tx.send(mark.clone()).unwrap();
        tx.send(mark).unwrap();
        drop(tx);
        stage.run().await;

        assert_eq!(store.is_used(request.id()).await, Some(true));
        assert!(store.load_unused().await.unwrap().is_empty());
        assert_eq!(metrics.snapshot().requests_marked, 1);
    }
}
