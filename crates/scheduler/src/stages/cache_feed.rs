//! Buffers near-term tasks and releases each due bucket as a batch on the
//! cache ticker.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace};

use super::{forward, BatchTx, TaskRx};
use crate::cache::TaskCache;
use crate::metrics::PipelineMetrics;
use crate::ticker::Ticker;

pub struct CacheFeedStage {
    pub ticker: Ticker,
    pub tasks: TaskRx,
    pub to_filter: BatchTx,
    pub metrics: Arc<PipelineMetrics>,
}

impl CacheFeedStage {
    pub async fn run(mut self) {
        let mut cache = TaskCache::new();
        let (mut ticks, ticker_handle) = self.ticker.start(Duration::ZERO);

        loop {
            tokio::select! {
                Some(task) = self.tasks.recv() => {
                    let (request_id, key) = (task.request_id, task.key.clone());
                    if cache.push(task) {
                        PipelineMetrics::incr(&self.metrics.tasks_cached);
                    } else {
                        trace!(request_id, key = %key, "bucket already holds key");
                    }
                }
                Some(now) = ticks.recv() => {
                    for (launch_time, bucket) in cache.poll(now) {
                        debug!(launch_time = %launch_time, count = bucket.len(), "releasing due tasks");
                        if !forward("cache", &self.to_filter, bucket) {
                            break;
                        }
                    }
                }
                else => break,
            }
            self.metrics
                .cache_size
                .store(cache.len() as u64, Ordering::Relaxed);
            if self.to_filter.is_closed() {
                break;
            }
        }

        ticker_handle.abort();
        debug!(remaining = cache.len(), "cache stage stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use herald_core::{now_utc, Key, Task};
    use tokio::sync::mpsc;

    fn task(request_id: i64, ocid: &str, launch: chrono::NaiveDateTime) -> Task {
        Task {
            request_id,
            key: Key::new(ocid, "p"),
            launch_time: launch,
            meta_data: String::new(),
        }
    }

    #[tokio::test]
    async fn releases_due_buckets_only() {
        let (task_tx, tasks) = mpsc::unbounded_channel();
        let (to_filter, mut batches) = mpsc::unbounded_channel();
        let metrics = Arc::new(PipelineMetrics::new());
        tokio::spawn(
            CacheFeedStage {
                ticker: Ticker::new("cache", Duration::from_millis(20)),
                tasks,
                to_filter,
                metrics: metrics.clone(),
            }
            .run(),
        );

        let now = now_utc();
        let past = now - ChronoDuration::seconds(1);
        task_tx.send(task(1, "a", past)).unwrap();
        task_tx.send(task(2, "a", past)).unwrap();
        task_tx.send(task(3, "b", past)).unwrap();
        task_tx.send(task(4, "c", now + ChronoDuration::hours(1))).unwrap();

        let batch = batches.recv().await.unwrap();
        let ids: Vec<i64> = batch.iter().map(|t| t.request_id).collect();
        assert_eq!(ids, vec![1, 3]);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(batches.try_recv().is_err());
        assert_eq!(metrics.snapshot().cache_size, 1);
    }
}
