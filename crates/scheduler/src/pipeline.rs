//! Wires the stages together and owns their tasks.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use herald_core::config::SchedulerConfig;
use herald_queue::{QueueConsumer, QueuePublisher};
use herald_store::{RequestStore, TaskStore};

use crate::metrics::PipelineMetrics;
use crate::stages::{
    CacheFeedStage, CommandStage, DeactivateStage, FilterStage, IngestStage, MarkStage,
    PersistStage, ResponseStage,
};
use crate::ticker::Ticker;
use crate::window::{TimeWindow, WindowError};

/// External collaborators of the pipeline.
#[derive(Clone)]
pub struct PipelineDeps {
    pub task_store: Arc<dyn TaskStore>,
    pub request_store: Arc<dyn RequestStore>,
    pub consumer: Arc<dyn QueueConsumer>,
    pub publisher: Arc<dyn QueuePublisher>,
}

pub struct Pipeline {
    config: SchedulerConfig,
    deps: PipelineDeps,
    batch_size: u32,
    poll_interval: Duration,
    metrics: Arc<PipelineMetrics>,
}

impl Pipeline {
    pub fn new(config: SchedulerConfig, deps: PipelineDeps) -> Self {
        Self {
            config,
            deps,
            batch_size: 10,
            poll_interval: Duration::from_millis(100),
            metrics: Arc::new(PipelineMetrics::new()),
        }
    }

    /// Maximum messages fetched per inbound poll.
    pub fn batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Pause after an empty inbound poll.
    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Share an existing metrics registry, e.g. with the HTTP server.
    pub fn metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Start every stage. Consumers are spawned before their producers so
    /// nothing is emitted into a stage that is not yet running; ingestion,
    /// which replays unused requests, goes last. Fails before anything is
    /// spawned if the window intervals are out of range.
    pub fn spawn(self) -> Result<PipelineHandle, WindowError> {
        let Self {
            config,
            deps,
            batch_size,
            poll_interval,
            metrics,
        } = self;
        let window = TimeWindow::from_config(&config)?;

        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (cache_tx, cache_rx) = mpsc::unbounded_channel();
        let (batch_tx, batch_rx) = mpsc::unbounded_channel();
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        let (failure_tx, failure_rx) = mpsc::unbounded_channel();
        let (deactivate_tx, deactivate_rx) = mpsc::unbounded_channel();
        let (mark_tx, mark_rx) = mpsc::unbounded_channel();

        let mut stages = Vec::with_capacity(8);
        let mut start = |name: &'static str, handle: JoinHandle<()>| {
            info!(stage = name, "stage started");
            stages.push((name, handle));
        };

        start(
            "deactivate",
            tokio::spawn(
                DeactivateStage {
                    tasks: deps.task_store.clone(),
                    dispatched: deactivate_rx,
                    metrics: metrics.clone(),
                }
                .run(),
            ),
        );
        start(
            "mark",
            tokio::spawn(
                MarkStage {
                    requests: deps.request_store.clone(),
                    marks: mark_rx,
                    metrics: metrics.clone(),
                }
                .run(),
            ),
        );
        start(
            "response",
            tokio::spawn(
                ResponseStage {
                    publisher: deps.publisher.clone(),
                    tasks: notify_rx,
                    failures: failure_rx,
                    to_deactivate: deactivate_tx,
                    to_mark: mark_tx,
                    metrics: metrics.clone(),
                }
                .run(),
            ),
        );
        start(
            "filter",
            tokio::spawn(
                FilterStage {
                    tasks: deps.task_store.clone(),
                    batches: batch_rx,
                    to_response: notify_tx,
                    metrics: metrics.clone(),
                }
                .run(),
            ),
        );
        start(
            "cache",
            tokio::spawn(
                CacheFeedStage {
                    ticker: Ticker::new("cache", config.cache_poll_interval()),
                    tasks: cache_rx,
                    to_filter: batch_tx,
                    metrics: metrics.clone(),
                }
                .run(),
            ),
        );
        start(
            "persist",
            tokio::spawn(
                PersistStage {
                    tasks: deps.task_store.clone(),
                    commands: command_rx,
                    to_cache: cache_tx,
                    failures: failure_tx.clone(),
                    metrics: metrics.clone(),
                }
                .run(),
            ),
        );
        start(
            "command",
            tokio::spawn(
                CommandStage {
                    window,
                    ticker: Ticker::new("window", config.repeat_interval()),
                    requests: request_rx,
                    to_persist: command_tx,
                    metrics: metrics.clone(),
                }
                .run(),
            ),
        );
        start(
            "ingest",
            tokio::spawn(
                IngestStage {
                    consumer: deps.consumer.clone(),
                    requests: deps.request_store.clone(),
                    batch_size,
                    poll_interval,
                    to_command: request_tx,
                    failures: failure_tx,
                    metrics: metrics.clone(),
                }
                .run(),
            ),
        );

        Ok(PipelineHandle { stages, metrics })
    }
}

/// Running pipeline.
pub struct PipelineHandle {
    stages: Vec<(&'static str, JoinHandle<()>)>,
    metrics: Arc<PipelineMetrics>,
}

impl PipelineHandle {
    pub fn metrics(&self) -> Arc<PipelineMetrics> {
        self.metrics.clone()
    }

    /// Stop every stage, producers first. Buffered work is dropped; anything
    /// not yet persisted as consumed is picked up again on the next start.
    pub async fn shutdown(self) {
        for (name, handle) in self.stages.into_iter().rev() {
            handle.abort();
            let _ = handle.await;
            info!(stage = name, "stage stopped");
        }
    }
}
