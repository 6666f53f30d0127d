//! Executes storage commands. Loaded tasks and newly stored tasks that fall
//! inside the current window go straight to the cache.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use herald_core::{Command, Failure, Task, TimeRange};
use herald_store::{StoreError, TaskStore};

use super::{forward, CommandRx, FailureTx, TaskTx};
use crate::metrics::PipelineMetrics;

pub struct PersistStage {
    pub tasks: Arc<dyn TaskStore>,
    pub commands: CommandRx,
    pub to_cache: TaskTx,
    pub failures: FailureTx,
    pub metrics: Arc<PipelineMetrics>,
}

impl PersistStage {
    pub async fn run(mut self) {
        while let Some(command) = self.commands.recv().await {
            debug!(command = %command, "executing command");
            self.execute(command).await;
        }
        debug!("persist stage stopped");
    }

    async fn execute(&self, command: Command) {
        match command {
            Command::LoadTask { range } => self.load(range).await,
            Command::ScheduleTask { request, range } => {
                let task = request.to_task();
                match self.tasks.save(&task).await {
                    Ok(()) => self.cache_if_due(task, &range),
                    Err(StoreError::TaskAlreadyActive(key)) => {
                        info!(request_id = task.request_id, key = %key, "task already scheduled");
                        forward("persist", &self.failures, Failure::ScheduleConflict { task });
                    }
                    Err(e) => error!(error = %e, request_id = task.request_id, "failed to save task"),
                }
            }
            Command::ReplaceTask { request, range } => {
                let task = request.to_task();
                match self.tasks.replace(&task).await {
                    Ok(()) => self.cache_if_due(task, &range),
                    Err(StoreError::TaskNotFound(key)) => {
                        info!(request_id = task.request_id, key = %key, "no active task to replace");
                        forward("persist", &self.failures, Failure::ReplaceNotFound { task });
                    }
                    Err(e) => {
                        error!(error = %e, request_id = task.request_id, "failed to replace task")
                    }
                }
            }
            Command::CancelTask { request, .. } => {
                match self.tasks.cancel(request.id, &request.key).await {
                    Ok(()) => debug!(request_id = request.id, key = %request.key, "task canceled"),
                    Err(StoreError::TaskNotFound(key)) => {
                        info!(request_id = request.id, key = %key, "no active task to cancel");
                        forward(
                            "persist",
                            &self.failures,
                            Failure::CancelNotFound {
                                request_id: request.id,
                                key,
                            },
                        );
                    }
                    Err(e) => error!(error = %e, request_id = request.id, "failed to cancel task"),
                }
            }
        }
    }

    async fn load(&self, range: TimeRange) {
        let loaded = match range {
            TimeRange::Empty => {
                warn!("load requested for an empty window");
                return;
            }
            TimeRange::Open { end_exclusive, .. } => self.tasks.load_due_before(end_exclusive).await,
            TimeRange::Closed {
                start,
                end_exclusive,
            } => self.tasks.load_due_between(start, end_exclusive).await,
        };

        match loaded {
            Ok(tasks) => {
                debug!(window = %range, count = tasks.len(), "loaded tasks");
                for task in tasks {
                    PipelineMetrics::incr(&self.metrics.tasks_loaded);
                    forward("persist", &self.to_cache, task);
                }
            }
            Err(e) => error!(error = %e, window = %range, "failed to load tasks"),
        }
    }

    /// A task stored after its window was loaded would otherwise be missed.
    fn cache_if_due(&self, task: Task, range: &TimeRange) {
        if range.precedes_end(task.launch_time) {
            forward("persist", &self.to_cache, task);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDateTime};
    use herald_core::{
        now_utc, CancelRequest, Key, Message, MessageBody, Request, ReplaceRequest,
        ScheduleRequest,
    };
    use herald_store::{MemoryStore, RequestStore};
    use tokio::sync::mpsc;

    struct Harness {
        store: Arc<MemoryStore>,
        commands: mpsc::UnboundedSender<Command>,
        cached: mpsc::UnboundedReceiver<Task>,
        failures: mpsc::UnboundedReceiver<Failure>,
    }

    fn spawn() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let (commands, rx) = mpsc::unbounded_channel();
        let (to_cache, cached) = mpsc::unbounded_channel();
        let (fail_tx, failures) = mpsc::unbounded_channel();
        tokio::spawn(
            PersistStage {
                tasks: store.clone(),
                commands: rx,
                to_cache,
                failures: fail_tx,
                metrics: Arc::new(PipelineMetrics::new()),
            }
            .run(),
        );
        Harness {
            store,
            commands,
            cached,
            failures,
        }
    }

    async fn schedule(store: &MemoryStore, ocid: &str, launch: NaiveDateTime) -> ScheduleRequest {
        let now = now_utc();
        let message = Message {
            body: MessageBody::Schedule {
                ocid: ocid.into(),
                phase: "p".into(),
                launch_time: launch,
                meta_data: "m".into(),
            },
            sent_time: now,
            received_time: now,
        };
        match RequestStore::save(store, &message).await.unwrap() {
            Request::Schedule(r) => r,
            other => panic!("unexpected request: {other:?}"),
        }
    }

    fn window(end: NaiveDateTime) -> TimeRange {
        TimeRange::Closed {
            start: end - Duration::seconds(10),
            end_exclusive: end,
        }
    }

    #[tokio::test]
    async fn schedules_inside_window_are_cached() {
        let mut h = spawn();
        let now = now_utc();
        let soon = schedule(&h.store, "soon", now + Duration::seconds(2)).await;
        let later = schedule(&h.store, "later", now + Duration::hours(1)).await;

        let range = window(now + Duration::seconds(5));
        h.commands
            .send(Command::ScheduleTask { request: later, range })
            .unwrap();
        h.commands
            .send(Command::ScheduleTask { request: soon.clone(), range })
            .unwrap();

        let cached = h.cached.recv().await.unwrap();
        assert_eq!(cached.request_id, soon.id);
        assert_eq!(h.store.task_count().await, 2);
        assert!(h.cached.try_recv().is_err());
    }

    #[tokio::test]
    async fn duplicate_schedule_conflicts() {
        let mut h = spawn();
        let launch = now_utc() + Duration::hours(1);
        let first = schedule(&h.store, "dup", launch).await;
        let second = schedule(&h.store, "dup", launch).await;
        let range = window(now_utc());

        h.commands.send(Command::ScheduleTask { request: first, range }).unwrap();
        h.commands
            .send(Command::ScheduleTask { request: second.clone(), range })
            .unwrap();

        match h.failures.recv().await.unwrap() {
            Failure::ScheduleConflict { task } => assert_eq!(task.request_id, second.id),
            other => panic!("unexpected failure: {other:?}"),
        }
    }

    #[tokio::test]
    async fn replace_and_cancel_without_task_fail() {
        let mut h = spawn();
        let now = now_utc();
        let range = window(now);
        let key = Key::new("missing", "p");

        h.commands
            .send(Command::ReplaceTask {
                request: ReplaceRequest {
                    id: 1,
                    key: key.clone(),
                    new_launch_time: now + Duration::hours(1),
                    meta_data: String::new(),
                    sent_time: now,
                    received_time: now,
                },
                range,
            })
            .unwrap();
        h.commands
            .send(Command::CancelTask {
                request: CancelRequest {
                    id: 2,
                    key: key.clone(),
                    sent_time: now,
                    received_time: now,
                },
                range,
            })
            .unwrap();

        assert!(matches!(
            h.failures.recv().await.unwrap(),
            Failure::ReplaceNotFound { .. }
        ));
        assert_eq!(
            h.failures.recv().await.unwrap(),
            Failure::CancelNotFound { request_id: 2, key }
        );
    }

    #[tokio::test]
    async fn open_window_loads_overdue_tasks() {
        let mut h = spawn();
        let now = now_utc();
        let overdue = schedule(&h.store, "overdue", now - Duration::minutes(5)).await;
        TaskStore::save(&*h.store, &overdue.to_task()).await.unwrap();
        let future = schedule(&h.store, "future", now + Duration::hours(1)).await;
        TaskStore::save(&*h.store, &future.to_task()).await.unwrap();

        h.commands
            .send(Command::LoadTask {
                range: TimeRange::Open {
                    end_exclusive: now + Duration::seconds(5),
                    delay: std::time::Duration::from_secs(3),
                },
            })
            .unwrap();

        assert_eq!(h.cached.recv().await.unwrap().request_id, overdue.id);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(h.cached.try_recv().is_err());
    }
}
