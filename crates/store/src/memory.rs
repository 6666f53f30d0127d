//! In-process store with the same semantics as [`crate::PgStore`].

use async_trait::async_trait;
use chrono::NaiveDateTime;
use tokio::sync::Mutex;

use herald_core::{now_utc, Key, Message, Request, RequestId, Task};

use crate::error::StoreError;
use crate::traits::{RequestStore, TaskStore};

#[derive(Debug, Clone)]
struct TaskRecord {
    task: Task,
    active: bool,
    canceled_time: Option<NaiveDateTime>,
    deactivate_time: Option<NaiveDateTime>,
}

#[derive(Debug, Clone)]
struct RequestRecord {
    request: Request,
    used: bool,
}

#[derive(Debug, Default)]
struct Tables {
    tasks: Vec<TaskRecord>,
    requests: Vec<RequestRecord>,
    next_request_id: RequestId,
    fail_request_saves: bool,
}

impl Tables {
    fn active_index(&self, key: &Key) -> Option<usize> {
        self.tasks
            .iter()
            .position(|r| r.active && &r.task.key == key)
    }

    fn cancel_active(&mut self, key: &Key) -> Result<(), StoreError> {
        let idx = self
            .active_index(key)
            .ok_or_else(|| StoreError::TaskNotFound(key.clone()))?;
        let record = &mut self.tasks[idx];
        record.active = false;
        record.canceled_time = Some(now_utc());
        Ok(())
    }

    fn insert_active(&mut self, task: &Task) -> Result<(), StoreError> {
        if self.active_index(&task.key).is_some() {
            return Err(StoreError::TaskAlreadyActive(task.key.clone()));
        }
        self.tasks.push(TaskRecord {
            task: task.clone(),
            active: true,
            canceled_time: None,
            deactivate_time: None,
        });
        Ok(())
    }

    fn consume(&mut self, request_id: RequestId) -> bool {
        match self
            .requests
            .iter_mut()
            .find(|r| r.request.id() == request_id && !r.used)
        {
            Some(record) => {
                record.used = true;
                true
            }
            None => false,
        }
    }

    fn due<F: Fn(NaiveDateTime) -> bool>(&self, pred: F) -> Vec<Task> {
        let mut due: Vec<Task> = self
            .tasks
            .iter()
            .filter(|r| r.active && pred(r.task.launch_time))
            .map(|r| r.task.clone())
            .collect();
        due.sort_by_key(|t| t.launch_time);
        due
    }
}

/// Mutations on the shared tables happen under one lock, so each call is
/// atomic like a database transaction.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, [`RequestStore::save`] fails with `RequestSave`.
    pub async fn fail_request_saves(&self, fail: bool) {
        self.tables.lock().await.fail_request_saves = fail;
    }

    /// Whether the request exists and has been consumed.
    pub async fn is_used(&self, request_id: RequestId) -> Option<bool> {
        self.tables
            .lock()
            .await
            .requests
            .iter()
            .find(|r| r.request.id() == request_id)
            .map(|r| r.used)
    }

    /// Active tasks, in insertion order.
    pub async fn active_tasks(&self) -> Vec<Task> {
        self.tables
            .lock()
            .await
            .tasks
            .iter()
            .filter(|r| r.active)
            .map(|r| r.task.clone())
            .collect()
    }

    /// Total task rows, active or not.
    pub async fn task_count(&self) -> usize {
        self.tables.lock().await.tasks.len()
    }

    /// Whether the task row created by `request_id` was retired after dispatch.
    pub async fn is_deactivated(&self, request_id: RequestId) -> bool {
        self.tables
            .lock()
            .await
            .tasks
            .iter()
            .any(|r| r.task.request_id == request_id && r.deactivate_time.is_some())
    }

    /// Whether the task row created by `request_id` was cancelled or replaced.
    pub async fn is_canceled(&self, request_id: RequestId) -> bool {
        self.tables
            .lock()
            .await
            .tasks
            .iter()
            .any(|r| r.task.request_id == request_id && r.canceled_time.is_some())
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn load_due_before(&self, end: NaiveDateTime) -> Result<Vec<Task>, StoreError> {
        Ok(self.tables.lock().await.due(|t| t < end))
    }

    async fn load_due_between(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<Task>, StoreError> {
        Ok(self.tables.lock().await.due(|t| start <= t && t < end))
    }

    async fn exists(&self, key: &Key) -> Result<bool, StoreError> {
        Ok(self.tables.lock().await.active_index(key).is_some())
    }

    async fn save(&self, task: &Task) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        tables.insert_active(task)?;
        tables.consume(task.request_id);
        Ok(())
    }

    async fn replace(&self, task: &Task) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        tables.cancel_active(&task.key)?;
        tables.insert_active(task)?;
        tables.consume(task.request_id);
        Ok(())
    }

    async fn cancel(&self, request_id: RequestId, key: &Key) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        tables.cancel_active(key)?;
        tables.consume(request_id);
        Ok(())
    }

    async fn deactivate(&self, key: &Key) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        let idx = tables
            .active_index(key)
            .ok_or_else(|| StoreError::TaskNotFound(key.clone()))?;
        let record = &mut tables.tasks[idx];
        record.active = false;
        record.deactivate_time = Some(now_utc());
        Ok(())
    }
}

#[async_trait]
impl RequestStore for MemoryStore {
    async fn load_unused(&self) -> Result<Vec<Request>, StoreError> {
        Ok(self
            .tables
            .lock()
            .await
            .requests
            .iter()
            .filter(|r| !r.used)
            .map(|r| r.request.clone())
            .collect())
    }

    async fn save(&self, message: &Message) -> Result<Request, StoreError> {
        let mut tables = self.tables.lock().await;
        if tables.fail_request_saves {
            return Err(StoreError::RequestSave("store unavailable".into()));
        }
        tables.next_request_id += 1;
        let request = Request::from_message(tables.next_request_id, message);
        tables.requests.push(RequestRecord {
            request: request.clone(),
            used: false,
        });
        Ok(request)
    }

    async fn mark_used(&self, request_id: RequestId, _key: &Key) -> Result<(), StoreError> {
        if self.tables.lock().await.consume(request_id) {
            Ok(())
        } else {
            Err(StoreError::RequestNotFound(request_id))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use herald_core::MessageBody;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 4, 4)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn schedule_message(ocid: &str, launch: NaiveDateTime) -> Message {
        Message {
            body: MessageBody::Schedule {
                ocid: ocid.into(),
                phase: "p".into(),
                launch_time: launch,
                meta_data: "m".into(),
            },
            sent_time: at(0, 0),
            received_time: at(0, 0),
        }
    }

    async fn saved_task(store: &MemoryStore, ocid: &str, launch: NaiveDateTime) -> Task {
        let request = RequestStore::save(store, &schedule_message(ocid, launch))
            .await
            .unwrap();
        match request {
            Request::Schedule(r) => r.to_task(),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn request_ids_are_sequential_and_replayed_in_order() {
        let store = MemoryStore::new();
        let a = RequestStore::save(&store, &schedule_message("a", at(10, 0))).await.unwrap();
        let b = RequestStore::save(&store, &schedule_message("b", at(9, 0))).await.unwrap();
        assert_eq!((a.id(), b.id()), (1, 2));

        let unused = store.load_unused().await.unwrap();
        assert_eq!(unused.iter().map(Request::id).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[tokio::test]
    async fn save_consumes_request_and_rejects_duplicates() {
        let store = MemoryStore::new();
        let first = saved_task(&store, "a", at(10, 0)).await;
        let second = saved_task(&store, "a", at(11, 0)).await;

        TaskStore::save(&store, &first).await.unwrap();
        assert_eq!(store.is_used(first.request_id).await, Some(true));

        let err = TaskStore::save(&store, &second).await.unwrap_err();
        assert!(matches!(err, StoreError::TaskAlreadyActive(_)));
        assert_eq!(store.is_used(second.request_id).await, Some(false));
        assert_eq!(store.active_tasks().await, vec![first]);
    }

    #[tokio::test]
    async fn load_windows_are_half_open() {
        let store = MemoryStore::new();
        for (ocid, launch) in [("a", at(10, 0)), ("b", at(10, 5)), ("c", at(10, 10))] {
            let task = saved_task(&store, ocid, launch).await;
            TaskStore::save(&store, &task).await.unwrap();
        }

        let before = store.load_due_before(at(10, 5)).await.unwrap();
        assert_eq!(before.len(), 1);
        let between = store.load_due_between(at(10, 5), at(10, 10)).await.unwrap();
        assert_eq!(between.len(), 1);
        assert_eq!(between[0].key.ocid, "b");
    }

    #[tokio::test]
    async fn replace_swaps_active_task() {
        let store = MemoryStore::new();
        let original = saved_task(&store, "a", at(10, 0)).await;
        TaskStore::save(&store, &original).await.unwrap();

        let replacement = saved_task(&store, "a", at(12, 0)).await;
        store.replace(&replacement).await.unwrap();

        assert!(store.is_canceled(original.request_id).await);
        assert_eq!(store.active_tasks().await, vec![replacement.clone()]);
        assert_eq!(store.is_used(replacement.request_id).await, Some(true));
    }

    #[tokio::test]
    async fn replace_and_cancel_require_active_task() {
        let store = MemoryStore::new();
        let task = saved_task(&store, "a", at(10, 0)).await;
        assert!(matches!(store.replace(&task).await, Err(StoreError::TaskNotFound(_))));
        assert!(matches!(
            store.cancel(task.request_id, &task.key).await,
            Err(StoreError::TaskNotFound(_))
        ));
        assert_eq!(store.task_count().await, 0);
        assert_eq!(store.is_used(task.request_id).await, Some(false));
    }

    #[tokio::test]
    async fn deactivate_retires_whatever_is_active_for_the_key() {
        let store = MemoryStore::new();
        let original = saved_task(&store, "a", at(10, 0)).await;
        TaskStore::save(&store, &original).await.unwrap();
        let replacement = saved_task(&store, "a", at(10, 0)).await;
        store.replace(&replacement).await.unwrap();

        store.deactivate(&original.key).await.unwrap();
        assert!(store.is_deactivated(replacement.request_id).await);
        assert!(!store.is_deactivated(original.request_id).await);
        assert!(!store.exists(&original.key).await.unwrap());

        assert!(matches!(
            store.deactivate(&original.key).await,
            Err(StoreError::TaskNotFound(_))
        ));
    }

    #[tokio::test]
    async fn mark_used_flips_once() {
        let store = MemoryStore::new();
        let task = saved_task(&store, "a", at(10, 0)).await;
        store.mark_used(task.request_id, &task.key).await.unwrap();
        assert!(matches!(
            store.mark_used(task.request_id, &task.key).await,
            Err(StoreError::RequestNotFound(_))
        ));
        assert!(matches!(
            store.mark_used(999, &task.key).await,
            Err(StoreError::RequestNotFound(999))
        ));
    }

    #[tokio::test]
    async fn failing_saves() {
        let store = MemoryStore::new();
        store.fail_request_saves(true).await;
        let err = RequestStore::save(&store, &schedule_message("a", at(1, 0)))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::RequestSave(_)));
    }
}
