use async_trait::async_trait;
use chrono::NaiveDateTime;

use herald_core::{Key, Message, Request, RequestId, Task};

use crate::error::StoreError;

/// Durable task storage. Every mutation is its own transaction.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Active tasks launching before `end`, overdue ones included.
    async fn load_due_before(&self, end: NaiveDateTime) -> Result<Vec<Task>, StoreError>;

    /// Active tasks launching in `[start, end)`.
    async fn load_due_between(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<Task>, StoreError>;

    async fn exists(&self, key: &Key) -> Result<bool, StoreError>;

    /// Insert an active task and consume its request.
    /// Fails with [`StoreError::TaskAlreadyActive`] if the key is taken.
    async fn save(&self, task: &Task) -> Result<(), StoreError>;

    /// Cancel the active task for the key, insert `task` in its place and
    /// consume the request. Fails with [`StoreError::TaskNotFound`].
    async fn replace(&self, task: &Task) -> Result<(), StoreError>;

    /// Cancel the active task for the key and consume the request.
    /// Fails with [`StoreError::TaskNotFound`].
    async fn cancel(&self, request_id: RequestId, key: &Key) -> Result<(), StoreError>;

    /// Retire the active task for the key after its notification went out.
    /// Fails with [`StoreError::TaskNotFound`].
    async fn deactivate(&self, key: &Key) -> Result<(), StoreError>;
}

/// Durable request log.
#[async_trait]
pub trait RequestStore: Send + Sync {
    /// Requests not yet marked used, in id order.
    async fn load_unused(&self) -> Result<Vec<Request>, StoreError>;

    /// Persist a received message; the returned request carries its id.
    async fn save(&self, message: &Message) -> Result<Request, StoreError>;

    /// Flip the used flag. Fails with [`StoreError::RequestNotFound`] when
    /// the request is missing or already used.
    async fn mark_used(&self, request_id: RequestId, key: &Key) -> Result<(), StoreError>;
}
