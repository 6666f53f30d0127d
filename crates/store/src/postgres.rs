//! PostgreSQL backend for [`TaskStore`] and [`RequestStore`].

use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::{PgConnection, PgPool};
use tracing::{debug, error};

use herald_core::{
    now_utc, CancelRequest, Key, Message, ReplaceRequest, Request, RequestId, ScheduleRequest, Task,
};

use crate::error::StoreError;
use crate::traits::{RequestStore, TaskStore};

/// Postgres-backed store. Cheap to clone; shares the pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// ── Row types ─────────────────────────────────────────────────

#[derive(Debug, sqlx::FromRow)]
struct TaskRow {
    request_id: i64,
    ocid: String,
    phase: String,
    launch_time: NaiveDateTime,
    meta_data: String,
}

impl From<TaskRow> for Task {
    fn from(row: TaskRow) -> Self {
        Task {
            request_id: row.request_id,
            key: Key::new(row.ocid, row.phase),
            launch_time: row.launch_time,
            meta_data: row.meta_data,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct RequestRow {
    id: i64,
    action: String,
    ocid: String,
    phase: String,
    launch_time: Option<NaiveDateTime>,
    meta_data: Option<String>,
    sent_time: NaiveDateTime,
    received_time: NaiveDateTime,
}

impl TryFrom<RequestRow> for Request {
    type Error = StoreError;

    fn try_from(row: RequestRow) -> Result<Self, Self::Error> {
        let id = row.id;
        let missing = |field: &str| StoreError::Decode(format!("request {id}: missing {field}"));
        let key = Key::new(row.ocid, row.phase);
        match row.action.as_str() {
            "SCHEDULE" => Ok(Request::Schedule(ScheduleRequest {
                id,
                key,
                launch_time: row.launch_time.ok_or_else(|| missing("launch_time"))?,
                meta_data: row.meta_data.ok_or_else(|| missing("meta_data"))?,
                sent_time: row.sent_time,
                received_time: row.received_time,
            })),
            "REPLACE" => Ok(Request::Replace(ReplaceRequest {
                id,
                key,
                new_launch_time: row.launch_time.ok_or_else(|| missing("launch_time"))?,
                meta_data: row.meta_data.ok_or_else(|| missing("meta_data"))?,
                sent_time: row.sent_time,
                received_time: row.received_time,
            })),
            "CANCEL" => Ok(Request::Cancel(CancelRequest {
                id,
                key,
                sent_time: row.sent_time,
                received_time: row.received_time,
            })),
            other => Err(StoreError::Decode(format!("request {id}: unknown action '{other}'"))),
        }
    }
}

// ── Statement helpers (run inside a transaction) ──────────────

fn map_unique_violation(e: sqlx::Error, key: &Key) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e {
        if db_err.code().as_deref() == Some("23505") {
            return StoreError::TaskAlreadyActive(key.clone());
        }
    }
    error!(key = %key, "task store database error: {}", e);
    StoreError::Database(e)
}

async fn insert_task(conn: &mut PgConnection, task: &Task) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO tasks (request_id, ocid, phase, launch_time, meta_data, active, created_time)
         VALUES ($1, $2, $3, $4, $5, TRUE, $6)",
    )
    .bind(task.request_id)
    .bind(&task.key.ocid)
    .bind(&task.key.phase)
    .bind(task.launch_time)
    .bind(&task.meta_data)
    .bind(now_utc())
    .execute(conn)
    .await
    .map_err(|e| map_unique_violation(e, &task.key))?;
    Ok(())
}

/// Cancel the active task for `key`; returns the request id that created it.
async fn cancel_active(conn: &mut PgConnection, key: &Key) -> Result<RequestId, StoreError> {
    sqlx::query_scalar::<_, i64>(
        "UPDATE tasks SET active = FALSE, canceled_time = $3
         WHERE active AND ocid = $1 AND phase = $2
         RETURNING request_id",
    )
    .bind(&key.ocid)
    .bind(&key.phase)
    .bind(now_utc())
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| StoreError::TaskNotFound(key.clone()))
}

async fn consume_request(conn: &mut PgConnection, request_id: RequestId) -> Result<bool, StoreError> {
    let updated = sqlx::query_scalar::<_, i64>(
        "UPDATE requests SET used = TRUE WHERE id = $1 AND NOT used RETURNING id",
    )
    .bind(request_id)
    .fetch_optional(conn)
    .await?;
    Ok(updated.is_some())
}

// ── TaskStore ─────────────────────────────────────────────────

#[async_trait]
impl TaskStore for PgStore {
    async fn load_due_before(&self, end: NaiveDateTime) -> Result<Vec<Task>, StoreError> {
        let rows = sqlx::query_as::<_, TaskRow>(
            "SELECT request_id, ocid, phase, launch_time, meta_data
             FROM tasks WHERE active AND launch_time < $1
             ORDER BY launch_time, id",
        )
        .bind(end)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Task::from).collect())
    }

    async fn load_due_between(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<Task>, StoreError> {
        let rows = sqlx::query_as::<_, TaskRow>(
            "SELECT request_id, ocid, phase, launch_time, meta_data
             FROM tasks WHERE active AND launch_time >= $1 AND launch_time < $2
             ORDER BY launch_time, id",
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Task::from).collect())
    }

    async fn exists(&self, key: &Key) -> Result<bool, StoreError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM tasks WHERE active AND ocid = $1 AND phase = $2)",
        )
        .bind(&key.ocid)
        .bind(&key.phase)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn save(&self, task: &Task) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        insert_task(&mut tx, task).await?;
        if !consume_request(&mut tx, task.request_id).await? {
            debug!(request_id = task.request_id, "request already consumed");
        }
        tx.commit().await?;
        Ok(())
    }

    async fn replace(&self, task: &Task) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        let previous = cancel_active(&mut tx, &task.key).await?;
        insert_task(&mut tx, task).await?;
        if !consume_request(&mut tx, task.request_id).await? {
            debug!(request_id = task.request_id, "request already consumed");
        }
        tx.commit().await?;
        debug!(key = %task.key, previous, replacement = task.request_id, "task replaced");
        Ok(())
    }

    async fn cancel(&self, request_id: RequestId, key: &Key) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        cancel_active(&mut tx, key).await?;
        if !consume_request(&mut tx, request_id).await? {
            debug!(request_id, "request already consumed");
        }
        tx.commit().await?;
        Ok(())
    }

    async fn deactivate(&self, key: &Key) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        let retired = sqlx::query_scalar::<_, i64>(
            "UPDATE tasks SET active = FALSE, deactivate_time = $3
             WHERE active AND ocid = $1 AND phase = $2
             RETURNING request_id",
        )
        .bind(&key.ocid)
        .bind(&key.phase)
        .bind(now_utc())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::TaskNotFound(key.clone()))?;
        tx.commit().await?;
        debug!(key = %key, request_id = retired, "task deactivated");
        Ok(())
    }
}

// ── RequestStore ──────────────────────────────────────────────

#[async_trait]
impl RequestStore for PgStore {
    async fn load_unused(&self) -> Result<Vec<Request>, StoreError> {
        let rows = sqlx::query_as::<_, RequestRow>(
            "SELECT id, action, ocid, phase, launch_time, meta_data, sent_time, received_time
             FROM requests WHERE NOT used ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Request::try_from).collect()
    }

    async fn save(&self, message: &Message) -> Result<Request, StoreError> {
        let key = message.body.key();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::RequestSave(e.to_string()))?;
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO requests (action, ocid, phase, launch_time, meta_data, sent_time, received_time, used)
             VALUES ($1, $2, $3, $4, $5, $6, $7, FALSE)
             RETURNING id",
        )
        .bind(message.body.action())
        .bind(&key.ocid)
        .bind(&key.phase)
        .bind(message.body.launch_time())
        .bind(message.body.meta_data())
        .bind(message.sent_time)
        .bind(message.received_time)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| StoreError::RequestSave(e.to_string()))?;
        tx.commit()
            .await
            .map_err(|e| StoreError::RequestSave(e.to_string()))?;
        Ok(Request::from_message(id, message))
    }

    async fn mark_used(&self, request_id: RequestId, key: &Key) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        let consumed = consume_request(&mut tx, request_id).await?;
        tx.commit().await?;
        if consumed {
            debug!(request_id, key = %key, "request marked used");
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

    fn row(action: &str, launch: Option<NaiveDateTime>, meta: Option<&str>) -> RequestRow {
        let t = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        RequestRow {
            id: 9,
            action: action.to_string(),
            ocid: "o".into(),
            phase: "p".into(),
            launch_time: launch,
            meta_data: meta.map(str::to_owned),
            sent_time: t,
            received_time: t,
        }
    }

    #[test]
    fn decodes_each_action() {
        let t = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let schedule = Request::try_from(row("SCHEDULE", Some(t), Some("m"))).unwrap();
        assert!(matches!(schedule, Request::Schedule(ref r) if r.launch_time == t));

        let replace = Request::try_from(row("REPLACE", Some(t), Some("m"))).unwrap();
        assert!(matches!(replace, Request::Replace(ref r) if r.new_launch_time == t));

        let cancel = Request::try_from(row("CANCEL", None, None)).unwrap();
        assert_eq!(cancel.id(), 9);
        assert!(matches!(cancel, Request::Cancel(_)));
    }

    #[test]
    fn rejects_incomplete_rows() {
        assert!(matches!(
            Request::try_from(row("SCHEDULE", None, Some("m"))),
            Err(StoreError::Decode(_))
        ));
        assert!(matches!(
            Request::try_from(row("PAUSE", None, None)),
            Err(StoreError::Decode(_))
        ));
    }
}
