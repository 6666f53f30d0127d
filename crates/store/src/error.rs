use thiserror::Error;

use herald_core::{Key, RequestId};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("task already active for {0}")]
    TaskAlreadyActive(Key),

    #[error("no active task for {0}")]
    TaskNotFound(Key),

    #[error("request {0} not found or already used")]
    RequestNotFound(RequestId),

    #[error("failed to save request: {0}")]
    RequestSave(String),

    #[error("corrupt row: {0}")]
    Decode(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
