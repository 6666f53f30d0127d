//! Pipeline stages. Each stage owns its inputs and runs until every
//! upstream sender has been dropped.

pub mod cache_feed;
pub mod command;
pub mod deactivate;
pub mod filter;
pub mod ingest;
pub mod mark;
pub mod persist;
pub mod response;

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

use herald_core::{Command, Failure, MarkRequest, Request, Task};

pub use cache_feed::CacheFeedStage;
pub use command::CommandStage;
pub use deactivate::DeactivateStage;
pub use filter::FilterStage;
pub use ingest::IngestStage;
pub use mark::MarkStage;
pub use persist::PersistStage;
pub use response::ResponseStage;

pub type RequestTx = UnboundedSender<Request>;
pub type RequestRx = UnboundedReceiver<Request>;
pub type CommandTx = UnboundedSender<Command>;
pub type CommandRx = UnboundedReceiver<Command>;
pub type TaskTx = UnboundedSender<Task>;
pub type TaskRx = UnboundedReceiver<Task>;
pub type BatchTx = UnboundedSender<Vec<Task>>;
pub type BatchRx = UnboundedReceiver<Vec<Task>>;
pub type FailureTx = UnboundedSender<Failure>;
pub type FailureRx = UnboundedReceiver<Failure>;
pub type MarkTx = UnboundedSender<MarkRequest>;
pub type MarkRx = UnboundedReceiver<MarkRequest>;

/// Forward to the next stage, logging when it has already gone away.
pub(crate) fn forward<T>(stage: &'static str, tx: &UnboundedSender<T>, item: T) -> bool {
    if tx.send(item).is_err() {
        tracing::debug!(stage, "downstream closed, dropping item");
        return false;
    }
    true
}
