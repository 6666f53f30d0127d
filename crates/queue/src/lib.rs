pub mod consumer;
pub mod error;
pub mod memory;
pub mod parser;
pub mod publisher;
pub mod sqs;

pub use consumer::{QueueConsumer, QueueMessage, QueueStatus};
pub use error::QueueError;
pub use memory::{MemoryPublisher, MemoryQueue};
pub use parser::parse_message;
pub use publisher::QueuePublisher;
pub use sqs::{SqsConsumer, SqsPublisher};
