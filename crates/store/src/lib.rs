//! Durable task and request storage.
//!
//! [`PgStore`] is the production backend; [`MemoryStore`] has the same
//! semantics without a database.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod traits;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use traits::{RequestStore, TaskStore};
