pub mod command;
pub mod config;
pub mod error;
pub mod failure;
pub mod range;
pub mod request;
pub mod response;
pub mod task;
pub mod time;

pub use command::Command;
pub use config::Config;
pub use error::ConfigError;
pub use failure::Failure;
pub use range::TimeRange;
pub use request::*;
pub use response::{ErrorResponse, Response};
pub use task::{Key, Task};
pub use time::now_utc;
