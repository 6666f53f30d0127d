use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    ZeroInterval(&'static str),

    #[error("advance margin ({advance_ms}ms) must be shorter than the repeat interval ({repeat_ms}ms)")]
    MarginExceedsInterval { advance_ms: u64, repeat_ms: u64 },

    #[error("{name} must not exceed {max_ms}ms")]
    IntervalTooLarge { name: &'static str, max_ms: u64 },

    #[error("missing required setting: {0}")]
    Missing(&'static str),
}
