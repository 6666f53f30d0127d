//! The dispatch pipeline.
//!
//! ```text
//! ingest ─▶ command ─▶ persist ─▶ cache-feed ─▶ filter ─▶ response ─┬─▶ deactivate
//!   │                    │                                  ▲      └─▶ mark
//!   └────── failures ────┴──────────────────────────────────┘
//! ```
//!
//! Every stage is a single task that owns its state and talks to its
//! neighbours only through unbounded channels.

pub mod cache;
pub mod metrics;
pub mod pipeline;
pub mod stages;
pub mod ticker;
pub mod window;

pub use cache::TaskCache;
pub use metrics::{MetricsSnapshot, PipelineMetrics};
pub use pipeline::{Pipeline, PipelineDeps, PipelineHandle};
pub use ticker::Ticker;
pub use window::{TimeWindow, WindowError};
