//! Sliding lookahead window.
//!
//! The first window is open below and covers everything due before
//! `now + repeat`. Each rollover fires `advance` ahead of the current
//! window's end and produces the next closed window
//! `[previous end, tick + advance + repeat)`, so tasks are loaded into the
//! cache before they fall due.

use std::time::Duration;

use chrono::NaiveDateTime;
use thiserror::Error;

use herald_core::config::{SchedulerConfig, MAX_INTERVAL_MS};
use herald_core::TimeRange;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WindowError {
    #[error("cannot {operation} a window from the {from} state")]
    InvalidState {
        from: &'static str,
        operation: &'static str,
    },

    #[error("window interval {0:?} exceeds {max}ms", max = MAX_INTERVAL_MS)]
    IntervalOutOfRange(Duration),
}

fn to_delta(d: Duration) -> Result<chrono::Duration, WindowError> {
    if d > Duration::from_millis(MAX_INTERVAL_MS) {
        return Err(WindowError::IntervalOutOfRange(d));
    }
    chrono::Duration::from_std(d).map_err(|_| WindowError::IntervalOutOfRange(d))
}

fn state_name(range: &TimeRange) -> &'static str {
    match range {
        TimeRange::Empty => "empty",
        TimeRange::Open { .. } => "open",
        TimeRange::Closed { .. } => "closed",
    }
}

/// Window state machine: `Empty → Open → Closed → Closed → …`.
#[derive(Debug, Clone)]
pub struct TimeWindow {
    repeat: chrono::Duration,
    advance: chrono::Duration,
    current: TimeRange,
}

impl TimeWindow {
    pub fn new(repeat_interval: Duration, advance_margin: Duration) -> Result<Self, WindowError> {
        Ok(Self {
            repeat: to_delta(repeat_interval)?,
            advance: to_delta(advance_margin)?,
            current: TimeRange::Empty,
        })
    }

    pub fn from_config(config: &SchedulerConfig) -> Result<Self, WindowError> {
        Self::new(config.repeat_interval(), config.advance_margin())
    }

    /// The window requests are stamped with right now.
    pub fn current(&self) -> TimeRange {
        self.current
    }

    /// Open the first window. Only legal once, from `Empty`.
    pub fn first(&mut self, now: NaiveDateTime) -> Result<TimeRange, WindowError> {
        if !matches!(self.current, TimeRange::Empty) {
            return Err(WindowError::InvalidState {
                from: state_name(&self.current),
                operation: "open the first",
            });
        }
        let end_exclusive = now + self.repeat;
        let delay = ((end_exclusive - self.advance) - now)
            .to_std()
            .unwrap_or(Duration::ZERO);
        self.current = TimeRange::Open {
            end_exclusive,
            delay,
        };
        Ok(self.current)
    }

    /// Roll over to the next window on a ticker tick.
    pub fn next(&mut self, tick: NaiveDateTime) -> Result<TimeRange, WindowError> {
        let start = match self.current {
            TimeRange::Empty => {
                return Err(WindowError::InvalidState {
                    from: "empty",
                    operation: "advance",
                })
            }
            TimeRange::Open { end_exclusive, .. } | TimeRange::Closed { end_exclusive, .. } => {
                end_exclusive
            }
        };
        // A clock stepping backwards yields an empty window, never an inverted one.
        let end_exclusive = (tick + self.advance + self.repeat).max(start);
        self.current = TimeRange::Closed {
            start,
            end_exclusive,
        };
        Ok(self.current)
    }
}
