use std::fmt;
use std::time::Duration;

use chrono::NaiveDateTime;

/// The lookahead window for which near-term tasks are held in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeRange {
    /// Sentinel before the scheduler has started.
    Empty,
    /// First window: everything due before `end_exclusive`, including overdue
    /// tasks. `delay` is how long to wait before the first rollover.
    Open {
        end_exclusive: NaiveDateTime,
        delay: Duration,
    },
    /// Every later window: `[start, end_exclusive)`.
    Closed {
        start: NaiveDateTime,
        end_exclusive: NaiveDateTime,
    },
}

impl TimeRange {
    pub fn end_exclusive(&self) -> Option<NaiveDateTime> {
        match self {
            Self::Empty => None,
            Self::Open { end_exclusive, .. } | Self::Closed { end_exclusive, .. } => {
                Some(*end_exclusive)
            }
        }
    }

    /// Whether a task launching at `t` is due no later than this window's
    /// upper bound, so it must be buffered now rather than wait for a load.
    pub fn precedes_end(&self, t: NaiveDateTime) -> bool {
        self.end_exclusive().is_some_and(|end| t < end)
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty"),
            Self::Open {
                end_exclusive,
                delay,
            } => write!(f, "(.., {end_exclusive}) delay={}ms", delay.as_millis()),
            Self::Closed {
                start,
                end_exclusive,
            } => write!(f, "[{start}, {end_exclusive})"),
        }
    }
}
