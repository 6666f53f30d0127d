use std::fmt;

use crate::range::TimeRange;
use crate::request::{CancelRequest, ReplaceRequest, ScheduleRequest};

/// Storage instruction produced by the window stage. Request-derived
/// commands carry the window that was active when they were issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    LoadTask {
        range: TimeRange,
    },
    ScheduleTask {
        request: ScheduleRequest,
        range: TimeRange,
    },
    ReplaceTask {
        request: ReplaceRequest,
        range: TimeRange,
    },
    CancelTask {
        request: CancelRequest,
        range: TimeRange,
    },
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LoadTask { range } => write!(f, "load {range}"),
            Self::ScheduleTask { request, .. } => {
                write!(f, "schedule #{} {}", request.id, request.key)
            }
            Self::ReplaceTask { request, .. } => {
                write!(f, "replace #{} {}", request.id, request.key)
            }
            Self::CancelTask { request, .. } => write!(f, "cancel #{} {}", request.id, request.key),
        }
    }
}
