use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::request::RequestId;

/// Identity of a schedulable unit. At most one active task exists per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Key {
    pub ocid: String,
    pub phase: String,
}

impl Key {
    pub fn new(ocid: impl Into<String>, phase: impl Into<String>) -> Self {
        Self {
            ocid: ocid.into(),
            phase: phase.into(),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.ocid, self.phase)
    }
}

/// Live state of a scheduled launch.
///
/// Two tasks with the same [`Key`] describe the same unit even when their
/// launch times differ; collections that deduplicate tasks must key on
/// `task.key` explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub request_id: RequestId,
    pub key: Key,
    pub launch_time: NaiveDateTime,
    pub meta_data: String,
}
