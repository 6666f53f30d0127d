//! Time-bucketed buffer for near-term tasks.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use indexmap::IndexMap;

use herald_core::{Key, Task};

/// Tasks grouped by launch time, ascending. Within one bucket a key
/// appears at most once and the first insertion wins. Entries for the
/// same key in different buckets are independent.
#[derive(Debug, Default)]
pub struct TaskCache {
    buckets: BTreeMap<NaiveDateTime, IndexMap<Key, Task>>,
}

impl TaskCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer a task. Returns `false` if its bucket already holds the key.
    pub fn push(&mut self, task: Task) -> bool {
        let bucket = self.buckets.entry(task.launch_time).or_default();
        if bucket.contains_key(&task.key) {
            return false;
        }
        bucket.insert(task.key.clone(), task);
        true
    }

    /// Remove and return every bucket launching at or before `as_of`,
    /// oldest first.
    pub fn poll(&mut self, as_of: NaiveDateTime) -> Vec<(NaiveDateTime, Vec<Task>)> {
        let mut later = self.buckets.split_off(&as_of);
        if let Some(exact) = later.remove(&as_of) {
            self.buckets.insert(as_of, exact);
        }
        let due = std::mem::replace(&mut self.buckets, later);
        due.into_iter()
            .map(|(time, bucket)| (time, bucket.into_values().collect()))
            .collect()
    }

    /// Number of buffered tasks across all buckets.
    pub fn len(&self) -> usize {
        self.buckets.values().map(IndexMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}
