//! Pipeline counters, shared by every stage and exposed over HTTP.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

#[derive(Debug)]
pub struct PipelineMetrics {
    pub requests_received: AtomicU64,
    pub requests_replayed: AtomicU64,
    pub parse_failures: AtomicU64,
    pub commands_executed: AtomicU64,
    pub tasks_loaded: AtomicU64,
    pub tasks_cached: AtomicU64,
    pub cache_size: AtomicU64,
    pub tasks_dispatched: AtomicU64,
    pub tasks_filtered_out: AtomicU64,
    pub notifications_published: AtomicU64,
    pub errors_published: AtomicU64,
    pub publish_failures: AtomicU64,
    pub deactivations: AtomicU64,
    pub requests_marked: AtomicU64,
    started: Instant,
}

/// Point-in-time copy for `GET /metrics`.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub requests_received: u64,
    pub requests_replayed: u64,
    pub parse_failures: u64,
    pub commands_executed: u64,
    pub tasks_loaded: u64,
    pub tasks_cached: u64,
    pub cache_size: u64,
    pub tasks_dispatched: u64,
    pub tasks_filtered_out: u64,
    pub notifications_published: u64,
    pub errors_published: u64,
    pub publish_failures: u64,
    pub deactivations: u64,
    pub requests_marked: u64,
    pub uptime_secs: f64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            requests_received: AtomicU64::new(0),
            requests_replayed: AtomicU64::new(0),
            parse_failures: AtomicU64::new(0),
            commands_executed: AtomicU64::new(0),
            tasks_loaded: AtomicU64::new(0),
            tasks_cached: AtomicU64::new(0),
            cache_size: AtomicU64::new(0),
            tasks_dispatched: AtomicU64::new(0),
            tasks_filtered_out: AtomicU64::new(0),
            notifications_published: AtomicU64::new(0),
            errors_published: AtomicU64::new(0),
            publish_failures: AtomicU64::new(0),
            deactivations: AtomicU64::new(0),
            requests_marked: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            requests_received: get(&self.requests_received),
            requests_replayed: get(&self.requests_replayed),
            parse_failures: get(&self.parse_failures),
            commands_executed: get(&self.commands_executed),
            tasks_loaded: get(&self.tasks_loaded),
            tasks_cached: get(&self.tasks_cached),
            cache_size: get(&self.cache_size),
            tasks_dispatched: get(&self.tasks_dispatched),
            tasks_filtered_out: get(&self.tasks_filtered_out),
            notifications_published: get(&self.notifications_published),
            errors_published: get(&self.errors_published),
            publish_failures: get(&self.publish_failures),
            deactivations: get(&self.deactivations),
            requests_marked: get(&self.requests_marked),
            uptime_secs: self.started.elapsed().as_secs_f64(),
        }
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_counters() {
        let metrics = PipelineMetrics::new();
        PipelineMetrics::incr(&metrics.requests_received);
        PipelineMetrics::incr(&metrics.requests_received);
        PipelineMetrics::incr(&metrics.errors_published);
        metrics.cache_size.store(7, Ordering::Relaxed);

        let snap = metrics.snapshot();
        assert_eq!(snap.requests_received, 2);
        assert_eq!(snap.errors_published, 1);
        assert_eq!(snap.cache_size, 7);
        assert_eq!(snap.tasks_dispatched, 0);

        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["requests_received"], 2);
    }
}
