use std::time::Duration;

use chrono::NaiveDateTime;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use herald_core::now_utc;

/// Repeating timer that emits the UTC wall-clock time of each tick.
#[derive(Debug, Clone, Copy)]
pub struct Ticker {
    name: &'static str,
    period: Duration,
}

impl Ticker {
    pub fn new(name: &'static str, period: Duration) -> Self {
        Self {
            name,
            period: period.max(Duration::from_millis(1)),
        }
    }

    /// Spawn the timer. The first tick fires after `initial_delay`, then
    /// every period. The task ends once the receiver is dropped.
    pub fn start(&self, initial_delay: Duration) -> (UnboundedReceiver<NaiveDateTime>, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let name = self.name;
        let mut interval = tokio::time::interval_at(Instant::now() + initial_delay, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let handle = tokio::spawn(async move {
            loop {
                interval.tick().await;
                if tx.send(now_utc()).is_err() {
                    debug!(ticker = name, "receiver dropped, ticker stopped");
                    break;
                }
            }
        });
        (rx, handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn waits_initial_delay_then_repeats() {
        let started = Instant::now();
        let (mut ticks, _handle) = Ticker::new("test", Duration::from_secs(1)).start(Duration::from_secs(3));

        assert!(tokio::time::timeout(Duration::from_millis(2900), ticks.recv())
            .await
            .is_err());

        ticks.recv().await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(3));

        ticks.recv().await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn stops_when_receiver_dropped() {
        let (ticks, handle) = Ticker::new("test", Duration::from_millis(10)).start(Duration::ZERO);
        drop(ticks);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
