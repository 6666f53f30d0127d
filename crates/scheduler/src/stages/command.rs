//! Owns the lookahead window. Turns requests into storage commands stamped
//! with the current window, and emits a load command on every rollover.

use std::sync::Arc;

use tracing::{debug, error, info};

use herald_core::{now_utc, Command, Request, TimeRange};

use super::{forward, CommandTx, RequestRx};
use crate::metrics::PipelineMetrics;
use crate::ticker::Ticker;
use crate::window::TimeWindow;

pub struct CommandStage {
    pub window: TimeWindow,
    pub ticker: Ticker,
    pub requests: RequestRx,
    pub to_persist: CommandTx,
    pub metrics: Arc<PipelineMetrics>,
}

impl CommandStage {
    pub async fn run(mut self) {
        let first = match self.window.first(now_utc()) {
            Ok(range) => range,
            Err(e) => {
                error!(error = %e, "failed to open lookahead window");
                return;
            }
        };
        let delay = match first {
            TimeRange::Open { delay, .. } => delay,
            _ => std::time::Duration::ZERO,
        };
        info!(window = %first, delay_ms = delay.as_millis() as u64, "opened lookahead window");

        let (mut ticks, ticker_handle) = self.ticker.start(delay);
        self.emit(Command::LoadTask { range: first });

        loop {
            tokio::select! {
                Some(tick) = ticks.recv() => {
                    match self.window.next(tick) {
                        Ok(range) => {
                            debug!(window = %range, "window rolled over");
                            self.emit(Command::LoadTask { range });
                        }
                        Err(e) => error!(error = %e, "window rollover failed"),
                    }
                }
                Some(request) = self.requests.recv() => {
                    let range = self.window.current();
                    let command = match request {
                        Request::Schedule(request) => Command::ScheduleTask { request, range },
                        Request::Replace(request) => Command::ReplaceTask { request, range },
                        Request::Cancel(request) => Command::CancelTask { request, range },
                    };
                    self.emit(command);
                }
                else => break,
            }
            if self.to_persist.is_closed() {
                break;
            }
        }

        ticker_handle.abort();
        debug!("command stage stopped");
    }

    fn emit(&self, command: Command) {
        PipelineMetrics::incr(&self.metrics.commands_executed);
        forward("command", &self.to_persist, command);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use herald_core::{CancelRequest, Key};
    use tokio::sync::mpsc;

    fn stage(
        requests: RequestRx,
        to_persist: CommandTx,
    ) -> CommandStage {
        CommandStage {
            window: TimeWindow::new(Duration::from_secs(5), Duration::from_secs(2)).unwrap(),
            ticker: Ticker::new("window", Duration::from_secs(5)),
            requests,
            to_persist,
            metrics: Arc::new(PipelineMetrics::new()),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_load_then_rollover() {
        let (_req_tx, req_rx) = mpsc::unbounded_channel();
        let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel();
        tokio::spawn(stage(req_rx, cmd_tx).run());

        let first = cmd_rx.recv().await.unwrap();
        let first_end = match first {
            Command::LoadTask {
                range: TimeRange::Open { end_exclusive, delay },
            } => {
                assert_eq!(delay, Duration::from_secs(3));
                end_exclusive
            }
            other => panic!("unexpected command: {other:?}"),
        };

        match cmd_rx.recv().await.unwrap() {
            Command::LoadTask {
                range: TimeRange::Closed { start, .. },
            } => assert_eq!(start, first_end),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn requests_carry_current_window() {
        let (req_tx, req_rx) = mpsc::unbounded_channel();
        let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel();
        tokio::spawn(stage(req_rx, cmd_tx).run());

        let window = match cmd_rx.recv().await.unwrap() {
            Command::LoadTask { range } => range,
            other => panic!("unexpected command: {other:?}"),
        };
        let now = now_utc();
        req_tx
            .send(Request::Cancel(CancelRequest {
                id: 9,
                key: Key::new("o", "p"),
                sent_time: now,
                received_time: now,
            }))
            .unwrap();

        match cmd_rx.recv().await.unwrap() {
            Command::CancelTask { request, range } => {
                assert_eq!(request.id, 9);
                assert_eq!(range, window);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
