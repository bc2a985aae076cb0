//! # LogWriter: tracing-backed event logger
//!
//! Writes every pool [`Event`] through `tracing` under the `rendervisor::events`
//! target. Per-task lifecycle lines go to `INFO` in verbose mode and to `DEBUG`
//! otherwise; degradations (timeouts, crashes, restarts) are always `WARN`.
//!
//! ## Example output
//! ```text
//! INFO  [worker-ready] worker=1 ready_ms=3
//! DEBUG [task-assigned] task="2k9f1m0x" worker=1 queued_ms=0
//! WARN  [task-timeout] task="2k9f1m0x" worker=1 timeout_ms=50
//! WARN  [worker-errored] worker=1 reason="task timed out"
//! INFO  [worker-terminated] worker=1
//! ```

use async_trait::async_trait;
use tracing::{Level, debug, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter {
    verbose: bool,
}

impl LogWriter {
    /// Construct a new [`LogWriter`]; `verbose` promotes task lifecycle lines to `INFO`.
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    fn task_level(&self) -> Level {
        if self.verbose { Level::INFO } else { Level::DEBUG }
    }
}

macro_rules! at_level {
    ($lvl:expr, $($arg:tt)+) => {
        if $lvl == Level::INFO {
            info!(target: "rendervisor::events", $($arg)+)
        } else {
            debug!(target: "rendervisor::events", $($arg)+)
        }
    };
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let task = e.task.as_deref().unwrap_or("-");
        let worker = e.worker.unwrap_or_default();
        let reason = e.reason.as_deref().unwrap_or("-");
        let lvl = self.task_level();

        match e.kind {
            EventKind::PoolStarted => {
                info!(target: "rendervisor::events", "[pool-started]");
            }
            EventKind::PoolStartFailed => {
                warn!(target: "rendervisor::events", reason, "[pool-start-failed]");
            }
            EventKind::ShutdownRequested => {
                info!(target: "rendervisor::events", "[shutdown-requested]");
            }
            EventKind::ShutdownComplete => {
                info!(target: "rendervisor::events", "[shutdown-complete]");
            }
            EventKind::WorkerSpawned => {
                at_level!(lvl, worker, "[worker-spawned]");
            }
            EventKind::WorkerReady => {
                info!(
                    target: "rendervisor::events",
                    worker,
                    ready_ms = e.duration_ms,
                    "[worker-ready]"
                );
            }
            EventKind::WorkerStartupFailed => {
                warn!(
                    target: "rendervisor::events",
                    worker,
                    timeout_ms = e.timeout_ms,
                    reason,
                    "[worker-startup-failed]"
                );
            }
            EventKind::WorkerErrored => {
                warn!(target: "rendervisor::events", worker, reason, "[worker-errored]");
            }
            EventKind::WorkersStuck => {
                warn!(
                    target: "rendervisor::events",
                    worker,
                    stuck = e.queue_len,
                    "[workers-stuck] retired unit threads are still rendering"
                );
            }
            EventKind::WorkerTerminated => {
                info!(target: "rendervisor::events", worker, "[worker-terminated]");
            }
            EventKind::TaskQueued => {
                at_level!(lvl, task, queue_len = e.queue_len, "[task-queued]");
            }
            EventKind::TaskRejected => {
                warn!(
                    target: "rendervisor::events",
                    task,
                    queue_len = e.queue_len,
                    "[task-rejected]"
                );
            }
            EventKind::TaskAssigned => {
                at_level!(lvl, task, worker, queued_ms = e.duration_ms, "[task-assigned]");
            }
            EventKind::TaskCompleted => {
                at_level!(lvl, task, worker, render_ms = e.duration_ms, "[task-completed]");
            }
            EventKind::TaskFailed => {
                warn!(target: "rendervisor::events", task, worker, reason, "[task-failed]");
            }
            EventKind::TaskTimedOut => {
                warn!(
                    target: "rendervisor::events",
                    task,
                    worker,
                    timeout_ms = e.timeout_ms,
                    "[task-timeout]"
                );
            }
            EventKind::LateReplyDiscarded => {
                warn!(target: "rendervisor::events", task, worker, "[late-reply-discarded]");
            }
            EventKind::SubscriberOverflow => {
                warn!(target: "rendervisor::events", reason, "[subscriber-overflow]");
            }
            EventKind::SubscriberPanicked => {
                warn!(target: "rendervisor::events", reason, "[subscriber-panicked]");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
