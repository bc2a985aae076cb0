//! # Runtime events emitted by the render pool.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Unit events**: execution unit lifecycle (spawned, ready, errored, terminated)
//! - **Task events**: render task flow (queued, assigned, completed, failed, timed out)
//! - **Pool events**: start-up and shutdown of the pool as a whole
//! - **Subscriber events**: delivery problems inside the fan-out
//!
//! The [`Event`] struct carries metadata such as timestamps, task id, unit id,
//! reasons and durations.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use rendervisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::TaskTimedOut)
//!     .with_task("2k9f1m0x")
//!     .with_worker(3)
//!     .with_timeout(Duration::from_millis(50));
//!
//! assert_eq!(ev.kind, EventKind::TaskTimedOut);
//! assert_eq!(ev.task.as_deref(), Some("2k9f1m0x"));
//! assert_eq!(ev.worker, Some(3));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets: `reason` (subscriber name and panic info)
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `reason` (subscriber name and cause)
    SubscriberOverflow,

    // === Pool events ===
    /// Every initial unit reported ready.
    ///
    /// Sets: `queue_len` (always 0)
    PoolStarted,

    /// Initial start-up failed; the pool tore itself down.
    ///
    /// Sets: `reason`
    PoolStartFailed,

    /// Shutdown requested; draining begins.
    ShutdownRequested,

    /// Every pending task was resolved and every unit terminated.
    ShutdownComplete,

    // === Unit events ===
    /// A new execution unit thread was spawned and awaits its handshake.
    ///
    /// Sets: `worker`
    WorkerSpawned,

    /// A unit completed its readiness handshake and joined the rotation.
    ///
    /// Sets: `worker`, `duration_ms` (time to ready)
    WorkerReady,

    /// A unit did not become ready within the startup window.
    ///
    /// Sets: `worker`, `timeout_ms`
    WorkerStartupFailed,

    /// A unit was taken out of rotation (error threshold, timeout, crash).
    ///
    /// Sets: `worker`, `reason`
    WorkerErrored,

    /// Retired units whose threads never exited outnumber `worker_count`.
    ///
    /// Published each time a retirement pushes the count past that limit.
    /// Sets: `worker` (the unit just retired), `queue_len` (stuck thread count)
    WorkersStuck,

    /// A unit was torn down (restart or shutdown).
    ///
    /// Sets: `worker`
    WorkerTerminated,

    // === Task events ===
    /// Task parked in the queue because no unit was idle.
    ///
    /// Sets: `task`, `queue_len`
    TaskQueued,

    /// Task rejected at admission (queue full).
    ///
    /// Sets: `task`, `queue_len`
    TaskRejected,

    /// Task handed to an idle unit.
    ///
    /// Sets: `task`, `worker`, `duration_ms` (time spent queued)
    TaskAssigned,

    /// Unit reported success.
    ///
    /// Sets: `task`, `worker`, `duration_ms` (render time reported by the unit)
    TaskCompleted,

    /// Unit reported failure, or crashed while running the task.
    ///
    /// Sets: `task`, `worker`, `reason`
    TaskFailed,

    /// Task deadline elapsed before the unit answered.
    ///
    /// Sets: `task`, `worker`, `timeout_ms`
    TaskTimedOut,

    /// A reply arrived for a task that is no longer active (e.g. after a timeout).
    ///
    /// Sets: `task`, `worker`
    LateReplyDiscarded,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Task id (base36), if applicable.
    pub task: Option<Arc<str>>,
    /// Execution unit id, if applicable.
    pub worker: Option<u64>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
    /// Timeout in milliseconds (compact).
    pub timeout_ms: Option<u32>,
    /// Duration in milliseconds; meaning depends on the kind.
    pub duration_ms: Option<u64>,
    /// Queue length right after the event.
    pub queue_len: Option<usize>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            task: None,
            worker: None,
            reason: None,
            timeout_ms: None,
            duration_ms: None,
            queue_len: None,
        }
    }

    /// Attaches a task id.
    #[inline]
    pub fn with_task(mut self, task: impl Into<Arc<str>>) -> Self {
        self.task = Some(task.into());
        self
    }

    /// Attaches an execution unit id.
    #[inline]
    pub fn with_worker(mut self, worker: u64) -> Self {
        self.worker = Some(worker);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a timeout duration (stored as milliseconds).
    #[inline]
    pub fn with_timeout(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.timeout_ms = Some(ms);
        self
    }

    /// Attaches a duration (stored as milliseconds).
    #[inline]
    pub fn with_duration(mut self, d: Duration) -> Self {
        self.duration_ms = Some(d.as_millis().min(u128::from(u64::MAX)) as u64);
        self
    }

    /// Attaches a duration already expressed in milliseconds.
    #[inline]
    pub fn with_duration_ms(mut self, ms: u64) -> Self {
        self.duration_ms = Some(ms);
        self
    }

    /// Attaches the queue length.
    #[inline]
    pub fn with_queue_len(mut self, len: usize) -> Self {
        self.queue_len = Some(len);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_reason(format!("subscriber={subscriber} info={info}"))
    }

    /// True for events that describe a degraded or failing pool.
    pub fn is_warning(&self) -> bool {
        matches!(
            self.kind,
            EventKind::PoolStartFailed
                | EventKind::WorkerStartupFailed
                | EventKind::WorkerErrored
                | EventKind::WorkersStuck
                | EventKind::TaskFailed
                | EventKind::TaskTimedOut
                | EventKind::LateReplyDiscarded
                | EventKind::SubscriberPanicked
                | EventKind::SubscriberOverflow
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_numbers_increase() {
        let a = Event::new(EventKind::TaskQueued);
        let b = Event::new(EventKind::TaskAssigned);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn timeout_is_clamped_to_u32() {
        let ev = Event::new(EventKind::TaskTimedOut).with_timeout(Duration::from_secs(u64::MAX));
        assert_eq!(ev.timeout_ms, Some(u32::MAX));
    }

    #[test]
    fn warnings_are_classified() {
        assert!(Event::new(EventKind::TaskTimedOut).is_warning());
        assert!(!Event::new(EventKind::TaskCompleted).is_warning());
    }
}
