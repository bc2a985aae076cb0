//! # Orchestrator: the single control sequence that owns all pool state.
//!
//! One tokio task owns the unit table, the queue, the active-task table and the
//! deadline queue. Nothing else mutates them; callers talk to it through
//! [`Command`]s, units through [`Envelope`]s, timers through [`DelayQueue`].
//!
//! ## Architecture
//! ```text
//!   RenderPool ── Command ──┐
//!                           ▼
//!   units ── Envelope ──► select! ◄── DelayQueue<Deadline>
//!                           │
//!          ┌────────────────┼───────────────────┐
//!          ▼                ▼                   ▼
//!       submit         on_envelope         on_deadline
//!  (or workers())    (ready/success/     (task timeout/
//!                     error/exited)       startup timeout)
//!          └────────────────┼───────────────────┘
//!                           ▼
//!                 dispatch() ─► publish_stats()
//! ```
//!
//! ## Unit state machine
//! ```text
//!  spawned ──Ready──► Idle ──assign──► Busy ──success/error──► Idle
//!     │                                 │
//!     │ startup timeout        timeout / crash / error threshold
//!     ▼                                 ▼
//!  dropped                          Errored ──Exited──► Terminated
//!                                       └──► replacement spawned
//! ```
//!
//! ## Rules
//! - Every active task owns exactly one deadline key; the key is removed exactly
//!   once (on reply) or consumed by expiry (on timeout).
//! - A reply whose task is not active on the sending unit is discarded.
//! - Queued tasks are dispatched strictly in submission order, lowest idle unit id first.
//! - Counters change in the same step as the transition that produces them.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::time::{DelayQueue, delay_queue};

use crate::config::PoolConfig;
use crate::error::{PoolError, RenderError};
use crate::events::{Bus, Event, EventKind};
use crate::tasks::{RenderTask, TaskId};

use super::protocol::{Envelope, Request, Response, UnitEvent, WorkerId};
use super::queue::TaskQueue;
use super::stats::{Counters, PoolStats, WorkerInfo, WorkerStatus};
use super::unit::{Renderer, UnitHandle, spawn_unit};

/// Requests from [`RenderPool`](super::RenderPool) to the orchestrator.
#[derive(Debug)]
pub(crate) enum Command {
    /// Admit a task. The ack carries `QueueFull` on rejection.
    Submit {
        task: RenderTask,
        ack: oneshot::Sender<Result<(), RenderError>>,
    },
    /// Per-unit diagnostics.
    Workers {
        reply: oneshot::Sender<Vec<WorkerInfo>>,
    },
    /// Drain and stop. Replied once every task is resolved and every unit dropped.
    Shutdown { done: oneshot::Sender<()> },
}

/// What a deadline key stands for.
#[derive(Debug, Clone, Copy)]
enum Deadline {
    Task(TaskId),
    Startup(WorkerId),
}

/// A live unit in rotation.
struct Unit {
    handle: UnitHandle,
    current: Option<TaskId>,
    tasks_completed: u64,
    errors: u32,
    created_at: SystemTime,
    last_active_at: SystemTime,
}

impl Unit {
    fn info(&self, status: WorkerStatus) -> WorkerInfo {
        WorkerInfo::new(
            self.handle.id(),
            status,
            self.current,
            self.tasks_completed,
            self.errors,
            self.created_at,
            self.last_active_at,
        )
    }
}

/// A unit waiting for its readiness handshake.
struct Starting {
    handle: UnitHandle,
    key: delay_queue::Key,
    spawned_at: Instant,
    created_at: SystemTime,
}

/// A task currently running on a unit.
struct Active {
    task: RenderTask,
    worker: WorkerId,
    key: delay_queue::Key,
}

/// Pending reply to `RenderPool::initialize`.
struct InitWaiter {
    reply: oneshot::Sender<Result<(), PoolError>>,
    requested: usize,
}

pub(crate) struct Orchestrator {
    cfg: PoolConfig,
    renderer: Arc<dyn Renderer>,
    bus: Bus,
    stats: Arc<watch::Sender<PoolStats>>,

    commands: mpsc::UnboundedReceiver<Command>,
    inbox_tx: mpsc::UnboundedSender<Envelope>,
    inbox: mpsc::UnboundedReceiver<Envelope>,

    units: BTreeMap<WorkerId, Unit>,
    starting: HashMap<WorkerId, Starting>,
    /// Taken out of rotation; thread not yet exited. Newest `worker_count` only.
    retiring: BTreeMap<WorkerId, WorkerInfo>,
    /// Every retired unit whose thread has not exited yet.
    stuck: BTreeSet<WorkerId>,
    /// Recently terminated units, newest last.
    terminated: VecDeque<WorkerInfo>,

    queue: TaskQueue,
    active: HashMap<TaskId, Active>,
    deadlines: DelayQueue<Deadline>,
    counters: Counters,

    next_worker: u64,
    init: Option<InitWaiter>,
    aborted: bool,
}

impl Orchestrator {
    pub fn new(
        cfg: PoolConfig,
        renderer: Arc<dyn Renderer>,
        bus: Bus,
        stats: Arc<watch::Sender<PoolStats>>,
        commands: mpsc::UnboundedReceiver<Command>,
        init: oneshot::Sender<Result<(), PoolError>>,
    ) -> Self {
        let (inbox_tx, inbox) = mpsc::unbounded_channel();
        let requested = cfg.worker_count;
        Self {
            queue: TaskQueue::new(cfg.max_queue_size),
            cfg,
            renderer,
            bus,
            stats,
            commands,
            inbox_tx,
            inbox,
            units: BTreeMap::new(),
            starting: HashMap::new(),
            retiring: BTreeMap::new(),
            stuck: BTreeSet::new(),
            terminated: VecDeque::new(),
            active: HashMap::new(),
            deadlines: DelayQueue::new(),
            counters: Counters::default(),
            next_worker: 1,
            init: Some(InitWaiter {
                reply: init,
                requested,
            }),
            aborted: false,
        }
    }

    /// Spawns the initial units and serves until shutdown, abort or pool drop.
    pub async fn run(mut self) {
        for _ in 0..self.cfg.worker_count {
            self.start_unit();
            if self.aborted {
                break;
            }
        }
        self.publish_stats();

        while !self.aborted {
            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(Command::Shutdown { done }) => {
                        self.bus.publish(Event::new(EventKind::ShutdownRequested));
                        self.drain();
                        let _ = done.send(());
                        return;
                    }
                    Some(Command::Submit { task, ack }) => self.submit(task, ack),
                    Some(Command::Workers { reply }) => {
                        let _ = reply.send(self.worker_infos());
                    }
                    None => break,
                },
                Some(env) = self.inbox.recv() => self.on_envelope(env),
                Some(expired) = self.deadlines.next(), if !self.deadlines.is_empty() => {
                    self.on_deadline(expired.into_inner());
                }
            }
            self.publish_stats();
        }

        self.drain();
    }

    // ---------------------------
    // Admission
    // ---------------------------

    fn submit(&mut self, task: RenderTask, ack: oneshot::Sender<Result<(), RenderError>>) {
        let task_label = task.id().to_string();

        if self.units.is_empty() && self.starting.is_empty() {
            let _ = ack.send(Err(RenderError::WorkerCrash {
                reason: "no execution units available".into(),
            }));
            return;
        }

        if self.queue.is_empty() {
            if let Some(worker) = self.first_idle() {
                let _ = ack.send(Ok(()));
                self.assign(worker, task);
                return;
            }
        }

        match self.queue.push(task) {
            Ok(()) => {
                let _ = ack.send(Ok(()));
                self.bus.publish(
                    Event::new(EventKind::TaskQueued)
                        .with_task(task_label)
                        .with_queue_len(self.queue.len()),
                );
                self.dispatch();
            }
            Err(_rejected) => {
                let _ = ack.send(Err(RenderError::QueueFull {
                    capacity: self.queue.capacity(),
                }));
                self.bus.publish(
                    Event::new(EventKind::TaskRejected)
                        .with_task(task_label)
                        .with_queue_len(self.queue.len()),
                );
            }
        }
    }

    // ---------------------------
    // Dispatch
    // ---------------------------

    fn first_idle(&self) -> Option<WorkerId> {
        self.units
            .iter()
            .find(|(_, u)| u.current.is_none())
            .map(|(id, _)| *id)
    }

    /// Hands queued tasks to idle units until one side runs out.
    fn dispatch(&mut self) {
        while !self.queue.is_empty() {
            let Some(worker) = self.first_idle() else {
                break;
            };
            let Some(task) = self.queue.pop() else {
                break;
            };
            self.assign(worker, task);
        }
    }

    fn assign(&mut self, worker: WorkerId, mut task: RenderTask) {
        let Some(unit) = self.units.get_mut(&worker) else {
            return;
        };

        let task_id = task.id();
        let request = Request::Render {
            task_id,
            template: Arc::clone(task.template()),
            input: task.take_input(),
        };

        if unit.handle.send(request).is_err() {
            self.counters.failed += 1;
            self.publish_task_failed(task_id, worker, "execution unit channel closed");
            task.fail(RenderError::WorkerCrash {
                reason: "execution unit channel closed".into(),
            });
            self.retire(worker, "request channel closed");
            return;
        }

        let waited = task.created_at().elapsed();
        unit.current = Some(task_id);
        unit.last_active_at = SystemTime::now();

        let key = self
            .deadlines
            .insert(Deadline::Task(task_id), self.cfg.task_timeout);
        self.active.insert(task_id, Active { task, worker, key });

        self.counters.assigned += 1;
        self.counters.total_wait_ms += waited.as_millis() as u64;

        self.bus.publish(
            Event::new(EventKind::TaskAssigned)
                .with_task(task_id.to_string())
                .with_worker(worker.as_u64())
                .with_duration(waited),
        );
    }

    // ---------------------------
    // Unit messages
    // ---------------------------

    fn on_envelope(&mut self, env: Envelope) {
        let Envelope { worker, event } = env;
        match event {
            UnitEvent::Message(Response::Ready) => self.on_ready(worker),
            UnitEvent::Message(Response::Success {
                task_id,
                bytes,
                duration_ms,
            }) => self.on_success(worker, task_id, bytes, duration_ms),
            UnitEvent::Message(Response::Error { task_id, message }) => {
                self.on_error(worker, task_id, message)
            }
            UnitEvent::Exited { reason } => self.on_exited(worker, reason),
        }
    }

    fn on_ready(&mut self, worker: WorkerId) {
        // Ready from a unit whose startup window already closed: ignore, it was dropped.
        let Some(st) = self.starting.remove(&worker) else {
            return;
        };
        self.deadlines.remove(&st.key);

        let now = SystemTime::now();
        self.units.insert(
            worker,
            Unit {
                handle: st.handle,
                current: None,
                tasks_completed: 0,
                errors: 0,
                created_at: st.created_at,
                last_active_at: now,
            },
        );
        self.bus.publish(
            Event::new(EventKind::WorkerReady)
                .with_worker(worker.as_u64())
                .with_duration(st.spawned_at.elapsed()),
        );

        let all_ready = self
            .init
            .as_ref()
            .is_some_and(|init| self.units.len() >= init.requested);
        if all_ready {
            if let Some(init) = self.init.take() {
                let _ = init.reply.send(Ok(()));
            }
            self.bus
                .publish(Event::new(EventKind::PoolStarted).with_queue_len(self.queue.len()));
        }

        self.dispatch();
    }

    /// Removes the task if it is active on `worker`; otherwise reports a late reply.
    fn take_active(&mut self, worker: WorkerId, task_id: TaskId) -> Option<Active> {
        match self.active.get(&task_id) {
            Some(a) if a.worker == worker => {
                let active = self.active.remove(&task_id)?;
                self.deadlines.remove(&active.key);
                Some(active)
            }
            _ => {
                self.bus.publish(
                    Event::new(EventKind::LateReplyDiscarded)
                        .with_task(task_id.to_string())
                        .with_worker(worker.as_u64()),
                );
                None
            }
        }
    }

    fn on_success(&mut self, worker: WorkerId, task_id: TaskId, bytes: Bytes, duration_ms: u64) {
        let Some(active) = self.take_active(worker, task_id) else {
            return;
        };

        if let Some(unit) = self.units.get_mut(&worker) {
            unit.current = None;
            unit.tasks_completed += 1;
            unit.last_active_at = SystemTime::now();
        }
        self.counters.completed += 1;
        self.counters.total_duration_ms += duration_ms;

        active.task.resolve(Ok(bytes));
        self.bus.publish(
            Event::new(EventKind::TaskCompleted)
                .with_task(task_id.to_string())
                .with_worker(worker.as_u64())
                .with_duration_ms(duration_ms),
        );

        self.dispatch();
    }

    fn on_error(&mut self, worker: WorkerId, task_id: TaskId, message: String) {
        let Some(active) = self.take_active(worker, task_id) else {
            return;
        };

        let mut errors = 0;
        if let Some(unit) = self.units.get_mut(&worker) {
            unit.current = None;
            unit.errors += 1;
            unit.last_active_at = SystemTime::now();
            errors = unit.errors;
        }
        self.counters.failed += 1;

        self.publish_task_failed(task_id, worker, &message);
        active.task.fail(RenderError::Template { message });

        if errors >= self.cfg.max_worker_errors {
            let reason = format!(
                "error threshold reached ({errors}/{})",
                self.cfg.max_worker_errors
            );
            self.retire(worker, &reason);
        }

        self.dispatch();
    }

    fn on_exited(&mut self, worker: WorkerId, reason: Option<String>) {
        let reason = match reason {
            Some(r) => format!("execution unit {r}"),
            None => "execution unit exited".to_string(),
        };

        if let Some(mut unit) = self.units.remove(&worker) {
            if let Some(task_id) = unit.current.take() {
                if let Some(active) = self.active.remove(&task_id) {
                    self.deadlines.remove(&active.key);
                    self.counters.failed += 1;
                    self.publish_task_failed(task_id, worker, &reason);
                    active.task.fail(RenderError::WorkerCrash {
                        reason: reason.clone(),
                    });
                }
            }
            self.bus.publish(
                Event::new(EventKind::WorkerErrored)
                    .with_worker(worker.as_u64())
                    .with_reason(reason),
            );
            self.bury(unit.info(WorkerStatus::Terminated));
            self.start_unit();
            self.dispatch();
            return;
        }

        if let Some(st) = self.starting.remove(&worker) {
            self.deadlines.remove(&st.key);
            self.startup_failed(worker, reason);
            return;
        }

        if self.stuck.remove(&worker) {
            match self.retiring.remove(&worker) {
                Some(mut info) => {
                    info.status = WorkerStatus::Terminated;
                    self.bury(info);
                }
                None => self.bus.publish(
                    Event::new(EventKind::WorkerTerminated).with_worker(worker.as_u64()),
                ),
            }
        }
    }

    // ---------------------------
    // Deadlines
    // ---------------------------

    fn on_deadline(&mut self, deadline: Deadline) {
        match deadline {
            Deadline::Task(task_id) => {
                let Some(active) = self.active.remove(&task_id) else {
                    return;
                };
                let worker = active.worker;
                self.counters.failed += 1;

                active.task.fail(RenderError::Timeout {
                    timeout: self.cfg.task_timeout,
                });
                self.bus.publish(
                    Event::new(EventKind::TaskTimedOut)
                        .with_task(task_id.to_string())
                        .with_worker(worker.as_u64())
                        .with_timeout(self.cfg.task_timeout),
                );

                self.retire(worker, "task timed out");
                self.dispatch();
            }
            Deadline::Startup(worker) => {
                if let Some(st) = self.starting.remove(&worker) {
                    // Dropping the handle closes the unit's request channel.
                    drop(st.handle);
                    let reason = format!(
                        "no readiness handshake within {:?}",
                        self.cfg.startup_timeout
                    );
                    self.startup_failed(worker, reason);
                }
            }
        }
    }

    // ---------------------------
    // Unit lifecycle
    // ---------------------------

    /// Spawns one unit and arms its startup deadline.
    fn start_unit(&mut self) {
        let worker = WorkerId(self.next_worker);
        self.next_worker += 1;

        match spawn_unit(worker, Arc::clone(&self.renderer), self.inbox_tx.clone()) {
            Ok(handle) => {
                let key = self
                    .deadlines
                    .insert(Deadline::Startup(worker), self.cfg.startup_timeout);
                self.starting.insert(
                    worker,
                    Starting {
                        handle,
                        key,
                        spawned_at: Instant::now(),
                        created_at: SystemTime::now(),
                    },
                );
                self.bus
                    .publish(Event::new(EventKind::WorkerSpawned).with_worker(worker.as_u64()));
            }
            Err(e) => self.startup_failed(worker, format!("thread spawn failed: {e}")),
        }
    }

    /// Startup failures are not retried. During `initialize` they abort the start.
    fn startup_failed(&mut self, worker: WorkerId, reason: String) {
        self.bus.publish(
            Event::new(EventKind::WorkerStartupFailed)
                .with_worker(worker.as_u64())
                .with_timeout(self.cfg.startup_timeout)
                .with_reason(reason.clone()),
        );

        if let Some(init) = self.init.take() {
            let _ = init.reply.send(Err(PoolError::StartupFailure {
                started: self.units.len(),
                requested: init.requested,
                timeout: self.cfg.startup_timeout,
            }));
            self.bus
                .publish(Event::new(EventKind::PoolStartFailed).with_reason(reason));
            self.aborted = true;
            return;
        }

        if self.units.is_empty() && self.starting.is_empty() {
            for task in self.queue.drain() {
                self.counters.failed += 1;
                task.fail(RenderError::WorkerCrash {
                    reason: "no execution units available".into(),
                });
            }
        }
    }

    /// Takes a unit out of rotation, terminates it and spawns a replacement.
    fn retire(&mut self, worker: WorkerId, reason: &str) {
        let Some(unit) = self.units.remove(&worker) else {
            return;
        };
        self.bus.publish(
            Event::new(EventKind::WorkerErrored)
                .with_worker(worker.as_u64())
                .with_reason(reason.to_string()),
        );
        let mut info = unit.info(WorkerStatus::Errored);
        info.current_task = None;
        drop(unit);

        let limit = self.cfg.worker_count.max(1);
        self.retiring.insert(worker, info);
        while self.retiring.len() > limit {
            self.retiring.pop_first();
        }
        self.stuck.insert(worker);
        if self.stuck.len() > limit {
            self.bus.publish(
                Event::new(EventKind::WorkersStuck)
                    .with_worker(worker.as_u64())
                    .with_queue_len(self.stuck.len()),
            );
        }

        self.start_unit();
    }

    fn bury(&mut self, info: WorkerInfo) {
        self.bus
            .publish(Event::new(EventKind::WorkerTerminated).with_worker(info.id));
        if self.terminated.len() >= self.cfg.worker_count.max(1) {
            self.terminated.pop_front();
        }
        self.terminated.push_back(info);
    }

    // ---------------------------
    // Shutdown
    // ---------------------------

    /// Resolves every queued and active task with `ShuttingDown` and drops every unit.
    fn drain(&mut self) {
        if let Some(init) = self.init.take() {
            let _ = init.reply.send(Err(PoolError::Closed));
        }

        for task in self.queue.drain() {
            task.fail(RenderError::ShuttingDown);
        }
        for (_, active) in self.active.drain() {
            active.task.fail(RenderError::ShuttingDown);
        }
        self.deadlines.clear();

        let live = std::mem::take(&mut self.units);
        for (worker, _unit) in live {
            self.bus
                .publish(Event::new(EventKind::WorkerTerminated).with_worker(worker.as_u64()));
        }
        for (worker, _st) in self.starting.drain() {
            self.bus
                .publish(Event::new(EventKind::WorkerTerminated).with_worker(worker.as_u64()));
        }
        self.retiring.clear();
        self.stuck.clear();

        self.publish_stats();
        self.bus.publish(Event::new(EventKind::ShutdownComplete));
    }

    // ---------------------------
    // Helpers
    // ---------------------------

    fn publish_task_failed(&self, task_id: TaskId, worker: WorkerId, reason: &str) {
        self.bus.publish(
            Event::new(EventKind::TaskFailed)
                .with_task(task_id.to_string())
                .with_worker(worker.as_u64())
                .with_reason(reason.to_string()),
        );
    }

    fn worker_infos(&self) -> Vec<WorkerInfo> {
        let mut out: Vec<WorkerInfo> = self
            .units
            .values()
            .map(|u| {
                let status = if u.current.is_some() {
                    WorkerStatus::Busy
                } else {
                    WorkerStatus::Idle
                };
                u.info(status)
            })
            .chain(self.retiring.values().cloned())
            .chain(self.terminated.iter().cloned())
            .collect();
        out.sort_by_key(|w| w.id);
        out
    }

    fn snapshot(&self) -> PoolStats {
        let busy = self.units.values().filter(|u| u.current.is_some()).count();
        PoolStats {
            total_workers: self.units.len(),
            idle_workers: self.units.len() - busy,
            busy_workers: busy,
            starting_workers: self.starting.len(),
            stuck_workers: self.stuck.len(),
            queued_tasks: self.queue.len(),
            active_tasks: self.active.len(),
            completed_tasks: self.counters.completed,
            failed_tasks: self.counters.failed,
            average_task_duration_ms: self.counters.average_duration_ms(),
            average_queue_wait_ms: self.counters.average_wait_ms(),
        }
    }

    fn publish_stats(&self) {
        let next = self.snapshot();
        self.stats.send_if_modified(|cur| {
            if *cur == next {
                false
            } else {
                *cur = next;
                true
            }
        });
    }
}
