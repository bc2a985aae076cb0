//! # RenderPool: the public handle to one orchestrator incarnation.
//!
//! The pool is explicitly constructed (see [`RenderPoolBuilder`](super::RenderPoolBuilder))
//! and passed to whoever needs it; there is no process-wide instance.
//!
//! ```text
//! initialize() ──► spawn Orchestrator ──► wait for every unit's Ready
//!      │                                       │
//!      │ all ready                  startup timeout / spawn failure
//!      ▼                                       ▼
//!   running ◄──── submit() / workers()     torn down, PoolError::StartupFailure
//!      │
//! shutdown() ──► drain (ShuttingDown to every pending task) ──► stopped
//!      │
//!      └──► initialize() may start a fresh incarnation
//! ```
//!
//! ## Rules
//! - `initialize` is idempotent while running; `shutdown` is a no-op while stopped.
//! - `submit` only waits for admission, never for a free unit.
//! - `stats` is a synchronous read of the last published snapshot.
//! - Dropping the pool drains it like `shutdown` (without waiting).

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde_json::Value;
use tokio::sync::{Mutex, broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::config::PoolConfig;
use crate::error::{PoolError, RenderError};
use crate::events::{Bus, Event};
use crate::tasks::{IdGenerator, RenderTask, TaskHandle};

use super::orchestrator::{Command, Orchestrator};
use super::stats::{PoolStats, WorkerInfo};
use super::unit::Renderer;

/// Supervised pool of render execution units.
pub struct RenderPool {
    cfg: PoolConfig,
    renderer: Arc<dyn Renderer>,
    bus: Bus,
    ids: IdGenerator,
    stats: Arc<watch::Sender<PoolStats>>,
    /// Present while an orchestrator is running.
    commands: parking_lot::Mutex<Option<mpsc::UnboundedSender<Command>>>,
    /// Serializes `initialize` / `shutdown`; holds the running orchestrator.
    lifecycle: Mutex<Option<JoinHandle<()>>>,
    listener: Option<JoinHandle<()>>,
}

impl RenderPool {
    pub(crate) fn new_internal(
        cfg: PoolConfig,
        renderer: Arc<dyn Renderer>,
        bus: Bus,
        ids: IdGenerator,
        listener: Option<JoinHandle<()>>,
    ) -> Self {
        let (stats, _) = watch::channel(PoolStats::default());
        Self {
            cfg,
            renderer,
            bus,
            ids,
            stats: Arc::new(stats),
            commands: parking_lot::Mutex::new(None),
            lifecycle: Mutex::new(None),
            listener,
        }
    }

    /// Starts `worker_count` units and waits until every one is ready.
    ///
    /// Calling it on a running pool is a no-op. If any unit misses its startup
    /// window, every started unit is torn down and
    /// [`PoolError::StartupFailure`] is returned.
    pub async fn initialize(&self) -> Result<(), PoolError> {
        let mut life = self.lifecycle.lock().await;
        if self.is_running() {
            return Ok(());
        }
        if let Some(prev) = life.take() {
            let _ = prev.await;
        }
        self.cfg.validate()?;

        let (tx, rx) = mpsc::unbounded_channel();
        let (init_tx, init_rx) = oneshot::channel();
        let orchestrator = Orchestrator::new(
            self.cfg.clone(),
            Arc::clone(&self.renderer),
            self.bus.clone(),
            Arc::clone(&self.stats),
            rx,
            init_tx,
        );
        let join = tokio::spawn(orchestrator.run());

        match init_rx.await {
            Ok(Ok(())) => {
                *self.commands.lock() = Some(tx);
                *life = Some(join);
                Ok(())
            }
            Ok(Err(e)) => {
                drop(tx);
                let _ = join.await;
                Err(e)
            }
            Err(_) => {
                drop(tx);
                let _ = join.await;
                Err(PoolError::Closed)
            }
        }
    }

    /// True while an orchestrator accepts commands.
    pub fn is_running(&self) -> bool {
        self.commands
            .lock()
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Admits one render task.
    ///
    /// Returns the task's handle as soon as the task is assigned or queued.
    /// Fails immediately with [`RenderError::QueueFull`] when every unit is busy
    /// and the queue is at capacity, or [`RenderError::NotRunning`] before
    /// `initialize`.
    pub async fn submit(
        &self,
        template: impl Into<Arc<str>>,
        input: Value,
    ) -> Result<TaskHandle, RenderError> {
        let tx = self.commands.lock().clone().ok_or(RenderError::NotRunning)?;

        let (task, handle) = RenderTask::new(self.ids.next_id(), template, input);
        let (ack_tx, ack_rx) = oneshot::channel();
        tx.send(Command::Submit { task, ack: ack_tx })
            .map_err(|_| RenderError::ShuttingDown)?;

        ack_rx.await.unwrap_or(Err(RenderError::ShuttingDown))?;
        Ok(handle)
    }

    /// Submits and awaits the result.
    pub async fn render(
        &self,
        template: impl Into<Arc<str>>,
        input: Value,
    ) -> Result<Bytes, RenderError> {
        self.submit(template, input).await?.await
    }

    /// Last published snapshot. No side effects.
    pub fn stats(&self) -> PoolStats {
        self.stats.borrow().clone()
    }

    /// Per-unit diagnostics: live units plus recently retired ones.
    pub async fn workers(&self) -> Result<Vec<WorkerInfo>, PoolError> {
        let tx = self.commands.lock().clone().ok_or(PoolError::Closed)?;
        let (reply, rx) = oneshot::channel();
        tx.send(Command::Workers { reply })
            .map_err(|_| PoolError::Closed)?;
        rx.await.map_err(|_| PoolError::Closed)
    }

    /// Receiver of every event published after this call.
    pub fn events(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    pub fn config(&self) -> &PoolConfig {
        &self.cfg
    }

    /// Drains the pool: every queued and in-flight task resolves with
    /// [`RenderError::ShuttingDown`], every timer is cancelled and every unit
    /// terminated. Returns once that has happened.
    pub async fn shutdown(&self) -> Result<(), PoolError> {
        let mut life = self.lifecycle.lock().await;
        let Some(tx) = self.commands.lock().take() else {
            return Ok(());
        };

        let (done, done_rx) = oneshot::channel();
        if tx.send(Command::Shutdown { done }).is_ok() {
            let _ = done_rx.await;
        }
        drop(tx);

        match life.take() {
            Some(join) => join.await.map_err(|_| PoolError::Closed),
            None => Ok(()),
        }
    }

    /// Like [`shutdown`](Self::shutdown), but gives up after `grace`.
    pub async fn shutdown_with_grace(&self, grace: Duration) -> Result<(), PoolError> {
        tokio::time::timeout(grace, self.shutdown())
            .await
            .map_err(|_| PoolError::GraceExceeded { grace })?
    }
}

impl Drop for RenderPool {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}
