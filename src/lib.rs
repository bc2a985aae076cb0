//! # rendervisor
//!
//! **Rendervisor** runs untrusted, possibly slow or crashing render jobs on a
//! bounded pool of isolated execution units, while the controlling process
//! stays responsive and recovers from unit failures on its own.
//!
//! The crate owns scheduling: a bounded FIFO queue, per-task timeouts, unit
//! restart on crash/timeout/error threshold and a draining shutdown. What a
//! template actually composes is opaque to it; units only call a [`Renderer`].
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   caller ──► RenderService ──validate──► RenderPool::submit(template, input)
//!                                                 │ Command::Submit
//!                                                 ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Orchestrator (one tokio task, owns all pool state)               │
//! │  - units: BTreeMap<WorkerId, Unit>     (Idle | Busy)              │
//! │  - queue: TaskQueue                    (bounded FIFO)             │
//! │  - active: HashMap<TaskId, Active>     (one per Busy unit)        │
//! │  - deadlines: DelayQueue<Deadline>     (task + startup timers)    │
//! └──────┬──────────────────┬──────────────────┬───────────────┬──────┘
//!        │ Request::Render  │                  │               │
//!        ▼                  ▼                  ▼               │
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   │
//!     │ render-unit-1│   │ render-unit-2│   │ render-unit-N│   │
//!     │  (OS thread) │   │  (OS thread) │   │  (OS thread) │   │
//!     └┬─────────────┘   └┬─────────────┘   └┬─────────────┘   │
//!      │ Ready / Success / Error / Exited    │                 │
//!      └──────────────► inbox ◄──────────────┘                 │
//!                                                              ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                     Bus (broadcast channel)                       │
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼
//!                         fan-out listener ──► SubscriberSet
//!                                         ┌─────────┼─────────┐
//!                                         ▼         ▼         ▼
//!                                     LogWriter   custom    custom
//! ```
//!
//! ### Task lifecycle
//! ```text
//! submit ──► idle unit?  ── yes ──► Assigned ──► Completed | Failed | TimedOut
//!               │ no
//!               ▼
//!          queue full? ── yes ──► QueueFull (immediate)
//!               │ no
//!               ▼
//!            Queued ──► (unit frees up) ──► Assigned ...
//!
//! shutdown: Queued | Assigned ──► ShuttingDown
//! ```
//!
//! ## Features
//! | Area              | Description                                               | Key types                                   |
//! |-------------------|-----------------------------------------------------------|---------------------------------------------|
//! | **Pool**          | Units, queue, timeouts, restarts, drain                   | [`RenderPool`], [`RenderPoolBuilder`]       |
//! | **Facade**        | Template registration, input validation, error classes    | [`RenderService`], [`ErrorClass`]           |
//! | **Templates**     | Explicit registry of schemas and render capabilities      | [`TemplateRegistry`], [`ObjectSchema`]      |
//! | **Tasks**         | Time-ordered ids, single-resolution handles               | [`TaskId`], [`TaskHandle`]                  |
//! | **Observability** | Events, subscribers, tracing writer, stats                | [`Event`], [`Subscribe`], [`PoolStats`]     |
//! | **Errors**        | Typed errors with stable labels                           | [`RenderError`], [`PoolError`]              |
//! | **Configuration** | TOML-loadable settings with humantime durations           | [`PoolConfig`], [`ServiceConfig`]           |
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use bytes::Bytes;
//! use serde_json::{Value, json};
//! use rendervisor::{PoolConfig, RenderPoolBuilder, Renderer};
//!
//! #[tokio::main(flavor = "multi_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut cfg = PoolConfig::default();
//!     cfg.worker_count = 2;
//!     cfg.task_timeout = Duration::from_secs(1);
//!
//!     let renderer: Arc<dyn Renderer> = Arc::new(|template: &str, input: &Value| {
//!         Ok::<_, String>(Bytes::from(format!("{template}:{input}")))
//!     });
//!     let pool = RenderPoolBuilder::new(cfg, renderer).build();
//!     pool.initialize().await?;
//!
//!     let bytes = pool.render("echo", json!({"n": 1})).await?;
//!     assert_eq!(&bytes[..], br#"echo:{"n":1}"#);
//!
//!     pool.shutdown().await?;
//!     Ok(())
//! }
//! ```

mod config;
mod core;
mod error;
mod events;
mod service;
mod subscribers;
mod tasks;
mod templates;

// ---- Public re-exports ----

pub use config::{MAX_TIMEOUT, PoolConfig, ServiceConfig};
pub use crate::core::shutdown::{ShutdownSignal, wait_for_shutdown_signal};
pub use crate::core::{
    PoolStats, RenderPool, RenderPoolBuilder, Renderer, WorkerId, WorkerInfo, WorkerStatus,
};
pub use error::{ConfigError, ErrorClass, PoolError, RenderError, SchemaError, ServiceError};
pub use events::{Bus, Event, EventKind};
pub use service::RenderService;
pub use subscribers::{LogWriter, Subscribe, SubscriberSet};
pub use tasks::{IdGenerator, RenderResult, RenderTask, TaskHandle, TaskId};
pub use templates::{FieldKind, InputSchema, ObjectSchema, Render, Template, TemplateRegistry};
