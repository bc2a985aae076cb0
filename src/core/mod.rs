//! Runtime core: the render pool and its supervised lifecycle.
//!
//! The public API from this module is [`RenderPool`] (built with
//! [`RenderPoolBuilder`]), the [`Renderer`] capability units call, and the
//! statistics types.
//!
//! Internal modules:
//! - [`orchestrator`]: single control sequence owning units, queue and deadlines;
//! - [`unit`]: execution unit threads and their handles;
//! - [`protocol`]: orchestrator ⇄ unit messages;
//! - [`queue`]: bounded FIFO with backpressure;
//! - [`stats`]: pool snapshot and per-unit diagnostics;
//! - [`shutdown`]: cross-platform termination signals.

mod builder;
mod orchestrator;
mod pool;
mod protocol;
mod queue;
pub mod shutdown;
mod stats;
mod unit;

pub use builder::RenderPoolBuilder;
pub use pool::RenderPool;
pub use protocol::WorkerId;
pub use stats::{PoolStats, WorkerInfo, WorkerStatus};
pub use unit::Renderer;
