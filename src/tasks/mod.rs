//! # Render tasks.
//!
//! - [`TaskId`] / [`IdGenerator`] - time-ordered, collision-free task identifiers
//! - [`RenderTask`] - one render request plus its result channel
//! - [`TaskHandle`] - the caller's side of that channel (a `Future`)

mod id;
mod task;

pub use id::{IdGenerator, TaskId};
pub use task::{RenderResult, RenderTask, TaskHandle};
