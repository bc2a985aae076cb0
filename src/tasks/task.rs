//! # Render task record and its completion handle.
//!
//! A [`RenderTask`] is created by [`RenderPool::submit`](crate::RenderPool::submit)
//! and owned by the orchestrator until it is resolved. Its caller keeps the
//! matching [`TaskHandle`], a future that yields the single resolution.
//!
//! ```text
//! Queued ──► Assigned ──► Completed | Failed | TimedOut
//!    └────────────────────► Failed(ShuttingDown)
//! ```
//!
//! ## Rules
//! - Exactly one resolution is delivered; `resolve` consumes the task.
//! - A task never re-enters the queue.
//! - Dropping the handle does not cancel the task; the result is discarded.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use bytes::Bytes;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::RenderError;

use super::id::TaskId;

/// Outcome of one render task.
pub type RenderResult = Result<Bytes, RenderError>;

/// Immutable description of one render request plus its result channel.
#[derive(Debug)]
pub struct RenderTask {
    id: TaskId,
    template: Arc<str>,
    input: Value,
    created_at: Instant,
    reply: oneshot::Sender<RenderResult>,
}

impl RenderTask {
    /// Creates a task and the handle its caller awaits.
    pub fn new(id: TaskId, template: impl Into<Arc<str>>, input: Value) -> (Self, TaskHandle) {
        let (tx, rx) = oneshot::channel();
        let task = Self {
            id,
            template: template.into(),
            input,
            created_at: Instant::now(),
            reply: tx,
        };
        (task, TaskHandle { id, rx })
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn template(&self) -> &Arc<str> {
        &self.template
    }

    pub fn input(&self) -> &Value {
        &self.input
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Moves the input out for hand-off to an execution unit, leaving `Null`.
    pub(crate) fn take_input(&mut self) -> Value {
        std::mem::take(&mut self.input)
    }

    /// Delivers the single resolution.
    ///
    /// Returns `false` if the caller already dropped its handle.
    pub fn resolve(self, result: RenderResult) -> bool {
        self.reply.send(result).is_ok()
    }

    /// Shorthand for `resolve(Err(err))`.
    pub fn fail(self, err: RenderError) -> bool {
        self.resolve(Err(err))
    }
}

/// Future resolving to the rendered bytes or a typed [`RenderError`].
///
/// If the orchestrator vanishes without resolving the task, the handle yields
/// [`RenderError::ShuttingDown`].
#[derive(Debug)]
#[must_use = "a task handle does nothing unless awaited"]
pub struct TaskHandle {
    id: TaskId,
    rx: oneshot::Receiver<RenderResult>,
}

impl TaskHandle {
    /// Id of the task this handle belongs to.
    pub fn id(&self) -> TaskId {
        self.id
    }
}

impl Future for TaskHandle {
    type Output = RenderResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.unwrap_or(Err(RenderError::ShuttingDown)))
    }
}
