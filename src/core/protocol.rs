//! # Orchestrator ⇄ execution unit messages.
//!
//! ```text
//! orchestrator ── Request::Render ──► unit
//! orchestrator ◄── Response::Ready ─── unit   (once, before any task)
//! orchestrator ◄── Response::Success | Response::Error ── unit  (one per task)
//! orchestrator ◄── UnitEvent::Exited ─ unit   (thread is leaving, always last)
//! ```
//!
//! Input is cloned into the request; result bytes are moved back. Nothing is shared.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;

use crate::tasks::TaskId;

/// Identifier of one execution unit. Never reused within a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(pub(crate) u64);

impl WorkerId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit-{}", self.0)
    }
}

/// Orchestrator → unit.
#[derive(Debug)]
pub(crate) enum Request {
    Render {
        task_id: TaskId,
        template: Arc<str>,
        input: Value,
    },
}

/// Unit → orchestrator.
#[derive(Debug)]
pub(crate) enum Response {
    Ready,
    Success {
        task_id: TaskId,
        bytes: Bytes,
        duration_ms: u64,
    },
    Error {
        task_id: TaskId,
        message: String,
    },
}

/// Everything a unit thread can tell the orchestrator.
#[derive(Debug)]
pub(crate) enum UnitEvent {
    Message(Response),
    /// The unit thread is exiting. `reason` is `None` for a clean exit (request
    /// channel closed) and describes the failure otherwise.
    Exited { reason: Option<String> },
}

/// A [`UnitEvent`] tagged with its sender.
#[derive(Debug)]
pub(crate) struct Envelope {
    pub worker: WorkerId,
    pub event: UnitEvent,
}

impl Envelope {
    pub fn message(worker: WorkerId, msg: Response) -> Self {
        Self {
            worker,
            event: UnitEvent::Message(msg),
        }
    }
}
