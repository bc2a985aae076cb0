//! # Pool statistics and per-unit diagnostics.
//!
//! [`PoolStats`] is recomputed by the orchestrator after every state change and
//! published through a `watch` channel, so reading it never touches pool state.
//! Counters move in the same step as the transition that produced them.

use std::time::SystemTime;

use serde::Serialize;

use crate::tasks::TaskId;

use super::protocol::WorkerId;

/// Point-in-time snapshot of the pool.
///
/// `idle_workers + busy_workers == total_workers` always holds; units still
/// completing their handshake are counted in `starting_workers` only.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PoolStats {
    pub total_workers: usize,
    pub idle_workers: usize,
    pub busy_workers: usize,
    pub starting_workers: usize,
    /// Retired units whose thread is still running (a render that never returned).
    pub stuck_workers: usize,
    pub queued_tasks: usize,
    pub active_tasks: usize,
    pub completed_tasks: u64,
    pub failed_tasks: u64,
    /// `total render time / completed_tasks`, in milliseconds.
    pub average_task_duration_ms: f64,
    /// Mean time from submission to assignment, in milliseconds.
    pub average_queue_wait_ms: f64,
}

/// Status of one execution unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Idle,
    Busy,
    Errored,
    Terminated,
}

impl WorkerStatus {
    pub fn as_label(&self) -> &'static str {
        match self {
            WorkerStatus::Idle => "idle",
            WorkerStatus::Busy => "busy",
            WorkerStatus::Errored => "errored",
            WorkerStatus::Terminated => "terminated",
        }
    }
}

/// Diagnostics for one live execution unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerInfo {
    pub id: u64,
    pub status: WorkerStatus,
    /// Base36 id of the task being rendered, if busy.
    pub current_task: Option<String>,
    pub tasks_completed: u64,
    pub errors_count: u32,
    #[serde(with = "humantime_serde")]
    pub created_at: SystemTime,
    #[serde(with = "humantime_serde")]
    pub last_active_at: SystemTime,
}

impl WorkerInfo {
    pub(crate) fn new(
        id: WorkerId,
        status: WorkerStatus,
        current_task: Option<TaskId>,
        tasks_completed: u64,
        errors_count: u32,
        created_at: SystemTime,
        last_active_at: SystemTime,
    ) -> Self {
        Self {
            id: id.as_u64(),
            status,
            current_task: current_task.map(|t| t.to_string()),
            tasks_completed,
            errors_count,
            created_at,
            last_active_at,
        }
    }
}

/// Running totals kept by the orchestrator across the pool's lifetime.
#[derive(Debug, Default, Clone)]
pub(crate) struct Counters {
    pub completed: u64,
    pub failed: u64,
    pub total_duration_ms: u64,
    pub assigned: u64,
    pub total_wait_ms: u64,
}

impl Counters {
    pub fn average_duration_ms(&self) -> f64 {
        if self.completed == 0 {
            0.0
        } else {
            self.total_duration_ms as f64 / self.completed as f64
        }
    }

    pub fn average_wait_ms(&self) -> f64 {
        if self.assigned == 0 {
            0.0
        } else {
            self.total_wait_ms as f64 / self.assigned as f64
        }
    }
}
