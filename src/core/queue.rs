//! # Bounded FIFO of pending render tasks.
//!
//! The queue is the single backpressure signal: `push` on a full queue hands the
//! task straight back so the caller can reject it. No priorities, no reordering.

use std::collections::VecDeque;

use crate::tasks::RenderTask;

#[derive(Debug)]
pub(crate) struct TaskQueue {
    items: VecDeque<RenderTask>,
    capacity: usize,
}

impl TaskQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Appends a task, or returns it unchanged if the queue is at capacity.
    pub fn push(&mut self, task: RenderTask) -> Result<(), RenderTask> {
        if self.is_full() {
            return Err(task);
        }
        self.items.push_back(task);
        Ok(())
    }

    /// Removes the oldest task.
    pub fn pop(&mut self) -> Option<RenderTask> {
        self.items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Empties the queue, yielding tasks oldest first.
    pub fn drain(&mut self) -> impl Iterator<Item = RenderTask> + '_ {
        self.items.drain(..)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;
    use crate::tasks::TaskId;

    fn task(raw: u64) -> RenderTask {
        RenderTask::new(TaskId::from_raw(raw), "t", Value::Null).0
    }

    #[test]
    fn fifo_order_and_bound() {
        let mut q = TaskQueue::new(2);
        assert!(q.is_empty());
        q.push(task(1)).unwrap();
        q.push(task(2)).unwrap();
        assert!(q.is_full());

        let rejected = q.push(task(3)).unwrap_err();
        assert_eq!(rejected.id(), TaskId::from_raw(3));
        assert_eq!(q.len(), 2);

        assert_eq!(q.pop().map(|t| t.id()), Some(TaskId::from_raw(1)));
        q.push(task(4)).unwrap();
        let rest: Vec<u64> = q.drain().map(|t| t.id().as_u64()).collect();
        assert_eq!(rest, vec![2, 4]);
        assert!(q.pop().is_none());
    }

    #[test]
    fn zero_capacity_rejects_everything() {
        let mut q = TaskQueue::new(0);
        assert_eq!(q.capacity(), 0);
        assert!(q.push(task(1)).is_err());
    }
}
