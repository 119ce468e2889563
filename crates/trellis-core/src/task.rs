//! Deferred task queue.
//!
//! Any thread may post a task; tasks run in posting order on the thread that
//! pumps the [`EventLoop`](crate::EventLoop). Worker threads use this to hand
//! results back to the UI thread.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::event_loop::HostCallback;

/// A unique identifier for a posted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

impl TaskId {
    /// Get the raw u64 value of this task ID.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

fn next_task_id() -> TaskId {
    TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
}

struct TaskData {
    id: TaskId,
    task: HostCallback,
}

/// Tasks waiting for the next pump.
pub(crate) struct TaskQueue {
    tasks: VecDeque<TaskData>,
}

impl TaskQueue {
    pub(crate) fn new() -> Self {
        Self {
            tasks: VecDeque::new(),
        }
    }

    pub(crate) fn post(&mut self, task: HostCallback) -> TaskId {
        let id = next_task_id();
        self.tasks.push_back(TaskData { id, task });
        id
    }

    /// Remove a pending task. Returns `false` if it already ran.
    pub(crate) fn cancel(&mut self, id: TaskId) -> bool {
        match self.tasks.iter().position(|t| t.id == id) {
            Some(pos) => {
                self.tasks.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Take the oldest pending task.
    pub(crate) fn pop(&mut self) -> Option<HostCallback> {
        self.tasks.pop_front().map(|t| t.task)
    }

    pub(crate) fn pending_count(&self) -> usize {
        self.tasks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_and_cancel() {
        let mut queue = TaskQueue::new();
        let first = queue.post(Box::new(|| Ok(())));
        let second = queue.post(Box::new(|| Err(crate::Error::Interrupted)));
        assert_ne!(first, second);
        assert_eq!(queue.pending_count(), 2);

        assert!(queue.cancel(first));
        assert!(!queue.cancel(first));

        let task = queue.pop().unwrap();
        assert!(task().unwrap_err().is_interrupted());
        assert!(queue.pop().is_none());
    }
}
