//! FIFO task queue with enqueue notification
//!
//! The queue preserves insertion order; priority never reorders it. A
//! `Notify` wakes the owning worker as soon as a task lands, so an idle
//! worker does not poll.

use corr_core::Task;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::Notify;

/// FIFO queue owned by exactly one agent
#[derive(Default)]
pub struct TaskQueue {
    inner: Mutex<VecDeque<Task>>,
    notify: Notify,
}

impl TaskQueue {
    /// Create a new empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a task at the tail and wake the worker
    pub fn push(&self, task: Task) {
        self.inner.lock().unwrap().push_back(task);
        self.notify.notify_one();
    }

    /// Pop the head of the queue
    pub fn pop(&self) -> Option<Task> {
        self.inner.lock().unwrap().pop_front()
    }

    /// Put a not-yet-due task back at the tail without waking the worker
    ///
    /// The worker retries on its poll interval; notifying here would spin the
    /// loop while the head task's `scheduled_at` is still in the future.
    pub fn requeue(&self, task: Task) {
        self.inner.lock().unwrap().push_back(task);
    }

    /// Current queue depth
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    /// Whether the queue is empty
    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }

    /// Wait until a task is pushed
    pub async fn notified(&self) {
        self.notify.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corr_core::{TaskPayload, TaskPriority};

    #[test]
    fn test_fifo_order() {
        let queue = TaskQueue::new();
        queue.push(Task::new("first", TaskPayload::Cleanup, TaskPriority::Low));
        queue.push(Task::new("second", TaskPayload::Cleanup, TaskPriority::Critical));

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop().unwrap().name, "first");
        assert_eq!(queue.pop().unwrap().name, "second");
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_requeue_lands_at_tail() {
        let queue = TaskQueue::new();
        queue.push(Task::new("head", TaskPayload::Cleanup, TaskPriority::Medium));
        queue.push(Task::new("tail", TaskPayload::Cleanup, TaskPriority::Medium));

        let head = queue.pop().unwrap();
        queue.requeue(head);

        assert_eq!(queue.pop().unwrap().name, "tail");
        assert_eq!(queue.pop().unwrap().name, "head");
    }

    #[tokio::test]
    async fn test_push_wakes_waiter() {
        let queue = std::sync::Arc::new(TaskQueue::new());

        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move {
                queue.notified().await;
                queue.pop()
            })
        };

        queue.push(Task::new("t", TaskPayload::Cleanup, TaskPriority::Medium));
        let popped = waiter.await.unwrap();
        assert_eq!(popped.unwrap().name, "t");
    }
}
