//! Shared in-memory task queue.
//!
//! Workers pop tasks in list order; each task is handed out exactly once.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::task::Task;

/// FIFO queue of tasks shared by all workers of a run.
#[derive(Debug, Default)]
pub struct TaskQueue {
    tasks: Mutex<VecDeque<Task>>,
}

impl TaskQueue {
    /// Creates a queue holding `tasks` in order.
    pub fn new(tasks: Vec<Task>) -> Self {
        Self {
            tasks: Mutex::new(tasks.into()),
        }
    }

    /// Takes the next task, if any.
    pub fn pop(&self) -> Option<Task> {
        self.lock().pop_front()
    }

    /// Number of tasks not yet handed out.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes and returns the ids of tasks never dispatched.
    pub fn drain_ids(&self) -> Vec<String> {
        self.lock().drain(..).map(|task| task.id).collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Task>> {
        // A worker panicking mid-pop cannot leave the deque inconsistent.
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str) -> Task {
        Task::with_command(id, "x", "true")
    }

    #[test]
    fn test_pop_in_order() {
        let queue = TaskQueue::new(vec![task("a"), task("b")]);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop().unwrap().id, "a");
        assert_eq!(queue.pop().unwrap().id, "b");
        assert!(queue.pop().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_drain_ids() {
        let queue = TaskQueue::new(vec![task("a"), task("b"), task("c")]);
        queue.pop();
        assert_eq!(queue.drain_ids(), vec!["b", "c"]);
        assert!(queue.is_empty());
    }
}
