//! Shared queue of states waiting to be explored
//!
//! A FIFO guarded by one mutex, with a condition variable for idle workers.
//! Besides plain enqueue/dequeue the queue tracks how many workers are in the
//! middle of exploring a state, which gives two things:
//!
//! - **Completion**: the run is finished when the queue is empty and no worker
//!   is active (an active worker may still enqueue successors)
//! - **Suspension**: `suspend_all` stops handing out states and waits for
//!   every active worker to finish, so a checkpoint sees a consistent queue.
//!   Suspensions nest: a checkpoint taken while the user holds the queue
//!   suspended leaves it suspended afterwards

use crate::fingerprint::Fingerprint;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A state waiting to be explored
#[derive(Debug, Clone)]
pub struct StateTask<S> {
    /// The state itself
    pub state: S,

    /// Its fingerprint
    pub fp: Fingerprint,

    /// Length of the behavior reaching it (initial states are at depth 1)
    pub depth: u32,
}

impl<S> StateTask<S> {
    pub fn new(state: S, fp: Fingerprint, depth: u32) -> Self {
        Self { state, fp, depth }
    }
}

/// Statistics for the state queue
#[derive(Debug, Default)]
pub struct QueueStats {
    /// Total tasks enqueued
    pub enqueued: AtomicU64,

    /// Total tasks dequeued
    pub dequeued: AtomicU64,
}

impl QueueStats {
    /// Tasks currently waiting
    pub fn pending(&self) -> u64 {
        self.enqueued
            .load(Ordering::Relaxed)
            .saturating_sub(self.dequeued.load(Ordering::Relaxed))
    }
}

struct Inner<S> {
    tasks: VecDeque<StateTask<S>>,
    active: usize,
    /// Outstanding `suspend_all` calls
    suspended: usize,
    closed: bool,
}

/// FIFO of unexplored states shared by all workers
pub struct StateQueue<S> {
    inner: Mutex<Inner<S>>,
    changed: Condvar,
    stats: Arc<QueueStats>,
}

impl<S: Clone> StateQueue<S> {
    /// Create a queue reporting into `stats`
    pub fn new(stats: Arc<QueueStats>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                tasks: VecDeque::new(),
                active: 0,
                suspended: 0,
                closed: false,
            }),
            changed: Condvar::new(),
            stats,
        }
    }

    /// Append a task
    pub fn enqueue(&self, task: StateTask<S>) {
        self.inner.lock().tasks.push_back(task);
        self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
        self.changed.notify_one();
    }

    /// Take the next task, waiting at most `timeout` for one
    ///
    /// The returned guard marks the caller active until dropped. Returns
    /// `None` on timeout, while suspended, or once the queue is closed.
    pub fn dequeue(&self, timeout: Duration) -> Option<(StateTask<S>, WorkGuard<'_, S>)> {
        let mut inner = self.inner.lock();
        loop {
            if inner.closed {
                return None;
            }
            if inner.suspended == 0 {
                if let Some(task) = inner.tasks.pop_front() {
                    inner.active += 1;
                    self.stats.dequeued.fetch_add(1, Ordering::Relaxed);
                    return Some((task, WorkGuard { queue: self }));
                }
            }
            if self.changed.wait_for(&mut inner, timeout).timed_out() {
                return None;
            }
        }
    }

    fn end_work(&self) {
        let mut inner = self.inner.lock();
        inner.active -= 1;
        let idle = inner.active == 0;
        drop(inner);
        if idle {
            self.changed.notify_all();
        }
    }

    /// Check if all work is complete
    ///
    /// Work is complete when:
    /// 1. Queue is empty
    /// 2. No worker is actively exploring a state
    /// 3. The queue is not suspended
    pub fn is_complete(&self) -> bool {
        let inner = self.inner.lock();
        inner.tasks.is_empty() && inner.active == 0 && inner.suspended == 0
    }

    /// Stop handing out tasks and wait until no worker is active
    ///
    /// Each call must be matched by one `resume_all`.
    pub fn suspend_all(&self) {
        let mut inner = self.inner.lock();
        inner.suspended += 1;
        while inner.active > 0 {
            self.changed.wait(&mut inner);
        }
    }

    /// Undo one `suspend_all`; tasks flow again once none is outstanding
    pub fn resume_all(&self) {
        let mut inner = self.inner.lock();
        inner.suspended = inner.suspended.saturating_sub(1);
        let resumed = inner.suspended == 0;
        drop(inner);
        if resumed {
            self.changed.notify_all();
        }
    }

    pub fn is_suspended(&self) -> bool {
        self.inner.lock().suspended > 0
    }

    /// Wake every waiting worker and refuse further dequeues
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        inner.suspended = 0;
        drop(inner);
        self.changed.notify_all();
    }

    /// Copy of every waiting task, in queue order
    pub fn snapshot(&self) -> Vec<StateTask<S>> {
        self.inner.lock().tasks.iter().cloned().collect()
    }

    /// Get current queue length
    pub fn len(&self) -> usize {
        self.inner.lock().tasks.len()
    }

    /// Check if the queue is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get queue statistics
    pub fn stats(&self) -> Arc<QueueStats> {
        Arc::clone(&self.stats)
    }
}

/// RAII guard marking a worker active while it explores a state
pub struct WorkGuard<'a, S: Clone> {
    queue: &'a StateQueue<S>,
}

impl<S: Clone> Drop for WorkGuard<'_, S> {
    fn drop(&mut self) {
        self.queue.end_work();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    fn queue() -> StateQueue<u32> {
        StateQueue::new(Arc::new(QueueStats::default()))
    }

    #[test]
    fn test_queue_fifo() {
        let queue = queue();
        queue.enqueue(StateTask::new(1, Fingerprint(1), 1));
        queue.enqueue(StateTask::new(2, Fingerprint(2), 1));
        assert_eq!(queue.len(), 2);

        let (task, _guard) = queue.dequeue(Duration::from_millis(10)).unwrap();
        assert_eq!(task.state, 1);
        assert_eq!(queue.stats().pending(), 1);
    }

    #[test]
    fn test_queue_completion() {
        let queue = queue();
        assert!(queue.is_complete());

        queue.enqueue(StateTask::new(7, Fingerprint(7), 1));
        assert!(!queue.is_complete());

        {
            let (_task, _guard) = queue.dequeue(Duration::from_millis(10)).unwrap();
            // Empty but a worker is still active
            assert!(queue.is_empty());
            assert!(!queue.is_complete());
        }

        assert!(queue.is_complete());
    }

    #[test]
    fn test_dequeue_times_out() {
        let queue = queue();
        let start = Instant::now();
        assert!(queue.dequeue(Duration::from_millis(20)).is_none());
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_suspend_blocks_dequeue() {
        let queue = queue();
        queue.enqueue(StateTask::new(1, Fingerprint(1), 1));
        queue.suspend_all();
        assert!(queue.is_suspended());
        assert!(!queue.is_complete());
        assert!(queue.dequeue(Duration::from_millis(10)).is_none());

        queue.resume_all();
        assert!(queue.dequeue(Duration::from_millis(10)).is_some());
    }

    #[test]
    fn test_nested_suspensions() {
        let queue = queue();
        queue.enqueue(StateTask::new(1, Fingerprint(1), 1));

        // A checkpoint inside a user suspension
        queue.suspend_all();
        queue.suspend_all();
        queue.resume_all();
        assert!(queue.is_suspended());
        assert!(queue.dequeue(Duration::from_millis(10)).is_none());

        queue.resume_all();
        assert!(!queue.is_suspended());
        assert!(queue.dequeue(Duration::from_millis(10)).is_some());

        // Unmatched resumes are ignored
        queue.resume_all();
        assert!(!queue.is_suspended());
    }

    #[test]
    fn test_suspend_waits_for_active_workers() {
        let queue = Arc::new(queue());
        queue.enqueue(StateTask::new(1, Fingerprint(1), 1));

        let (started_tx, started_rx) = crossbeam_channel::bounded(1);
        let worker = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let (_task, _guard) = queue.dequeue(Duration::from_secs(1)).unwrap();
                started_tx.send(()).unwrap();
                thread::sleep(Duration::from_millis(50));
                queue.enqueue(StateTask::new(2, Fingerprint(2), 2));
            })
        };

        started_rx.recv().unwrap();
        queue.suspend_all();
        // The successor enqueued by the active worker is visible
        assert_eq!(queue.snapshot().len(), 1);
        queue.resume_all();
        worker.join().unwrap();
    }

    #[test]
    fn test_close_wakes_waiters() {
        let queue = Arc::new(queue());
        let waiter = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.dequeue(Duration::from_secs(10)).is_none())
        };
        thread::sleep(Duration::from_millis(20));
        queue.close();
        assert!(waiter.join().unwrap());
    }
}
