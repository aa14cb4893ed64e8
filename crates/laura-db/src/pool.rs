//! A bounded task queue with N worker threads, used for background
//! maintenance (TTL cleanup, cursor reaping).
//!
//! Built around an `AtomicBool` shutdown flag, generalized from one fixed
//! background loop into a bounded MPMC queue of boxed closures so
//! `Database` can submit arbitrary maintenance tasks from one place.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

pub const DEFAULT_QUEUE_SIZE: usize = 100;
pub const DEFAULT_NUM_WORKERS: usize = 4;

type Task = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Clone, Copy, Default)]
pub struct PoolStats {
    pub num_workers: usize,
    pub queued_tasks: usize,
    pub tasks_total: u64,
    pub tasks_active: u64,
    pub tasks_done: u64,
}

struct Shared {
    sender: SyncSender<Task>,
    shutting_down: AtomicBool,
    queue_size: usize,
    num_workers: usize,
    tasks_total: AtomicU64,
    tasks_active: AtomicU64,
    tasks_done: AtomicU64,
}

/// Bounded worker pool. `num_workers` threads pull tasks off
/// a capacity-`queue_size` channel until shut down.
pub struct WorkerPool {
    shared: Arc<Shared>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(num_workers: usize, queue_size: usize) -> Self {
        let num_workers = num_workers.max(1);
        let (sender, receiver) = mpsc::sync_channel::<Task>(queue_size);
        let shared = Arc::new(Shared {
            sender,
            shutting_down: AtomicBool::new(false),
            queue_size,
            num_workers,
            tasks_total: AtomicU64::new(0),
            tasks_active: AtomicU64::new(0),
            tasks_done: AtomicU64::new(0),
        });
        let receiver = Arc::new(Mutex::new(receiver));
        let mut handles = Vec::with_capacity(num_workers);
        for _ in 0..num_workers {
            let receiver = receiver.clone();
            let shared = shared.clone();
            handles.push(thread::spawn(move || worker_loop(receiver, shared)));
        }
        WorkerPool { shared, handles: Mutex::new(handles) }
    }

    /// Non-blocking submission: fails (returns `false`) if the queue is
    /// full or the pool is shutting down.
    pub fn submit(&self, task: impl FnOnce() + Send + 'static) -> bool {
        if self.shared.shutting_down.load(Ordering::SeqCst) {
            return false;
        }
        match self.shared.sender.try_send(Box::new(task)) {
            Ok(()) => {
                self.shared.tasks_total.fetch_add(1, Ordering::SeqCst);
                true
            }
            Err(TrySendError::Full(_)) => false,
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Blocking submission: waits for queue space. Fails only if the pool
    /// is shutting down.
    pub fn submit_blocking(&self, task: impl FnOnce() + Send + 'static) -> bool {
        if self.shared.shutting_down.load(Ordering::SeqCst) {
            return false;
        }
        if self.shared.sender.send(Box::new(task)).is_err() {
            return false;
        }
        self.shared.tasks_total.fetch_add(1, Ordering::SeqCst);
        true
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shared.shutting_down.load(Ordering::SeqCst)
    }

    pub fn is_full(&self) -> bool {
        self.queued_tasks() >= self.shared.queue_size
    }

    fn queued_tasks(&self) -> usize {
        let total = self.shared.tasks_total.load(Ordering::SeqCst);
        let active = self.shared.tasks_active.load(Ordering::SeqCst);
        let done = self.shared.tasks_done.load(Ordering::SeqCst);
        total.saturating_sub(active + done) as usize
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            num_workers: self.shared.num_workers,
            queued_tasks: self.queued_tasks(),
            tasks_total: self.shared.tasks_total.load(Ordering::SeqCst),
            tasks_active: self.shared.tasks_active.load(Ordering::SeqCst),
            tasks_done: self.shared.tasks_done.load(Ordering::SeqCst),
        }
    }

    /// Signals workers to stop once the queue drains; in-flight tasks
    /// finish, but no new submissions are accepted. Does not block.
    pub fn shutdown(&self) {
        self.shared.shutting_down.store(true, Ordering::SeqCst);
    }

    /// Shuts down and blocks until every worker has drained the queue and
    /// exited.
    pub fn shutdown_and_drain(&mut self) {
        self.shutdown();
        for handle in self.handles.lock().unwrap().drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_loop(receiver: Arc<Mutex<Receiver<Task>>>, shared: Arc<Shared>) {
    loop {
        let task = {
            let guard = receiver.lock().unwrap();
            guard.recv_timeout(std::time::Duration::from_millis(50))
        };
        match task {
            Ok(task) => {
                shared.tasks_active.fetch_add(1, Ordering::SeqCst);
                task();
                shared.tasks_active.fetch_sub(1, Ordering::SeqCst);
                shared.tasks_done.fetch_add(1, Ordering::SeqCst);
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if shared.shutting_down.load(Ordering::SeqCst) {
                    break;
                }
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        WorkerPool::new(DEFAULT_NUM_WORKERS, DEFAULT_QUEUE_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn submit_runs_task() {
        let pool = WorkerPool::new(2, 10);
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        assert!(pool.submit(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        thread::sleep(Duration::from_millis(100));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn shutdown_then_submit_fails() {
        let mut pool = WorkerPool::new(1, 10);
        pool.shutdown();
        assert!(!pool.submit(|| {}));
        pool.shutdown_and_drain();
        assert!(pool.is_shutting_down());
    }

    #[test]
    fn stats_reflect_submitted_and_completed() {
        let pool = WorkerPool::new(2, 10);
        for _ in 0..5 {
            pool.submit(|| {
                thread::sleep(Duration::from_millis(10));
            });
        }
        thread::sleep(Duration::from_millis(300));
        let stats = pool.stats();
        assert_eq!(stats.tasks_total, 5);
        assert_eq!(stats.tasks_done, 5);
        assert_eq!(stats.num_workers, 2);
    }
}
