//! Fixed-size worker pool for zero-argument tasks.
//!
//! Tasks run in FIFO dequeue order on named OS threads. A panicking task is
//! caught at the execution boundary so the worker keeps serving the queue.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use thiserror::Error;
use tracing::{debug, error, warn};

pub type Task = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("task pool is stopped")]
    Stopped,
}

struct Queue {
    tasks: VecDeque<Task>,
    stopped: bool,
}

struct Shared {
    queue: Mutex<Queue>,
    available: Condvar,
    // Queued plus executing tasks. Lock order is always queue -> active.
    active: Mutex<usize>,
    idle: Condvar,
    panicked: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn next_task(&self) -> Option<Task> {
        let guard = lock(&self.queue);
        let mut queue = self
            .available
            .wait_while(guard, |q| q.tasks.is_empty() && !q.stopped)
            .unwrap_or_else(PoisonError::into_inner);
        if queue.stopped {
            return None;
        }
        queue.tasks.pop_front()
    }

    fn run(&self, task: Task) {
        if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
            self.panicked.fetch_add(1, Ordering::Relaxed);
            error!(
                thread = thread::current().name().unwrap_or("worker"),
                "task panicked; worker continues"
            );
        }
        self.finish(1);
    }

    fn finish(&self, count: usize) {
        let mut active = lock(&self.active);
        *active = active.saturating_sub(count);
        if *active == 0 {
            self.idle.notify_all();
        }
    }
}

fn worker_loop(shared: Arc<Shared>) {
    while let Some(task) = shared.next_task() {
        shared.run(task);
    }
}

pub struct TaskPool {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl TaskPool {
    /// Spawns `workers` threads (at least one). Failing to spawn any of them
    /// tears down the ones already started.
    pub fn new(workers: usize) -> Result<Self, PoolError> {
        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue {
                tasks: VecDeque::new(),
                stopped: false,
            }),
            available: Condvar::new(),
            active: Mutex::new(0),
            idle: Condvar::new(),
            panicked: AtomicUsize::new(0),
        });

        let mut pool = TaskPool {
            shared,
            workers: Vec::with_capacity(workers.max(1)),
        };

        for index in 0..workers.max(1) {
            let shared = Arc::clone(&pool.shared);
            let spawned = thread::Builder::new()
                .name(format!("procman-worker-{index}"))
                .spawn(move || worker_loop(shared));
            match spawned {
                Ok(handle) => pool.workers.push(handle),
                // Dropping the partial pool stops and joins what was spawned.
                Err(err) => return Err(PoolError::Spawn(err)),
            }
        }

        debug!(workers = pool.workers.len(), "task pool started");
        Ok(pool)
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Enqueues a task without blocking.
    pub fn submit<F>(&self, task: F) -> Result<(), PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut queue = lock(&self.shared.queue);
        if queue.stopped {
            warn!("task submitted to a stopped pool");
            return Err(PoolError::Stopped);
        }
        *lock(&self.shared.active) += 1;
        queue.tasks.push_back(Box::new(task));
        drop(queue);
        self.shared.available.notify_one();
        Ok(())
    }

    /// Closes the pool. Tasks already dequeued run to completion; queued ones
    /// are discarded. Safe to call repeatedly.
    pub fn stop(&self) {
        let mut queue = lock(&self.shared.queue);
        if queue.stopped {
            return;
        }
        queue.stopped = true;
        let discarded = std::mem::take(&mut queue.tasks);
        if !discarded.is_empty() {
            self.shared.finish(discarded.len());
        }
        drop(queue);
        self.shared.available.notify_all();

        if !discarded.is_empty() {
            debug!(count = discarded.len(), "discarded queued tasks on stop");
        }
    }

    pub fn is_stopped(&self) -> bool {
        lock(&self.shared.queue).stopped
    }

    /// Blocks until no task is queued or executing.
    ///
    /// Calling this from one of the pool's own workers would wait on itself,
    /// so that case is logged and returns immediately.
    pub fn wait_idle(&self) {
        if self.is_worker_thread() {
            warn!("wait_idle called from a pool worker; skipping join");
            return;
        }
        let active = lock(&self.shared.active);
        let _idle = self
            .shared
            .idle
            .wait_while(active, |count| *count > 0)
            .unwrap_or_else(PoisonError::into_inner);
    }

    pub fn active_tasks(&self) -> usize {
        *lock(&self.shared.active)
    }

    pub fn panicked_tasks(&self) -> usize {
        self.shared.panicked.load(Ordering::Relaxed)
    }

    pub fn is_worker_thread(&self) -> bool {
        let current = thread::current().id();
        self.workers.iter().any(|h| h.thread().id() == current)
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        self.stop();
        let current = thread::current().id();
        for handle in self.workers.drain(..) {
            // The last owner may be a task running on one of our own workers.
            if handle.thread().id() == current {
                continue;
            }
            let _ = handle.join();
        }
    }
}
