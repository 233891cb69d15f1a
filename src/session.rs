//! Interactive monitoring session.
//!
//! `start` arms the usage sampler, hands its two refresh loops, a display
//! loop and a stop listener to the session's pool, then blocks the caller
//! until the session is stopped. State is guarded by one mutex and every
//! pool task re-checks it under that mutex.
//!
//! A stopped session passes through `Stopping` until its tasks have drained,
//! so a new `start` can never revive tasks from the previous run.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::input::{LineEvent, LineSource};
use crate::pool::{PoolError, TaskPool};
use crate::system::sampler::{SystemSample, UsageSampler};

/// Tasks a running session keeps busy at once: cpu loop, memory loop,
/// display loop and stop listener.
pub const SESSION_TASKS: usize = 4;
pub const DEFAULT_WORKERS: usize = SESSION_TASKS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    /// Stop requested; the session's tasks are still winding down.
    Stopping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The session ran and has returned to idle.
    Completed,
    /// Another session was active; nothing was launched.
    AlreadyRunning,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("monitoring task pool failed: {0}")]
    Pool(#[from] PoolError),
}

/// Receives each sample the display loop reads.
pub trait SampleSink: Send + Sync {
    fn begin(&self) {}
    fn render(&self, sample: &SystemSample);
    fn finish(&self) {}
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub workers: usize,
    pub display_interval: Duration,
    pub input_poll: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions {
            workers: DEFAULT_WORKERS,
            display_interval: Duration::from_secs(1),
            input_poll: Duration::from_millis(200),
        }
    }
}

struct Shared {
    state: Mutex<SessionState>,
    changed: Condvar,
    sampler: Arc<UsageSampler>,
    input: Arc<dyn LineSource>,
    sink: Arc<dyn SampleSink>,
    display_interval: Duration,
    input_poll: Duration,
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_running(&self) -> bool {
        *self.lock_state() == SessionState::Running
    }

    /// Moves a running session to `Stopping` and wakes the blocked starter.
    /// Idempotent.
    fn request_stop(&self) {
        let mut state = self.lock_state();
        let was_running = *state == SessionState::Running;
        if was_running {
            *state = SessionState::Stopping;
        }
        self.sampler.stop();
        drop(state);
        self.changed.notify_all();
        if was_running {
            info!("stopping resource monitoring");
        }
    }

    fn set_idle(&self) {
        *self.lock_state() = SessionState::Idle;
        self.changed.notify_all();
    }

    /// Waits up to `interval` for a state change; returns whether still
    /// running.
    fn pause(&self, interval: Duration) -> bool {
        let state = self.lock_state();
        let (state, _) = self
            .changed
            .wait_timeout_while(state, interval, |s| *s == SessionState::Running)
            .unwrap_or_else(PoisonError::into_inner);
        *state == SessionState::Running
    }

    fn display_loop(&self) {
        self.sink.begin();
        while self.is_running() {
            self.sink.render(&self.sampler.sample());
            if !self.pause(self.display_interval) {
                break;
            }
        }
        self.sink.finish();
    }

    fn listen_for_stop(&self) {
        while self.is_running() {
            match self.input.next_line(Some(self.input_poll)) {
                LineEvent::Timeout => continue,
                LineEvent::Line(_) => {
                    debug!("stop requested from input");
                    self.request_stop();
                }
                LineEvent::Closed => {
                    debug!("input closed during monitoring");
                    self.request_stop();
                }
            }
        }
    }
}

pub struct MonitoringSession {
    shared: Arc<Shared>,
    pool: TaskPool,
}

impl MonitoringSession {
    pub fn new(
        sampler: Arc<UsageSampler>,
        input: Arc<dyn LineSource>,
        sink: Arc<dyn SampleSink>,
        options: SessionOptions,
    ) -> Result<Self, PoolError> {
        // Fewer workers than session tasks would leave the stop listener
        // queued behind loops that never end.
        let workers = options.workers.max(SESSION_TASKS);
        if workers != options.workers {
            warn!(
                requested = options.workers,
                workers, "raising monitoring worker count to fit every session task"
            );
        }
        let pool = TaskPool::new(workers)?;
        let shared = Arc::new(Shared {
            state: Mutex::new(SessionState::Idle),
            changed: Condvar::new(),
            sampler,
            input,
            sink,
            display_interval: options.display_interval,
            input_poll: options.input_poll,
        });
        Ok(MonitoringSession { shared, pool })
    }

    pub fn state(&self) -> SessionState {
        *self.shared.lock_state()
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    pub fn workers(&self) -> usize {
        self.pool.size()
    }

    pub fn sampler(&self) -> &Arc<UsageSampler> {
        &self.shared.sampler
    }

    /// Runs one session, blocking until it is stopped from input or by
    /// `stop`. A call made while a session is active returns
    /// `AlreadyRunning` without side effects; a call made while the previous
    /// session is still winding down waits for it first.
    pub fn start(&self) -> Result<SessionOutcome, SessionError> {
        let state = self.shared.lock_state();
        let mut state = self
            .shared
            .changed
            .wait_while(state, |s| *s == SessionState::Stopping)
            .unwrap_or_else(PoisonError::into_inner);
        if *state == SessionState::Running {
            warn!("attempted to start monitoring, but it is already running");
            return Ok(SessionOutcome::AlreadyRunning);
        }
        *state = SessionState::Running;
        info!("starting resource monitoring");

        if let Err(err) = self.launch() {
            *state = SessionState::Stopping;
            self.shared.sampler.stop();
            drop(state);
            self.shared.changed.notify_all();
            self.pool.wait_idle();
            self.shared.set_idle();
            return Err(err.into());
        }

        let state = self
            .shared
            .changed
            .wait_while(state, |s| *s == SessionState::Running)
            .unwrap_or_else(PoisonError::into_inner);
        drop(state);

        // The listener may have ended the session from a worker; the join
        // happens here, and only then may another session begin.
        self.pool.wait_idle();
        self.shared.set_idle();
        info!("resource monitoring stopped");
        Ok(SessionOutcome::Completed)
    }

    fn launch(&self) -> Result<(), PoolError> {
        if self.shared.sampler.start() {
            let sampler = Arc::clone(&self.shared.sampler);
            self.pool.submit(move || sampler.run_cpu_loop())?;
            let sampler = Arc::clone(&self.shared.sampler);
            self.pool.submit(move || sampler.run_memory_loop())?;
        }
        let shared = Arc::clone(&self.shared);
        self.pool.submit(move || shared.display_loop())?;
        let shared = Arc::clone(&self.shared);
        self.pool.submit(move || shared.listen_for_stop())?;
        Ok(())
    }

    /// Ends the session if one is running and waits for its tasks to wind
    /// down. Idempotent.
    pub fn stop(&self) {
        self.shared.request_stop();
        if !self.pool.is_worker_thread() {
            self.pool.wait_idle();
        }
    }
}

impl Drop for MonitoringSession {
    fn drop(&mut self) {
        self.shared.request_stop();
    }
}
