use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::source::{CpuTimes, TelemetrySource};

pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// The two published machine-wide percentages at one point in time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct SystemSample {
    pub cpu_percent: f64,
    pub memory_percent: f64,
}

/// CPU busy share between two counter readings, or `None` when no ticks
/// elapsed (or the counters went backwards).
pub fn cpu_usage_between(prev: &CpuTimes, cur: &CpuTimes) -> Option<f64> {
    let total_delta = cur.total().checked_sub(prev.total())?;
    if total_delta == 0 {
        return None;
    }
    let idle_delta = cur.idle_total().saturating_sub(prev.idle_total());
    let busy = total_delta.saturating_sub(idle_delta);
    Some(100.0 * busy as f64 / total_delta as f64)
}

/// `None` when `total` is zero.
pub fn memory_usage_percent(total: u64, available: u64) -> Option<f64> {
    if total == 0 {
        return None;
    }
    let used = total.saturating_sub(available);
    Some(100.0 * used as f64 / total as f64)
}

/// An `f64` published through an atomic so readers never see a torn value.
struct Gauge(AtomicU64);

impl Gauge {
    fn new() -> Self {
        Gauge(AtomicU64::new(0f64.to_bits()))
    }

    fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }

    fn store(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Release);
    }
}

/// Continuously refreshed CPU% and memory%.
///
/// `start` only arms the sampler; the caller decides where the two refresh
/// loops run (`run_cpu_loop`, `run_memory_loop`), typically on pool workers.
pub struct UsageSampler {
    source: Arc<dyn TelemetrySource>,
    interval: Duration,
    cpu: Gauge,
    memory: Gauge,
    active: Mutex<bool>,
    wake: Condvar,
}

impl UsageSampler {
    pub fn new(source: Arc<dyn TelemetrySource>, interval: Duration) -> Self {
        UsageSampler {
            source,
            interval,
            cpu: Gauge::new(),
            memory: Gauge::new(),
            active: Mutex::new(false),
            wake: Condvar::new(),
        }
    }

    fn active_guard(&self) -> MutexGuard<'_, bool> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns `false` (and logs) when already active.
    pub fn start(&self) -> bool {
        let mut active = self.active_guard();
        if *active {
            warn!("usage sampler already active");
            return false;
        }
        *active = true;
        info!(
            interval_ms = self.interval.as_millis() as u64,
            "usage sampler started"
        );
        true
    }

    pub fn stop(&self) {
        let mut active = self.active_guard();
        if *active {
            *active = false;
            info!("usage sampler stopped");
        }
        drop(active);
        self.wake.notify_all();
    }

    pub fn is_active(&self) -> bool {
        *self.active_guard()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn cpu_percent(&self) -> f64 {
        self.cpu.load()
    }

    pub fn memory_percent(&self) -> f64 {
        self.memory.load()
    }

    pub fn sample(&self) -> SystemSample {
        SystemSample {
            cpu_percent: self.cpu_percent(),
            memory_percent: self.memory_percent(),
        }
    }

    /// Sleeps one interval or until `stop`; returns whether still active.
    fn pause(&self) -> bool {
        let active = self.active_guard();
        let (active, _) = self
            .wake
            .wait_timeout_while(active, self.interval, |active| *active)
            .unwrap_or_else(PoisonError::into_inner);
        *active
    }

    /// Refreshes the CPU gauge every interval until stopped. Each tick
    /// compares against the previous successful reading.
    pub fn run_cpu_loop(&self) {
        let mut prev = self.read_cpu();
        while self.pause() {
            let Some(cur) = self.read_cpu() else {
                continue;
            };
            if let Some(before) = prev {
                match cpu_usage_between(&before, &cur) {
                    Some(percent) => self.cpu.store(percent),
                    None => debug!("no cpu ticks elapsed; keeping previous sample"),
                }
            }
            prev = Some(cur);
        }
    }

    /// Refreshes the memory gauge immediately, then every interval until
    /// stopped.
    pub fn run_memory_loop(&self) {
        if !self.is_active() {
            return;
        }
        loop {
            self.refresh_memory();
            if !self.pause() {
                break;
            }
        }
    }

    fn read_cpu(&self) -> Option<CpuTimes> {
        match self.source.cpu_times() {
            Ok(times) => Some(times),
            Err(err) => {
                debug!(error = %err, "skipping cpu refresh");
                None
            }
        }
    }

    /// One memory refresh; failed or invalid reads leave the gauge untouched.
    pub fn refresh_memory(&self) {
        let info = match self.source.memory_info() {
            Ok(info) => info,
            Err(err) => {
                debug!(error = %err, "skipping memory refresh");
                return;
            }
        };
        match memory_usage_percent(info.total_bytes, info.available_bytes) {
            Some(percent) => self.memory.store(percent),
            None => debug!("total memory reported as zero; skipping memory refresh"),
        }
    }
}
