//! In-memory telemetry source with a mutable process table.
//!
//! Used by tests and benches to drive the sampler and collector without
//! touching `/proc`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::source::{CpuTimes, MemoryInfo, ProcessStat, SourceError, TelemetrySource};

#[derive(Clone, Debug)]
pub struct FixtureProcess {
    pub name: String,
    pub ticks: u64,
    pub resident_pages: u64,
    pub readable: bool,
}

impl FixtureProcess {
    pub fn new(name: &str, ticks: u64, resident_pages: u64) -> Self {
        Self {
            name: name.to_string(),
            ticks,
            resident_pages,
            readable: true,
        }
    }
}

#[derive(Debug, Default)]
struct FixtureState {
    cpu: CpuTimes,
    memory: MemoryInfo,
    processes: BTreeMap<u32, FixtureProcess>,
    machine_reads_fail: bool,
}

#[derive(Debug)]
pub struct FixtureSource {
    state: Mutex<FixtureState>,
    page_size: u64,
    stat_reads: AtomicUsize,
}

impl Default for FixtureSource {
    fn default() -> Self {
        Self::new(4096)
    }
}

impl FixtureSource {
    pub fn new(page_size: u64) -> Self {
        Self {
            state: Mutex::new(FixtureState::default()),
            page_size,
            stat_reads: AtomicUsize::new(0),
        }
    }

    /// Number of `process_stat` calls served so far.
    pub fn stat_reads(&self) -> usize {
        self.stat_reads.load(Ordering::Relaxed)
    }

    /// `count` processes named `proc_N` with PIDs starting at 1.
    pub fn with_processes(count: u32) -> Self {
        let source = Self::default();
        source.set_memory(8 * 1024 * 1024 * 1024, 4 * 1024 * 1024 * 1024);
        for pid in 1..=count {
            source.insert(
                pid,
                FixtureProcess::new(&format!("proc_{pid}"), u64::from(pid), 256),
            );
        }
        source
    }

    fn state(&self) -> MutexGuard<'_, FixtureState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_cpu_times(&self, cpu: CpuTimes) {
        self.state().cpu = cpu;
    }

    pub fn set_memory(&self, total_bytes: u64, available_bytes: u64) {
        self.state().memory = MemoryInfo {
            total_bytes,
            available_bytes,
        };
    }

    pub fn set_machine_reads_fail(&self, fail: bool) {
        self.state().machine_reads_fail = fail;
    }

    pub fn insert(&self, pid: u32, process: FixtureProcess) {
        self.state().processes.insert(pid, process);
    }

    pub fn remove(&self, pid: u32) {
        self.state().processes.remove(&pid);
    }

    pub fn set_process_ticks(&self, pid: u32, ticks: u64) {
        if let Some(process) = self.state().processes.get_mut(&pid) {
            process.ticks = ticks;
        }
    }

    /// Keeps the PID enumerable but makes every per-process read fail, as if
    /// the process exited mid-scan.
    pub fn mark_unreadable(&self, pid: u32) {
        if let Some(process) = self.state().processes.get_mut(&pid) {
            process.readable = false;
        }
    }

    fn with_process<T>(
        &self,
        pid: u32,
        read: impl FnOnce(&FixtureProcess) -> T,
    ) -> Result<T, SourceError> {
        match self.state().processes.get(&pid) {
            Some(process) if process.readable => Ok(read(process)),
            _ => Err(SourceError::NotFound(pid)),
        }
    }
}

impl TelemetrySource for FixtureSource {
    fn cpu_times(&self) -> Result<CpuTimes, SourceError> {
        let state = self.state();
        if state.machine_reads_fail {
            return Err(SourceError::Parse("fixture cpu counters".to_string()));
        }
        Ok(state.cpu)
    }

    fn memory_info(&self) -> Result<MemoryInfo, SourceError> {
        let state = self.state();
        if state.machine_reads_fail {
            return Err(SourceError::Parse("fixture memory info".to_string()));
        }
        Ok(state.memory)
    }

    fn pids(&self) -> Result<Vec<u32>, SourceError> {
        Ok(self.state().processes.keys().copied().collect())
    }

    fn process_stat(&self, pid: u32) -> Result<ProcessStat, SourceError> {
        self.stat_reads.fetch_add(1, Ordering::Relaxed);
        self.with_process(pid, |p| ProcessStat {
            name: p.name.clone(),
            ticks: p.ticks,
        })
    }

    fn process_resident_pages(&self, pid: u32) -> Result<u64, SourceError> {
        self.with_process(pid, |p| p.resident_pages)
    }

    fn page_size(&self) -> u64 {
        self.page_size
    }
}
