use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use thiserror::Error;
use tracing::{debug, warn};

use super::snapshot::{ProcessSnapshot, SnapshotSet, UNKNOWN_NAME};
use super::source::{SourceError, TelemetrySource};

pub const DEFAULT_BATCH_SIZE: usize = 15;

#[derive(Debug, Error)]
pub enum CollectError {
    #[error("failed to enumerate processes: {0}")]
    Enumerate(#[source] SourceError),
    #[error("failed to spawn collection thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Process and machine tick counters observed together for one PID.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct TickPair {
    process: u64,
    system: u64,
}

fn process_cpu_percent(prev: TickPair, cur: TickPair) -> f64 {
    let system_delta = cur.system.saturating_sub(prev.system);
    if system_delta == 0 {
        return 0.0;
    }
    // A reused PID can report fewer ticks than its predecessor.
    let process_delta = cur.process.saturating_sub(prev.process);
    100.0 * process_delta as f64 / system_delta as f64
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Builds per-process snapshots, fanning the PID list out over one scoped
/// thread per batch.
///
/// CPU usage is the share of machine ticks a process consumed since the
/// previous `collect`; the first time a PID is seen it reports 0%.
pub struct SnapshotCollector {
    source: Arc<dyn TelemetrySource>,
    batch_size: usize,
    history: Mutex<HashMap<u32, TickPair>>,
}

impl SnapshotCollector {
    pub fn new(source: Arc<dyn TelemetrySource>, batch_size: usize) -> Self {
        SnapshotCollector {
            source,
            batch_size: batch_size.max(1),
            history: Mutex::new(HashMap::new()),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn collect(&self) -> Result<SnapshotSet, CollectError> {
        let pids = self.source.pids().map_err(CollectError::Enumerate)?;
        let total_memory = match self.source.memory_info() {
            Ok(info) => info.total_bytes,
            Err(err) => {
                debug!(error = %err, "memory info unavailable; memory% will read 0");
                0
            }
        };

        let collected = Mutex::new(Vec::with_capacity(pids.len()));
        thread::scope(|scope| -> Result<(), CollectError> {
            let mut handles = Vec::new();
            for (index, batch) in pids.chunks(self.batch_size).enumerate() {
                let collected = &collected;
                let handle = thread::Builder::new()
                    .name(format!("procman-batch-{index}"))
                    .spawn_scoped(scope, move || {
                        for &pid in batch {
                            let snapshot = self.snapshot(pid, total_memory);
                            lock(collected).push(snapshot);
                        }
                    })
                    .map_err(CollectError::Spawn)?;
                handles.push(handle);
            }
            for handle in handles {
                if handle.join().is_err() {
                    warn!("collection batch panicked; its remaining processes are missing");
                }
            }
            Ok(())
        })?;

        self.prune_history(&pids);

        let snapshots = collected
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        debug!(
            processes = snapshots.len(),
            batch_size = self.batch_size,
            "collected process snapshots"
        );
        Ok(SnapshotSet::new(snapshots))
    }

    fn snapshot(&self, pid: u32, total_memory: u64) -> ProcessSnapshot {
        let (name, cpu_percent) = match self.source.process_stat(pid) {
            Ok(stat) => (stat.name, self.cpu_percent(pid, stat.ticks)),
            Err(_) => (UNKNOWN_NAME.to_string(), 0.0),
        };
        ProcessSnapshot {
            pid,
            name,
            cpu_percent,
            memory_percent: self.memory_percent(pid, total_memory),
        }
    }

    fn cpu_percent(&self, pid: u32, process: u64) -> f64 {
        let Ok(system) = self.source.cpu_times().map(|t| t.total()) else {
            return 0.0;
        };
        let current = TickPair { process, system };
        let previous = lock(&self.history).insert(pid, current);
        match previous {
            Some(prev) => process_cpu_percent(prev, current),
            None => 0.0,
        }
    }

    fn memory_percent(&self, pid: u32, total_memory: u64) -> f64 {
        if total_memory == 0 {
            return 0.0;
        }
        let Ok(pages) = self.source.process_resident_pages(pid) else {
            return 0.0;
        };
        let resident = pages.saturating_mul(self.source.page_size());
        100.0 * resident as f64 / total_memory as f64
    }

    fn prune_history(&self, alive: &[u32]) {
        let alive: HashSet<u32> = alive.iter().copied().collect();
        lock(&self.history).retain(|pid, _| alive.contains(pid));
    }

    #[cfg(test)]
    fn tracked_pids(&self) -> usize {
        lock(&self.history).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::fixture::{FixtureProcess, FixtureSource};
    use crate::system::source::CpuTimes;

    fn cpu_total(total: u64) -> CpuTimes {
        CpuTimes {
            user: total / 2,
            idle: total - total / 2,
            ..CpuTimes::default()
        }
    }

    #[test]
    fn tick_delta_percent() {
        let prev = TickPair {
            process: 100,
            system: 1_000,
        };
        let cur = TickPair {
            process: 150,
            system: 1_200,
        };
        assert_eq!(process_cpu_percent(prev, cur), 25.0);
        assert_eq!(process_cpu_percent(cur, cur), 0.0);
    }

    #[test]
    fn first_observation_reports_zero_then_delta() {
        let source = Arc::new(FixtureSource::default());
        source.set_memory(1_000_000, 500_000);
        source.set_cpu_times(cpu_total(1_000));
        source.insert(42, FixtureProcess::new("worker", 500, 0));
        let collector = SnapshotCollector::new(source.clone(), 15);

        let first = collector.collect().unwrap();
        assert_eq!(first.get(42).unwrap().cpu_percent, 0.0);

        source.set_cpu_times(cpu_total(1_400));
        source.set_process_ticks(42, 600);
        let second = collector.collect().unwrap();
        assert_eq!(second.get(42).unwrap().cpu_percent, 25.0);

        // No new ticks anywhere: zero delta is guarded.
        let third = collector.collect().unwrap();
        assert_eq!(third.get(42).unwrap().cpu_percent, 0.0);
    }

    #[test]
    fn memory_percent_uses_resident_pages_and_page_size() {
        let source = Arc::new(FixtureSource::new(4096));
        source.set_memory(4096 * 1000, 0);
        source.insert(1, FixtureProcess::new("big", 0, 250));
        let collector = SnapshotCollector::new(source, 15);
        let set = collector.collect().unwrap();
        assert_eq!(set.get(1).unwrap().memory_percent, 25.0);
    }

    #[test]
    fn unreadable_process_yields_default_snapshot() {
        let source = Arc::new(FixtureSource::with_processes(20));
        source.mark_unreadable(7);
        let collector = SnapshotCollector::new(source, 15);
        let set = collector.collect().unwrap();
        assert_eq!(set.len(), 20);
        assert_eq!(set.get(7).unwrap(), &ProcessSnapshot::unknown(7));
        assert_eq!(set.get(8).unwrap().name, "proc_8");
    }

    #[test]
    fn one_stat_read_per_process() {
        let source = Arc::new(FixtureSource::with_processes(40));
        let collector = SnapshotCollector::new(source.clone(), 15);
        collector.collect().unwrap();
        assert_eq!(source.stat_reads(), 40);
        collector.collect().unwrap();
        assert_eq!(source.stat_reads(), 80);
    }

    #[test]
    fn history_is_pruned_for_exited_processes() {
        let source = Arc::new(FixtureSource::with_processes(5));
        let collector = SnapshotCollector::new(source.clone(), 2);
        collector.collect().unwrap();
        assert_eq!(collector.tracked_pids(), 5);

        source.remove(3);
        source.remove(4);
        let set = collector.collect().unwrap();
        assert_eq!(set.len(), 3);
        assert_eq!(collector.tracked_pids(), 3);
    }

    #[test]
    fn batch_size_zero_is_clamped() {
        let collector = SnapshotCollector::new(Arc::new(FixtureSource::with_processes(3)), 0);
        assert_eq!(collector.batch_size(), 1);
        assert_eq!(collector.collect().unwrap().len(), 3);
    }

    #[test]
    fn empty_process_table() {
        let collector = SnapshotCollector::new(Arc::new(FixtureSource::default()), 15);
        assert!(collector.collect().unwrap().is_empty());
    }
}
