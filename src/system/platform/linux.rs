use procfs::prelude::*;
use procfs::process::{Process, all_processes};
use procfs::{KernelStats, Meminfo, ProcError};

use crate::system::source::{CpuTimes, MemoryInfo, ProcessStat, SourceError, TelemetrySource};

/// Reads `/proc/stat`, `/proc/meminfo` and `/proc/[pid]/{stat,statm}`.
pub struct ProcfsSource {
    page_size: u64,
}

impl Default for ProcfsSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcfsSource {
    pub fn new() -> Self {
        ProcfsSource {
            page_size: procfs::page_size(),
        }
    }

    fn process(&self, pid: u32) -> Result<Process, SourceError> {
        let raw = i32::try_from(pid).map_err(|_| SourceError::NotFound(pid))?;
        Process::new(raw).map_err(|e| process_error(pid, e))
    }
}

fn machine_error(what: &str, err: ProcError) -> SourceError {
    match err {
        ProcError::Io(source, _) => SourceError::Io {
            what: what.to_string(),
            source,
        },
        other => SourceError::Parse(format!("{what}: {other}")),
    }
}

fn process_error(pid: u32, err: ProcError) -> SourceError {
    match err {
        // The process exited between enumeration and this read.
        ProcError::NotFound(_) => SourceError::NotFound(pid),
        other => machine_error(&format!("/proc/{pid}"), other),
    }
}

impl TelemetrySource for ProcfsSource {
    fn cpu_times(&self) -> Result<CpuTimes, SourceError> {
        let stats = KernelStats::current().map_err(|e| machine_error("/proc/stat", e))?;
        let total = stats.total;
        Ok(CpuTimes {
            user: total.user,
            nice: total.nice,
            system: total.system,
            idle: total.idle,
            iowait: total.iowait.unwrap_or(0),
            irq: total.irq.unwrap_or(0),
            softirq: total.softirq.unwrap_or(0),
            steal: total.steal.unwrap_or(0),
        })
    }

    fn memory_info(&self) -> Result<MemoryInfo, SourceError> {
        let meminfo = Meminfo::current().map_err(|e| machine_error("/proc/meminfo", e))?;
        Ok(MemoryInfo {
            total_bytes: meminfo.mem_total,
            // Kernels before 3.14 lack MemAvailable.
            available_bytes: meminfo.mem_available.unwrap_or(meminfo.mem_free),
        })
    }

    fn pids(&self) -> Result<Vec<u32>, SourceError> {
        let processes = all_processes().map_err(|e| machine_error("/proc", e))?;
        Ok(processes
            .filter_map(Result::ok)
            .filter_map(|p| u32::try_from(p.pid()).ok())
            .collect())
    }

    fn process_stat(&self, pid: u32) -> Result<ProcessStat, SourceError> {
        let stat = self
            .process(pid)?
            .stat()
            .map_err(|e| process_error(pid, e))?;
        let children = stat.cutime.max(0) as u64 + stat.cstime.max(0) as u64;
        Ok(ProcessStat {
            ticks: stat.utime + stat.stime + children,
            name: stat.comm,
        })
    }

    fn process_resident_pages(&self, pid: u32) -> Result<u64, SourceError> {
        let statm = self
            .process(pid)?
            .statm()
            .map_err(|e| process_error(pid, e))?;
        Ok(statm.resident)
    }

    fn page_size(&self) -> u64 {
        self.page_size
    }
}
