use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("I/O error reading {what}: {source}")]
    Io {
        what: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed {0}")]
    Parse(String),
    #[error("process {0} not found")]
    NotFound(u32),
    #[error("telemetry source is not supported on this platform")]
    Unsupported,
}

/// Machine-wide CPU time counters, in clock ticks since boot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CpuTimes {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
}

impl CpuTimes {
    pub fn total(&self) -> u64 {
        self.user
            + self.nice
            + self.system
            + self.idle
            + self.iowait
            + self.irq
            + self.softirq
            + self.steal
    }

    pub fn idle_total(&self) -> u64 {
        self.idle + self.iowait
    }
}

/// One read of a process's stat record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessStat {
    pub name: String,
    /// utime + stime + cutime + cstime.
    pub ticks: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemoryInfo {
    pub total_bytes: u64,
    pub available_bytes: u64,
}

/// Read-only view of the OS process table and machine counters.
///
/// Implementations must be callable from many threads at once; every call
/// reads fresh values.
pub trait TelemetrySource: Send + Sync {
    fn cpu_times(&self) -> Result<CpuTimes, SourceError>;
    fn memory_info(&self) -> Result<MemoryInfo, SourceError>;
    fn pids(&self) -> Result<Vec<u32>, SourceError>;
    /// Name and accumulated CPU ticks, taken from a single stat read.
    fn process_stat(&self, pid: u32) -> Result<ProcessStat, SourceError>;
    fn process_resident_pages(&self, pid: u32) -> Result<u64, SourceError>;
    fn page_size(&self) -> u64;
}
