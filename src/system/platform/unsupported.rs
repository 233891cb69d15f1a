use crate::system::source::{CpuTimes, MemoryInfo, ProcessStat, SourceError, TelemetrySource};

/// Stand-in for targets without a `/proc` hierarchy.
pub struct UnsupportedSource;

impl TelemetrySource for UnsupportedSource {
    fn cpu_times(&self) -> Result<CpuTimes, SourceError> {
        Err(SourceError::Unsupported)
    }

    fn memory_info(&self) -> Result<MemoryInfo, SourceError> {
        Err(SourceError::Unsupported)
    }

    fn pids(&self) -> Result<Vec<u32>, SourceError> {
        Err(SourceError::Unsupported)
    }

    fn process_stat(&self, _pid: u32) -> Result<ProcessStat, SourceError> {
        Err(SourceError::Unsupported)
    }

    fn process_resident_pages(&self, _pid: u32) -> Result<u64, SourceError> {
        Err(SourceError::Unsupported)
    }

    fn page_size(&self) -> u64 {
        4096
    }
}
