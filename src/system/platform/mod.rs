use std::sync::Arc;

use super::source::TelemetrySource;

#[cfg(target_os = "linux")]
mod linux;
#[cfg(not(target_os = "linux"))]
mod unsupported;

#[cfg(target_os = "linux")]
pub use linux::ProcfsSource;

/// The telemetry source for the running OS.
pub fn default_source() -> Arc<dyn TelemetrySource> {
    #[cfg(target_os = "linux")]
    {
        Arc::new(linux::ProcfsSource::new())
    }

    #[cfg(not(target_os = "linux"))]
    {
        Arc::new(unsupported::UnsupportedSource)
    }
}
