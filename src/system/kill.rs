use std::thread;
use std::time::{Duration, Instant};

use sysinfo::{Pid, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, Signal, System};
use tracing::{error, info, warn};

pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_millis(1000);
const EXIT_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KillResult {
    /// Exited after SIGTERM.
    Terminated(u32),
    /// Needed SIGKILL after the grace period.
    Killed(u32),
    NotFound(u32),
    InvalidPid(i64),
    Failed(u32, String),
}

impl KillResult {
    pub fn message(&self) -> String {
        match self {
            KillResult::Terminated(pid) => {
                format!("Process with PID {pid} terminated successfully.")
            }
            KillResult::Killed(pid) => {
                format!("Process with PID {pid} did not exit after SIGTERM; sent SIGKILL.")
            }
            KillResult::NotFound(pid) => format!("Process with PID {pid} does not exist."),
            KillResult::InvalidPid(pid) => format!("Invalid PID {pid}."),
            KillResult::Failed(_, reason) => reason.clone(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, KillResult::Terminated(_) | KillResult::Killed(_))
    }
}

fn refresh(sys: &mut System, pid: Pid) {
    let pids = [pid];
    sys.refresh_processes_specifics(
        ProcessesToUpdate::Some(&pids),
        true,
        ProcessRefreshKind::nothing(),
    );
}

fn is_alive(sys: &mut System, pid: Pid) -> bool {
    refresh(sys, pid);
    // An unreaped zombie has already terminated.
    sys.process(pid)
        .is_some_and(|p| p.status() != ProcessStatus::Zombie)
}

fn wait_for_exit(sys: &mut System, pid: Pid, grace: Duration) -> bool {
    let deadline = Instant::now() + grace;
    loop {
        if !is_alive(sys, pid) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(EXIT_POLL);
    }
}

fn send(sys: &System, pid: Pid, signal: Signal) -> Result<(), String> {
    let Some(process) = sys.process(pid) else {
        return Ok(());
    };
    let signal_name = match signal {
        Signal::Term => "SIGTERM",
        Signal::Kill => "SIGKILL",
        _ => "signal",
    };
    match process.kill_with(signal) {
        Some(true) => Ok(()),
        Some(false) => Err(format!(
            "Failed to send {signal_name} to PID {pid} (permission denied?)"
        )),
        None => {
            // Signal not supported on this platform, fall back to kill()
            if process.kill() {
                Ok(())
            } else {
                Err(format!("Failed to kill PID {pid} (permission denied?)"))
            }
        }
    }
}

/// Sends SIGTERM, waits up to `grace` for the process to exit, then escalates
/// to SIGKILL.
pub fn terminate_process(pid: i64, grace: Duration) -> KillResult {
    let raw = match u32::try_from(pid) {
        Ok(raw) if raw > 0 => raw,
        _ => {
            error!(pid, "invalid PID for termination");
            return KillResult::InvalidPid(pid);
        }
    };
    let sys_pid = Pid::from_u32(raw);
    let mut sys = System::new();
    refresh(&mut sys, sys_pid);

    if sys.process(sys_pid).is_none() {
        error!(pid = raw, "attempted to terminate non-existing process");
        return KillResult::NotFound(raw);
    }

    if let Err(reason) = send(&sys, sys_pid, Signal::Term) {
        error!(pid = raw, %reason, "failed to terminate process");
        return KillResult::Failed(raw, reason);
    }

    if wait_for_exit(&mut sys, sys_pid, grace) {
        info!(pid = raw, "terminated process");
        return KillResult::Terminated(raw);
    }

    warn!(pid = raw, "process did not terminate; attempting SIGKILL");
    if let Err(reason) = send(&sys, sys_pid, Signal::Kill) {
        error!(pid = raw, %reason, "failed to forcefully terminate process");
        return KillResult::Failed(raw, reason);
    }
    info!(pid = raw, "killed process");
    KillResult::Killed(raw)
}
