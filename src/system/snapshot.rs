use std::cmp::Ordering;

use serde::Serialize;

pub const UNKNOWN_NAME: &str = "Unknown";

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProcessSnapshot {
    pub pid: u32,
    pub name: String,
    pub cpu_percent: f64,
    pub memory_percent: f64,
}

impl ProcessSnapshot {
    /// Best-effort entry for a process whose files could not be read.
    pub fn unknown(pid: u32) -> Self {
        ProcessSnapshot {
            pid,
            name: UNKNOWN_NAME.to_string(),
            cpu_percent: 0.0,
            memory_percent: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    Pid,
    Cpu,
    Memory,
    Name,
}

impl SortKey {
    pub fn from_str_config(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "cpu" => SortKey::Cpu,
            "memory" | "mem" => SortKey::Memory,
            "name" => SortKey::Name,
            _ => SortKey::Pid,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SortKey::Pid => "PID",
            SortKey::Cpu => "CPU",
            SortKey::Memory => "Memory",
            SortKey::Name => "Name",
        }
    }

    fn compare(self, a: &ProcessSnapshot, b: &ProcessSnapshot) -> Ordering {
        let primary = match self {
            SortKey::Pid => Ordering::Equal,
            SortKey::Cpu => b.cpu_percent.total_cmp(&a.cpu_percent),
            SortKey::Memory => b.memory_percent.total_cmp(&a.memory_percent),
            SortKey::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
        };
        primary.then(a.pid.cmp(&b.pid))
    }
}

/// Snapshots from one collection, in arrival order.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(transparent)]
pub struct SnapshotSet {
    snapshots: Vec<ProcessSnapshot>,
}

impl SnapshotSet {
    pub fn new(snapshots: Vec<ProcessSnapshot>) -> Self {
        SnapshotSet { snapshots }
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProcessSnapshot> {
        self.snapshots.iter()
    }

    pub fn get(&self, pid: u32) -> Option<&ProcessSnapshot> {
        self.snapshots.iter().find(|s| s.pid == pid)
    }

    pub fn into_vec(self) -> Vec<ProcessSnapshot> {
        self.snapshots
    }

    pub fn sorted(mut self, key: SortKey) -> Vec<ProcessSnapshot> {
        self.snapshots.sort_by(|a, b| key.compare(a, b));
        self.snapshots
    }
}
