//! Runner domain model
//!
//! Worker nodes host one or more named runners. Each runner offers a catalog
//! of environments and reports its live resource state on request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named execution capability offered by a worker node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerDescriptor {
    pub name: String,
    pub description: Option<String>,
}

/// An environment advertised by a runner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentDescriptor {
    pub name: String,
    pub description: Option<String>,
}

/// Live resource state reported by a runner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerState {
    pub free_memory_mb: u64,
    pub total_memory_mb: u64,
    pub total_disk_bytes: u64,
    pub used_disk_bytes: u64,
    /// Last time the runner started an application
    pub last_usage_time: Option<DateTime<Utc>>,
}

impl RunnerState {
    /// Percentage of disk space still free, in `0.0..=100.0`
    ///
    /// A runner reporting no disk at all is treated as full.
    pub fn free_disk_percent(&self) -> f64 {
        if self.total_disk_bytes == 0 {
            return 0.0;
        }
        let free = self.total_disk_bytes.saturating_sub(self.used_disk_bytes);
        free as f64 * 100.0 / self.total_disk_bytes as f64
    }
}

/// Status of a registered worker node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerStatus {
    /// Node answered its last liveness probe
    Online,

    /// Node failed its last liveness probe
    Offline,
}

impl std::fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerStatus::Online => write!(f, "Online"),
            WorkerStatus::Offline => write!(f, "Offline"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(total: u64, used: u64) -> RunnerState {
        RunnerState {
            free_memory_mb: 0,
            total_memory_mb: 0,
            total_disk_bytes: total,
            used_disk_bytes: used,
            last_usage_time: None,
        }
    }

    #[test]
    fn test_free_disk_percent() {
        assert_eq!(state(1000, 900).free_disk_percent(), 10.0);
        assert_eq!(state(1000, 0).free_disk_percent(), 100.0);
    }

    #[test]
    fn test_free_disk_percent_without_disk() {
        assert_eq!(state(0, 0).free_disk_percent(), 0.0);
        assert_eq!(state(100, 200).free_disk_percent(), 0.0);
    }
}
