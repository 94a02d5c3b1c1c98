use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Work type a worker advertises to accept any payment type.
pub const ANY_WORK_TYPE: &str = "ALL";

/// One execution worker's reported capacity, upserted by heartbeats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRecord {
    pub worker_id: String,
    pub current_load: u32,
    pub max_capacity: u32,
    pub supported_types: HashSet<String>,
    pub last_updated: DateTime<Utc>,
}

impl WorkerRecord {
    pub fn can_handle(&self, work_type: &str) -> bool {
        self.supported_types.contains(work_type) || self.supported_types.contains(ANY_WORK_TYPE)
    }

    /// Load as a fraction of capacity. A worker reporting zero capacity is
    /// treated as fully loaded.
    pub fn load_ratio(&self) -> f64 {
        if self.max_capacity == 0 {
            1.0
        } else {
            f64::from(self.current_load) / f64::from(self.max_capacity)
        }
    }

    pub fn available_capacity(&self) -> u32 {
        self.max_capacity.saturating_sub(self.current_load)
    }
}

/// Point-in-time view of the worker fleet, for monitoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetMetrics {
    pub total_workers: usize,
    pub overloaded_workers: usize,
    pub average_load: f64,
    pub total_capacity: u64,
    pub used_capacity: u64,
}
