//! Load-aware worker selection.
//!
//! Workers report load by heartbeat; selection filters to workers that
//! support the payment type, are fresh, and are not overloaded, then picks
//! the least-loaded one (ties prefer the larger capacity). `None` means no
//! candidate exists and the caller must fall back (default worker,
//! re-queue).

use crate::config::BalancerConfig;
use crate::domain::ports::Clock;
use crate::domain::worker::{FleetMetrics, WorkerRecord};
use chrono::Duration;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

pub struct LoadBalancer {
    overload_threshold: f64,
    stale_after: Duration,
    workers: RwLock<HashMap<String, WorkerRecord>>,
    clock: Arc<dyn Clock>,
}

impl LoadBalancer {
    pub fn new(config: BalancerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            overload_threshold: config.overload_threshold,
            stale_after: Duration::seconds(config.stale_after_secs as i64),
            workers: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Upserts one worker's heartbeat.
    pub async fn update_worker(
        &self,
        worker_id: &str,
        current_load: u32,
        max_capacity: u32,
        supported_types: HashSet<String>,
    ) {
        let record = WorkerRecord {
            worker_id: worker_id.to_string(),
            current_load,
            max_capacity,
            supported_types,
            last_updated: self.clock.now(),
        };

        if record.load_ratio() > self.overload_threshold {
            tracing::warn!(
                worker_id,
                current_load,
                max_capacity,
                "worker is overloaded"
            );
        }

        let mut workers = self.workers.write().await;
        workers.insert(worker_id.to_string(), record);
    }

    /// Picks the best worker for `work_type`, or `None` if no fresh,
    /// capable, non-overloaded worker exists.
    pub async fn select_worker(&self, work_type: &str, _tenant: &str) -> Option<String> {
        let now = self.clock.now();
        let workers = self.workers.read().await;
        workers
            .values()
            .filter(|w| now - w.last_updated <= self.stale_after)
            .filter(|w| w.can_handle(work_type))
            .filter(|w| w.load_ratio() <= self.overload_threshold)
            .min_by(|a, b| {
                a.current_load
                    .cmp(&b.current_load)
                    .then(b.max_capacity.cmp(&a.max_capacity))
            })
            .map(|w| w.worker_id.clone())
    }

    /// Fleet-wide load figures for monitoring. Stale workers are included;
    /// they drop out of selection, not out of the books.
    pub async fn metrics(&self) -> FleetMetrics {
        let workers = self.workers.read().await;
        let total_workers = workers.len();
        let overloaded_workers = workers
            .values()
            .filter(|w| w.load_ratio() > self.overload_threshold)
            .count();
        let used_capacity: u64 = workers.values().map(|w| u64::from(w.current_load)).sum();
        let total_capacity: u64 = workers.values().map(|w| u64::from(w.max_capacity)).sum();
        let average_load = if total_workers == 0 {
            0.0
        } else {
            workers.values().map(|w| f64::from(w.current_load)).sum::<f64>() / total_workers as f64
        };

        FleetMetrics {
            total_workers,
            overloaded_workers,
            average_load,
            total_capacity,
            used_capacity,
        }
    }
}
