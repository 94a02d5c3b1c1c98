//! Predictive scaling advisor.
//!
//! Keeps a bounded ring of load samples and recommends a worker count from
//! the observed hourly pattern. Advisory only: no scaling action is taken
//! here.

use crate::config::ScalingConfig;
use crate::domain::ports::Clock;
use crate::domain::scaling::{
    LoadSnapshot, ScalingRecommendation, ScalingStatus, hourly_averages, peak_hours,
};
use chrono::Timelike;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct ScalingAdvisor {
    config: ScalingConfig,
    history: Mutex<VecDeque<LoadSnapshot>>,
    clock: Arc<dyn Clock>,
}

impl ScalingAdvisor {
    pub fn new(config: ScalingConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            history: Mutex::new(VecDeque::new()),
            clock,
        }
    }

    /// Appends one sample, dropping the oldest past the retention window.
    pub async fn record_sample(
        &self,
        hourly_volumes: HashMap<u32, f64>,
        worker_count: u32,
        average_load: f64,
    ) {
        let snapshot = LoadSnapshot {
            hourly_volumes,
            worker_count,
            average_load,
            sampled_at: self.clock.now(),
        };

        let mut history = self.history.lock().await;
        history.push_back(snapshot);
        while history.len() > self.config.retention {
            history.pop_front();
        }
    }

    /// Recommends a worker count from the retained history.
    pub async fn recommend(&self) -> ScalingRecommendation {
        let history = self.history.lock().await;
        if history.len() < self.config.min_history {
            return ScalingRecommendation {
                worker_count: 0,
                status: ScalingStatus::InsufficientData,
                reason: "Need more historical data".to_string(),
            };
        }

        let samples: Vec<LoadSnapshot> = history.iter().cloned().collect();
        drop(history);

        let averages = hourly_averages(&samples);
        let peaks = peak_hours(&averages, self.config.peak_ratio);

        // history.len() >= min_history >= 1 here.
        let latest = &samples[samples.len() - 1];
        let current_load = latest.average_load;
        let current_workers = latest.worker_count;
        let current_hour = self.clock.now().hour();
        let is_peak_hour = peaks.contains(&current_hour);

        let recommended = if is_peak_hour && current_load > self.config.scale_up_load {
            (current_workers + self.config.scale_up_step).min(self.config.max_workers)
        } else if !is_peak_hour
            && current_load < self.config.scale_down_load
            && current_workers > self.config.min_workers
        {
            current_workers
                .saturating_sub(self.config.scale_down_step)
                .max(self.config.min_workers)
        } else {
            current_workers
        };

        let reason = if recommended > current_workers {
            format!(
                "High load ({current_load:.1}%) detected, scaling up for predicted peak hours: {peaks:?}"
            )
        } else if recommended < current_workers {
            format!("Low load ({current_load:.1}%) detected, scaling down to save resources")
        } else {
            format!("Load stable at {current_load:.1}%, no scaling needed")
        };

        ScalingRecommendation {
            worker_count: recommended,
            status: ScalingStatus::AnalysisComplete,
            reason,
        }
    }
}
