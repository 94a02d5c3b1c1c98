//! Load-history analysis for the scaling advisor.
//!
//! The functions here are pure over a slice of retained samples; the advisor
//! in the application layer owns the sample ring and the clock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One historical load sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadSnapshot {
    /// Observed payment volume per hour of day (0-23).
    pub hourly_volumes: HashMap<u32, f64>,
    pub worker_count: u32,
    /// Average worker load in percent (0-100).
    pub average_load: f64,
    pub sampled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScalingStatus {
    InsufficientData,
    AnalysisComplete,
}

/// Advisory output; the advisor never performs scaling itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingRecommendation {
    pub worker_count: u32,
    pub status: ScalingStatus,
    pub reason: String,
}

/// Per-hour average volume across all retained samples.
pub fn hourly_averages(history: &[LoadSnapshot]) -> HashMap<u32, f64> {
    let mut sums: HashMap<u32, (f64, usize)> = HashMap::new();
    for snapshot in history {
        for (&hour, &volume) in &snapshot.hourly_volumes {
            let entry = sums.entry(hour).or_insert((0.0, 0));
            entry.0 += volume;
            entry.1 += 1;
        }
    }
    sums.into_iter()
        .map(|(hour, (sum, count))| (hour, sum / count as f64))
        .collect()
}

/// Hours whose average volume reaches `peak_ratio` of the maximum average.
pub fn peak_hours(averages: &HashMap<u32, f64>, peak_ratio: f64) -> Vec<u32> {
    let max = averages.values().copied().fold(0.0_f64, f64::max);
    if max <= 0.0 {
        return Vec::new();
    }
    let threshold = max * peak_ratio;
    let mut hours: Vec<u32> = averages
        .iter()
        .filter(|&(_, &volume)| volume >= threshold)
        .map(|(&hour, _)| hour)
        .collect();
    hours.sort_unstable();
    hours
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(volumes: &[(u32, f64)]) -> LoadSnapshot {
        LoadSnapshot {
            hourly_volumes: volumes.iter().copied().collect(),
            worker_count: 4,
            average_load: 50.0,
            sampled_at: DateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn test_hourly_averages_across_samples() {
        let history = vec![
            snapshot(&[(9, 100.0), (14, 40.0)]),
            snapshot(&[(9, 200.0), (14, 60.0)]),
        ];
        let averages = hourly_averages(&history);
        assert_eq!(averages.get(&9), Some(&150.0));
        assert_eq!(averages.get(&14), Some(&50.0));
    }

    #[test]
    fn test_peak_hours_threshold() {
        let averages: HashMap<u32, f64> =
            [(9, 100.0), (10, 85.0), (14, 50.0), (23, 10.0)].into_iter().collect();
        // Max 100, ratio 0.8 -> threshold 80.
        assert_eq!(peak_hours(&averages, 0.8), vec![9, 10]);
    }

    #[test]
    fn test_peak_hours_empty_history() {
        assert!(peak_hours(&HashMap::new(), 0.8).is_empty());
    }
}
