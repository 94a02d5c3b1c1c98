//! Scheduler configuration.
//!
//! Every component reads its tunables from one of the structs below. All
//! fields carry serde defaults so a partial JSON document (or none at all)
//! yields a fully working configuration.

use serde::{Deserialize, Serialize};

/// Top-level configuration for [`PaymentScheduler`](crate::application::scheduler::PaymentScheduler).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub admission: AdmissionConfig,
    pub queue: QueueConfig,
    pub batch: BatchConfig,
    pub breaker: BreakerConfig,
    pub retry: RetryConfig,
    pub balancer: BalancerConfig,
    pub scaling: ScalingConfig,
}

/// Rate-limit quotas per admission scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Admissions per second across the whole process.
    #[serde(default = "default_global_per_second")]
    pub global_per_second: u32,
    /// Admissions per minute for a single tenant.
    #[serde(default = "default_tenant_per_minute")]
    pub tenant_per_minute: u32,
    /// Admissions per minute for a single user.
    #[serde(default = "default_user_per_minute")]
    pub user_per_minute: u32,
}

const fn default_global_per_second() -> u32 {
    100
}

const fn default_tenant_per_minute() -> u32 {
    50
}

const fn default_user_per_minute() -> u32 {
    10
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            global_per_second: default_global_per_second(),
            tenant_per_minute: default_tenant_per_minute(),
            user_per_minute: default_user_per_minute(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum number of queued work items before submissions are rejected.
    #[serde(default = "default_queue_capacity")]
    pub capacity: usize,
}

const fn default_queue_capacity() -> usize {
    1000
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: default_queue_capacity(),
        }
    }
}

/// What the batch executor does with work still running at the deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadlinePolicy {
    /// Leave in-flight tasks running and discard their results.
    Abandon,
    /// Abort in-flight tasks.
    Cancel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Items per sub-batch; each sub-batch is processed sequentially.
    #[serde(default = "default_sub_batch_size")]
    pub sub_batch_size: usize,
    /// Maximum sub-batches in flight at once.
    #[serde(default = "default_batch_concurrency")]
    pub concurrency: usize,
    /// Overall deadline for one `process_batch` call.
    #[serde(default = "default_batch_deadline_secs")]
    pub deadline_secs: u64,
    #[serde(default = "default_deadline_policy")]
    pub on_deadline: DeadlinePolicy,
}

const fn default_sub_batch_size() -> usize {
    10
}

const fn default_batch_concurrency() -> usize {
    10
}

const fn default_batch_deadline_secs() -> u64 {
    30
}

const fn default_deadline_policy() -> DeadlinePolicy {
    DeadlinePolicy::Abandon
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            sub_batch_size: default_sub_batch_size(),
            concurrency: default_batch_concurrency(),
            deadline_secs: default_batch_deadline_secs(),
            on_deadline: default_deadline_policy(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures that trip a closed circuit.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// How long an open circuit rejects calls before admitting a probe.
    #[serde(default = "default_open_timeout_secs")]
    pub open_timeout_secs: u64,
}

const fn default_failure_threshold() -> u32 {
    5
}

const fn default_open_timeout_secs() -> u64 {
    60
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            open_timeout_secs: default_open_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts before work is parked in the dead-letter store. With the
    /// default of 3, attempts 0, 1 and 2 are retried and attempt 3 is final.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Bound on the dead-letter store; insertion past it is a hard loss.
    #[serde(default = "default_dead_letter_capacity")]
    pub dead_letter_capacity: usize,
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_dead_letter_capacity() -> usize {
    1000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            dead_letter_capacity: default_dead_letter_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalancerConfig {
    /// Workers above this load/capacity ratio are excluded from selection.
    #[serde(default = "default_overload_threshold")]
    pub overload_threshold: f64,
    /// Workers that have not heartbeated within this window are ignored.
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
}

const fn default_overload_threshold() -> f64 {
    0.8
}

const fn default_stale_after_secs() -> u64 {
    60
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            overload_threshold: default_overload_threshold(),
            stale_after_secs: default_stale_after_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalingConfig {
    /// Samples required before the advisor produces a recommendation.
    #[serde(default = "default_min_history")]
    pub min_history: usize,
    /// Samples retained in the history ring.
    #[serde(default = "default_retention")]
    pub retention: usize,
    /// Hours at or above this fraction of the max hourly average are peaks.
    #[serde(default = "default_peak_ratio")]
    pub peak_ratio: f64,
    /// Average load (percent) above which peak hours scale up.
    #[serde(default = "default_scale_up_load")]
    pub scale_up_load: f64,
    /// Average load (percent) below which off-peak hours scale down.
    #[serde(default = "default_scale_down_load")]
    pub scale_down_load: f64,
    #[serde(default = "default_min_workers")]
    pub min_workers: u32,
    #[serde(default = "default_max_workers")]
    pub max_workers: u32,
    #[serde(default = "default_scale_up_step")]
    pub scale_up_step: u32,
    #[serde(default = "default_scale_down_step")]
    pub scale_down_step: u32,
}

const fn default_min_history() -> usize {
    6
}

const fn default_retention() -> usize {
    24
}

const fn default_peak_ratio() -> f64 {
    0.8
}

const fn default_scale_up_load() -> f64 {
    70.0
}

const fn default_scale_down_load() -> f64 {
    30.0
}

const fn default_min_workers() -> u32 {
    2
}

const fn default_max_workers() -> u32 {
    20
}

const fn default_scale_up_step() -> u32 {
    2
}

const fn default_scale_down_step() -> u32 {
    1
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            min_history: default_min_history(),
            retention: default_retention(),
            peak_ratio: default_peak_ratio(),
            scale_up_load: default_scale_up_load(),
            scale_down_load: default_scale_down_load(),
            min_workers: default_min_workers(),
            max_workers: default_max_workers(),
            scale_up_step: default_scale_up_step(),
            scale_down_step: default_scale_down_step(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_yields_defaults() {
        let config: SchedulerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.admission.global_per_second, 100);
        assert_eq!(config.queue.capacity, 1000);
        assert_eq!(config.batch.sub_batch_size, 10);
        assert_eq!(config.batch.on_deadline, DeadlinePolicy::Abandon);
        assert_eq!(config.breaker.failure_threshold, 5);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.scaling.max_workers, 20);
    }

    #[test]
    fn test_partial_document_overrides_one_field() {
        let config: SchedulerConfig =
            serde_json::from_str(r#"{"queue": {"capacity": 5}, "batch": {"on_deadline": "cancel"}}"#)
                .unwrap();
        assert_eq!(config.queue.capacity, 5);
        assert_eq!(config.batch.on_deadline, DeadlinePolicy::Cancel);
        assert_eq!(config.batch.sub_batch_size, 10);
    }
}
