//! Retry scheduling and the dead-letter store.
//!
//! A failed attempt below the retry budget is re-dispatched through the
//! injected [`RetryHandler`] after an exponential backoff (1s, 2s, 4s, ...).
//! An attempt at the budget parks the work in the bounded dead-letter store
//! and raises the alert sink. Retry timers run on spawned tasks; the caller
//! never blocks on them.

use crate::config::RetryConfig;
use crate::domain::ports::{AlertSink, Clock, RetryHandler};
use crate::domain::work::DeadLetterEntry;
use std::collections::VecDeque;
use std::sync::{Mutex as StdMutex, PoisonError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinSet;

/// Disposition of one recorded failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    /// A retry will fire after `delay`.
    RetryScheduled { delay: Duration },
    /// The retry budget is exhausted; the work is parked for manual handling.
    MovedToDeadLetter,
}

pub struct DeadLetterQueue {
    max_retries: u32,
    capacity: usize,
    entries: Mutex<VecDeque<DeadLetterEntry>>,
    retry: Arc<dyn RetryHandler>,
    alert: Arc<dyn AlertSink>,
    clock: Arc<dyn Clock>,
    timers: StdMutex<JoinSet<()>>,
}

impl DeadLetterQueue {
    pub fn new(
        config: RetryConfig,
        retry: Arc<dyn RetryHandler>,
        alert: Arc<dyn AlertSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            max_retries: config.max_retries,
            capacity: config.dead_letter_capacity,
            entries: Mutex::new(VecDeque::new()),
            retry,
            alert,
            clock,
            timers: StdMutex::new(JoinSet::new()),
        }
    }

    /// Records a failed attempt and either schedules a retry or parks the
    /// work. `attempt` is zero-based: with a budget of 3, attempts 0-2 are
    /// retried and attempt 3 is final.
    pub async fn record_failure(
        &self,
        work_id: &str,
        tenant: &str,
        user: &str,
        error: &str,
        attempt: u32,
    ) -> FailureDisposition {
        if attempt < self.max_retries {
            let delay = Duration::from_secs(2u64.saturating_pow(attempt));
            let retry = Arc::clone(&self.retry);
            let work_id = work_id.to_string();
            let next_attempt = attempt + 1;

            let mut timers = self.timers.lock().unwrap_or_else(PoisonError::into_inner);
            // Drop bookkeeping for timers that already fired.
            while timers.try_join_next().is_some() {}
            let retry_work_id = work_id.clone();
            timers.spawn(async move {
                tokio::time::sleep(delay).await;
                tracing::info!(work_id = %retry_work_id, attempt = next_attempt, "retrying payment");
                retry.retry(&retry_work_id, next_attempt).await;
            });

            tracing::info!(
                work_id,
                attempt = next_attempt,
                delay_secs = delay.as_secs(),
                "scheduled payment retry"
            );
            FailureDisposition::RetryScheduled { delay }
        } else {
            let entry = DeadLetterEntry {
                work_id: work_id.to_string(),
                tenant: tenant.to_string(),
                user: user.to_string(),
                last_error: error.to_string(),
                retry_count: attempt,
                failed_at: self.clock.now(),
            };

            {
                let mut entries = self.entries.lock().await;
                if entries.len() >= self.capacity {
                    tracing::error!(
                        work_id,
                        retries = attempt,
                        "dead-letter store full, payment lost"
                    );
                } else {
                    entries.push_back(entry.clone());
                }
            }

            self.alert.dead_lettered(&entry).await;
            FailureDisposition::MovedToDeadLetter
        }
    }

    /// Removes and returns every parked entry for reprocessing.
    pub async fn drain(&self) -> Vec<DeadLetterEntry> {
        let mut entries = self.entries.lock().await;
        entries.drain(..).collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Aborts retry timers that have not fired yet.
    pub fn shutdown(&self) {
        let mut timers = self.timers.lock().unwrap_or_else(PoisonError::into_inner);
        timers.abort_all();
    }
}
