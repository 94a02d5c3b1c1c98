//! Parallel batch dispatch with an overall deadline.
//!
//! A batch is split into fixed-size sub-batches; each sub-batch is a
//! sequential map over the unit operation, and sub-batches run concurrently
//! under a semaphore. Per-item outcomes are recorded as they complete, so a
//! deadline expiry only loses items that genuinely had no outcome yet.

use crate::config::{BatchConfig, DeadlinePolicy};
use crate::domain::work::BatchResult;
use crate::error::ExecutionError;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

pub struct BatchExecutor {
    sub_batch_size: usize,
    concurrency: usize,
    deadline: Duration,
    on_deadline: DeadlinePolicy,
}

impl BatchExecutor {
    pub fn new(config: BatchConfig) -> Self {
        Self {
            sub_batch_size: config.sub_batch_size.max(1),
            concurrency: config.concurrency.max(1),
            deadline: Duration::from_secs(config.deadline_secs),
            on_deadline: config.on_deadline,
        }
    }

    /// Dispatches `unit` for every id and aggregates the outcomes.
    ///
    /// Unit failures are captured per item and never abort sibling items.
    /// Items with no recorded outcome when the deadline elapses are counted
    /// as failed; depending on [`DeadlinePolicy`] the in-flight remainder is
    /// either aborted or left to finish with its results discarded.
    pub async fn process_batch<F, Fut>(&self, ids: Vec<String>, unit: F) -> BatchResult
    where
        F: Fn(String) -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = Result<(), ExecutionError>> + Send + 'static,
    {
        let started = tokio::time::Instant::now();
        let total = ids.len();
        tracing::info!(total, "starting batch dispatch");

        let outcomes: Arc<Mutex<HashMap<String, bool>>> =
            Arc::new(Mutex::new(HashMap::with_capacity(total)));
        let permits = Arc::new(Semaphore::new(self.concurrency));

        let mut tasks = JoinSet::new();
        for sub_batch in ids.chunks(self.sub_batch_size) {
            let sub_batch = sub_batch.to_vec();
            let unit = unit.clone();
            let outcomes = Arc::clone(&outcomes);
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return;
                };
                for id in sub_batch {
                    let outcome = match unit(id.clone()).await {
                        Ok(()) => true,
                        Err(error) => {
                            tracing::warn!(work_id = %id, %error, "unit operation failed");
                            false
                        }
                    };
                    outcomes
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .insert(id, outcome);
                }
            });
        }

        let drained = async {
            while tasks.join_next().await.is_some() {}
        };
        if tokio::time::timeout(self.deadline, drained).await.is_err() {
            match self.on_deadline {
                DeadlinePolicy::Cancel => {
                    tracing::warn!("batch deadline elapsed, aborting in-flight sub-batches");
                    tasks.abort_all();
                }
                DeadlinePolicy::Abandon => {
                    tracing::warn!("batch deadline elapsed, abandoning in-flight sub-batches");
                    tasks.detach_all();
                }
            }
        }

        let outcomes = outcomes.lock().unwrap_or_else(PoisonError::into_inner);
        let failed_ids: Vec<String> = ids
            .iter()
            .filter(|id| !outcomes.get(*id).copied().unwrap_or(false))
            .cloned()
            .collect();
        let failed = failed_ids.len();
        let result = BatchResult {
            total,
            succeeded: total - failed,
            failed,
            elapsed_ms: started.elapsed().as_millis() as u64,
            failed_ids,
        };
        tracing::info!(
            succeeded = result.succeeded,
            failed = result.failed,
            elapsed_ms = result.elapsed_ms,
            "batch dispatch finished"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn executor(config: BatchConfig) -> BatchExecutor {
        BatchExecutor::new(config)
    }

    fn ids(count: usize) -> Vec<String> {
        (0..count).map(|i| format!("pay-{i}")).collect()
    }

    #[tokio::test]
    async fn test_single_failure_is_isolated() {
        let executor = executor(BatchConfig::default());

        let result = executor
            .process_batch(ids(15), |id| async move {
                if id == "pay-7" {
                    Err(ExecutionError::new("INSUFFICIENT_FUNDS"))
                } else {
                    Ok(())
                }
            })
            .await;

        assert_eq!(result.total, 15);
        assert_eq!(result.succeeded, 14);
        assert_eq!(result.failed, 1);
        assert_eq!(result.failed_ids, vec!["pay-7".to_string()]);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let executor = executor(BatchConfig::default());
        let result = executor.process_batch(Vec::new(), |_| async { Ok(()) }).await;
        assert_eq!(result.total, 0);
        assert_eq!(result.succeeded, 0);
        assert!(result.failed_ids.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_counts_unfinished_as_failed() {
        let executor = executor(BatchConfig {
            sub_batch_size: 1,
            concurrency: 10,
            deadline_secs: 5,
            on_deadline: DeadlinePolicy::Abandon,
        });

        // pay-0 and pay-1 complete; pay-2 never does.
        let result = executor
            .process_batch(ids(3), |id| async move {
                if id == "pay-2" {
                    std::future::pending::<()>().await;
                }
                Ok(())
            })
            .await;

        assert_eq!(result.total, 3);
        assert_eq!(result.succeeded, 2);
        assert_eq!(result.failed, 1);
        assert_eq!(result.failed_ids, vec!["pay-2".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_cancel_policy_aborts() {
        let executor = executor(BatchConfig {
            sub_batch_size: 2,
            concurrency: 2,
            deadline_secs: 1,
            on_deadline: DeadlinePolicy::Cancel,
        });

        let result = executor
            .process_batch(ids(4), |_| async {
                std::future::pending::<()>().await;
                Ok(())
            })
            .await;

        assert_eq!(result.failed, 4);
        assert_eq!(result.succeeded, 0);
    }

    #[tokio::test]
    async fn test_sub_batches_run_concurrently() {
        // 4 sub-batches of 1, concurrency 4: all items park on one barrier
        // and release each other. Sequential execution would deadlock the
        // 30s overall deadline instead.
        let executor = executor(BatchConfig {
            sub_batch_size: 1,
            concurrency: 4,
            deadline_secs: 30,
            on_deadline: DeadlinePolicy::Abandon,
        });

        let barrier = Arc::new(tokio::sync::Barrier::new(4));
        let result = executor
            .process_batch(ids(4), move |_| {
                let barrier = Arc::clone(&barrier);
                async move {
                    barrier.wait().await;
                    Ok(())
                }
            })
            .await;

        assert_eq!(result.succeeded, 4);
    }
}
