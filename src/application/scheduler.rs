use crate::application::admission::AdmissionControl;
use crate::application::balancer::LoadBalancer;
use crate::application::batch::BatchExecutor;
use crate::application::circuit::{CircuitBreakerRegistry, CircuitState, ProtectedCallError};
use crate::application::dead_letter::{DeadLetterQueue, FailureDisposition};
use crate::application::queue::{AdmissionQueue, SubmitOutcome};
use crate::application::scaling::ScalingAdvisor;
use crate::config::SchedulerConfig;
use crate::domain::event::{EventType, PaymentEvent, ProjectedState};
use crate::domain::ports::{AlertSink, Clock, EventStore, RetryHandler};
use crate::domain::scaling::ScalingRecommendation;
use crate::domain::work::{BatchResult, DeadLetterEntry, WorkItem};
use crate::domain::worker::FleetMetrics;
use crate::error::{ExecutionError, Result};
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// The scheduler the orchestration layer talks to.
///
/// Owns every sub-component as instance state; construct one per process
/// and share it behind an `Arc`. Collaborators the scheduler cannot decide
/// for itself (event persistence, alerting, retry re-dispatch, time) are
/// injected as ports.
pub struct PaymentScheduler {
    admission: AdmissionControl,
    queue: AdmissionQueue,
    batch: BatchExecutor,
    breakers: CircuitBreakerRegistry,
    dead_letters: DeadLetterQueue,
    balancer: LoadBalancer,
    advisor: ScalingAdvisor,
    events: Arc<dyn EventStore>,
    clock: Arc<dyn Clock>,
}

impl PaymentScheduler {
    pub fn new(
        config: SchedulerConfig,
        events: Arc<dyn EventStore>,
        alert: Arc<dyn AlertSink>,
        retry: Arc<dyn RetryHandler>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            admission: AdmissionControl::new(config.admission),
            queue: AdmissionQueue::new(config.queue.capacity, Arc::clone(&clock)),
            batch: BatchExecutor::new(config.batch),
            breakers: CircuitBreakerRegistry::new(config.breaker, Arc::clone(&clock)),
            dead_letters: DeadLetterQueue::new(config.retry, retry, alert, Arc::clone(&clock)),
            balancer: LoadBalancer::new(config.balancer, Arc::clone(&clock)),
            advisor: ScalingAdvisor::new(config.scaling, Arc::clone(&clock)),
            events,
            clock,
        }
    }

    /// Checks the rate-limit chain (global, tenant, user) and consumes one
    /// token from each scope it clears.
    pub async fn can_admit(&self, tenant: &str, user: &str) -> bool {
        self.admission.try_admit(tenant, user).await
    }

    /// Queues an admitted item for dispatch, by priority.
    pub async fn submit(&self, item: WorkItem) -> SubmitOutcome {
        self.queue.submit(item).await
    }

    /// Removes the most urgent queued item, waiting up to `wait`.
    pub async fn take_next(&self, wait: Duration) -> Option<WorkItem> {
        self.queue.take_next(wait).await
    }

    /// Dispatches `unit` for every id in concurrent sub-batches.
    pub async fn process_batch<F, Fut>(&self, ids: Vec<String>, unit: F) -> BatchResult
    where
        F: Fn(String) -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = std::result::Result<(), ExecutionError>> + Send + 'static,
    {
        self.batch.process_batch(ids, unit).await
    }

    /// Runs `call` behind the circuit breaker for the downstream `key`.
    pub async fn execute_protected<F, Fut, T, E>(
        &self,
        key: &str,
        call: F,
    ) -> std::result::Result<T, ProtectedCallError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        self.breakers.execute(key, call).await
    }

    /// Records a failed attempt: schedules a backoff retry or parks the work
    /// in the dead-letter store. Either way the disposition is appended to
    /// the payment's audit history.
    pub async fn record_failure(
        &self,
        work_id: &str,
        tenant: &str,
        user: &str,
        error: &str,
        attempt: u32,
    ) -> Result<FailureDisposition> {
        let disposition = self
            .dead_letters
            .record_failure(work_id, tenant, user, error, attempt)
            .await;

        match disposition {
            FailureDisposition::RetryScheduled { delay } => {
                self.record_event(
                    work_id,
                    EventType::RetryScheduled,
                    json!({
                        "retry_count": attempt + 1,
                        "delay_secs": delay.as_secs(),
                    }),
                )
                .await?;
            }
            FailureDisposition::MovedToDeadLetter => {
                self.record_event(
                    work_id,
                    EventType::MovedToDeadLetter,
                    json!({ "error": error, "retry_count": attempt }),
                )
                .await?;
            }
        }

        Ok(disposition)
    }

    /// Removes and returns all dead-lettered work for reprocessing.
    pub async fn drain_dead_letters(&self) -> Vec<DeadLetterEntry> {
        self.dead_letters.drain().await
    }

    /// Appends one audit event to the payment's history.
    pub async fn record_event(
        &self,
        work_id: &str,
        event_type: EventType,
        payload: Value,
    ) -> Result<()> {
        self.events
            .append(PaymentEvent {
                work_id: work_id.to_string(),
                event_type,
                payload,
                recorded_at: self.clock.now(),
            })
            .await
    }

    /// Full audit history of one payment, in append order.
    pub async fn history(&self, work_id: &str) -> Result<Vec<PaymentEvent>> {
        self.events.history(work_id).await
    }

    /// Current state of one payment, folded from its history.
    pub async fn project(&self, work_id: &str) -> Result<ProjectedState> {
        let events = self.events.history(work_id).await?;
        ProjectedState::replay(&events)
    }

    /// Upserts one worker's heartbeat.
    pub async fn update_worker(
        &self,
        worker_id: &str,
        current_load: u32,
        max_capacity: u32,
        supported_types: HashSet<String>,
    ) {
        self.balancer
            .update_worker(worker_id, current_load, max_capacity, supported_types)
            .await;
    }

    /// Picks a destination worker, or `None` if no candidate exists.
    pub async fn select_worker(&self, work_type: &str, tenant: &str) -> Option<String> {
        self.balancer.select_worker(work_type, tenant).await
    }

    /// Appends one load sample to the scaling history.
    pub async fn record_load_sample(
        &self,
        hourly_volumes: HashMap<u32, f64>,
        worker_count: u32,
        average_load: f64,
    ) {
        self.advisor
            .record_sample(hourly_volumes, worker_count, average_load)
            .await;
    }

    /// Advisory worker-count recommendation from the load history.
    pub async fn recommend(&self) -> ScalingRecommendation {
        self.advisor.recommend().await
    }

    /// Breaker state per downstream key, for monitoring.
    pub async fn breaker_status(&self) -> HashMap<String, (CircuitState, u32)> {
        self.breakers.status().await
    }

    /// Fleet-wide worker load figures, for monitoring.
    pub async fn fleet_metrics(&self) -> FleetMetrics {
        self.balancer.metrics().await
    }

    /// Number of items currently queued for dispatch.
    pub async fn queued(&self) -> usize {
        self.queue.len().await
    }

    /// Aborts retry timers that have not fired. Queued work and recorded
    /// events are left intact.
    pub fn shutdown(&self) {
        self.dead_letters.shutdown();
    }
}
