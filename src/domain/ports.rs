use super::event::PaymentEvent;
use super::work::DeadLetterEntry;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Source of time for every component that reasons about elapsed time
/// (breaker timeouts, worker staleness, event timestamps, scaling hours).
/// Injected so tests can drive time manually.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Append-only storage for payment audit events.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends one event. Never validates against prior state.
    async fn append(&self, event: PaymentEvent) -> Result<()>;

    /// All events for one payment, in append order.
    async fn history(&self, work_id: &str) -> Result<Vec<PaymentEvent>>;
}

/// Operations sink notified when work is parked in the dead-letter store.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn dead_lettered(&self, entry: &DeadLetterEntry);
}

/// Re-invokes failed work when its backoff delay fires.
#[async_trait]
pub trait RetryHandler: Send + Sync {
    async fn retry(&self, work_id: &str, attempt: u32);
}
