use crate::domain::event::PaymentEvent;
use crate::domain::ports::{AlertSink, EventStore};
use crate::domain::work::DeadLetterEntry;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// A thread-safe in-memory event store.
///
/// Each work id owns its own `Arc<Mutex<Vec<_>>>` log, so appends for
/// different payments contend only on the brief outer read lock; the outer
/// write lock is taken once per work id, when its log is first created.
#[derive(Default)]
pub struct InMemoryEventStore {
    logs: RwLock<HashMap<String, Arc<Mutex<Vec<PaymentEvent>>>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn log_for(&self, work_id: &str) -> Arc<Mutex<Vec<PaymentEvent>>> {
        {
            let logs = self.logs.read().await;
            if let Some(log) = logs.get(work_id) {
                return Arc::clone(log);
            }
        }
        let mut logs = self.logs.write().await;
        Arc::clone(logs.entry(work_id.to_string()).or_default())
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, event: PaymentEvent) -> Result<()> {
        let log = self.log_for(&event.work_id).await;
        let mut log = log.lock().await;
        log.push(event);
        Ok(())
    }

    async fn history(&self, work_id: &str) -> Result<Vec<PaymentEvent>> {
        let log = {
            let logs = self.logs.read().await;
            logs.get(work_id).cloned()
        };
        match log {
            Some(log) => Ok(log.lock().await.clone()),
            None => Ok(Vec::new()),
        }
    }
}

/// Alert sink that reports dead-lettered work to the log.
///
/// The production deployment wires a pager here; the scheduler only needs
/// the side effect to happen, not to know where it goes.
#[derive(Debug, Default, Clone)]
pub struct TracingAlertSink;

#[async_trait]
impl AlertSink for TracingAlertSink {
    async fn dead_lettered(&self, entry: &DeadLetterEntry) {
        tracing::error!(
            work_id = %entry.work_id,
            tenant = %entry.tenant,
            user = %entry.user,
            retries = entry.retry_count,
            error = %entry.last_error,
            "payment failed permanently, parked in dead-letter store"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::event::EventType;
    use chrono::DateTime;
    use serde_json::json;

    fn event(work_id: &str, event_type: EventType) -> PaymentEvent {
        PaymentEvent {
            work_id: work_id.to_string(),
            event_type,
            payload: json!({}),
            recorded_at: DateTime::UNIX_EPOCH,
        }
    }

    #[tokio::test]
    async fn test_append_and_history_preserve_order() {
        let store = InMemoryEventStore::new();
        store.append(event("pay-1", EventType::Submitted)).await.unwrap();
        store.append(event("pay-1", EventType::Completed)).await.unwrap();
        store.append(event("pay-2", EventType::Submitted)).await.unwrap();

        let history = store.history("pay-1").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].event_type, EventType::Submitted);
        assert_eq!(history[1].event_type, EventType::Completed);

        assert_eq!(store.history("pay-2").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_history_of_unknown_id_is_empty() {
        let store = InMemoryEventStore::new();
        assert!(store.history("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_appends_to_one_id_all_land() {
        let store = Arc::new(InMemoryEventStore::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                for _ in 0..25 {
                    store.append(event("pay-hot", EventType::Executed)).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(store.history("pay-hot").await.unwrap().len(), 200);
    }
}
