//! Payment audit events and the pure state projection over them.
//!
//! Events are immutable facts appended per work id. Current payment state is
//! never stored; it is the left fold of the event sequence, so replaying the
//! same history always reconstructs the same state.

use crate::error::SchedulerError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Submitted,
    Validated,
    Routed,
    Executed,
    Completed,
    Failed,
    Compensated,
    RetryScheduled,
    MovedToDeadLetter,
}

/// One immutable fact about a payment's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentEvent {
    pub work_id: String,
    pub event_type: EventType,
    pub payload: Value,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Unknown,
    Submitted,
    Validated,
    Executing,
    Completed,
    Failed,
    Compensated,
}

/// State of one payment derived by folding its event history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectedState {
    pub status: PaymentStatus,
    pub retry_count: u32,
    pub last_error: Option<String>,
    /// Processors the payment was routed through, in routing order.
    pub processors: Vec<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Default for ProjectedState {
    fn default() -> Self {
        Self {
            status: PaymentStatus::Unknown,
            retry_count: 0,
            last_error: None,
            processors: Vec::new(),
            created_at: None,
            completed_at: None,
        }
    }
}

impl ProjectedState {
    /// Folds an ordered event history into the current state.
    ///
    /// Pure: reads only the given events, never the wall clock. A payload
    /// field that is present with the wrong JSON type is a hard error; an
    /// absent field falls back to its default.
    pub fn replay(events: &[PaymentEvent]) -> Result<Self, SchedulerError> {
        events.iter().try_fold(Self::default(), Self::apply)
    }

    fn apply(mut self, event: &PaymentEvent) -> Result<Self, SchedulerError> {
        match event.event_type {
            EventType::Submitted => {
                self.status = PaymentStatus::Submitted;
                self.created_at = Some(event.recorded_at);
            }
            EventType::Validated => {
                self.status = PaymentStatus::Validated;
            }
            EventType::Routed => {
                if let Some(processor) = optional_str(event, "processor")? {
                    self.processors.push(processor.to_string());
                }
            }
            EventType::Executed => {
                self.status = PaymentStatus::Executing;
            }
            EventType::Completed => {
                self.status = PaymentStatus::Completed;
                self.completed_at = Some(event.recorded_at);
            }
            EventType::Failed => {
                self.status = PaymentStatus::Failed;
                self.last_error = optional_str(event, "error")?.map(str::to_string);
            }
            EventType::Compensated => {
                self.status = PaymentStatus::Compensated;
            }
            EventType::RetryScheduled => {
                self.retry_count = optional_u32(event, "retry_count")?.unwrap_or(0);
            }
            EventType::MovedToDeadLetter => {}
        }
        Ok(self)
    }
}

fn optional_str<'a>(
    event: &'a PaymentEvent,
    field: &str,
) -> Result<Option<&'a str>, SchedulerError> {
    match event.payload.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(other) => Err(malformed(event, field, "string", other)),
    }
}

fn optional_u32(event: &PaymentEvent, field: &str) -> Result<Option<u32>, SchedulerError> {
    match event.payload.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => match value.as_u64().and_then(|n| u32::try_from(n).ok()) {
            Some(n) => Ok(Some(n)),
            None => Err(malformed(event, field, "unsigned integer", value)),
        },
    }
}

fn malformed(event: &PaymentEvent, field: &str, expected: &str, got: &Value) -> SchedulerError {
    SchedulerError::MalformedPayload {
        work_id: event.work_id.clone(),
        reason: format!("field '{field}' expected {expected}, got {got}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(event_type: EventType, payload: Value, at_secs: i64) -> PaymentEvent {
        PaymentEvent {
            work_id: "pay-1".to_string(),
            event_type,
            payload,
            recorded_at: DateTime::from_timestamp(at_secs, 0).unwrap(),
        }
    }

    #[test]
    fn test_replay_full_lifecycle() {
        let events = vec![
            event(EventType::Submitted, json!({}), 10),
            event(EventType::Validated, json!({}), 11),
            event(EventType::Routed, json!({"processor": "BANK_A"}), 12),
            event(EventType::Executed, json!({}), 13),
            event(EventType::Completed, json!({}), 14),
        ];

        let state = ProjectedState::replay(&events).unwrap();
        assert_eq!(state.status, PaymentStatus::Completed);
        assert_eq!(state.processors, vec!["BANK_A".to_string()]);
        assert_eq!(state.created_at, DateTime::from_timestamp(10, 0));
        assert_eq!(state.completed_at, DateTime::from_timestamp(14, 0));
        assert_eq!(state.retry_count, 0);
    }

    #[test]
    fn test_replay_failure_and_retries() {
        let events = vec![
            event(EventType::Submitted, json!({}), 10),
            event(EventType::Routed, json!({"processor": "BANK_A"}), 11),
            event(EventType::Failed, json!({"error": "TIMEOUT"}), 12),
            event(EventType::RetryScheduled, json!({"retry_count": 1}), 13),
            event(EventType::Routed, json!({"processor": "BANK_B"}), 14),
            event(EventType::Failed, json!({"error": "ACCOUNT_BLOCKED"}), 15),
            event(EventType::RetryScheduled, json!({"retry_count": 2}), 16),
        ];

        let state = ProjectedState::replay(&events).unwrap();
        assert_eq!(state.status, PaymentStatus::Failed);
        assert_eq!(state.retry_count, 2);
        assert_eq!(state.last_error.as_deref(), Some("ACCOUNT_BLOCKED"));
        assert_eq!(state.processors.len(), 2);
    }

    #[test]
    fn test_replay_is_idempotent() {
        let events = vec![
            event(EventType::Submitted, json!({}), 10),
            event(EventType::Failed, json!({"error": "NETWORK_ERROR"}), 11),
        ];

        let first = ProjectedState::replay(&events).unwrap();
        let second = ProjectedState::replay(&events).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_replay_empty_history_is_unknown() {
        let state = ProjectedState::replay(&[]).unwrap();
        assert_eq!(state.status, PaymentStatus::Unknown);
        assert!(state.created_at.is_none());
    }

    #[test]
    fn test_missing_retry_count_defaults_to_zero() {
        let events = vec![event(EventType::RetryScheduled, json!({}), 10)];
        let state = ProjectedState::replay(&events).unwrap();
        assert_eq!(state.retry_count, 0);
    }

    #[test]
    fn test_wrong_payload_type_is_hard_error() {
        let events = vec![event(
            EventType::RetryScheduled,
            json!({"retry_count": "two"}),
            10,
        )];
        let err = ProjectedState::replay(&events).unwrap_err();
        assert!(matches!(err, SchedulerError::MalformedPayload { .. }));

        let events = vec![event(EventType::Routed, json!({"processor": 42}), 10)];
        assert!(ProjectedState::replay(&events).is_err());
    }

    #[test]
    fn test_null_error_field_is_absent() {
        let events = vec![event(EventType::Failed, json!({"error": null}), 10)];
        let state = ProjectedState::replay(&events).unwrap();
        assert_eq!(state.status, PaymentStatus::Failed);
        assert!(state.last_error.is_none());
    }
}
