use crate::error::SchedulerError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Represents a positive monetary amount for a payment.
///
/// Wrapper around `rust_decimal::Decimal` so non-positive amounts are
/// rejected at construction rather than deep inside the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, SchedulerError> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(SchedulerError::Validation(
                "Amount must be positive".to_string(),
            ))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = SchedulerError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

/// Priority class of a payment. Lower numeric class is dispatched first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentPriority {
    /// System-failure remediation payments.
    Critical,
    /// Large-amount payments.
    HighValue,
    /// Premium/VIP customers.
    VipCustomer,
    /// Time-sensitive payments.
    Urgent,
    /// Regular payments.
    Standard,
    /// Batch and scheduled payments.
    Batch,
}

impl PaymentPriority {
    /// Numeric class, 1 (most urgent) through 6.
    pub fn class(self) -> u8 {
        match self {
            Self::Critical => 1,
            Self::HighValue => 2,
            Self::VipCustomer => 3,
            Self::Urgent => 4,
            Self::Standard => 5,
            Self::Batch => 6,
        }
    }
}

/// A unit of payment work awaiting dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: String,
    pub tenant: String,
    pub user: String,
    pub priority: PaymentPriority,
    pub amount: Amount,
    /// Stamped by the admission queue when the item is accepted.
    pub submitted_at: DateTime<Utc>,
}

impl WorkItem {
    pub fn new(
        id: impl Into<String>,
        tenant: impl Into<String>,
        user: impl Into<String>,
        priority: PaymentPriority,
        amount: Amount,
    ) -> Self {
        Self {
            id: id.into(),
            tenant: tenant.into(),
            user: user.into(),
            priority,
            amount,
            submitted_at: DateTime::UNIX_EPOCH,
        }
    }
}

/// Work that exhausted its retry budget, awaiting manual handling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub work_id: String,
    pub tenant: String,
    pub user: String,
    pub last_error: String,
    pub retry_count: u32,
    pub failed_at: DateTime<Utc>,
}

/// Aggregated outcome of one batch dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub elapsed_ms: u64,
    /// Ids that failed or had no recorded outcome at the deadline, in
    /// submission order.
    pub failed_ids: Vec<String>,
}

impl BatchResult {
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.succeeded as f64 / self.total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_amount_rejects_non_positive() {
        assert!(Amount::new(dec!(0.0)).is_err());
        assert!(Amount::new(dec!(-5.0)).is_err());
        assert_eq!(Amount::new(dec!(12.5)).unwrap().value(), dec!(12.5));
    }

    #[test]
    fn test_priority_class_ordering() {
        assert!(PaymentPriority::Critical < PaymentPriority::Standard);
        assert!(PaymentPriority::Standard < PaymentPriority::Batch);
        assert_eq!(PaymentPriority::Critical.class(), 1);
        assert_eq!(PaymentPriority::Batch.class(), 6);
    }

    #[test]
    fn test_batch_result_success_rate() {
        let result = BatchResult {
            total: 20,
            succeeded: 15,
            failed: 5,
            elapsed_ms: 100,
            failed_ids: vec![],
        };
        assert!((result.success_rate() - 0.75).abs() < f64::EPSILON);
    }
}
