//! Per-endpoint circuit breaking.
//!
//! One breaker per downstream key (bank, processor). Transitions for a key
//! are serialized by that key's own mutex, so unrelated endpoints never
//! contend and no two callers can both claim the half-open probe slot.

use crate::config::BreakerConfig;
use crate::domain::ports::Clock;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation, calls pass through.
    Closed,
    /// Tripped, calls are rejected until the timeout elapses.
    Open,
    /// A single probe call is in flight.
    HalfOpen,
}

/// Outcome of a protected call.
#[derive(Debug)]
pub enum ProtectedCallError<E> {
    /// The circuit is open; the downstream operation was never invoked.
    CircuitOpen,
    /// The downstream operation ran and failed.
    Inner(E),
}

impl<E> ProtectedCallError<E> {
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen)
    }
}

#[derive(Debug)]
struct Breaker {
    state: CircuitState,
    consecutive_failures: u32,
    /// Last failure in Open, probe admission time in HalfOpen.
    since: DateTime<Utc>,
}

impl Breaker {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            since: DateTime::UNIX_EPOCH,
        }
    }
}

pub struct CircuitBreakerRegistry {
    failure_threshold: u32,
    open_timeout: Duration,
    breakers: RwLock<HashMap<String, Arc<Mutex<Breaker>>>>,
    clock: Arc<dyn Clock>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: BreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            failure_threshold: config.failure_threshold.max(1),
            open_timeout: Duration::seconds(config.open_timeout_secs as i64),
            breakers: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Runs `call` behind the breaker for `key`.
    ///
    /// Open circuits reject immediately without invoking the operation.
    /// After the open timeout, exactly one caller is admitted as a probe;
    /// its success closes the circuit, its failure re-opens it. If a probe
    /// is abandoned (the future dropped before completing), another probe
    /// is admitted once a further timeout elapses.
    pub async fn execute<F, Fut, T, E>(&self, key: &str, call: F) -> Result<T, ProtectedCallError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let breaker = self.breaker_for(key).await;

        {
            let mut guard = breaker.lock().await;
            let now = self.clock.now();
            match guard.state {
                CircuitState::Closed => {}
                CircuitState::Open | CircuitState::HalfOpen => {
                    if now - guard.since < self.open_timeout {
                        return Err(ProtectedCallError::CircuitOpen);
                    }
                    // Claim the probe slot for this caller.
                    guard.state = CircuitState::HalfOpen;
                    guard.since = now;
                    tracing::info!(key, "circuit breaker transitioned to HALF_OPEN");
                }
            }
        }

        match call().await {
            Ok(value) => {
                self.record_success(key, &breaker).await;
                Ok(value)
            }
            Err(err) => {
                self.record_failure(key, &breaker).await;
                Err(ProtectedCallError::Inner(err))
            }
        }
    }

    /// Current state of one key's breaker, if it has been used.
    pub async fn state(&self, key: &str) -> Option<CircuitState> {
        let breakers = self.breakers.read().await;
        match breakers.get(key) {
            Some(breaker) => Some(breaker.lock().await.state),
            None => None,
        }
    }

    /// Snapshot of every breaker, for monitoring.
    pub async fn status(&self) -> HashMap<String, (CircuitState, u32)> {
        let breakers = self.breakers.read().await;
        let mut status = HashMap::with_capacity(breakers.len());
        for (key, breaker) in breakers.iter() {
            let guard = breaker.lock().await;
            status.insert(key.clone(), (guard.state, guard.consecutive_failures));
        }
        status
    }

    async fn breaker_for(&self, key: &str) -> Arc<Mutex<Breaker>> {
        {
            let breakers = self.breakers.read().await;
            if let Some(breaker) = breakers.get(key) {
                return Arc::clone(breaker);
            }
        }
        let mut breakers = self.breakers.write().await;
        Arc::clone(
            breakers
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(Breaker::new()))),
        )
    }

    async fn record_success(&self, key: &str, breaker: &Mutex<Breaker>) {
        let mut guard = breaker.lock().await;
        guard.consecutive_failures = 0;
        if guard.state == CircuitState::HalfOpen {
            guard.state = CircuitState::Closed;
            tracing::info!(key, "circuit breaker transitioned to CLOSED");
        }
    }

    async fn record_failure(&self, key: &str, breaker: &Mutex<Breaker>) {
        let mut guard = breaker.lock().await;
        let now = self.clock.now();
        match guard.state {
            CircuitState::Closed => {
                guard.consecutive_failures += 1;
                if guard.consecutive_failures >= self.failure_threshold {
                    guard.state = CircuitState::Open;
                    guard.since = now;
                    tracing::warn!(
                        key,
                        failures = guard.consecutive_failures,
                        "circuit breaker transitioned to OPEN"
                    );
                }
            }
            CircuitState::HalfOpen => {
                guard.state = CircuitState::Open;
                guard.since = now;
                tracing::warn!(key, "circuit breaker back to OPEN (probe failed)");
            }
            CircuitState::Open => {
                // A straggler from before the trip; extend the open window.
                guard.since = now;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::clock::ManualClock;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn registry(clock: Arc<ManualClock>) -> CircuitBreakerRegistry {
        CircuitBreakerRegistry::new(
            BreakerConfig {
                failure_threshold: 5,
                open_timeout_secs: 60,
            },
            clock,
        )
    }

    async fn fail(registry: &CircuitBreakerRegistry, key: &str) {
        let result: Result<(), _> = registry.execute(key, || async { Err::<(), _>("boom") }).await;
        assert!(!matches!(result, Err(ProtectedCallError::CircuitOpen)));
    }

    #[tokio::test]
    async fn test_five_failures_open_the_circuit() {
        let clock = Arc::new(ManualClock::new(DateTime::UNIX_EPOCH));
        let registry = registry(clock);

        for _ in 0..4 {
            fail(&registry, "BANK_A").await;
            assert_eq!(registry.state("BANK_A").await, Some(CircuitState::Closed));
        }
        fail(&registry, "BANK_A").await;
        assert_eq!(registry.state("BANK_A").await, Some(CircuitState::Open));
    }

    #[tokio::test]
    async fn test_open_circuit_rejects_without_invoking() {
        let clock = Arc::new(ManualClock::new(DateTime::UNIX_EPOCH));
        let registry = registry(clock);

        for _ in 0..5 {
            fail(&registry, "BANK_A").await;
        }

        let invoked = AtomicU32::new(0);
        let result: Result<(), ProtectedCallError<&str>> = registry
            .execute("BANK_A", || {
                invoked.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;
        assert!(matches!(result, Err(ProtectedCallError::CircuitOpen)));
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_probe_success_closes_after_timeout() {
        let clock = Arc::new(ManualClock::new(DateTime::UNIX_EPOCH));
        let registry = registry(Arc::clone(&clock));

        for _ in 0..5 {
            fail(&registry, "BANK_A").await;
        }

        clock.advance(Duration::seconds(61));
        let result: Result<&str, ProtectedCallError<&str>> =
            registry.execute("BANK_A", || async { Ok("ok") }).await;
        assert!(result.is_ok());
        assert_eq!(registry.state("BANK_A").await, Some(CircuitState::Closed));

        // Counter was reset: it takes a full threshold of failures to trip again.
        for _ in 0..4 {
            fail(&registry, "BANK_A").await;
        }
        assert_eq!(registry.state("BANK_A").await, Some(CircuitState::Closed));
    }

    #[tokio::test]
    async fn test_probe_failure_reopens() {
        let clock = Arc::new(ManualClock::new(DateTime::UNIX_EPOCH));
        let registry = registry(Arc::clone(&clock));

        for _ in 0..5 {
            fail(&registry, "BANK_A").await;
        }

        clock.advance(Duration::seconds(61));
        fail(&registry, "BANK_A").await;
        assert_eq!(registry.state("BANK_A").await, Some(CircuitState::Open));

        // Still rejecting before another full timeout.
        let result: Result<(), ProtectedCallError<&str>> =
            registry.execute("BANK_A", || async { Ok(()) }).await;
        assert!(matches!(result, Err(ProtectedCallError::CircuitOpen)));
    }

    #[tokio::test]
    async fn test_only_one_probe_admitted() {
        let clock = Arc::new(ManualClock::new(DateTime::UNIX_EPOCH));
        let registry = Arc::new(registry(Arc::clone(&clock)));

        for _ in 0..5 {
            fail(&registry, "BANK_A").await;
        }
        clock.advance(Duration::seconds(61));

        // First caller claims the probe slot and parks on this channel.
        let (release, gate) = tokio::sync::oneshot::channel::<()>();
        let probe_registry = Arc::clone(&registry);
        let probe = tokio::spawn(async move {
            probe_registry
                .execute("BANK_A", || async move {
                    let _ = gate.await;
                    Ok::<_, &str>("probe")
                })
                .await
        });

        // Give the probe task a chance to claim the slot.
        tokio::task::yield_now().await;
        while registry.state("BANK_A").await != Some(CircuitState::HalfOpen) {
            tokio::task::yield_now().await;
        }

        // A second caller is rejected while the probe is in flight.
        let result: Result<(), ProtectedCallError<&str>> =
            registry.execute("BANK_A", || async { Ok(()) }).await;
        assert!(matches!(result, Err(ProtectedCallError::CircuitOpen)));

        release.send(()).unwrap();
        assert!(probe.await.unwrap().is_ok());
        assert_eq!(registry.state("BANK_A").await, Some(CircuitState::Closed));
    }

    #[tokio::test]
    async fn test_keys_are_isolated() {
        let clock = Arc::new(ManualClock::new(DateTime::UNIX_EPOCH));
        let registry = registry(clock);

        for _ in 0..5 {
            fail(&registry, "BANK_A").await;
        }
        assert_eq!(registry.state("BANK_A").await, Some(CircuitState::Open));

        let result: Result<&str, ProtectedCallError<&str>> =
            registry.execute("BANK_B", || async { Ok("ok") }).await;
        assert!(result.is_ok());
        assert_eq!(registry.state("BANK_B").await, Some(CircuitState::Closed));
    }

    #[tokio::test]
    async fn test_success_resets_failure_streak() {
        let clock = Arc::new(ManualClock::new(DateTime::UNIX_EPOCH));
        let registry = registry(clock);

        for _ in 0..4 {
            fail(&registry, "BANK_A").await;
        }
        let result: Result<(), ProtectedCallError<&str>> =
            registry.execute("BANK_A", || async { Ok(()) }).await;
        assert!(result.is_ok());

        // Four more failures do not trip it; the fifth consecutive one does.
        for _ in 0..4 {
            fail(&registry, "BANK_A").await;
            assert_eq!(registry.state("BANK_A").await, Some(CircuitState::Closed));
        }
        fail(&registry, "BANK_A").await;
        assert_eq!(registry.state("BANK_A").await, Some(CircuitState::Open));
    }
}
