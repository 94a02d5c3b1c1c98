//! Per-scope admission throttling.
//!
//! Every payment must clear three token buckets before it may proceed:
//! global, tenant, user. Buckets are checked in that order and the first
//! one without capacity denies the request; scopes already debited are not
//! refunded. Scope limiters are created lazily with the configured quota
//! on first use.

use crate::config::AdmissionConfig;
use governor::clock::{Clock as GovernorClock, DefaultClock};
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use tokio::sync::RwLock;

type ScopeLimiter<C> = RateLimiter<NotKeyed, InMemoryState, C, NoOpMiddleware<<C as GovernorClock>::Instant>>;

pub struct AdmissionControl<C: GovernorClock = DefaultClock> {
    config: AdmissionConfig,
    clock: C,
    global: ScopeLimiter<C>,
    tenants: RwLock<HashMap<String, Arc<ScopeLimiter<C>>>>,
    users: RwLock<HashMap<String, Arc<ScopeLimiter<C>>>>,
}

impl AdmissionControl<DefaultClock> {
    pub fn new(config: AdmissionConfig) -> Self {
        Self::with_clock(config, DefaultClock::default())
    }
}

impl<C: GovernorClock> AdmissionControl<C> {
    pub fn with_clock(config: AdmissionConfig, clock: C) -> Self {
        let global = RateLimiter::direct_with_clock(per_second(config.global_per_second), &clock);
        Self {
            config,
            clock,
            global,
            tenants: RwLock::new(HashMap::new()),
            users: RwLock::new(HashMap::new()),
        }
    }

    /// Non-blocking admission check; consumes one token from each scope it
    /// clears. Callers that want to wait must re-invoke later.
    pub async fn try_admit(&self, tenant: &str, user: &str) -> bool {
        if self.global.check().is_err() {
            tracing::warn!("global rate limit exceeded");
            return false;
        }

        let tenant_limiter = self
            .scope_limiter(&self.tenants, tenant, per_minute(self.config.tenant_per_minute))
            .await;
        if tenant_limiter.check().is_err() {
            tracing::warn!(tenant, "tenant rate limit exceeded");
            return false;
        }

        let user_limiter = self
            .scope_limiter(&self.users, user, per_minute(self.config.user_per_minute))
            .await;
        if user_limiter.check().is_err() {
            tracing::warn!(user, "user rate limit exceeded");
            return false;
        }

        true
    }

    async fn scope_limiter(
        &self,
        limiters: &RwLock<HashMap<String, Arc<ScopeLimiter<C>>>>,
        key: &str,
        quota: Quota,
    ) -> Arc<ScopeLimiter<C>> {
        {
            let read_guard = limiters.read().await;
            if let Some(limiter) = read_guard.get(key) {
                return Arc::clone(limiter);
            }
        }

        let mut write_guard = limiters.write().await;
        // Double-check after acquiring the write lock.
        if let Some(limiter) = write_guard.get(key) {
            return Arc::clone(limiter);
        }

        let limiter = Arc::new(RateLimiter::direct_with_clock(quota, &self.clock));
        write_guard.insert(key.to_string(), Arc::clone(&limiter));
        limiter
    }
}

fn per_second(count: u32) -> Quota {
    Quota::per_second(NonZeroU32::new(count.max(1)).unwrap_or(NonZeroU32::MIN))
}

fn per_minute(count: u32) -> Quota {
    Quota::per_minute(NonZeroU32::new(count.max(1)).unwrap_or(NonZeroU32::MIN))
}
