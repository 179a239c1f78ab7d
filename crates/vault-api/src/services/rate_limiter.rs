//! Per-client request limiting.
//!
//! A keyed GCRA limiter owned by the service container. Each client identity
//! gets its own bucket; idle buckets are dropped by [`RequestLimiter::evict_idle`],
//! normally driven by [`RequestLimiter::spawn_eviction`].

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::{Clock, DefaultClock};
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use vault_core::{Error, Result};

use crate::config::RateLimitConfig;

type KeyedLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Result of checking one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    /// Rejected; the client may retry after the given wait.
    Limited { retry_after: Duration },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

pub struct RequestLimiter {
    limiter: KeyedLimiter,
    clock: DefaultClock,
}

impl RequestLimiter {
    /// Build a limiter allowing `requests` per `period` per client.
    ///
    /// The full allowance is available as a burst; afterwards one request is
    /// replenished every `period / requests`.
    pub fn new(config: &RateLimitConfig) -> Result<Self> {
        let burst = NonZeroU32::new(config.requests)
            .ok_or_else(|| Error::Config("RATE_LIMIT_REQUESTS must be positive".into()))?;
        let quota = Quota::with_period(config.period / config.requests)
            .ok_or_else(|| Error::Config("RATE_LIMIT_PERIOD_SECS must be positive".into()))?
            .allow_burst(burst);

        let clock = DefaultClock::default();
        let limiter = RateLimiter::new(quota, DefaultKeyedStateStore::default(), &clock);
        Ok(Self { limiter, clock })
    }

    /// Count one request from `client`.
    pub fn check(&self, client: &str) -> RateDecision {
        match self.limiter.check_key(&client.to_string()) {
            Ok(()) => RateDecision::Allowed,
            Err(not_until) => {
                let retry_after = not_until.wait_time_from(self.clock.now());
                warn!(
                    subsystem = "service",
                    component = "rate_limit",
                    client = client,
                    retry_after_ms = retry_after.as_millis() as u64,
                    "Rate limit exceeded"
                );
                RateDecision::Limited { retry_after }
            }
        }
    }

    /// Drop buckets that have fully replenished.
    pub fn evict_idle(&self) -> usize {
        let before = self.limiter.len();
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
        let evicted = before.saturating_sub(self.limiter.len());
        debug!(
            subsystem = "service",
            component = "rate_limit",
            op = "evict",
            evicted,
            remaining = self.limiter.len(),
            "Evicted idle rate limit buckets"
        );
        evicted
    }

    /// Number of tracked clients.
    pub fn len(&self) -> usize {
        self.limiter.len()
    }

    pub fn is_empty(&self) -> bool {
        self.limiter.is_empty()
    }

    /// Run [`Self::evict_idle`] on a fixed interval until the task is aborted.
    pub fn spawn_eviction(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self.evict_idle();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(requests: u32, period: Duration) -> RequestLimiter {
        RequestLimiter::new(&RateLimitConfig { requests, period }).unwrap()
    }

    #[test]
    fn test_burst_then_limited() {
        let limiter = limiter(3, Duration::from_secs(3600));
        for _ in 0..3 {
            assert!(limiter.check("alice").is_allowed());
        }
        match limiter.check("alice") {
            RateDecision::Limited { retry_after } => {
                assert!(retry_after > Duration::ZERO);
                assert!(retry_after <= Duration::from_secs(1200));
            }
            RateDecision::Allowed => panic!("fourth request should be limited"),
        }
    }

    #[test]
    fn test_clients_are_independent() {
        let limiter = limiter(1, Duration::from_secs(3600));
        assert!(limiter.check("alice").is_allowed());
        assert!(!limiter.check("alice").is_allowed());
        assert!(limiter.check("bob").is_allowed());
        assert_eq!(limiter.len(), 2);
    }

    #[test]
    fn test_evict_idle_drops_replenished_buckets() {
        let limiter = limiter(1, Duration::from_millis(1));
        limiter.check("alice");
        limiter.check("bob");
        assert_eq!(limiter.len(), 2);

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(limiter.evict_idle(), 2);
        assert!(limiter.is_empty());
    }

    #[test]
    fn test_evict_idle_keeps_active_buckets() {
        let limiter = limiter(2, Duration::from_secs(3600));
        limiter.check("alice");
        assert_eq!(limiter.evict_idle(), 0);
        assert_eq!(limiter.len(), 1);
    }

    #[test]
    fn test_zero_values_rejected() {
        let err = RequestLimiter::new(&RateLimitConfig {
            requests: 0,
            period: Duration::from_secs(60),
        })
        .err()
        .unwrap();
        assert!(matches!(err, Error::Config(_)));

        let err = RequestLimiter::new(&RateLimitConfig {
            requests: 10,
            period: Duration::ZERO,
        })
        .err()
        .unwrap();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_spawned_eviction_runs() {
        let limiter = Arc::new(limiter(1, Duration::from_millis(1)));
        limiter.check("alice");
        let handle = Arc::clone(&limiter).spawn_eviction(Duration::from_millis(10));

        let mut evicted = false;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if limiter.is_empty() {
                evicted = true;
                break;
            }
        }
        handle.abort();
        assert!(evicted);
    }
}
