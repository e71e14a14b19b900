//! Configuration for the sync engine.

use crate::policy::{RetryPolicy, TokenBucket};
use shopsync_adapter::FetchSelector;
use std::time::Duration;

/// Rate-limit parameters for one platform.
#[derive(Debug, Clone, Copy)]
pub struct RateLimit {
    /// Burst capacity of the token bucket.
    pub capacity: u32,
    /// Steady-state refill rate, tokens per second.
    pub per_sec: f64,
}

impl RateLimit {
    /// Builds a token bucket from these parameters.
    #[must_use]
    pub fn bucket(&self) -> TokenBucket {
        TokenBucket::new(self.capacity, self.per_sec)
    }
}

/// Configuration for one run coordinator.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// What subset of the catalogs to fetch.
    pub selector: FetchSelector,
    /// Retry/backoff budget shared by fetches and applies.
    pub retry: RetryPolicy,
    /// Rate limit for storefront calls.
    pub storefront_rate: RateLimit,
    /// Rate limit for inventory calls.
    pub inventory_rate: RateLimit,
    /// After this long, a lease holder is reported as stale.
    pub lease_timeout: Duration,
    /// Diff and resolve, but apply nothing.
    pub dry_run: bool,
}

impl EngineConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            selector: FetchSelector::default(),
            retry: RetryPolicy::default(),
            // The storefront throttles in short bursts; the inventory
            // platform budgets per minute.
            storefront_rate: RateLimit {
                capacity: 40,
                per_sec: 2.0,
            },
            inventory_rate: RateLimit {
                capacity: 100,
                per_sec: 100.0 / 60.0,
            },
            lease_timeout: Duration::from_secs(15 * 60),
            dry_run: false,
        }
    }

    /// Sets the fetch selector.
    #[must_use]
    pub fn with_selector(mut self, selector: FetchSelector) -> Self {
        self.selector = selector;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the storefront rate limit.
    #[must_use]
    pub fn with_storefront_rate(mut self, rate: RateLimit) -> Self {
        self.storefront_rate = rate;
        self
    }

    /// Sets the inventory rate limit.
    #[must_use]
    pub fn with_inventory_rate(mut self, rate: RateLimit) -> Self {
        self.inventory_rate = rate;
        self
    }

    /// Sets the lease staleness timeout.
    #[must_use]
    pub fn with_lease_timeout(mut self, timeout: Duration) -> Self {
        self.lease_timeout = timeout;
        self
    }

    /// Enables dry-run mode.
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_chains() {
        let config = EngineConfig::new()
            .with_dry_run(true)
            .with_lease_timeout(Duration::from_secs(60))
            .with_storefront_rate(RateLimit {
                capacity: 5,
                per_sec: 1.0,
            });

        assert!(config.dry_run);
        assert_eq!(config.lease_timeout, Duration::from_secs(60));
        assert_eq!(config.storefront_rate.capacity, 5);
    }

    #[test]
    fn rate_limit_builds_bucket() {
        let rate = RateLimit {
            capacity: 2,
            per_sec: 0.0,
        };
        let bucket = rate.bucket();
        assert!(bucket.try_take());
        assert!(bucket.try_take());
        assert!(!bucket.try_take());
    }
}
