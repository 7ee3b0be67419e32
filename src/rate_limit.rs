use dashmap::DashMap;
use governor::{
    clock::{Clock, DefaultClock},
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::{num::NonZeroU32, sync::Arc, time::Duration};

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Per-API-key request quota on the intake paths
#[derive(Clone)]
pub struct ApiKeyLimiter {
    // api key hash -> limiter
    limiters: Arc<DashMap<String, Arc<DirectLimiter>>>,
    max: u32,
    window: Duration,
}

impl ApiKeyLimiter {
    pub fn new(max: u32, window_ms: u64) -> Self {
        Self {
            limiters: Arc::new(DashMap::new()),
            max: max.max(1),
            window: Duration::from_millis(window_ms.max(1)),
        }
    }

    fn limiter_for(&self, key: &str) -> Arc<DirectLimiter> {
        if let Some(existing) = self.limiters.get(key) {
            return existing.clone();
        }

        let replenish = self.window / self.max;
        let quota = Quota::with_period(replenish.max(Duration::from_nanos(1)))
            .unwrap()
            .allow_burst(NonZeroU32::new(self.max).unwrap());

        let limiter = Arc::new(RateLimiter::direct(quota));
        self.limiters.insert(key.to_string(), limiter.clone());
        limiter
    }

    /// `Err(wait)` when the caller must back off for `wait` before retrying
    pub fn check(&self, api_key_hash: &str) -> Result<(), Duration> {
        let limiter = self.limiter_for(api_key_hash);
        limiter
            .check()
            .map_err(|n| n.wait_time_from(DefaultClock::default().now()))
    }
}
