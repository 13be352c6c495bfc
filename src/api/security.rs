//! Per-user rate limiting
//!
//! Token buckets keyed by caller and operation class. Money-moving calls
//! (bet, win, rollback) share one budget; server spins have a tighter one.
//! Buckets of callers that went quiet are evicted by a background task.

use crate::config::LimitsConfig;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// How often the cleanup task sweeps the bucket map
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(30);
/// Buckets untouched for this long and back at capacity are dropped
pub const IDLE_BUCKET_TTL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LimitClass {
    Wager,
    Spin,
}

/// Token bucket refilled continuously at `refill_rate` tokens per second
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
    capacity: f64,
    refill_rate: f64,
}

impl TokenBucket {
    fn new(per_second: u32) -> Self {
        Self {
            tokens: per_second as f64,
            last_refill: Instant::now(),
            capacity: per_second as f64,
            refill_rate: per_second as f64,
        }
    }

    fn try_consume(&mut self, tokens: f64) -> bool {
        self.refill();

        if self.tokens >= tokens {
            self.tokens -= tokens;
            true
        } else {
            false
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();

        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }

    /// Dropping an idle, refilled bucket is indistinguishable from keeping it
    fn is_idle(&self, now: Instant, ttl: Duration) -> bool {
        let elapsed = now.saturating_duration_since(self.last_refill);
        let refilled = self.tokens + elapsed.as_secs_f64() * self.refill_rate;
        elapsed >= ttl && refilled >= self.capacity
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    wager_per_second: u32,
    spin_per_second: u32,
    buckets: Arc<DashMap<(String, LimitClass), TokenBucket>>,
}

impl RateLimiter {
    pub fn new(wager_per_second: u32, spin_per_second: u32) -> Self {
        Self {
            wager_per_second,
            spin_per_second,
            buckets: Arc::new(DashMap::new()),
        }
    }

    pub fn from_limits(limits: &LimitsConfig) -> Self {
        Self::new(limits.bet_ops_per_second, limits.spin_ops_per_second)
    }

    pub fn limit_of(&self, class: LimitClass) -> u32 {
        match class {
            LimitClass::Wager => self.wager_per_second,
            LimitClass::Spin => self.spin_per_second,
        }
    }

    /// Take one token for `caller`; false when the budget is exhausted
    pub fn check(&self, caller: &str, class: LimitClass) -> bool {
        let limit = self.limit_of(class);
        self.buckets
            .entry((caller.to_string(), class))
            .or_insert_with(|| TokenBucket::new(limit))
            .try_consume(1.0)
    }

    pub fn tracked_callers(&self) -> usize {
        self.buckets.len()
    }

    /// Remove buckets idle for at least `ttl`; returns how many were dropped
    pub fn evict_idle(&self, ttl: Duration) -> usize {
        let now = Instant::now();
        let before = self.buckets.len();
        self.buckets.retain(|_, bucket| !bucket.is_idle(now, ttl));
        before.saturating_sub(self.buckets.len())
    }

    /// Start cleanup task for idle buckets
    pub fn start_cleanup_task(limiter: RateLimiter) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(CLEANUP_INTERVAL);

            loop {
                interval.tick().await;
                let evicted = limiter.evict_idle(IDLE_BUCKET_TTL);
                debug!(
                    evicted,
                    remaining = limiter.tracked_callers(),
                    "rate limiter cleanup"
                );
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_is_capped_per_second() {
        let limiter = RateLimiter::new(20, 5);
        let spins = (0..10).filter(|_| limiter.check("alice", LimitClass::Spin)).count();
        assert_eq!(spins, 5);

        // Separate budgets per class and per caller
        assert!(limiter.check("alice", LimitClass::Wager));
        assert!(limiter.check("bob", LimitClass::Spin));
        assert_eq!(limiter.tracked_callers(), 3);
    }

    #[test]
    fn test_bucket_refills() {
        let mut bucket = TokenBucket::new(2);
        assert!(bucket.try_consume(1.0));
        assert!(bucket.try_consume(1.0));
        assert!(!bucket.try_consume(1.0));
        bucket.last_refill -= Duration::from_millis(600);
        assert!(bucket.try_consume(1.0));
    }

    fn age(limiter: &RateLimiter, caller: &str, class: LimitClass, by: Duration) {
        if let Some(mut bucket) = limiter.buckets.get_mut(&(caller.to_string(), class)) {
            bucket.last_refill -= by;
        }
    }

    #[test]
    fn test_idle_buckets_are_evicted() {
        let limiter = RateLimiter::new(20, 5);
        for i in 0..100 {
            assert!(limiter.check(&format!("caller-{}", i), LimitClass::Wager));
        }
        assert!(limiter.check("active", LimitClass::Spin));
        for i in 0..100 {
            age(&limiter, &format!("caller-{}", i), LimitClass::Wager, IDLE_BUCKET_TTL);
        }

        assert_eq!(limiter.evict_idle(IDLE_BUCKET_TTL), 100);
        assert_eq!(limiter.tracked_callers(), 1);
    }

    #[test]
    fn test_recently_drained_bucket_survives_eviction() {
        let limiter = RateLimiter::new(20, 5);
        for _ in 0..5 {
            assert!(limiter.check("alice", LimitClass::Spin));
        }
        assert!(!limiter.check("alice", LimitClass::Spin));

        // Evicting here would hand alice a fresh burst
        assert_eq!(limiter.evict_idle(IDLE_BUCKET_TTL), 0);
        assert!(!limiter.check("alice", LimitClass::Spin));
    }

    #[tokio::test]
    async fn test_cleanup_task_sweeps_on_first_tick() {
        let limiter = RateLimiter::new(20, 5);
        assert!(limiter.check("ghost", LimitClass::Wager));
        age(&limiter, "ghost", LimitClass::Wager, IDLE_BUCKET_TTL);

        let handle = RateLimiter::start_cleanup_task(limiter.clone());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(limiter.tracked_callers(), 0);
        handle.abort();
    }
}
