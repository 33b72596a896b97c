//! Per-host request pacing.
//!
//! Upstream quote hosts throttle callers that hammer them on a fixed
//! cadence. All workers reserve send slots from one shared map, so requests
//! to the same host are spaced by a jittered minimum regardless of which
//! worker issues them. Different hosts pace independently.

use dashmap::DashMap;
use rand::Rng;
use std::time::Duration;
use tokio::time::Instant;

pub struct RateLimiter {
    min_spacing: Duration,
    jitter: Duration,
    /// Next free send slot per host.
    next_slot: DashMap<String, Instant>,
}

impl RateLimiter {
    pub fn new(min_spacing: Duration, jitter: Duration) -> Self {
        Self {
            min_spacing,
            jitter,
            next_slot: DashMap::new(),
        }
    }

    /// Reserve the next send slot for `host` and wait until it arrives.
    ///
    /// The reservation happens atomically under the map entry; the sleep
    /// happens after the entry is released, so other workers can queue
    /// behind this slot while we wait.
    pub async fn acquire(&self, host: &str) {
        if self.min_spacing.is_zero() && self.jitter.is_zero() {
            return;
        }

        let spacing = self.min_spacing + self.random_jitter();
        let slot = {
            let mut entry = self
                .next_slot
                .entry(host.to_string())
                .or_insert_with(Instant::now);
            let now = Instant::now();
            let slot = (*entry).max(now);
            *entry = slot + spacing;
            slot
        };

        tokio::time::sleep_until(slot).await;
    }

    fn random_jitter(&self) -> Duration {
        if self.jitter.is_zero() {
            return Duration::ZERO;
        }
        let max_ms = self.jitter.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_host_requests_are_spaced() {
        let limiter = RateLimiter::new(Duration::from_millis(50), Duration::ZERO);

        let start = Instant::now();
        limiter.acquire("quotes.example").await;
        limiter.acquire("quotes.example").await;
        limiter.acquire("quotes.example").await;

        // Third acquire cannot land before 2 spacing intervals
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_different_hosts_pace_independently() {
        let limiter = RateLimiter::new(Duration::from_millis(200), Duration::ZERO);

        let start = Instant::now();
        limiter.acquire("a.example").await;
        limiter.acquire("b.example").await;

        // Second host pays no spacing debt from the first
        assert!(start.elapsed() < Duration::from_millis(150));
    }

    #[tokio::test]
    async fn test_zero_spacing_is_free() {
        let limiter = RateLimiter::new(Duration::ZERO, Duration::ZERO);
        let start = Instant::now();
        for _ in 0..100 {
            limiter.acquire("quotes.example").await;
        }
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_concurrent_workers_share_the_schedule() {
        use std::sync::Arc;

        let limiter = Arc::new(RateLimiter::new(Duration::from_millis(40), Duration::ZERO));
        let start = Instant::now();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                limiter.acquire("quotes.example").await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        // 4 workers against one host: at least 3 spacing intervals elapse
        assert!(start.elapsed() >= Duration::from_millis(120));
    }
}
