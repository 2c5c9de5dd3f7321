use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Per-domain minimum-interval rate limiter.
///
/// Holds the last-access instant of every domain it has seen. `acquire` is
/// the only mutation: read the last instant, sleep out the rest of the
/// period if needed, then record the new instant.
///
/// The limiter has no internal locking. It is owned by the single worker
/// that issues requests, and `&mut self` on `acquire` makes that the only
/// way to use it.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    default_period: Duration,
    periods: HashMap<String, Duration>,
    last_access: HashMap<String, Instant>,
}

impl RateLimiter {
    pub fn new(default_period: Duration) -> Self {
        Self {
            default_period,
            periods: HashMap::new(),
            last_access: HashMap::new(),
        }
    }

    /// Overrides the period for one domain.
    pub fn with_period(mut self, domain: impl Into<String>, period: Duration) -> Self {
        self.periods.insert(domain.into(), period);
        self
    }

    pub fn period(&self, domain: &str) -> Duration {
        self.periods
            .get(domain)
            .copied()
            .unwrap_or(self.default_period)
    }

    pub fn last_access(&self, domain: &str) -> Option<Instant> {
        self.last_access.get(domain).copied()
    }

    /// Waits until `period(domain)` has elapsed since the previous `acquire`
    /// for `domain`, then records now as its last access. Never fails.
    pub async fn acquire(&mut self, domain: &str) {
        let period = self.period(domain);
        if let Some(last) = self.last_access.get(domain) {
            let elapsed = last.elapsed();
            if elapsed < period {
                let wait = period - elapsed;
                tracing::trace!(
                    domain = domain,
                    wait_ms = wait.as_millis() as u64,
                    "Rate limiting request"
                );
                tokio::time::sleep(wait).await;
            }
        }
        self.last_access.insert(domain.to_owned(), Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_first_acquire_does_not_wait() {
        let mut limiter = RateLimiter::new(Duration::from_secs(1));
        let start = Instant::now();
        limiter.acquire("imgur.com").await;
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert!(limiter.last_access("imgur.com").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_domain_waits_full_period() {
        let mut limiter = RateLimiter::new(Duration::from_secs(1));
        let start = Instant::now();

        limiter.acquire("imgur.com").await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        limiter.acquire("imgur.com").await;

        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_domains_are_independent() {
        let mut limiter = RateLimiter::new(Duration::from_secs(1));
        let start = Instant::now();

        limiter.acquire("imgur.com").await;
        limiter.acquire("gfycat.com").await;

        assert!(start.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_wait_once_period_has_passed() {
        let mut limiter = RateLimiter::new(Duration::from_secs(1));
        limiter.acquire("imgur.com").await;
        tokio::time::sleep(Duration::from_secs(3)).await;

        let before = Instant::now();
        limiter.acquire("imgur.com").await;
        assert_eq!(before.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_domain_override_period() {
        let mut limiter = RateLimiter::new(Duration::from_secs(1))
            .with_period("old.reddit.com", Duration::from_secs(2));
        assert_eq!(limiter.period("old.reddit.com"), Duration::from_secs(2));
        assert_eq!(limiter.period("imgur.com"), Duration::from_secs(1));

        let start = Instant::now();
        limiter.acquire("old.reddit.com").await;
        limiter.acquire("old.reddit.com").await;
        assert!(start.elapsed() >= Duration::from_secs(2));
    }
}
