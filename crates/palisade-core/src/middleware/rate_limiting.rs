//! Per-client token-bucket rate limiting with an exemption set.

use ahash::AHashSet;
use dashmap::{mapref::entry::Entry, DashMap};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

/// Per-IP token-bucket registry.
///
/// Each bucket starts full with a burst capacity of one tenth of the
/// per-minute rate and refills continuously. Exempt IPs bypass the registry
/// entirely. Reads proceed concurrently; only the first sighting of an IP
/// takes a shard write lock, and a losing concurrent creator observes and
/// reuses the winner's bucket.
pub struct VisitorLimiter {
    buckets: Arc<DashMap<String, TokenBucket>>,
    exempt: AHashSet<String>,
    /// Burst capacity; buckets start full at this value.
    burst: f64,
    /// Continuous refill rate in tokens per second.
    per_second: f64,
    prune_interval: Duration,
    bucket_ttl: Duration,
}

#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
    last_access: Instant,
}

impl TokenBucket {
    fn full(capacity: f64, now: Instant) -> Self {
        Self { tokens: capacity, last_refill: now, last_access: now }
    }

    /// Refills for elapsed time, then withdraws one token if available.
    /// Never blocks; a drained bucket means an immediate deny.
    fn try_withdraw(&mut self, now: Instant, capacity: f64, per_second: f64) -> bool {
        self.last_access = now;

        let elapsed = now.duration_since(self.last_refill);
        self.tokens = (self.tokens + elapsed.as_secs_f64() * per_second).min(capacity);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

impl VisitorLimiter {
    const PRUNE_INTERVAL: Duration = Duration::from_secs(300);
    const BUCKET_TTL: Duration = Duration::from_secs(300);

    /// Creates a limiter admitting `requests_per_minute` sustained requests
    /// per IP, with the given exempt IPs never limited or tracked.
    #[must_use]
    pub fn new<I, S>(requests_per_minute: u32, exempt_ips: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            buckets: Arc::new(DashMap::new()),
            exempt: exempt_ips.into_iter().map(Into::into).collect(),
            burst: f64::from((requests_per_minute / 10).max(1)),
            per_second: f64::from(requests_per_minute) / 60.0,
            prune_interval: Self::PRUNE_INTERVAL,
            bucket_ttl: Self::BUCKET_TTL,
        }
    }

    /// Decides whether one request from `ip` is admitted right now.
    ///
    /// Returns `(allowed, newly_created)`. Exempt IPs are always
    /// `(true, false)` without touching the registry. `newly_created` is true
    /// only for the caller that actually inserted the bucket; when two
    /// requests race on a first sighting, exactly one reports it.
    #[must_use]
    pub fn allow_visitor(&self, ip: &str) -> (bool, bool) {
        if self.exempt.contains(ip) {
            return (true, false);
        }

        let now = Instant::now();
        if let Some(mut bucket) = self.buckets.get_mut(ip) {
            return (bucket.try_withdraw(now, self.burst, self.per_second), false);
        }

        // First sighting: the entry API re-checks under the shard write lock.
        match self.buckets.entry(ip.to_string()) {
            Entry::Occupied(mut occupied) => {
                (occupied.get_mut().try_withdraw(now, self.burst, self.per_second), false)
            }
            Entry::Vacant(vacant) => {
                let mut bucket = TokenBucket::full(self.burst, now);
                let allowed = bucket.try_withdraw(now, self.burst, self.per_second);
                vacant.insert(bucket);
                (allowed, true)
            }
        }
    }

    /// Spawns a background task that drops buckets idle longer than the TTL,
    /// bounding registry growth under long-running load.
    pub fn start_pruning(&self) {
        let buckets = Arc::clone(&self.buckets);
        let interval = self.prune_interval;
        let ttl = self.bucket_ttl;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let now = Instant::now();
                buckets.retain(|_, bucket| now.duration_since(bucket.last_access) < ttl);
            }
        });
    }

    /// Number of currently tracked IPs.
    #[must_use]
    pub fn visitor_count(&self) -> usize {
        self.buckets.len()
    }
}
