//! TTL-cached, single-flight resolution of the upstream chain head.
//!
//! The block-range guard needs the latest block number to resolve symbolic
//! markers like `"latest"`, potentially for every call of every request.
//! [`LatestBlockCache`] answers that cheaply: results (including errors) are
//! trusted for a short TTL, and when the cache goes cold, exactly one upstream
//! call runs while every concurrent caller awaits its outcome.

use crate::upstream::UpstreamError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::watch;

/// Capability to fetch the current chain head block number.
///
/// Implemented by [`crate::upstream::UpstreamClient`] in production and by
/// counting mocks in tests.
#[async_trait]
pub trait BlockNumberSource: Send + Sync {
    async fn latest_block_number(&self) -> Result<u64, UpstreamError>;
}

/// Failure to resolve the chain head.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    /// The upstream fetch failed; carries the underlying error text. Cached
    /// like a value, so a failing upstream is not hammered with retries.
    #[error("{0}")]
    Upstream(String),

    /// The wait for an in-flight refresh ended without an outcome, e.g.
    /// because the process is shutting down.
    #[error("latest block fetch interrupted")]
    Interrupted,
}

#[derive(Default)]
struct CacheState {
    /// Last completed fetch outcome and when it was stored.
    cached: Option<(Result<u64, ResolveError>, Instant)>,
    /// Present while a refresh is running; resolves to `true` when it stores
    /// its outcome. Acts as the shared completion promise for all waiters.
    inflight: Option<watch::Receiver<bool>>,
}

/// Singleton cache for the upstream's latest block number.
///
/// `get()` returns the cached outcome while it is younger than the TTL —
/// errors included. On a cold or stale cache, the first caller claims the
/// in-flight slot under the state lock and a refresh task performs exactly
/// one upstream call; everyone else awaits the same completion signal.
/// Dropping a waiting `get()` future (request cancelled or timed out)
/// detaches promptly without disturbing the refresh other waiters observe.
#[derive(Clone)]
pub struct LatestBlockCache {
    inner: Arc<Inner>,
}

struct Inner {
    source: Arc<dyn BlockNumberSource>,
    ttl: Duration,
    state: Mutex<CacheState>,
}

impl LatestBlockCache {
    /// How long a fetched head (or fetch error) is trusted.
    pub const TTL: Duration = Duration::from_secs(5);

    #[must_use]
    pub fn new(source: Arc<dyn BlockNumberSource>) -> Self {
        Self::with_ttl(source, Self::TTL)
    }

    #[must_use]
    pub fn with_ttl(source: Arc<dyn BlockNumberSource>, ttl: Duration) -> Self {
        Self { inner: Arc::new(Inner { source, ttl, state: Mutex::new(CacheState::default()) }) }
    }

    /// Returns the latest block number, fetching at most once per TTL window.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Upstream`] when the (possibly cached) fetch
    /// failed, or [`ResolveError::Interrupted`] when an awaited refresh went
    /// away without completing.
    pub async fn get(&self) -> Result<u64, ResolveError> {
        let mut rx = {
            let mut state = self.inner.state.lock();

            if let Some((outcome, at)) = &state.cached {
                if at.elapsed() < self.inner.ttl {
                    return outcome.clone();
                }
            }

            match &state.inflight {
                Some(rx) => rx.clone(),
                None => {
                    // No refresh running: claim the slot while still holding
                    // the lock, so exactly one claimant spawns the fetch.
                    let (tx, rx) = watch::channel(false);
                    state.inflight = Some(rx.clone());
                    self.spawn_refresh(tx);
                    rx
                }
            }
        };

        rx.wait_for(|done| *done).await.map_err(|_| ResolveError::Interrupted)?;

        let state = self.inner.state.lock();
        match &state.cached {
            Some((outcome, _)) => outcome.clone(),
            None => Err(ResolveError::Interrupted),
        }
    }

    /// Runs the refresh as its own task so a cancelled claimant cannot strand
    /// the other waiters.
    fn spawn_refresh(&self, tx: watch::Sender<bool>) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let outcome = inner
                .source
                .latest_block_number()
                .await
                .map_err(|e| ResolveError::Upstream(e.to_string()));

            if let Err(err) = &outcome {
                tracing::warn!(error = %err, "latest block fetch failed");
            }

            let mut state = inner.state.lock();
            state.cached = Some((outcome, Instant::now()));
            state.inflight = None;
            drop(state);

            let _ = tx.send(true);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts fetches; optionally delays so tests can pile up waiters.
    struct CountingSource {
        calls: AtomicUsize,
        result: Result<u64, String>,
        delay: Duration,
    }

    impl CountingSource {
        fn ok(value: u64) -> Self {
            Self { calls: AtomicUsize::new(0), result: Ok(value), delay: Duration::ZERO }
        }

        fn failing(message: &str) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                result: Err(message.to_string()),
                delay: Duration::ZERO,
            }
        }

        fn slow(value: u64, delay: Duration) -> Self {
            Self { calls: AtomicUsize::new(0), result: Ok(value), delay }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl BlockNumberSource for CountingSource {
        async fn latest_block_number(&self) -> Result<u64, UpstreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.delay > Duration::ZERO {
                tokio::time::sleep(self.delay).await;
            }
            self.result.clone().map_err(UpstreamError::Payload)
        }
    }

    #[tokio::test]
    async fn test_cached_value_within_ttl() {
        let source = Arc::new(CountingSource::ok(1234));
        let cache = LatestBlockCache::new(Arc::clone(&source) as Arc<dyn BlockNumberSource>);

        for _ in 0..50 {
            assert_eq!(cache.get().await, Ok(1234));
        }
        assert_eq!(source.call_count(), 1, "repeated gets within TTL must not refetch");
    }

    #[tokio::test]
    async fn test_error_cached_until_ttl() {
        let source = Arc::new(CountingSource::failing("upstream down"));
        let cache = LatestBlockCache::new(Arc::clone(&source) as Arc<dyn BlockNumberSource>);

        let first = cache.get().await;
        assert_eq!(first, Err(ResolveError::Upstream("upstream down".to_string())));

        // A fresh error is not retried until the TTL lapses.
        for _ in 0..10 {
            assert_eq!(cache.get().await, first);
        }
        assert_eq!(source.call_count(), 1);
    }

    #[tokio::test]
    async fn test_stale_cache_refetches() {
        let source = Arc::new(CountingSource::ok(7));
        let cache = LatestBlockCache::with_ttl(
            Arc::clone(&source) as Arc<dyn BlockNumberSource>,
            Duration::from_millis(20),
        );

        assert_eq!(cache.get().await, Ok(7));
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.get().await, Ok(7));
        assert_eq!(source.call_count(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_cold_gets_single_flight() {
        let source = Arc::new(CountingSource::slow(42, Duration::from_millis(50)));
        let cache = LatestBlockCache::new(Arc::clone(&source) as Arc<dyn BlockNumberSource>);

        let mut handles = Vec::new();
        for _ in 0..32 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move { cache.get().await }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), Ok(42));
        }
        assert_eq!(source.call_count(), 1, "N cold gets must trigger exactly one fetch");
    }

    #[tokio::test]
    async fn test_cancelled_waiter_does_not_disturb_refresh() {
        let source = Arc::new(CountingSource::slow(9, Duration::from_millis(50)));
        let cache = LatestBlockCache::new(Arc::clone(&source) as Arc<dyn BlockNumberSource>);

        // A waiter that gets dropped mid-wait.
        let doomed = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        doomed.abort();

        assert_eq!(cache.get().await, Ok(9));
        assert_eq!(source.call_count(), 1);
    }
}
