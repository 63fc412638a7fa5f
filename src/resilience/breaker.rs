//! Circuit breaker over an injectable counter store.
//!
//! Breaker state is kept per job class in an external store so that multiple
//! worker processes share one view of a failing dependency. The store must
//! provide atomic increment-with-expiry; the breaker never does
//! read-modify-write on the counter.
//!
//! Transitions: `closed → open` on reaching the failure threshold,
//! `open → half_open` once the recovery timeout has elapsed, and
//! `half_open → closed` on the next success. A store outage fails open:
//! execution proceeds with a warning rather than blocking the hot path.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::{Result, SuperAgentError};

/// Counters expire after an hour without activity.
const COUNTER_TTL: Duration = Duration::from_secs(3600);

/// Breaker state for one job class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Calls flow normally; failures are being counted.
    Closed,
    /// One trial call is allowed through.
    HalfOpen,
    /// Calls are blocked until the recovery timeout elapses.
    Open,
}

impl BreakerState {
    fn as_str(self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::HalfOpen => "half_open",
            BreakerState::Open => "open",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "open" => BreakerState::Open,
            "half_open" => BreakerState::HalfOpen,
            _ => BreakerState::Closed,
        }
    }
}

/// External atomic counter/cache store consumed by the breaker.
///
/// Production hosts back this with their shared cache (e.g. Redis);
/// [`InMemoryCounterStore`] serves tests and single-process hosts.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Read a value.
    async fn get(&self, key: &str) -> Result<Option<String>>;
    /// Write a value with a TTL.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;
    /// Atomically increment a counter, setting/refreshing its TTL, and
    /// return the new value.
    async fn incr(&self, key: &str, ttl: Duration) -> Result<i64>;
    /// Remove a key.
    async fn delete(&self, key: &str) -> Result<()>;
}

/// In-memory [`CounterStore`] with lazy TTL expiry.
#[derive(Default)]
pub struct InMemoryCounterStore {
    entries: Mutex<HashMap<String, Entry>>,
}

struct Entry {
    value: String,
    expires_at: std::time::Instant,
}

impl InMemoryCounterStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn live<'a>(entries: &'a HashMap<String, Entry>, key: &str) -> Option<&'a Entry> {
        entries
            .get(key)
            .filter(|e| e.expires_at > std::time::Instant::now())
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().await;
        Ok(Self::live(&entries, key).map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: std::time::Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn incr(&self, key: &str, ttl: Duration) -> Result<i64> {
        let mut entries = self.entries.lock().await;
        let current = Self::live(&entries, key)
            .and_then(|e| e.value.parse::<i64>().ok())
            .unwrap_or(0);
        let next = current + 1;
        entries.insert(
            key.to_string(),
            Entry {
                value: next.to_string(),
                expires_at: std::time::Instant::now() + ttl,
            },
        );
        Ok(next)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

/// Per-job-class circuit breaker.
///
/// # Example
///
/// ```
/// use superagent::resilience::{CircuitBreaker, InMemoryCounterStore};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # async fn demo() {
/// let breaker = CircuitBreaker::new(
///     Arc::new(InMemoryCounterStore::new()),
///     3,
///     Duration::from_secs(60),
/// );
/// assert!(!breaker.is_open("ExportJob").await);
/// # }
/// ```
pub struct CircuitBreaker {
    store: Arc<dyn CounterStore>,
    failure_threshold: u32,
    recovery_timeout: Duration,
}

impl CircuitBreaker {
    /// Create a breaker over the given store.
    pub fn new(
        store: Arc<dyn CounterStore>,
        failure_threshold: u32,
        recovery_timeout: Duration,
    ) -> Self {
        Self {
            store,
            failure_threshold,
            recovery_timeout,
        }
    }

    fn failures_key(job: &str) -> String {
        format!("circuit:{job}:failures")
    }

    fn last_failure_key(job: &str) -> String {
        format!("circuit:{job}:last_failure")
    }

    fn state_key(job: &str) -> String {
        format!("circuit:{job}:state")
    }

    /// Current state for the job class. Store outages read as closed.
    pub async fn state(&self, job: &str) -> BreakerState {
        match self.store.get(&Self::state_key(job)).await {
            Ok(Some(s)) => BreakerState::parse(&s),
            Ok(None) => BreakerState::Closed,
            Err(err) => {
                warn!(job, error = %err, "counter store unavailable; treating breaker as closed");
                BreakerState::Closed
            }
        }
    }

    /// Current failure count. Store outages read as zero.
    pub async fn failure_count(&self, job: &str) -> u32 {
        match self.store.get(&Self::failures_key(job)).await {
            Ok(Some(s)) => s.parse().unwrap_or(0),
            Ok(None) => 0,
            Err(err) => {
                warn!(job, error = %err, "counter store unavailable; reading failure count as 0");
                0
            }
        }
    }

    /// Whether calls for this job class are currently blocked.
    pub async fn is_open(&self, job: &str) -> bool {
        self.state(job).await == BreakerState::Open
    }

    /// Whether enough time has elapsed since the last failure for an open
    /// breaker to allow a trial call.
    pub async fn should_attempt_reset(&self, job: &str) -> bool {
        let last_failure_ms = match self.store.get(&Self::last_failure_key(job)).await {
            Ok(Some(s)) => s.parse::<i64>().unwrap_or(0),
            Ok(None) => return true,
            Err(err) => {
                warn!(job, error = %err, "counter store unavailable; allowing reset attempt");
                return true;
            }
        };
        let elapsed_ms = Utc::now().timestamp_millis() - last_failure_ms;
        elapsed_ms >= self.recovery_timeout.as_millis() as i64
    }

    /// Move an open breaker to half-open, allowing one trial call.
    pub async fn attempt_reset(&self, job: &str) {
        if let Err(err) = self
            .store
            .set(
                &Self::state_key(job),
                BreakerState::HalfOpen.as_str(),
                COUNTER_TTL,
            )
            .await
        {
            warn!(job, error = %err, "counter store unavailable; could not record half-open state");
        }
    }

    /// Record a successful call: counters reset, state returns to closed.
    pub async fn record_success(&self, job: &str) {
        for key in [
            Self::failures_key(job),
            Self::last_failure_key(job),
            Self::state_key(job),
        ] {
            if let Err(err) = self.store.delete(&key).await {
                warn!(job, key = %key, error = %err, "counter store unavailable; could not reset breaker");
                return;
            }
        }
    }

    /// Record a failed call: increments the shared counter atomically and
    /// trips the breaker once the threshold is reached.
    pub async fn record_failure(&self, job: &str) {
        let count = match self.store.incr(&Self::failures_key(job), COUNTER_TTL).await {
            Ok(count) => count,
            Err(err) => {
                warn!(job, error = %err, "counter store unavailable; failure not recorded");
                return;
            }
        };

        let now_ms = Utc::now().timestamp_millis().to_string();
        if let Err(err) = self
            .store
            .set(&Self::last_failure_key(job), &now_ms, COUNTER_TTL)
            .await
        {
            warn!(job, error = %err, "counter store unavailable; last-failure time not recorded");
        }

        if count >= self.failure_threshold as i64 {
            if let Err(err) = self
                .store
                .set(&Self::state_key(job), BreakerState::Open.as_str(), COUNTER_TTL)
                .await
            {
                warn!(job, error = %err, "counter store unavailable; could not trip breaker");
            } else {
                warn!(job, failures = count, "circuit breaker tripped open");
            }
        }
    }

    /// Guard one call for the job class: blocks while open (unless the
    /// recovery timeout has elapsed, in which case one trial call runs
    /// half-open), and records the outcome.
    pub async fn guard<T, F, Fut>(&self, job: &str, op: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        if self.is_open(job).await {
            if self.should_attempt_reset(job).await {
                self.attempt_reset(job).await;
            } else {
                return Err(SuperAgentError::Other(format!(
                    "circuit breaker open for '{job}'"
                )));
            }
        }

        match op().await {
            Ok(value) => {
                self.record_success(job).await;
                Ok(value)
            }
            Err(err) => {
                self.record_failure(job).await;
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, recovery: Duration) -> CircuitBreaker {
        CircuitBreaker::new(Arc::new(InMemoryCounterStore::new()), threshold, recovery)
    }

    #[tokio::test]
    async fn trips_open_at_failure_threshold() {
        let breaker = breaker(3, Duration::from_secs(60));
        for _ in 0..2 {
            breaker.record_failure("ExportJob").await;
            assert!(!breaker.is_open("ExportJob").await);
        }
        breaker.record_failure("ExportJob").await;
        assert!(breaker.is_open("ExportJob").await);
        assert_eq!(breaker.failure_count("ExportJob").await, 3);
    }

    #[tokio::test]
    async fn half_open_then_success_closes() {
        let breaker = breaker(1, Duration::from_millis(0));
        breaker.record_failure("NotifyJob").await;
        assert!(breaker.is_open("NotifyJob").await);

        // Zero recovery timeout: reset is immediately allowed.
        assert!(breaker.should_attempt_reset("NotifyJob").await);
        breaker.attempt_reset("NotifyJob").await;
        assert_eq!(breaker.state("NotifyJob").await, BreakerState::HalfOpen);

        breaker.record_success("NotifyJob").await;
        assert_eq!(breaker.state("NotifyJob").await, BreakerState::Closed);
        assert_eq!(breaker.failure_count("NotifyJob").await, 0);
    }

    #[tokio::test]
    async fn reset_not_allowed_before_recovery_timeout() {
        let breaker = breaker(1, Duration::from_secs(3600));
        breaker.record_failure("SlowJob").await;
        assert!(breaker.is_open("SlowJob").await);
        assert!(!breaker.should_attempt_reset("SlowJob").await);
    }

    #[tokio::test]
    async fn guard_blocks_while_open() {
        let breaker = breaker(1, Duration::from_secs(3600));
        breaker.record_failure("BlockedJob").await;

        let result: Result<()> = breaker.guard("BlockedJob", || async { Ok(()) }).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn guard_records_outcomes() {
        let breaker = breaker(2, Duration::from_secs(60));

        let failed: Result<()> = breaker
            .guard("FlakyJob", || async {
                Err(SuperAgentError::network("down"))
            })
            .await;
        assert!(failed.is_err());
        assert_eq!(breaker.failure_count("FlakyJob").await, 1);

        let ok = breaker.guard("FlakyJob", || async { Ok(41) }).await;
        assert_eq!(ok.unwrap(), 41);
        assert_eq!(breaker.failure_count("FlakyJob").await, 0);
    }

    #[tokio::test]
    async fn breakers_are_per_job_class() {
        let breaker = breaker(1, Duration::from_secs(3600));
        breaker.record_failure("JobA").await;
        assert!(breaker.is_open("JobA").await);
        assert!(!breaker.is_open("JobB").await);
    }

    /// A store that always errors, to verify fail-open behavior.
    struct BrokenStore;

    #[async_trait]
    impl CounterStore for BrokenStore {
        async fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(SuperAgentError::network("store down"))
        }
        async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<()> {
            Err(SuperAgentError::network("store down"))
        }
        async fn incr(&self, _key: &str, _ttl: Duration) -> Result<i64> {
            Err(SuperAgentError::network("store down"))
        }
        async fn delete(&self, _key: &str) -> Result<()> {
            Err(SuperAgentError::network("store down"))
        }
    }

    #[tokio::test]
    async fn store_outage_fails_open() {
        let breaker = CircuitBreaker::new(Arc::new(BrokenStore), 1, Duration::from_secs(60));
        breaker.record_failure("AnyJob").await;
        assert!(!breaker.is_open("AnyJob").await);

        let result = breaker.guard("AnyJob", || async { Ok("ran") }).await;
        assert_eq!(result.unwrap(), "ran");
    }

    #[tokio::test]
    async fn in_memory_store_expires_entries() {
        let store = InMemoryCounterStore::new();
        store
            .set("k", "v", Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
    }
}
