//! In-memory transaction cache, the reentrant transaction-scope lock, and the
//! contention/rate-limit counters surfaced by introspection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::error::{AiAgentPaymentsError, Result};
use crate::models::PaymentTransaction;

const LOCK_TIMEOUT: Duration = Duration::from_secs(10);
const CONTENTION_ESCALATION_THRESHOLD: u64 = 50;
const COUNTER_RESET_INTERVAL: chrono::Duration = chrono::Duration::hours(1);

/// A slot in the transaction cache: either a reserved id awaiting its first
/// write, or the last transaction this provider observed for that id.
#[derive(Debug, Clone)]
pub enum CacheEntry {
    Reserved,
    Transaction(Box<PaymentTransaction>),
}

/// The id→transaction cache consulted by the placeholder-reservation
/// protocol (see [`super::UsdtProvider::reserve_transaction_id`]).
#[derive(Default)]
pub struct TxCache {
    entries: HashMap<String, CacheEntry>,
}

impl TxCache {
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn reserve(&mut self, id: String) {
        self.entries.insert(id, CacheEntry::Reserved);
    }

    pub fn remove(&mut self, id: &str) {
        self.entries.remove(id);
    }

    pub fn insert(&mut self, id: String, transaction: PaymentTransaction) {
        self.entries.insert(id, CacheEntry::Transaction(Box::new(transaction)));
    }

    /// Live transactions only; reserved placeholders are never surfaced.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&PaymentTransaction> {
        match self.entries.get(id) {
            Some(CacheEntry::Transaction(tx)) => Some(tx),
            _ => None,
        }
    }
}

/// Counter that resets once an hour, shared by the lock-contention and
/// rate-limit-error tallies.
struct HourlyCounter {
    count: AtomicU64,
    reset_at: Mutex<DateTime<Utc>>,
}

impl HourlyCounter {
    fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
            reset_at: Mutex::new(Utc::now() + COUNTER_RESET_INTERVAL),
        }
    }

    async fn increment(&self) -> u64 {
        let mut reset_at = self.reset_at.lock().await;
        if Utc::now() >= *reset_at {
            self.count.store(0, Ordering::SeqCst);
            *reset_at = Utc::now() + COUNTER_RESET_INTERVAL;
        }
        self.count.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn snapshot(&self) -> (u64, DateTime<Utc>) {
        let reset_at = *self.reset_at.lock().await;
        (self.count.load(Ordering::SeqCst), reset_at)
    }
}

/// Opaque proof that the calling flow currently holds the transaction-scope
/// lock. Passed down the call stack instead of re-acquiring, since
/// `tokio::sync::Mutex` is not natively reentrant.
pub struct ScopeToken(());

/// RAII handle returned by [`TxLock::acquire`]; releases the lock on drop.
pub struct ScopeGuard<'a> {
    _guard: tokio::sync::MutexGuard<'a, ()>,
    pub token: ScopeToken,
}

/// Reentrant (by token-passing) mutual-exclusion lock bounding the
/// transaction scope described in the concurrency model.
pub struct TxLock {
    mutex: Mutex<()>,
    contention: HourlyCounter,
}

impl Default for TxLock {
    fn default() -> Self {
        Self::new()
    }
}

impl TxLock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            mutex: Mutex::new(()),
            contention: HourlyCounter::new(),
        }
    }

    /// Acquire the lock, bounded by a 10-second timeout. On timeout, the
    /// contention counter is incremented and a `Provider` error raised; past
    /// a threshold of 50 contentions within the hourly window, an escalation
    /// is logged.
    ///
    /// # Errors
    /// Returns a `Provider` error if the lock is not acquired within 10 seconds.
    pub async fn acquire(&self) -> Result<ScopeGuard<'_>> {
        match tokio::time::timeout(LOCK_TIMEOUT, self.mutex.lock()).await {
            Ok(guard) => Ok(ScopeGuard {
                _guard: guard,
                token: ScopeToken(()),
            }),
            Err(_) => {
                let count = self.contention.increment().await;
                if count >= CONTENTION_ESCALATION_THRESHOLD {
                    tracing::warn!(
                        component = "usdt_provider",
                        event = "lock_contention_escalation",
                        count,
                        "transaction scope lock contention has crossed the hourly escalation threshold"
                    );
                }
                Err(AiAgentPaymentsError::provider(
                    "timed out waiting for the transaction scope lock",
                ))
            }
        }
    }

    /// Current contention count and the timestamp at which it next resets.
    pub async fn statistics(&self) -> (u64, DateTime<Utc>) {
        self.contention.snapshot().await
    }
}

/// Rate-limit (HTTP 429) counter for the Transfer-event scan, reset hourly.
#[derive(Default)]
pub struct RateLimitTracker {
    counter: Option<HourlyCounter>,
}

impl RateLimitTracker {
    #[must_use]
    pub fn new() -> Self {
        Self {
            counter: Some(HourlyCounter::new()),
        }
    }

    pub async fn record_rate_limit_error(&self) -> u64 {
        match &self.counter {
            Some(counter) => counter.increment().await,
            None => 0,
        }
    }

    pub async fn statistics(&self) -> (u64, DateTime<Utc>) {
        match &self.counter {
            Some(counter) => counter.snapshot().await,
            None => (0, Utc::now()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[tokio::test]
    async fn reservation_round_trips() {
        let mut cache = TxCache::default();
        cache.reserve("tx_1".to_string());
        assert!(cache.contains("tx_1"));
        assert!(cache.get("tx_1").is_none(), "reserved slots are never surfaced as live transactions");
        let tx = PaymentTransaction::new("alice", Decimal::ONE, "USDT", "usdt_erc20");
        cache.insert("tx_1".to_string(), tx);
        assert!(cache.get("tx_1").is_some());
    }

    #[tokio::test]
    async fn lock_acquires_and_releases() {
        let lock = TxLock::new();
        let guard = lock.acquire().await.unwrap();
        drop(guard);
        let (count, _) = lock.statistics().await;
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn rate_limit_tracker_counts() {
        let tracker = RateLimitTracker::new();
        tracker.record_rate_limit_error().await;
        tracker.record_rate_limit_error().await;
        let (count, _) = tracker.statistics().await;
        assert_eq!(count, 2);
    }
}
