//! Pluggable persistence for payment plans, subscriptions, usage records, and
//! payment transactions, plus an optional transaction scope for callers that
//! need atomic multi-record mutations (the USDT provider's verification flow).

mod file;
mod memory;
mod sql;

pub use file::FileStorage;
pub use memory::MemoryStorage;
pub use sql::SqlStorage;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{PaymentPlan, PaymentTransaction, Subscription, UsageRecord};

/// Capabilities a storage backend advertises so callers (and the USDT
/// provider's startup check) can decide whether it's fit for purpose.
#[derive(Debug, Clone, Copy)]
pub struct StorageCapabilities {
    pub supports_transactions: bool,
    pub supports_bulk_operations: bool,
    pub max_data_size: Option<usize>,
    pub supports_concurrent_access: bool,
}

/// Result of a read+write round-trip health check against a backend.
#[derive(Debug, Clone)]
pub struct StorageStatus {
    pub is_healthy: bool,
    pub response_time_ms: f64,
    pub error_message: Option<String>,
}

/// Persistence contract every backend (in-memory, file, SQL) implements.
///
/// Every method is a total function with the failure modes documented per
/// method; `save_*`/`update_*` validate the record and its estimated
/// serialized size against [`StorageCapabilities::max_data_size`] before
/// persisting.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    fn name(&self) -> &str;
    fn capabilities(&self) -> StorageCapabilities;

    async fn save_plan(&self, plan: &PaymentPlan) -> Result<()>;
    async fn get_plan(&self, plan_id: &str) -> Result<Option<PaymentPlan>>;
    async fn list_plans(&self) -> Result<Vec<PaymentPlan>>;

    async fn save_subscription(&self, subscription: &Subscription) -> Result<()>;
    async fn get_subscription(&self, subscription_id: &str) -> Result<Option<Subscription>>;
    async fn get_user_subscription(&self, user_id: &str) -> Result<Option<Subscription>>;

    async fn save_usage(&self, record: &UsageRecord) -> Result<()>;
    async fn get_user_usage(
        &self,
        user_id: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<UsageRecord>>;

    async fn save_transaction(&self, transaction: &PaymentTransaction) -> Result<()>;
    async fn update_transaction(&self, transaction: &PaymentTransaction) -> Result<()>;
    async fn get_transaction(&self, transaction_id: &str) -> Result<Option<PaymentTransaction>>;
    async fn delete_transaction(&self, transaction_id: &str) -> Result<()>;
    async fn list_transactions(
        &self,
        user_id: Option<&str>,
        status: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<PaymentTransaction>>;

    /// Begin a transaction scope. Backends that don't support one return a `Storage` error.
    async fn begin_transaction(&self) -> Result<()>;
    async fn commit(&self) -> Result<()>;
    async fn rollback(&self) -> Result<()>;

    /// Read+write round-trip against a scratch object; returns the measured latency on success.
    async fn check_health(&self) -> StorageStatus;
}

/// Estimate the serialized size of a value for the `max_data_size` check.
///
/// # Errors
/// Returns a `Storage` error if `value` cannot be serialized to JSON.
pub fn estimate_size<T: serde::Serialize>(value: &T) -> Result<usize> {
    serde_json::to_vec(value)
        .map(|bytes| bytes.len())
        .map_err(|e| crate::error::AiAgentPaymentsError::storage(e.to_string()))
}

/// Validate `size` against `max_data_size`, if one is set.
///
/// # Errors
/// Returns a `Validation` error naming the limit when `size` exceeds it.
pub fn check_size_limit(size: usize, max_data_size: Option<usize>) -> Result<()> {
    if let Some(max) = max_data_size {
        if size > max {
            return Err(crate::error::AiAgentPaymentsError::validation_field(
                "data_size",
                size as u64,
                format!("data size ({size} bytes) exceeds storage backend limit ({max} bytes)"),
            ));
        }
    }
    Ok(())
}
