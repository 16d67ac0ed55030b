//! In-memory storage backend for development and testing.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::error::{AiAgentPaymentsError, Result};
use crate::models::{PaymentPlan, PaymentTransaction, Subscription, UsageRecord};

use super::{check_size_limit, estimate_size, StorageBackend, StorageCapabilities, StorageStatus};

const MAX_DATA_SIZE: usize = 100 * 1024 * 1024;

#[derive(Default, Clone)]
struct Tables {
    payment_plans: HashMap<String, PaymentPlan>,
    subscriptions: HashMap<String, Subscription>,
    user_subscriptions: HashMap<String, String>,
    usage_records: HashMap<String, UsageRecord>,
    transactions: HashMap<String, PaymentTransaction>,
}

/// Maps guarded by a single mutex; a transaction scope snapshots all tables
/// on `begin_transaction` and restores them on `rollback`. Only one
/// transaction may be active at a time.
pub struct MemoryStorage {
    tables: Mutex<Tables>,
    snapshot: Mutex<Option<Tables>>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            snapshot: Mutex::new(None),
        }
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    fn name(&self) -> &str {
        "MemoryStorage"
    }

    fn capabilities(&self) -> StorageCapabilities {
        StorageCapabilities {
            supports_transactions: true,
            supports_bulk_operations: true,
            max_data_size: Some(MAX_DATA_SIZE),
            supports_concurrent_access: true,
        }
    }

    async fn save_plan(&self, plan: &PaymentPlan) -> Result<()> {
        plan.validate()?;
        check_size_limit(estimate_size(plan)?, Some(MAX_DATA_SIZE))?;
        self.tables.lock().await.payment_plans.insert(plan.id.clone(), plan.clone());
        Ok(())
    }

    async fn get_plan(&self, plan_id: &str) -> Result<Option<PaymentPlan>> {
        Ok(self.tables.lock().await.payment_plans.get(plan_id).cloned())
    }

    async fn list_plans(&self) -> Result<Vec<PaymentPlan>> {
        Ok(self.tables.lock().await.payment_plans.values().cloned().collect())
    }

    async fn save_subscription(&self, subscription: &Subscription) -> Result<()> {
        subscription.validate()?;
        check_size_limit(estimate_size(subscription)?, Some(MAX_DATA_SIZE))?;
        let mut tables = self.tables.lock().await;
        if subscription.status == crate::models::SubscriptionStatus::Active {
            tables
                .user_subscriptions
                .insert(subscription.user_id.clone(), subscription.id.clone());
        } else if tables.user_subscriptions.get(&subscription.user_id) == Some(&subscription.id) {
            tables.user_subscriptions.remove(&subscription.user_id);
        }
        tables.subscriptions.insert(subscription.id.clone(), subscription.clone());
        Ok(())
    }

    async fn get_subscription(&self, subscription_id: &str) -> Result<Option<Subscription>> {
        Ok(self.tables.lock().await.subscriptions.get(subscription_id).cloned())
    }

    async fn get_user_subscription(&self, user_id: &str) -> Result<Option<Subscription>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .user_subscriptions
            .get(user_id)
            .and_then(|sub_id| tables.subscriptions.get(sub_id))
            .cloned())
    }

    async fn save_usage(&self, record: &UsageRecord) -> Result<()> {
        record.validate()?;
        check_size_limit(estimate_size(record)?, Some(MAX_DATA_SIZE))?;
        self.tables.lock().await.usage_records.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn get_user_usage(
        &self,
        user_id: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<UsageRecord>> {
        let tables = self.tables.lock().await;
        let mut records: Vec<UsageRecord> = tables
            .usage_records
            .values()
            .filter(|r| r.user_id == user_id)
            .filter(|r| from.map_or(true, |from| r.timestamp >= from))
            .filter(|r| to.map_or(true, |to| r.timestamp <= to))
            .cloned()
            .collect();
        records.sort_by_key(|r| r.timestamp);
        Ok(records)
    }

    async fn save_transaction(&self, transaction: &PaymentTransaction) -> Result<()> {
        transaction.validate()?;
        check_size_limit(estimate_size(transaction)?, Some(MAX_DATA_SIZE))?;
        self.tables
            .lock()
            .await
            .transactions
            .insert(transaction.id.clone(), transaction.clone());
        Ok(())
    }

    async fn update_transaction(&self, transaction: &PaymentTransaction) -> Result<()> {
        transaction.validate()?;
        check_size_limit(estimate_size(transaction)?, Some(MAX_DATA_SIZE))?;
        let mut tables = self.tables.lock().await;
        if !tables.transactions.contains_key(&transaction.id) {
            return Err(AiAgentPaymentsError::storage(format!(
                "transaction {} does not exist",
                transaction.id
            )));
        }
        tables.transactions.insert(transaction.id.clone(), transaction.clone());
        Ok(())
    }

    async fn get_transaction(&self, transaction_id: &str) -> Result<Option<PaymentTransaction>> {
        Ok(self.tables.lock().await.transactions.get(transaction_id).cloned())
    }

    async fn delete_transaction(&self, transaction_id: &str) -> Result<()> {
        self.tables.lock().await.transactions.remove(transaction_id);
        Ok(())
    }

    async fn list_transactions(
        &self,
        user_id: Option<&str>,
        status: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<PaymentTransaction>> {
        let tables = self.tables.lock().await;
        let mut transactions: Vec<PaymentTransaction> = tables
            .transactions
            .values()
            .filter(|tx| user_id.map_or(true, |uid| tx.user_id == uid))
            .filter(|tx| status.map_or(true, |s| format!("{:?}", tx.status).to_lowercase() == s.to_lowercase()))
            .cloned()
            .collect();
        transactions.sort_by_key(|tx| std::cmp::Reverse(tx.created_at));
        if let Some(limit) = limit {
            transactions.truncate(limit);
        }
        Ok(transactions)
    }

    async fn begin_transaction(&self) -> Result<()> {
        let mut snapshot = self.snapshot.lock().await;
        if snapshot.is_some() {
            return Err(AiAgentPaymentsError::storage("transaction already in progress"));
        }
        *snapshot = Some(self.tables.lock().await.clone());
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        let mut snapshot = self.snapshot.lock().await;
        if snapshot.take().is_none() {
            return Err(AiAgentPaymentsError::storage("no transaction in progress"));
        }
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        let mut snapshot = self.snapshot.lock().await;
        match snapshot.take() {
            Some(saved) => {
                *self.tables.lock().await = saved;
                Ok(())
            }
            None => Err(AiAgentPaymentsError::storage("no transaction in progress")),
        }
    }

    async fn check_health(&self) -> StorageStatus {
        let start = std::time::Instant::now();
        let tables = self.tables.lock().await;
        let _ = (
            tables.payment_plans.len(),
            tables.subscriptions.len(),
            tables.usage_records.len(),
            tables.transactions.len(),
        );
        StorageStatus {
            is_healthy: true,
            response_time_ms: start.elapsed().as_secs_f64() * 1000.0,
            error_message: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PaymentType, TransactionStatus};
    use rust_decimal::Decimal;

    #[tokio::test]
    async fn save_and_get_plan_round_trips() {
        let storage = MemoryStorage::new();
        let plan = PaymentPlan::new("Pro", PaymentType::PayPerUse, Decimal::new(100, 2), "USD");
        storage.save_plan(&plan).await.unwrap();
        let fetched = storage.get_plan(&plan.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, plan.id);
    }

    #[tokio::test]
    async fn user_subscription_lookup_tracks_active_only() {
        let storage = MemoryStorage::new();
        let sub = Subscription::new("alice", "pro-plan");
        storage.save_subscription(&sub).await.unwrap();
        let fetched = storage.get_user_subscription("alice").await.unwrap();
        assert!(fetched.is_some());
    }

    #[tokio::test]
    async fn transaction_scope_rolls_back() {
        let storage = MemoryStorage::new();
        let tx = PaymentTransaction::new("alice", Decimal::new(500, 2), "USDT", "usdt_erc20");
        storage.begin_transaction().await.unwrap();
        storage.save_transaction(&tx).await.unwrap();
        storage.rollback().await.unwrap();
        assert!(storage.get_transaction(&tx.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn transaction_scope_commits() {
        let storage = MemoryStorage::new();
        let tx = PaymentTransaction::new("alice", Decimal::new(500, 2), "USDT", "usdt_erc20");
        storage.begin_transaction().await.unwrap();
        storage.save_transaction(&tx).await.unwrap();
        storage.commit().await.unwrap();
        assert!(storage.get_transaction(&tx.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn update_nonexistent_transaction_fails() {
        let storage = MemoryStorage::new();
        let tx = PaymentTransaction::new("alice", Decimal::new(500, 2), "USDT", "usdt_erc20");
        assert!(storage.update_transaction(&tx).await.is_err());
    }

    #[tokio::test]
    async fn list_transactions_filters_and_sorts() {
        let storage = MemoryStorage::new();
        let mut tx1 = PaymentTransaction::new("alice", Decimal::new(500, 2), "USDT", "usdt_erc20");
        tx1.set_status(TransactionStatus::Completed, Utc::now()).unwrap();
        storage.save_transaction(&tx1).await.unwrap();
        let tx2 = PaymentTransaction::new("bob", Decimal::new(500, 2), "USDT", "usdt_erc20");
        storage.save_transaction(&tx2).await.unwrap();

        let alice_txs = storage.list_transactions(Some("alice"), None, None).await.unwrap();
        assert_eq!(alice_txs.len(), 1);
        let completed = storage.list_transactions(None, Some("completed"), None).await.unwrap();
        assert_eq!(completed.len(), 1);
    }
}
