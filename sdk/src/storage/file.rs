//! File-based storage backend: one JSON file per record type in a
//! directory, each read/write guarded by an OS-level advisory lock, writes
//! staged to sibling `.tmp` files and atomically renamed on commit.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read as _, Write as _};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::error::{AiAgentPaymentsError, Result};
use crate::models::{PaymentPlan, PaymentTransaction, Subscription, UsageRecord};

use super::{check_size_limit, estimate_size, StorageBackend, StorageCapabilities, StorageStatus};

const MAX_DATA_SIZE: usize = 100 * 1024 * 1024;

fn load_locked<T: DeserializeOwned>(path: &Path) -> std::io::Result<HashMap<String, T>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let file = File::open(path)?;
    file.lock_shared()?;
    let mut contents = String::new();
    let mut reader = &file;
    reader.read_to_string(&mut contents)?;
    file.unlock()?;
    if contents.trim().is_empty() {
        return Ok(HashMap::new());
    }
    serde_json::from_str(&contents).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

fn save_locked<T: Serialize>(path: &Path, map: &HashMap<String, T>) -> std::io::Result<()> {
    let tmp_path = path.with_extension("tmp");
    {
        let mut tmp = OpenOptions::new().create(true).write(true).truncate(true).open(&tmp_path)?;
        tmp.lock_exclusive()?;
        let json = serde_json::to_string_pretty(map).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        tmp.write_all(json.as_bytes())?;
        tmp.sync_all()?;
        tmp.unlock()?;
    }
    std::fs::rename(&tmp_path, path)
}

/// The five record tables, held in memory as the working copy and the
/// transaction-scope snapshot; persisted one file per table.
#[derive(Default, Clone)]
struct Tables {
    payment_plans: HashMap<String, PaymentPlan>,
    subscriptions: HashMap<String, Subscription>,
    user_subscriptions: HashMap<String, String>,
    usage_records: HashMap<String, UsageRecord>,
    transactions: HashMap<String, PaymentTransaction>,
}

struct FilePaths {
    payment_plans: PathBuf,
    subscriptions: PathBuf,
    user_subscriptions: PathBuf,
    usage_records: PathBuf,
    transactions: PathBuf,
}

impl FilePaths {
    fn new(data_dir: &Path) -> Self {
        Self {
            payment_plans: data_dir.join("payment_plans.json"),
            subscriptions: data_dir.join("subscriptions.json"),
            user_subscriptions: data_dir.join("user_subscriptions.json"),
            usage_records: data_dir.join("usage_records.json"),
            transactions: data_dir.join("transactions.json"),
        }
    }

    fn load(&self) -> std::io::Result<Tables> {
        Ok(Tables {
            payment_plans: load_locked(&self.payment_plans)?,
            subscriptions: load_locked(&self.subscriptions)?,
            user_subscriptions: load_locked(&self.user_subscriptions)?,
            usage_records: load_locked(&self.usage_records)?,
            transactions: load_locked(&self.transactions)?,
        })
    }

    fn save(&self, tables: &Tables) -> std::io::Result<()> {
        save_locked(&self.payment_plans, &tables.payment_plans)?;
        save_locked(&self.subscriptions, &tables.subscriptions)?;
        save_locked(&self.user_subscriptions, &tables.user_subscriptions)?;
        save_locked(&self.usage_records, &tables.usage_records)?;
        save_locked(&self.transactions, &tables.transactions)?;
        Ok(())
    }
}

/// Directory-backed storage: `payment_plans.json`, `subscriptions.json`,
/// `user_subscriptions.json`, `usage_records.json`, `transactions.json`.
/// `transaction_scope` holds a full in-memory snapshot while a
/// caller-initiated transaction is open; only one may be active at a time.
pub struct FileStorage {
    data_dir: PathBuf,
    paths: FilePaths,
    snapshot: Mutex<Option<Tables>>,
}

impl FileStorage {
    /// Create (if needed) the data directory and bind it as the storage root.
    ///
    /// # Errors
    /// Returns a `Storage` error if the directory cannot be created or is not writable.
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir).map_err(|e| AiAgentPaymentsError::storage(e.to_string()))?;
        let paths = FilePaths::new(&data_dir);
        Ok(Self {
            data_dir,
            paths,
            snapshot: Mutex::new(None),
        })
    }

    async fn read(&self) -> Result<Tables> {
        let paths_dir = self.data_dir.clone();
        tokio::task::spawn_blocking(move || FilePaths::new(&paths_dir).load())
            .await
            .map_err(|e| AiAgentPaymentsError::storage(e.to_string()))?
            .map_err(|e| AiAgentPaymentsError::storage(e.to_string()))
    }

    async fn write(&self, tables: Tables) -> Result<()> {
        let paths_dir = self.data_dir.clone();
        tokio::task::spawn_blocking(move || FilePaths::new(&paths_dir).save(&tables))
            .await
            .map_err(|e| AiAgentPaymentsError::storage(e.to_string()))?
            .map_err(|e| AiAgentPaymentsError::storage(e.to_string()))
    }

    async fn mutate<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Tables) -> Result<()> + Send,
    {
        let mut tables = self.read().await?;
        f(&mut tables)?;
        self.write(tables).await
    }
}

#[async_trait]
impl StorageBackend for FileStorage {
    fn name(&self) -> &str {
        "FileStorage"
    }

    fn capabilities(&self) -> StorageCapabilities {
        StorageCapabilities {
            supports_transactions: true,
            supports_bulk_operations: false,
            max_data_size: Some(MAX_DATA_SIZE),
            supports_concurrent_access: true,
        }
    }

    async fn save_plan(&self, plan: &PaymentPlan) -> Result<()> {
        plan.validate()?;
        check_size_limit(estimate_size(plan)?, Some(MAX_DATA_SIZE))?;
        let plan = plan.clone();
        self.mutate(move |tables| {
            tables.payment_plans.insert(plan.id.clone(), plan);
            Ok(())
        })
        .await
    }

    async fn get_plan(&self, plan_id: &str) -> Result<Option<PaymentPlan>> {
        Ok(self.read().await?.payment_plans.get(plan_id).cloned())
    }

    async fn list_plans(&self) -> Result<Vec<PaymentPlan>> {
        Ok(self.read().await?.payment_plans.into_values().collect())
    }

    async fn save_subscription(&self, subscription: &Subscription) -> Result<()> {
        subscription.validate()?;
        check_size_limit(estimate_size(subscription)?, Some(MAX_DATA_SIZE))?;
        let subscription = subscription.clone();
        self.mutate(move |tables| {
            if subscription.status == crate::models::SubscriptionStatus::Active {
                tables
                    .user_subscriptions
                    .insert(subscription.user_id.clone(), subscription.id.clone());
            } else if tables.user_subscriptions.get(&subscription.user_id) == Some(&subscription.id) {
                tables.user_subscriptions.remove(&subscription.user_id);
            }
            tables.subscriptions.insert(subscription.id.clone(), subscription);
            Ok(())
        })
        .await
    }

    async fn get_subscription(&self, subscription_id: &str) -> Result<Option<Subscription>> {
        Ok(self.read().await?.subscriptions.get(subscription_id).cloned())
    }

    async fn get_user_subscription(&self, user_id: &str) -> Result<Option<Subscription>> {
        let tables = self.read().await?;
        Ok(tables
            .user_subscriptions
            .get(user_id)
            .and_then(|sub_id| tables.subscriptions.get(sub_id))
            .cloned())
    }

    async fn save_usage(&self, record: &UsageRecord) -> Result<()> {
        record.validate()?;
        check_size_limit(estimate_size(record)?, Some(MAX_DATA_SIZE))?;
        let record = record.clone();
        self.mutate(move |tables| {
            tables.usage_records.insert(record.id.clone(), record);
            Ok(())
        })
        .await
    }

    async fn get_user_usage(
        &self,
        user_id: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<UsageRecord>> {
        let tables = self.read().await?;
        let mut records: Vec<UsageRecord> = tables
            .usage_records
            .into_values()
            .filter(|r| r.user_id == user_id)
            .filter(|r| from.map_or(true, |from| r.timestamp >= from))
            .filter(|r| to.map_or(true, |to| r.timestamp <= to))
            .collect();
        records.sort_by_key(|r| r.timestamp);
        Ok(records)
    }

    async fn save_transaction(&self, transaction: &PaymentTransaction) -> Result<()> {
        transaction.validate()?;
        check_size_limit(estimate_size(transaction)?, Some(MAX_DATA_SIZE))?;
        let transaction = transaction.clone();
        self.mutate(move |tables| {
            tables.transactions.insert(transaction.id.clone(), transaction);
            Ok(())
        })
        .await
    }

    async fn update_transaction(&self, transaction: &PaymentTransaction) -> Result<()> {
        transaction.validate()?;
        check_size_limit(estimate_size(transaction)?, Some(MAX_DATA_SIZE))?;
        let transaction = transaction.clone();
        self.mutate(move |tables| {
            if !tables.transactions.contains_key(&transaction.id) {
                return Err(AiAgentPaymentsError::storage(format!(
                    "transaction {} does not exist",
                    transaction.id
                )));
            }
            tables.transactions.insert(transaction.id.clone(), transaction);
            Ok(())
        })
        .await
    }

    async fn get_transaction(&self, transaction_id: &str) -> Result<Option<PaymentTransaction>> {
        Ok(self.read().await?.transactions.get(transaction_id).cloned())
    }

    async fn delete_transaction(&self, transaction_id: &str) -> Result<()> {
        let transaction_id = transaction_id.to_string();
        self.mutate(move |tables| {
            tables.transactions.remove(&transaction_id);
            Ok(())
        })
        .await
    }

    async fn list_transactions(
        &self,
        user_id: Option<&str>,
        status: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<PaymentTransaction>> {
        let tables = self.read().await?;
        let mut transactions: Vec<PaymentTransaction> = tables
            .transactions
            .into_values()
            .filter(|tx| user_id.map_or(true, |uid| tx.user_id == uid))
            .filter(|tx| status.map_or(true, |s| format!("{:?}", tx.status).to_lowercase() == s.to_lowercase()))
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
        *snapshot = Some(self.read().await?);
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
            Some(saved) => self.write(saved).await,
            None => Err(AiAgentPaymentsError::storage("no transaction in progress")),
        }
    }

    async fn check_health(&self) -> StorageStatus {
        let start = std::time::Instant::now();
        let probe = self.data_dir.join(".health_check");
        let result = tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            std::fs::write(&probe, b"ok")?;
            std::fs::remove_file(&probe)
        })
        .await;
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        match result {
            Ok(Ok(())) => StorageStatus {
                is_healthy: true,
                response_time_ms: elapsed_ms,
                error_message: None,
            },
            Ok(Err(e)) => StorageStatus {
                is_healthy: false,
                response_time_ms: elapsed_ms,
                error_message: Some(e.to_string()),
            },
            Err(e) => StorageStatus {
                is_healthy: false,
                response_time_ms: elapsed_ms,
                error_message: Some(e.to_string()),
            },
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
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path()).unwrap();
        let plan = PaymentPlan::new("Pro", PaymentType::PayPerUse, Decimal::new(100, 2), "USD");
        storage.save_plan(&plan).await.unwrap();
        let fetched = storage.get_plan(&plan.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, plan.id);
        assert!(dir.path().join("payment_plans.json").exists());
    }

    #[tokio::test]
    async fn transaction_scope_rolls_back_to_disk_state() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path()).unwrap();
        let mut tx = PaymentTransaction::new("alice", Decimal::new(500, 2), "USDT", "usdt_erc20");
        storage.save_transaction(&tx).await.unwrap();

        storage.begin_transaction().await.unwrap();
        tx.set_status(TransactionStatus::Completed, Utc::now()).unwrap();
        storage.update_transaction(&tx).await.unwrap();
        storage.rollback().await.unwrap();

        let reloaded = storage.get_transaction(&tx.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, TransactionStatus::Pending);
    }

    #[tokio::test]
    async fn cancelled_subscription_is_removed_from_user_index() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path()).unwrap();
        let mut sub = Subscription::new("alice", "pro-plan");
        storage.save_subscription(&sub).await.unwrap();
        assert!(storage.get_user_subscription("alice").await.unwrap().is_some());

        sub.set_status(crate::models::SubscriptionStatus::Cancelled).unwrap();
        storage.save_subscription(&sub).await.unwrap();
        assert!(storage.get_user_subscription("alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn health_check_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path()).unwrap();
        assert!(storage.check_health().await.is_healthy);
    }
}
