//! SQLite-backed storage. Table layout mirrors the domain model exactly:
//! `payment_plans`, `subscriptions`, `usage_records`, `transactions`, with
//! metadata stored as JSON text and dates as ISO 8601 strings.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tokio::sync::Mutex;

use crate::error::{AiAgentPaymentsError, Result};
use crate::models::{
    BillingPeriod, PaymentPlan, PaymentTransaction, PaymentType, Subscription, SubscriptionStatus,
    TransactionStatus, UsageRecord,
};

use super::{check_size_limit, estimate_size, StorageBackend, StorageCapabilities, StorageStatus};

const MAX_DATA_SIZE: usize = 100 * 1024 * 1024;

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS payment_plans (
    id TEXT PRIMARY KEY, name TEXT NOT NULL, description TEXT,
    payment_type TEXT NOT NULL, price REAL NOT NULL, currency TEXT DEFAULT 'USD',
    price_per_request REAL, billing_period TEXT, requests_per_period INTEGER,
    free_requests INTEGER DEFAULT 0, features TEXT, is_active BOOLEAN DEFAULT 1,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS subscriptions (
    id TEXT PRIMARY KEY, user_id TEXT NOT NULL, plan_id TEXT NOT NULL,
    status TEXT DEFAULT 'active', start_date TEXT NOT NULL, end_date TEXT,
    current_period_start TEXT, current_period_end TEXT, usage_count INTEGER DEFAULT 0,
    metadata TEXT
);
CREATE TABLE IF NOT EXISTS usage_records (
    id TEXT PRIMARY KEY, user_id TEXT NOT NULL, feature TEXT NOT NULL,
    timestamp TEXT NOT NULL, cost REAL, currency TEXT DEFAULT 'USD', metadata TEXT
);
CREATE TABLE IF NOT EXISTS transactions (
    id TEXT PRIMARY KEY, user_id TEXT NOT NULL, amount REAL NOT NULL,
    currency TEXT DEFAULT 'USD', payment_method TEXT DEFAULT 'unknown',
    status TEXT DEFAULT 'pending', created_at TEXT NOT NULL, completed_at TEXT, metadata TEXT
);
";

pub struct SqlStorage {
    pool: SqlitePool,
    in_transaction: Mutex<bool>,
}

impl SqlStorage {
    /// Open (creating if needed) a SQLite database at `path` and run the schema migration.
    ///
    /// # Errors
    /// Returns a `Storage` error if the database cannot be opened or migrated.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(|e| AiAgentPaymentsError::storage(e.to_string()))?;
        for statement in SCHEMA.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(statement)
                .execute(&pool)
                .await
                .map_err(|e| AiAgentPaymentsError::storage(e.to_string()))?;
        }
        Ok(Self {
            pool,
            in_transaction: Mutex::new(false),
        })
    }

    fn payment_type_str(pt: PaymentType) -> &'static str {
        match pt {
            PaymentType::PayPerUse => "pay_per_use",
            PaymentType::Subscription => "subscription",
            PaymentType::Freemium => "freemium",
        }
    }

    fn parse_payment_type(s: &str) -> Result<PaymentType> {
        match s {
            "pay_per_use" => Ok(PaymentType::PayPerUse),
            "subscription" => Ok(PaymentType::Subscription),
            "freemium" => Ok(PaymentType::Freemium),
            other => Err(AiAgentPaymentsError::storage(format!("unknown payment_type '{other}'"))),
        }
    }

    fn billing_period_str(bp: BillingPeriod) -> &'static str {
        match bp {
            BillingPeriod::Daily => "daily",
            BillingPeriod::Weekly => "weekly",
            BillingPeriod::Monthly => "monthly",
            BillingPeriod::Yearly => "yearly",
        }
    }

    fn parse_billing_period(s: &str) -> Result<BillingPeriod> {
        match s {
            "daily" => Ok(BillingPeriod::Daily),
            "weekly" => Ok(BillingPeriod::Weekly),
            "monthly" => Ok(BillingPeriod::Monthly),
            "yearly" => Ok(BillingPeriod::Yearly),
            other => Err(AiAgentPaymentsError::storage(format!("unknown billing_period '{other}'"))),
        }
    }

    fn subscription_status_str(s: SubscriptionStatus) -> &'static str {
        match s {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Cancelled => "cancelled",
            SubscriptionStatus::Expired => "expired",
            SubscriptionStatus::Suspended => "suspended",
        }
    }

    fn parse_subscription_status(s: &str) -> Result<SubscriptionStatus> {
        match s {
            "active" => Ok(SubscriptionStatus::Active),
            "cancelled" => Ok(SubscriptionStatus::Cancelled),
            "expired" => Ok(SubscriptionStatus::Expired),
            "suspended" => Ok(SubscriptionStatus::Suspended),
            other => Err(AiAgentPaymentsError::storage(format!("unknown subscription status '{other}'"))),
        }
    }

    fn transaction_status_str(s: TransactionStatus) -> &'static str {
        match s {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Refunded => "refunded",
            TransactionStatus::Cancelled => "cancelled",
        }
    }

    fn parse_transaction_status(s: &str) -> Result<TransactionStatus> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "completed" => Ok(TransactionStatus::Completed),
            "failed" => Ok(TransactionStatus::Failed),
            "refunded" => Ok(TransactionStatus::Refunded),
            "cancelled" => Ok(TransactionStatus::Cancelled),
            other => Err(AiAgentPaymentsError::storage(format!("unknown transaction status '{other}'"))),
        }
    }

    fn row_to_plan(row: &sqlx::sqlite::SqliteRow) -> Result<PaymentPlan> {
        let features: String = row.try_get("features").unwrap_or_default();
        let billing_period: Option<String> = row.try_get("billing_period").ok();
        Ok(PaymentPlan {
            id: row.try_get("id").map_err(sql_err)?,
            name: row.try_get("name").map_err(sql_err)?,
            description: row.try_get("description").ok(),
            payment_type: Self::parse_payment_type(&row.try_get::<String, _>("payment_type").map_err(sql_err)?)?,
            price: parse_decimal(row.try_get::<f64, _>("price").map_err(sql_err)?),
            currency: row.try_get("currency").map_err(sql_err)?,
            price_per_request: row.try_get::<Option<f64>, _>("price_per_request").map_err(sql_err)?.map(parse_decimal),
            billing_period: billing_period.map(|s| Self::parse_billing_period(&s)).transpose()?,
            requests_per_period: row
                .try_get::<Option<i64>, _>("requests_per_period")
                .map_err(sql_err)?
                .map(|v| v as u64),
            free_requests: row.try_get::<i64, _>("free_requests").map_err(sql_err)? as u64,
            features: if features.is_empty() {
                Vec::new()
            } else {
                serde_json::from_str(&features).unwrap_or_default()
            },
            is_active: row.try_get::<i64, _>("is_active").map_err(sql_err)? != 0,
            created_at: parse_timestamp(&row.try_get::<String, _>("created_at").map_err(sql_err)?)?,
        })
    }

    fn row_to_subscription(row: &sqlx::sqlite::SqliteRow) -> Result<Subscription> {
        let metadata: String = row.try_get("metadata").unwrap_or_default();
        let end_date: Option<String> = row.try_get("end_date").ok();
        let period_start: Option<String> = row.try_get("current_period_start").ok();
        let period_end: Option<String> = row.try_get("current_period_end").ok();
        Ok(Subscription {
            id: row.try_get("id").map_err(sql_err)?,
            user_id: row.try_get("user_id").map_err(sql_err)?,
            plan_id: row.try_get("plan_id").map_err(sql_err)?,
            status: Self::parse_subscription_status(&row.try_get::<String, _>("status").map_err(sql_err)?)?,
            start_date: parse_timestamp(&row.try_get::<String, _>("start_date").map_err(sql_err)?)?,
            end_date: end_date.filter(|s| !s.is_empty()).map(|s| parse_timestamp(&s)).transpose()?,
            current_period_start: period_start.filter(|s| !s.is_empty()).map(|s| parse_timestamp(&s)).transpose()?,
            current_period_end: period_end.filter(|s| !s.is_empty()).map(|s| parse_timestamp(&s)).transpose()?,
            usage_count: row.try_get::<i64, _>("usage_count").map_err(sql_err)? as u64,
            metadata: if metadata.is_empty() {
                HashMap::new()
            } else {
                serde_json::from_str(&metadata).unwrap_or_default()
            },
        })
    }

    fn row_to_usage(row: &sqlx::sqlite::SqliteRow) -> Result<UsageRecord> {
        let metadata: String = row.try_get("metadata").unwrap_or_default();
        Ok(UsageRecord {
            id: row.try_get("id").map_err(sql_err)?,
            user_id: row.try_get("user_id").map_err(sql_err)?,
            feature: row.try_get("feature").map_err(sql_err)?,
            timestamp: parse_timestamp(&row.try_get::<String, _>("timestamp").map_err(sql_err)?)?,
            cost: row.try_get::<Option<f64>, _>("cost").map_err(sql_err)?.map(parse_decimal),
            currency: row.try_get("currency").map_err(sql_err)?,
            metadata: if metadata.is_empty() {
                HashMap::new()
            } else {
                serde_json::from_str(&metadata).unwrap_or_default()
            },
        })
    }

    fn row_to_transaction(row: &sqlx::sqlite::SqliteRow) -> Result<PaymentTransaction> {
        let metadata: String = row.try_get("metadata").unwrap_or_default();
        let completed_at: Option<String> = row.try_get("completed_at").ok();
        Ok(PaymentTransaction {
            id: row.try_get("id").map_err(sql_err)?,
            user_id: row.try_get("user_id").map_err(sql_err)?,
            amount: parse_decimal(row.try_get::<f64, _>("amount").map_err(sql_err)?),
            currency: row.try_get("currency").map_err(sql_err)?,
            payment_method: row.try_get("payment_method").map_err(sql_err)?,
            status: Self::parse_transaction_status(&row.try_get::<String, _>("status").map_err(sql_err)?)?,
            created_at: parse_timestamp(&row.try_get::<String, _>("created_at").map_err(sql_err)?)?,
            completed_at: completed_at.filter(|s| !s.is_empty()).map(|s| parse_timestamp(&s)).transpose()?,
            metadata: if metadata.is_empty() {
                HashMap::new()
            } else {
                serde_json::from_str(&metadata).unwrap_or_default()
            },
        })
    }
}

fn sql_err(e: sqlx::Error) -> AiAgentPaymentsError {
    AiAgentPaymentsError::storage(e.to_string())
}

fn parse_decimal(value: f64) -> Decimal {
    Decimal::try_from(value).unwrap_or_default()
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AiAgentPaymentsError::storage(format!("invalid timestamp '{raw}': {e}")))
}

#[async_trait]
impl StorageBackend for SqlStorage {
    fn name(&self) -> &str {
        "SqlStorage"
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
        let features = serde_json::to_string(&plan.features).map_err(|e| AiAgentPaymentsError::storage(e.to_string()))?;
        sqlx::query(
            "INSERT OR REPLACE INTO payment_plans (id, name, description, payment_type, price, currency, \
             price_per_request, billing_period, requests_per_period, free_requests, features, is_active, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&plan.id)
        .bind(&plan.name)
        .bind(&plan.description)
        .bind(Self::payment_type_str(plan.payment_type))
        .bind(plan.price.to_string().parse::<f64>().unwrap_or_default())
        .bind(&plan.currency)
        .bind(plan.price_per_request.map(|d| d.to_string().parse::<f64>().unwrap_or_default()))
        .bind(plan.billing_period.map(Self::billing_period_str))
        .bind(plan.requests_per_period.map(|v| v as i64))
        .bind(plan.free_requests as i64)
        .bind(features)
        .bind(plan.is_active)
        .bind(plan.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(sql_err)?;
        Ok(())
    }

    async fn get_plan(&self, plan_id: &str) -> Result<Option<PaymentPlan>> {
        let row = sqlx::query("SELECT * FROM payment_plans WHERE id = ?")
            .bind(plan_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(sql_err)?;
        row.as_ref().map(Self::row_to_plan).transpose()
    }

    async fn list_plans(&self) -> Result<Vec<PaymentPlan>> {
        let rows = sqlx::query("SELECT * FROM payment_plans WHERE is_active = 1")
            .fetch_all(&self.pool)
            .await
            .map_err(sql_err)?;
        rows.iter().map(Self::row_to_plan).collect()
    }

    async fn save_subscription(&self, subscription: &Subscription) -> Result<()> {
        subscription.validate()?;
        check_size_limit(estimate_size(subscription)?, Some(MAX_DATA_SIZE))?;
        let metadata = serde_json::to_string(&subscription.metadata).map_err(|e| AiAgentPaymentsError::storage(e.to_string()))?;
        sqlx::query(
            "INSERT OR REPLACE INTO subscriptions (id, user_id, plan_id, status, start_date, end_date, \
             current_period_start, current_period_end, usage_count, metadata) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&subscription.id)
        .bind(&subscription.user_id)
        .bind(&subscription.plan_id)
        .bind(Self::subscription_status_str(subscription.status))
        .bind(subscription.start_date.to_rfc3339())
        .bind(subscription.end_date.map(|d| d.to_rfc3339()))
        .bind(subscription.current_period_start.map(|d| d.to_rfc3339()))
        .bind(subscription.current_period_end.map(|d| d.to_rfc3339()))
        .bind(subscription.usage_count as i64)
        .bind(metadata)
        .execute(&self.pool)
        .await
        .map_err(sql_err)?;
        Ok(())
    }

    async fn get_subscription(&self, subscription_id: &str) -> Result<Option<Subscription>> {
        let row = sqlx::query("SELECT * FROM subscriptions WHERE id = ?")
            .bind(subscription_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(sql_err)?;
        row.as_ref().map(Self::row_to_subscription).transpose()
    }

    async fn get_user_subscription(&self, user_id: &str) -> Result<Option<Subscription>> {
        let row = sqlx::query("SELECT * FROM subscriptions WHERE user_id = ? AND status = 'active' ORDER BY start_date DESC LIMIT 1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(sql_err)?;
        row.as_ref().map(Self::row_to_subscription).transpose()
    }

    async fn save_usage(&self, record: &UsageRecord) -> Result<()> {
        record.validate()?;
        check_size_limit(estimate_size(record)?, Some(MAX_DATA_SIZE))?;
        let metadata = serde_json::to_string(&record.metadata).map_err(|e| AiAgentPaymentsError::storage(e.to_string()))?;
        sqlx::query(
            "INSERT OR REPLACE INTO usage_records (id, user_id, feature, timestamp, cost, currency, metadata) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.user_id)
        .bind(&record.feature)
        .bind(record.timestamp.to_rfc3339())
        .bind(record.cost.map(|d| d.to_string().parse::<f64>().unwrap_or_default()))
        .bind(&record.currency)
        .bind(metadata)
        .execute(&self.pool)
        .await
        .map_err(sql_err)?;
        Ok(())
    }

    async fn get_user_usage(
        &self,
        user_id: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<UsageRecord>> {
        let rows = sqlx::query("SELECT * FROM usage_records WHERE user_id = ? ORDER BY timestamp ASC")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(sql_err)?;
        let records: Result<Vec<UsageRecord>> = rows.iter().map(Self::row_to_usage).collect();
        let mut records = records?;
        if let Some(from) = from {
            records.retain(|r| r.timestamp >= from);
        }
        if let Some(to) = to {
            records.retain(|r| r.timestamp <= to);
        }
        Ok(records)
    }

    async fn save_transaction(&self, transaction: &PaymentTransaction) -> Result<()> {
        transaction.validate()?;
        check_size_limit(estimate_size(transaction)?, Some(MAX_DATA_SIZE))?;
        let metadata = serde_json::to_string(&transaction.metadata).map_err(|e| AiAgentPaymentsError::storage(e.to_string()))?;
        sqlx::query(
            "INSERT INTO transactions (id, user_id, amount, currency, payment_method, status, created_at, completed_at, metadata) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&transaction.id)
        .bind(&transaction.user_id)
        .bind(transaction.amount.to_string().parse::<f64>().unwrap_or_default())
        .bind(&transaction.currency)
        .bind(&transaction.payment_method)
        .bind(Self::transaction_status_str(transaction.status))
        .bind(transaction.created_at.to_rfc3339())
        .bind(transaction.completed_at.map(|d| d.to_rfc3339()))
        .bind(metadata)
        .execute(&self.pool)
        .await
        .map_err(|e| AiAgentPaymentsError::storage(format!("duplicate or invalid transaction: {e}")))?;
        Ok(())
    }

    async fn update_transaction(&self, transaction: &PaymentTransaction) -> Result<()> {
        transaction.validate()?;
        check_size_limit(estimate_size(transaction)?, Some(MAX_DATA_SIZE))?;
        let metadata = serde_json::to_string(&transaction.metadata).map_err(|e| AiAgentPaymentsError::storage(e.to_string()))?;
        let result = sqlx::query(
            "UPDATE transactions SET amount = ?, currency = ?, payment_method = ?, status = ?, completed_at = ?, metadata = ? \
             WHERE id = ?",
        )
        .bind(transaction.amount.to_string().parse::<f64>().unwrap_or_default())
        .bind(&transaction.currency)
        .bind(&transaction.payment_method)
        .bind(Self::transaction_status_str(transaction.status))
        .bind(transaction.completed_at.map(|d| d.to_rfc3339()))
        .bind(metadata)
        .bind(&transaction.id)
        .execute(&self.pool)
        .await
        .map_err(sql_err)?;
        if result.rows_affected() == 0 {
            return Err(AiAgentPaymentsError::storage(format!(
                "transaction {} does not exist",
                transaction.id
            )));
        }
        Ok(())
    }

    async fn get_transaction(&self, transaction_id: &str) -> Result<Option<PaymentTransaction>> {
        let row = sqlx::query("SELECT * FROM transactions WHERE id = ?")
            .bind(transaction_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(sql_err)?;
        row.as_ref().map(Self::row_to_transaction).transpose()
    }

    async fn delete_transaction(&self, transaction_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM transactions WHERE id = ?")
            .bind(transaction_id)
            .execute(&self.pool)
            .await
            .map_err(sql_err)?;
        Ok(())
    }

    async fn list_transactions(
        &self,
        user_id: Option<&str>,
        status: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<PaymentTransaction>> {
        let rows = sqlx::query("SELECT * FROM transactions ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await
            .map_err(sql_err)?;
        let transactions: Result<Vec<PaymentTransaction>> = rows.iter().map(Self::row_to_transaction).collect();
        let mut transactions = transactions?;
        if let Some(user_id) = user_id {
            transactions.retain(|tx| tx.user_id == user_id);
        }
        if let Some(status) = status {
            transactions.retain(|tx| Self::transaction_status_str(tx.status) == status.to_lowercase());
        }
        if let Some(limit) = limit {
            transactions.truncate(limit);
        }
        Ok(transactions)
    }

    async fn begin_transaction(&self) -> Result<()> {
        let mut in_transaction = self.in_transaction.lock().await;
        if *in_transaction {
            return Err(AiAgentPaymentsError::storage("transaction already in progress"));
        }
        sqlx::query("BEGIN").execute(&self.pool).await.map_err(sql_err)?;
        *in_transaction = true;
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        let mut in_transaction = self.in_transaction.lock().await;
        if !*in_transaction {
            return Err(AiAgentPaymentsError::storage("no transaction in progress"));
        }
        sqlx::query("COMMIT").execute(&self.pool).await.map_err(sql_err)?;
        *in_transaction = false;
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        let mut in_transaction = self.in_transaction.lock().await;
        if !*in_transaction {
            return Err(AiAgentPaymentsError::storage("no transaction in progress"));
        }
        sqlx::query("ROLLBACK").execute(&self.pool).await.map_err(sql_err)?;
        *in_transaction = false;
        Ok(())
    }

    async fn check_health(&self) -> StorageStatus {
        let start = std::time::Instant::now();
        let result = sqlx::query("SELECT 1").fetch_one(&self.pool).await;
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        match result {
            Ok(_) => StorageStatus {
                is_healthy: true,
                response_time_ms: elapsed_ms,
                error_message: None,
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
    use rust_decimal::Decimal;

    async fn memory_db() -> SqlStorage {
        SqlStorage::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn save_and_get_plan_round_trips() {
        let storage = memory_db().await;
        let plan = PaymentPlan::new("Pro", PaymentType::PayPerUse, Decimal::new(100, 2), "USD");
        storage.save_plan(&plan).await.unwrap();
        let fetched = storage.get_plan(&plan.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, plan.id);
        assert_eq!(fetched.name, "Pro");
    }

    #[tokio::test]
    async fn duplicate_transaction_insert_fails() {
        let storage = memory_db().await;
        let tx = PaymentTransaction::new("alice", Decimal::new(500, 2), "USDT", "usdt_erc20");
        storage.save_transaction(&tx).await.unwrap();
        assert!(storage.save_transaction(&tx).await.is_err());
    }

    #[tokio::test]
    async fn update_nonexistent_transaction_fails() {
        let storage = memory_db().await;
        let tx = PaymentTransaction::new("alice", Decimal::new(500, 2), "USDT", "usdt_erc20");
        assert!(storage.update_transaction(&tx).await.is_err());
    }

    #[tokio::test]
    async fn list_plans_excludes_inactive() {
        let storage = memory_db().await;
        let mut plan = PaymentPlan::new("Retired", PaymentType::PayPerUse, Decimal::ZERO, "USD");
        plan.is_active = false;
        storage.save_plan(&plan).await.unwrap();
        assert!(storage.list_plans().await.unwrap().is_empty());
    }
}
