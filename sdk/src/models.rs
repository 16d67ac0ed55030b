//! Domain records: payment plans, subscriptions, usage records, and payment
//! transactions, plus the status-transition rules enforced by the access and
//! billing core.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AiAgentPaymentsError, Result};
use crate::utils::generate_id;
use crate::validation::{validate_currency, validate_stablecoin_minimum, validate_string_field};

const MAX_ID_LEN: usize = 100;
const MAX_NAME_LEN: usize = 255;
const MAX_DESCRIPTION_LEN: usize = 1000;

/// Recursively validate that `value` is the kind of JSON metadata this crate
/// is willing to persist: no NaN/Infinity numbers, depth ≤ 3, ≤100 top-level
/// keys / ≤50 nested keys, ≤100 list elements, and key length ≤100.
///
/// # Errors
/// Returns a `Validation` error describing the first offending value found.
pub fn validate_json_serializable(value: &Value, depth: u8) -> Result<()> {
    const MAX_DEPTH: u8 = 3;
    if depth > MAX_DEPTH {
        return Err(AiAgentPaymentsError::validation(
            "metadata is nested too deeply (max depth 3)",
        ));
    }
    match value {
        Value::Number(n) => {
            if let Some(f) = n.as_f64() {
                if !f.is_finite() {
                    return Err(AiAgentPaymentsError::validation(
                        "metadata numbers must be finite",
                    ));
                }
            }
            Ok(())
        }
        Value::Object(map) => {
            let max_keys = if depth == 0 { 100 } else { 50 };
            if map.len() > max_keys {
                return Err(AiAgentPaymentsError::validation(format!(
                    "metadata object has too many keys (max {max_keys})"
                )));
            }
            for (key, v) in map {
                if key.len() > 100 {
                    return Err(AiAgentPaymentsError::validation(
                        "metadata key exceeds maximum length of 100 characters",
                    ));
                }
                validate_json_serializable(v, depth + 1)?;
            }
            Ok(())
        }
        Value::Array(items) => {
            if items.len() > 100 {
                return Err(AiAgentPaymentsError::validation(
                    "metadata list exceeds maximum of 100 elements",
                ));
            }
            for v in items {
                validate_json_serializable(v, depth + 1)?;
            }
            Ok(())
        }
        Value::String(_) | Value::Bool(_) | Value::Null => Ok(()),
    }
}

/// Billing interval a subscription plan recurs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingPeriod {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl BillingPeriod {
    #[must_use]
    pub fn duration(self) -> chrono::Duration {
        match self {
            Self::Daily => chrono::Duration::days(1),
            Self::Weekly => chrono::Duration::days(7),
            Self::Monthly => chrono::Duration::days(30),
            Self::Yearly => chrono::Duration::days(365),
        }
    }
}

/// The monetization model a plan charges under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    PayPerUse,
    Subscription,
    Freemium,
}

/// Catalog entry a user can subscribe to, or be charged against per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentPlan {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub payment_type: PaymentType,
    pub price: Decimal,
    pub currency: String,
    pub price_per_request: Option<Decimal>,
    pub billing_period: Option<BillingPeriod>,
    pub requests_per_period: Option<u64>,
    pub free_requests: u64,
    pub features: Vec<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl PaymentPlan {
    #[must_use]
    pub fn new(name: impl Into<String>, payment_type: PaymentType, price: Decimal, currency: impl Into<String>) -> Self {
        Self {
            id: generate_id(Some("plan")),
            name: name.into(),
            description: None,
            payment_type,
            price,
            currency: currency.into(),
            price_per_request: None,
            billing_period: None,
            requests_per_period: None,
            free_requests: 0,
            features: Vec::new(),
            is_active: true,
            created_at: Utc::now(),
        }
    }

    /// Validate field constraints, the `payment_type` ⇒ `billing_period` invariant,
    /// currency support, and the stablecoin minimum price.
    ///
    /// # Errors
    /// Returns a `Validation` error naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        validate_string_field(&self.id, "id", MAX_ID_LEN)?;
        validate_string_field(&self.name, "name", MAX_NAME_LEN)?;
        if let Some(description) = &self.description {
            if !description.is_empty() {
                validate_string_field(description, "description", MAX_DESCRIPTION_LEN)?;
            }
        }
        validate_currency(&self.currency)?;
        if self.price < Decimal::ZERO {
            return Err(AiAgentPaymentsError::validation_field(
                "price",
                self.price.to_string(),
                "price cannot be negative",
            ));
        }
        if let Some(ppr) = self.price_per_request {
            if ppr < Decimal::ZERO {
                return Err(AiAgentPaymentsError::validation_field(
                    "price_per_request",
                    ppr.to_string(),
                    "price_per_request cannot be negative",
                ));
            }
        }
        if self.payment_type == PaymentType::Subscription && self.billing_period.is_none() {
            return Err(AiAgentPaymentsError::validation(
                "subscription plans require a billing_period",
            ));
        }
        if let Ok(price_f64) = self.price.to_string().parse::<f64>() {
            validate_stablecoin_minimum(price_f64, &self.currency)?;
        }
        for feature in &self.features {
            validate_string_field(feature, "features", MAX_NAME_LEN)?;
        }
        Ok(())
    }
}

/// Lifecycle state of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Cancelled,
    Expired,
    Suspended,
}

impl SubscriptionStatus {
    /// Whether transitioning from `self` to `next` is a legal status change.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Active, Self::Cancelled)
                | (Self::Active, Self::Expired)
                | (Self::Active, Self::Suspended)
                | (Self::Cancelled, Self::Active)
                | (Self::Expired, Self::Active)
                | (Self::Suspended, Self::Active)
                | (Self::Suspended, Self::Cancelled)
        )
    }
}

/// A user's binding to a plan over time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub user_id: String,
    pub plan_id: String,
    pub status: SubscriptionStatus,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub usage_count: u64,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl Subscription {
    #[must_use]
    pub fn new(user_id: impl Into<String>, plan_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: generate_id(Some("sub")),
            user_id: user_id.into(),
            plan_id: plan_id.into(),
            status: SubscriptionStatus::Active,
            start_date: now,
            end_date: None,
            current_period_start: None,
            current_period_end: None,
            usage_count: 0,
            metadata: HashMap::new(),
        }
    }

    /// Validate id fields and date ordering invariants.
    ///
    /// # Errors
    /// Returns a `Validation` error naming the offending field.
    pub fn validate(&self) -> Result<()> {
        validate_string_field(&self.user_id, "user_id", MAX_ID_LEN)?;
        validate_string_field(&self.plan_id, "plan_id", MAX_ID_LEN)?;
        if let Some(end_date) = self.end_date {
            if end_date < self.start_date {
                return Err(AiAgentPaymentsError::validation(
                    "end_date must not precede start_date",
                ));
            }
        }
        if let (Some(start), Some(end)) = (self.current_period_start, self.current_period_end) {
            if end < start {
                return Err(AiAgentPaymentsError::validation(
                    "current_period_end must not precede current_period_start",
                ));
            }
        }
        for value in self.metadata.values() {
            validate_json_serializable(value, 0)?;
        }
        Ok(())
    }

    /// True iff active and within both the overall and current billing period, when set.
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        if self.status != SubscriptionStatus::Active {
            return false;
        }
        if let Some(end_date) = self.end_date {
            if now > end_date {
                return false;
            }
        }
        if let Some(current_period_end) = self.current_period_end {
            if now > current_period_end {
                return false;
            }
        }
        true
    }

    /// Apply a status transition, rejecting illegal ones; same-status is a no-op.
    ///
    /// # Errors
    /// Returns a `Validation` error if the transition is not legal from the current status.
    pub fn set_status(&mut self, next: SubscriptionStatus) -> Result<()> {
        if self.status == next {
            return Ok(());
        }
        if !self.status.can_transition_to(next) {
            return Err(AiAgentPaymentsError::validation(format!(
                "cannot transition subscription from {:?} to {next:?}",
                self.status
            )));
        }
        self.status = next;
        Ok(())
    }
}

/// A single billable or free usage event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub id: String,
    pub user_id: String,
    pub feature: String,
    pub timestamp: DateTime<Utc>,
    pub cost: Option<Decimal>,
    pub currency: String,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl UsageRecord {
    #[must_use]
    pub fn new(user_id: impl Into<String>, feature: impl Into<String>, cost: Option<Decimal>, currency: impl Into<String>) -> Self {
        Self {
            id: generate_id(Some("usage")),
            user_id: user_id.into(),
            feature: feature.into(),
            timestamp: Utc::now(),
            cost,
            currency: currency.into(),
            metadata: HashMap::new(),
        }
    }

    /// Validate id/feature fields, non-negative cost, and the stablecoin minimum when billed.
    ///
    /// # Errors
    /// Returns a `Validation` error naming the offending field.
    pub fn validate(&self) -> Result<()> {
        validate_string_field(&self.user_id, "user_id", MAX_ID_LEN)?;
        validate_string_field(&self.feature, "feature", MAX_NAME_LEN)?;
        if let Some(cost) = self.cost {
            if cost < Decimal::ZERO {
                return Err(AiAgentPaymentsError::validation_field(
                    "cost",
                    cost.to_string(),
                    "cost cannot be negative",
                ));
            }
            if let Ok(cost_f64) = cost.to_string().parse::<f64>() {
                validate_stablecoin_minimum(cost_f64, &self.currency)?;
            }
        }
        for value in self.metadata.values() {
            validate_json_serializable(value, 0)?;
        }
        Ok(())
    }
}

/// Lifecycle state of a payment transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
    Cancelled,
}

impl TransactionStatus {
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Completed)
                | (Self::Pending, Self::Failed)
                | (Self::Completed, Self::Failed)
                | (Self::Completed, Self::Refunded)
        )
    }
}

/// A single payment attempt or confirmed on-chain transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentTransaction {
    pub id: String,
    pub user_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub payment_method: String,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl PaymentTransaction {
    #[must_use]
    pub fn new(user_id: impl Into<String>, amount: Decimal, currency: impl Into<String>, payment_method: impl Into<String>) -> Self {
        Self {
            id: generate_id(Some("tx")),
            user_id: user_id.into(),
            amount,
            currency: currency.into(),
            payment_method: payment_method.into(),
            status: TransactionStatus::Pending,
            created_at: Utc::now(),
            completed_at: None,
            metadata: HashMap::new(),
        }
    }

    /// Validate id/method fields, a non-negative amount, and currency/minimum invariants.
    ///
    /// # Errors
    /// Returns a `Validation` error naming the offending field.
    pub fn validate(&self) -> Result<()> {
        validate_string_field(&self.user_id, "user_id", MAX_ID_LEN)?;
        validate_string_field(&self.payment_method, "payment_method", MAX_NAME_LEN)?;
        validate_currency(&self.currency)?;
        if self.amount < Decimal::ZERO {
            return Err(AiAgentPaymentsError::validation_field(
                "amount",
                self.amount.to_string(),
                "amount cannot be negative",
            ));
        }
        for value in self.metadata.values() {
            validate_json_serializable(value, 0)?;
        }
        Ok(())
    }

    /// Apply a status transition, rejecting illegal ones; same-status is a no-op.
    ///
    /// # Errors
    /// Returns a `Validation` error if the transition is not legal from the current status.
    pub fn set_status(&mut self, next: TransactionStatus, now: DateTime<Utc>) -> Result<()> {
        if self.status == next {
            return Ok(());
        }
        if !self.status.can_transition_to(next) {
            return Err(AiAgentPaymentsError::validation(format!(
                "cannot transition transaction from {:?} to {next:?}",
                self.status
            )));
        }
        self.status = next;
        if next == TransactionStatus::Completed {
            self.completed_at = Some(now);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn freemium_plan_validates_without_billing_period() {
        let plan = PaymentPlan::new("Free", PaymentType::Freemium, Decimal::ZERO, "USD");
        assert!(plan.validate().is_ok());
    }

    #[test]
    fn subscription_plan_requires_billing_period() {
        let mut plan = PaymentPlan::new("Pro", PaymentType::Subscription, Decimal::new(999, 2), "USD");
        assert!(plan.validate().is_err());
        plan.billing_period = Some(BillingPeriod::Monthly);
        assert!(plan.validate().is_ok());
    }

    #[test]
    fn plan_rejects_negative_price() {
        let mut plan = PaymentPlan::new("Pro", PaymentType::PayPerUse, Decimal::ZERO, "USD");
        plan.price = Decimal::new(-1, 0);
        assert!(plan.validate().is_err());
    }

    #[test]
    fn subscription_status_transitions() {
        let mut sub = Subscription::new("alice", "pro-plan");
        assert!(sub.set_status(SubscriptionStatus::Suspended).is_ok());
        assert!(sub.set_status(SubscriptionStatus::Active).is_ok());
        assert!(sub.set_status(SubscriptionStatus::Expired).is_ok());
        assert!(sub.set_status(SubscriptionStatus::Suspended).is_err());
        assert!(sub.set_status(SubscriptionStatus::Expired).is_ok());
    }

    #[test]
    fn subscription_is_active_honors_period_end() {
        let mut sub = Subscription::new("alice", "pro-plan");
        sub.current_period_end = Some(now() - Duration::days(1));
        assert!(!sub.is_active(now()));
        sub.current_period_end = Some(now() + Duration::days(1));
        assert!(sub.is_active(now()));
    }

    #[test]
    fn usage_record_enforces_stablecoin_minimum() {
        let mut record = UsageRecord::new("alice", "search", Some(Decimal::ZERO), "USDT");
        assert!(record.validate().is_err());
        record.cost = Some(Decimal::new(1, 0));
        assert!(record.validate().is_ok());
    }

    #[test]
    fn transaction_status_transitions() {
        let mut tx = PaymentTransaction::new("alice", Decimal::new(500, 2), "USDT", "usdt_erc20");
        assert!(tx.validate().is_ok());
        assert!(tx.set_status(TransactionStatus::Completed, now()).is_ok());
        assert!(tx.completed_at.is_some());
        assert!(tx.set_status(TransactionStatus::Refunded, now()).is_ok());
        assert!(tx.set_status(TransactionStatus::Pending, now()).is_err());
    }

    #[test]
    fn metadata_depth_limit_enforced() {
        let deeply_nested = serde_json::json!({"a": {"b": {"c": {"d": 1}}}});
        assert!(validate_json_serializable(&deeply_nested, 0).is_err());
    }
}
