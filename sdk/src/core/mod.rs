//! Access & Billing Core: the plan catalog, subscription lifecycle, usage
//! accounting, and the access-decision engine, built on top of a pluggable
//! [`StorageBackend`] and [`PaymentProvider`].

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;

use crate::error::{AiAgentPaymentsError, Result};
use crate::models::{PaymentPlan, PaymentTransaction, PaymentType, Subscription, SubscriptionStatus, UsageRecord};
use crate::provider::PaymentProvider;
use crate::storage::StorageBackend;
use crate::validation::validate_string_field;

const MAX_ID_LEN: usize = 100;
const MAX_FEATURE_LEN: usize = 255;

/// Orchestrates the plan catalog, subscriptions, usage, and payment
/// dispatch over a storage backend and a payment provider.
pub struct PaymentManager {
    storage: Arc<dyn StorageBackend>,
    provider: Arc<dyn PaymentProvider>,
}

impl PaymentManager {
    #[must_use]
    pub fn new(storage: Arc<dyn StorageBackend>, provider: Arc<dyn PaymentProvider>) -> Self {
        Self { storage, provider }
    }

    /// Validate and persist a new payment plan.
    ///
    /// # Errors
    /// Returns a `Validation` error if the plan fails its own invariants, or
    /// a `Storage` error if persistence fails.
    pub async fn create_payment_plan(&self, plan: PaymentPlan) -> Result<PaymentPlan> {
        plan.validate()?;
        self.storage.save_plan(&plan).await?;
        Ok(plan)
    }

    /// All plans currently marked active.
    ///
    /// # Errors
    /// Returns a `Storage` error if the backend cannot be read.
    pub async fn list_payment_plans(&self) -> Result<Vec<PaymentPlan>> {
        self.storage.list_plans().await
    }

    /// Subscribe `user_id` to `plan_id`. For subscription plans, sets the
    /// current billing period to `[now, now + billing_period)`.
    ///
    /// # Errors
    /// Returns a `Validation` error if the plan does not exist, or a
    /// `Storage` error if persistence fails.
    pub async fn subscribe_user(&self, user_id: &str, plan_id: &str) -> Result<Subscription> {
        validate_string_field(user_id, "user_id", MAX_ID_LEN)?;
        let plan = self
            .storage
            .get_plan(plan_id)
            .await?
            .ok_or_else(|| AiAgentPaymentsError::validation(format!("unknown payment plan {plan_id}")))?;

        let mut subscription = Subscription::new(user_id, plan_id);
        if plan.payment_type == PaymentType::Subscription {
            let period = plan
                .billing_period
                .ok_or_else(|| AiAgentPaymentsError::configuration("subscription plan is missing a billing_period"))?;
            let now = Utc::now();
            subscription.current_period_start = Some(now);
            subscription.current_period_end = Some(now + period.duration());
        }
        subscription.validate()?;
        self.storage.save_subscription(&subscription).await?;
        Ok(subscription)
    }

    /// Cancel `user_id`'s active subscription.
    ///
    /// # Errors
    /// Returns a `Validation` error if the user has no active subscription,
    /// or a `Storage` error if persistence fails.
    pub async fn cancel_user_subscription(&self, user_id: &str) -> Result<()> {
        validate_string_field(user_id, "user_id", MAX_ID_LEN)?;
        let mut subscription = self
            .storage
            .get_user_subscription(user_id)
            .await?
            .ok_or_else(|| AiAgentPaymentsError::validation(format!("user {user_id} has no active subscription")))?;
        subscription.set_status(SubscriptionStatus::Cancelled)?;
        self.storage.save_subscription(&subscription).await?;
        Ok(())
    }

    /// Decide whether `user_id` may currently use `feature`.
    ///
    /// # Errors
    /// Returns a `Validation` error for empty inputs, or a `Storage` error
    /// if the backend cannot be read.
    pub async fn check_access(&self, user_id: &str, feature: &str) -> Result<bool> {
        validate_string_field(user_id, "user_id", MAX_ID_LEN)?;
        validate_string_field(feature, "feature", MAX_FEATURE_LEN)?;

        match self.storage.get_user_subscription(user_id).await? {
            None => {
                let plans = self.storage.list_plans().await?;
                let has_free_allowance = plans.iter().any(|plan| {
                    plan.is_active
                        && plan.payment_type == PaymentType::Freemium
                        && plan.features.iter().any(|f| f == feature)
                        && plan.free_requests > 0
                });
                if has_free_allowance {
                    return Ok(true);
                }
                let has_pay_per_use = plans.iter().any(|plan| {
                    plan.is_active && plan.payment_type == PaymentType::PayPerUse && plan.features.iter().any(|f| f == feature)
                });
                Ok(has_pay_per_use)
            }
            Some(subscription) => {
                let Some(plan) = self.storage.get_plan(&subscription.plan_id).await? else {
                    return Ok(false);
                };
                if !plan.features.iter().any(|f| f == feature) {
                    return Ok(false);
                }
                if plan.payment_type == PaymentType::Freemium
                    && plan.free_requests > 0
                    && subscription.usage_count >= plan.free_requests
                {
                    return Ok(false);
                }
                if plan.payment_type == PaymentType::Subscription {
                    if let Some(limit) = plan.requests_per_period {
                        if subscription.usage_count >= limit {
                            return Ok(false);
                        }
                    }
                    if !subscription.is_active(Utc::now()) {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        }
    }

    /// Record one use of `feature` by `user_id`. Increments the active
    /// subscription's usage counter when one exists; otherwise dispatches a
    /// pay-per-use charge through the configured provider.
    ///
    /// # Errors
    /// Returns `PaymentFailed` if pay-per-use dispatch fails, or a
    /// `Storage` error if persistence fails.
    pub async fn record_usage(&self, user_id: &str, feature: &str, cost: Option<Decimal>) -> Result<UsageRecord> {
        validate_string_field(user_id, "user_id", MAX_ID_LEN)?;
        validate_string_field(feature, "feature", MAX_FEATURE_LEN)?;

        let mut currency = "USD".to_string();
        match self.storage.get_user_subscription(user_id).await? {
            Some(mut subscription) => {
                subscription.usage_count += 1;
                self.storage.save_subscription(&subscription).await?;
            }
            None => {
                let plans = self.storage.list_plans().await?;
                if let Some(plan) = plans
                    .iter()
                    .find(|plan| plan.is_active && plan.payment_type == PaymentType::PayPerUse && plan.features.iter().any(|f| f == feature))
                {
                    currency = plan.currency.clone();
                    let price = plan.price_per_request.unwrap_or(plan.price);
                    self.provider
                        .process_payment(user_id, price, &plan.currency, None)
                        .await
                        .map_err(|e| AiAgentPaymentsError::payment_failed(format!("pay-per-use charge failed: {e}")))?;
                }
            }
        }

        let record = UsageRecord::new(user_id, feature, cost, currency);
        self.storage.save_usage(&record).await?;
        Ok(record)
    }

    /// Dispatch a direct payment (outside the usage-metered flows above)
    /// through the configured provider, persisting the resulting
    /// transaction.
    ///
    /// # Errors
    /// Returns whatever the provider raises, or a `Storage` error if
    /// persistence fails.
    pub async fn process_payment(&self, user_id: &str, amount: Decimal, currency: &str) -> Result<PaymentTransaction> {
        let transaction = self.provider.process_payment(user_id, amount, currency, None).await?;
        self.storage.save_transaction(&transaction).await?;
        Ok(transaction)
    }

    /// All usage records for `user_id`, oldest first.
    ///
    /// # Errors
    /// Returns a `Storage` error if the backend cannot be read.
    pub async fn get_user_usage(&self, user_id: &str) -> Result<Vec<UsageRecord>> {
        self.storage.get_user_usage(user_id, None, None).await
    }

    /// `user_id`'s currently active subscription, if any.
    ///
    /// # Errors
    /// Returns a `Storage` error if the backend cannot be read.
    pub async fn get_user_subscription(&self, user_id: &str) -> Result<Option<Subscription>> {
        self.storage.get_user_subscription(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BillingPeriod;
    use crate::provider::MockProvider;
    use crate::storage::MemoryStorage;

    fn manager() -> PaymentManager {
        PaymentManager::new(Arc::new(MemoryStorage::new()), Arc::new(MockProvider::new()))
    }

    #[tokio::test]
    async fn freemium_access_respects_free_request_allowance() {
        let manager = manager();
        let mut plan = PaymentPlan::new("Free", PaymentType::Freemium, Decimal::ZERO, "USD");
        plan.features.push("search".to_string());
        plan.free_requests = 2;
        manager.create_payment_plan(plan.clone()).await.unwrap();

        assert!(manager.check_access("alice", "search").await.unwrap());
        manager.subscribe_user("alice", &plan.id).await.unwrap();
        for _ in 0..2 {
            manager.record_usage("alice", "search", None).await.unwrap();
        }
        assert!(!manager.check_access("alice", "search").await.unwrap());
    }

    #[tokio::test]
    async fn pay_per_use_grants_access_and_charges_on_record_usage() {
        let manager = manager();
        let mut plan = PaymentPlan::new("Metered", PaymentType::PayPerUse, Decimal::ZERO, "USD");
        plan.price_per_request = Some(Decimal::new(10, 2));
        plan.features.push("translate".to_string());
        manager.create_payment_plan(plan).await.unwrap();

        assert!(manager.check_access("bob", "translate").await.unwrap());
        manager.record_usage("bob", "translate", None).await.unwrap();
    }

    #[tokio::test]
    async fn subscription_plan_enforces_requests_per_period() {
        let manager = manager();
        let mut plan = PaymentPlan::new("Pro", PaymentType::Subscription, Decimal::new(999, 2), "USD");
        plan.billing_period = Some(BillingPeriod::Monthly);
        plan.requests_per_period = Some(1);
        plan.features.push("chat".to_string());
        manager.create_payment_plan(plan.clone()).await.unwrap();
        manager.subscribe_user("carol", &plan.id).await.unwrap();

        assert!(manager.check_access("carol", "chat").await.unwrap());
        manager.record_usage("carol", "chat", None).await.unwrap();
        assert!(!manager.check_access("carol", "chat").await.unwrap());
    }

    #[tokio::test]
    async fn cancel_subscription_revokes_access() {
        let manager = manager();
        let mut plan = PaymentPlan::new("Pro", PaymentType::Subscription, Decimal::new(999, 2), "USD");
        plan.billing_period = Some(BillingPeriod::Monthly);
        plan.features.push("chat".to_string());
        manager.create_payment_plan(plan.clone()).await.unwrap();
        manager.subscribe_user("dave", &plan.id).await.unwrap();
        manager.cancel_user_subscription("dave").await.unwrap();

        assert!(manager.get_user_subscription("dave").await.unwrap().is_none());
    }
}
