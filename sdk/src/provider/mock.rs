//! Deterministic in-memory `PaymentProvider` fixture. Exercises the core and
//! the CLI end-to-end without a live chain or vendor HTTP API; not a vendor
//! adapter.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::{AiAgentPaymentsError, Result};
use crate::models::{PaymentTransaction, TransactionStatus};

use super::{validate_against_capabilities, Capabilities, CheckoutSession, PaymentProvider, RefundInfo};

/// `process_payment` always succeeds synchronously; `verify_payment` returns
/// true for any transaction id this fixture has recorded as completed;
/// `refund_payment` succeeds for completed transactions only.
pub struct MockProvider {
    transactions: Mutex<HashMap<String, PaymentTransaction>>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    #[must_use]
    pub fn new() -> Self {
        Self {
            transactions: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl PaymentProvider for MockProvider {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            supports_refunds: true,
            supports_webhooks: false,
            supports_partial_refunds: true,
            supports_subscriptions: true,
            supports_metadata: true,
            supported_currencies: vec!["USD".to_string(), "EUR".to_string(), "USDT".to_string(), "USDC".to_string()],
            min_amount: Decimal::ZERO,
            max_amount: Decimal::new(1_000_000, 0),
        }
    }

    async fn process_payment(
        &self,
        user_id: &str,
        amount: Decimal,
        currency: &str,
        metadata: Option<HashMap<String, Value>>,
    ) -> Result<PaymentTransaction> {
        validate_against_capabilities(&self.capabilities(), amount, currency)?;
        let mut tx = PaymentTransaction::new(user_id, amount, currency, "mock");
        tx.metadata = metadata.unwrap_or_default();
        tx.set_status(TransactionStatus::Completed, Utc::now())?;
        self.transactions.lock().await.insert(tx.id.clone(), tx.clone());
        Ok(tx)
    }

    async fn verify_payment(&self, transaction_id: &str) -> Result<bool> {
        Ok(self
            .transactions
            .lock()
            .await
            .get(transaction_id)
            .is_some_and(|tx| tx.status == TransactionStatus::Completed))
    }

    async fn refund_payment(&self, transaction_id: &str, amount: Option<Decimal>) -> Result<RefundInfo> {
        let mut transactions = self.transactions.lock().await;
        let tx = transactions
            .get_mut(transaction_id)
            .ok_or_else(|| AiAgentPaymentsError::payment_failed(format!("unknown transaction {transaction_id}")))?;
        if tx.status != TransactionStatus::Completed {
            return Err(AiAgentPaymentsError::payment_failed(
                "only completed transactions can be refunded",
            ));
        }
        let refund_amount = amount.unwrap_or(tx.amount);
        tx.set_status(TransactionStatus::Refunded, Utc::now())?;
        Ok(RefundInfo {
            transaction_id: transaction_id.to_string(),
            amount: refund_amount,
            instructions: format!("refunded {refund_amount} {} to user {}", tx.currency, tx.user_id),
        })
    }

    async fn get_payment_status(&self, transaction_id: &str) -> Result<String> {
        self.transactions
            .lock()
            .await
            .get(transaction_id)
            .map(|tx| format!("{:?}", tx.status).to_lowercase())
            .ok_or_else(|| AiAgentPaymentsError::payment_failed(format!("unknown transaction {transaction_id}")))
    }

    fn verify_webhook_signature(&self, _payload: &str, _headers: &HashMap<String, String>) -> bool {
        true
    }

    async fn create_checkout_session(&self, user_id: &str, amount: Decimal, currency: &str) -> Result<CheckoutSession> {
        validate_against_capabilities(&self.capabilities(), amount, currency)?;
        let session_id = crate::utils::generate_id(Some("mock_session"));
        Ok(CheckoutSession {
            checkout_url: format!("https://mock.invalid/checkout/{session_id}?user={user_id}"),
            session_id,
        })
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn process_payment_completes_synchronously() {
        let provider = MockProvider::new();
        let tx = provider.process_payment("alice", Decimal::ONE, "USD", None).await.unwrap();
        assert_eq!(tx.status, TransactionStatus::Completed);
        assert!(provider.verify_payment(&tx.id).await.unwrap());
    }

    #[tokio::test]
    async fn refund_requires_completed_status() {
        let provider = MockProvider::new();
        let tx = provider.process_payment("alice", Decimal::ONE, "USD", None).await.unwrap();
        assert!(provider.refund_payment(&tx.id, None).await.is_ok());
        assert!(provider.refund_payment(&tx.id, None).await.is_err());
    }

    #[tokio::test]
    async fn verify_unknown_transaction_returns_false() {
        let provider = MockProvider::new();
        assert!(!provider.verify_payment("nonexistent").await.unwrap());
    }
}
