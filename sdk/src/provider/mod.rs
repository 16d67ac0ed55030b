//! Uniform payment provider contract: process, verify, refund, status,
//! checkout session, webhook verification, health. The USDT on-chain
//! provider and the deterministic mock fixture both implement this trait.

mod mock;
pub mod usdt;

pub use mock::MockProvider;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::HashMap;

use crate::config::Config;
use crate::error::{AiAgentPaymentsError, Result};
use crate::models::PaymentTransaction;

/// What a provider supports, advertised up front so the core can reject a
/// request the provider cannot honour before ever dispatching it.
#[derive(Debug, Clone)]
pub struct Capabilities {
    pub supports_refunds: bool,
    pub supports_webhooks: bool,
    pub supports_partial_refunds: bool,
    pub supports_subscriptions: bool,
    pub supports_metadata: bool,
    pub supported_currencies: Vec<String>,
    pub min_amount: Decimal,
    pub max_amount: Decimal,
}

/// Outcome of a refund request.
#[derive(Debug, Clone)]
pub struct RefundInfo {
    pub transaction_id: String,
    pub amount: Decimal,
    pub instructions: String,
}

/// A checkout session handed back to a caller that needs a hosted redirect URL.
#[derive(Debug, Clone)]
pub struct CheckoutSession {
    pub session_id: String,
    pub checkout_url: String,
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    fn capabilities(&self) -> Capabilities;

    async fn process_payment(
        &self,
        user_id: &str,
        amount: Decimal,
        currency: &str,
        metadata: Option<HashMap<String, Value>>,
    ) -> Result<PaymentTransaction>;

    async fn verify_payment(&self, transaction_id: &str) -> Result<bool>;
    async fn refund_payment(&self, transaction_id: &str, amount: Option<Decimal>) -> Result<RefundInfo>;
    async fn get_payment_status(&self, transaction_id: &str) -> Result<String>;
    fn verify_webhook_signature(&self, payload: &str, headers: &HashMap<String, String>) -> bool;
    async fn create_checkout_session(&self, user_id: &str, amount: Decimal, currency: &str) -> Result<CheckoutSession>;
    async fn health_check(&self) -> Result<bool>;
}

/// Validate a requested payment against what a provider declares it can handle.
///
/// # Errors
/// Returns `InvalidPaymentMethod` if the currency isn't supported, or
/// `Validation` if the amount falls outside the provider's declared range.
pub fn validate_against_capabilities(caps: &Capabilities, amount: Decimal, currency: &str) -> Result<()> {
    if !caps.supported_currencies.iter().any(|c| c.eq_ignore_ascii_case(currency)) {
        return Err(AiAgentPaymentsError::InvalidPaymentMethod {
            message: format!("currency {currency} is not supported by this provider"),
            details: HashMap::new(),
        });
    }
    if amount < caps.min_amount || amount > caps.max_amount {
        return Err(AiAgentPaymentsError::validation(format!(
            "amount {amount} is outside the supported range [{}, {}]",
            caps.min_amount, caps.max_amount
        )));
    }
    Ok(())
}

/// True when any of the process-wide development-mode signals are present.
/// Relaxes production-only invariants (e.g. allowing in-memory storage or a
/// dummy RPC project id).
#[must_use]
pub fn is_dev_mode(config: &Config) -> bool {
    config.is_dev_mode()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps() -> Capabilities {
        Capabilities {
            supports_refunds: true,
            supports_webhooks: false,
            supports_partial_refunds: false,
            supports_subscriptions: false,
            supports_metadata: true,
            supported_currencies: vec!["USDT".to_string()],
            min_amount: Decimal::new(1, 2),
            max_amount: Decimal::new(10_000, 0),
        }
    }

    #[test]
    fn rejects_unsupported_currency() {
        assert!(validate_against_capabilities(&caps(), Decimal::ONE, "USD").is_err());
    }

    #[test]
    fn rejects_amount_outside_range() {
        assert!(validate_against_capabilities(&caps(), Decimal::new(100_000, 0), "USDT").is_err());
    }

    #[test]
    fn accepts_valid_request() {
        assert!(validate_against_capabilities(&caps(), Decimal::ONE, "usdt").is_ok());
    }
}
