//! Error types for the AI agent payments SDK
//!
//! Every variant carries a stable `code()` string (for callers that want to
//! match on error identity across language boundaries, e.g. a JSON API
//! wrapping this crate) plus a `details` map of structured context.

use std::collections::HashMap;

use serde_json::Value;
use thiserror::Error;

/// Result type for SDK operations.
pub type Result<T> = std::result::Result<T, AiAgentPaymentsError>;

/// Structured error taxonomy for the Access & Billing Core and payment providers.
#[derive(Error, Debug)]
pub enum AiAgentPaymentsError {
    /// Input shape or invariant violation.
    #[error("validation error: {message}")]
    Validation {
        message: String,
        details: HashMap<String, Value>,
    },

    /// Bad constructor arguments or environment configuration.
    #[error("configuration error: {message}")]
    Configuration {
        message: String,
        details: HashMap<String, Value>,
    },

    /// User has exhausted their usage allowance for the current period.
    #[error("usage limit exceeded: {message}")]
    UsageLimitExceeded {
        message: String,
        details: HashMap<String, Value>,
    },

    /// A subscription's period or end date has passed.
    #[error("subscription expired: {message}")]
    SubscriptionExpired {
        message: String,
        details: HashMap<String, Value>,
    },

    /// The requested feature is not part of the user's plan.
    #[error("feature not available: {message}")]
    FeatureNotAvailable {
        message: String,
        details: HashMap<String, Value>,
    },

    /// A payment could not be completed.
    #[error("payment failed: {message}")]
    PaymentFailed {
        message: String,
        details: HashMap<String, Value>,
    },

    /// Access requires a payment that has not been made.
    #[error("payment required: {message}")]
    PaymentRequired {
        message: String,
        details: HashMap<String, Value>,
    },

    /// The requested payment method is not supported or misconfigured.
    #[error("invalid payment method: {message}")]
    InvalidPaymentMethod {
        message: String,
        details: HashMap<String, Value>,
    },

    /// A storage backend failed to persist or retrieve a record.
    #[error("storage error: {message}")]
    Storage {
        message: String,
        details: HashMap<String, Value>,
    },

    /// A payment provider or its upstream RPC endpoint failed.
    #[error("provider error: {message}")]
    Provider {
        message: String,
        details: HashMap<String, Value>,
    },

    /// JSON (de)serialization failure.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AiAgentPaymentsError {
    /// Stable string code for this error, suitable for cross-language matching.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::Configuration { .. } => "CONFIGURATION_ERROR",
            Self::UsageLimitExceeded { .. } => "USAGE_LIMIT_EXCEEDED",
            Self::SubscriptionExpired { .. } => "SUBSCRIPTION_EXPIRED",
            Self::FeatureNotAvailable { .. } => "FEATURE_NOT_AVAILABLE",
            Self::PaymentFailed { .. } => "PAYMENT_FAILED",
            Self::PaymentRequired { .. } => "PAYMENT_REQUIRED",
            Self::InvalidPaymentMethod { .. } => "INVALID_PAYMENT_METHOD",
            Self::Storage { .. } => "STORAGE_ERROR",
            Self::Provider { .. } => "PROVIDER_ERROR",
            Self::Json(_) => "JSON_ERROR",
        }
    }

    /// The structured details map carried by this error, empty for variants that don't carry one.
    #[must_use]
    pub fn details(&self) -> HashMap<String, Value> {
        match self {
            Self::Validation { details, .. }
            | Self::Configuration { details, .. }
            | Self::UsageLimitExceeded { details, .. }
            | Self::SubscriptionExpired { details, .. }
            | Self::FeatureNotAvailable { details, .. }
            | Self::PaymentFailed { details, .. }
            | Self::PaymentRequired { details, .. }
            | Self::InvalidPaymentMethod { details, .. }
            | Self::Storage { details, .. }
            | Self::Provider { details, .. } => details.clone(),
            Self::Json(_) => HashMap::new(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            details: HashMap::new(),
        }
    }

    pub fn validation_field(field: &str, value: impl Into<Value>, message: impl Into<String>) -> Self {
        let mut details = HashMap::new();
        details.insert("field".to_string(), Value::String(field.to_string()));
        details.insert("value".to_string(), value.into());
        Self::Validation {
            message: message.into(),
            details,
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            details: HashMap::new(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            details: HashMap::new(),
        }
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider {
            message: message.into(),
            details: HashMap::new(),
        }
    }

    pub fn payment_failed(message: impl Into<String>) -> Self {
        Self::PaymentFailed {
            message: message.into(),
            details: HashMap::new(),
        }
    }

    /// Attach a detail key/value to any variant that carries a details map.
    #[must_use]
    pub fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        match &mut self {
            Self::Validation { details, .. }
            | Self::Configuration { details, .. }
            | Self::UsageLimitExceeded { details, .. }
            | Self::SubscriptionExpired { details, .. }
            | Self::FeatureNotAvailable { details, .. }
            | Self::PaymentFailed { details, .. }
            | Self::PaymentRequired { details, .. }
            | Self::InvalidPaymentMethod { details, .. }
            | Self::Storage { details, .. }
            | Self::Provider { details, .. } => {
                details.insert(key.to_string(), value.into());
            }
            Self::Json(_) => {}
        }
        self
    }
}

impl From<String> for AiAgentPaymentsError {
    fn from(msg: String) -> Self {
        Self::validation(msg)
    }
}

impl From<&str> for AiAgentPaymentsError {
    fn from(msg: &str) -> Self {
        Self::validation(msg.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_is_stable_per_variant() {
        assert_eq!(AiAgentPaymentsError::validation("x").code(), "VALIDATION_ERROR");
        assert_eq!(AiAgentPaymentsError::storage("x").code(), "STORAGE_ERROR");
        assert_eq!(AiAgentPaymentsError::provider("x").code(), "PROVIDER_ERROR");
    }

    #[test]
    fn with_detail_round_trips() {
        let err = AiAgentPaymentsError::validation("bad field").with_detail("field", "user_id");
        assert_eq!(
            err.details().get("field").and_then(Value::as_str),
            Some("user_id")
        );
    }
}
