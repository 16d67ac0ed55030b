//! Field-level validators and the anti-injection string sanitizer shared by
//! every domain record (plan id/name/description, user id, feature tags).

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{AiAgentPaymentsError, Result};

/// ISO 4217 codes and stablecoins this crate recognizes.
pub const SUPPORTED_CURRENCIES: &[&str] = &[
    "USD", "EUR", "GBP", "JPY", "CAD", "AUD", "CHF", "CNY", "SEK", "NZD", "USDC", "USDT", "DAI",
    "BUSD", "GUSD",
];

/// Minimum representable amount per stablecoin, below which a transfer is
/// not meaningfully distinguishable from zero. The original Python source's
/// `config.py` (holding these constants) was not retained in the reference
/// material for this crate; the values below follow the smallest unit a
/// 6-decimal stablecoin can express and are documented as a judgment call in
/// the design ledger.
pub fn minimum_amount(currency: &str) -> Option<f64> {
    match currency.to_uppercase().as_str() {
        "USDT" | "USDC" | "DAI" | "BUSD" | "GUSD" => Some(0.000_001),
        _ => None,
    }
}

#[must_use]
pub fn is_stablecoin(currency: &str) -> bool {
    minimum_amount(currency).is_some()
}

#[must_use]
pub fn is_supported_currency(currency: &str) -> bool {
    currency.len() == 3
        && currency.chars().all(|c| c.is_ascii_uppercase())
        && SUPPORTED_CURRENCIES.contains(&currency)
}

static MALICIOUS_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r#"[<>"']"#,
        r"(?i)\b(union|select|insert|update|delete|drop|create|alter|exec|execute|script)\b",
        r"(?is)<script\b[^<]*(?:(?!</script>)<[^<]*)*</script>",
        r"[;&|`(){}\[\]]",
        r"\.\./|\.\.\\",
        r"\x00",
        r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F]",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static sanitizer pattern is valid"))
    .collect()
});

/// Validate a free-text field: non-empty, within `max_length`, no leading or
/// trailing whitespace, and free of HTML/SQL/JS/shell/path-traversal/control
/// character patterns.
///
/// # Errors
/// Returns a `Validation` error naming the offending field.
pub fn validate_string_field(value: &str, field_name: &str, max_length: usize) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AiAgentPaymentsError::validation_field(
            field_name,
            value,
            format!("{field_name} cannot be empty"),
        ));
    }
    if value.chars().count() > max_length {
        return Err(AiAgentPaymentsError::validation_field(
            field_name,
            value,
            format!("{field_name} exceeds maximum length of {max_length} characters"),
        ));
    }
    if value != value.trim() {
        return Err(AiAgentPaymentsError::validation_field(
            field_name,
            value,
            format!("{field_name} cannot start or end with whitespace"),
        ));
    }
    for pattern in MALICIOUS_PATTERNS.iter() {
        if pattern.is_match(value) {
            return Err(AiAgentPaymentsError::validation_field(
                field_name,
                value,
                format!("{field_name} contains potentially malicious content"),
            ));
        }
    }
    Ok(())
}

/// Validate a non-negative amount, rejecting NaN.
///
/// # Errors
/// Returns a `Validation` error if the amount is negative or not a number.
pub fn validate_amount(amount: f64, field_name: &str) -> Result<()> {
    if amount.is_nan() || amount < 0.0 {
        return Err(AiAgentPaymentsError::validation_field(
            field_name,
            amount,
            format!("{field_name} must be a non-negative number"),
        ));
    }
    Ok(())
}

/// Validate that `amount` meets the per-currency stablecoin minimum, when one applies.
///
/// # Errors
/// Returns a `Validation` error if `currency` is a stablecoin and `amount` is
/// below its minimum.
pub fn validate_stablecoin_minimum(amount: f64, currency: &str) -> Result<()> {
    if let Some(minimum) = minimum_amount(currency) {
        if amount < minimum {
            return Err(AiAgentPaymentsError::validation_field(
                "amount",
                amount,
                format!("amount {amount} is below the minimum {minimum} for {currency}"),
            ));
        }
    }
    Ok(())
}

/// Validate a currency code against the supported set.
///
/// # Errors
/// Returns a `Validation` error if the code isn't a recognized ISO 4217 or stablecoin code.
pub fn validate_currency(currency: &str) -> Result<()> {
    if !is_supported_currency(currency) {
        return Err(AiAgentPaymentsError::validation_field(
            "currency",
            currency,
            format!("unsupported currency code '{currency}'"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_and_whitespace_padded() {
        assert!(validate_string_field("", "user_id", 100).is_err());
        assert!(validate_string_field("   ", "user_id", 100).is_err());
        assert!(validate_string_field(" alice", "user_id", 100).is_err());
    }

    #[test]
    fn rejects_injection_patterns() {
        assert!(validate_string_field("alice; DROP TABLE users", "user_id", 100).is_err());
        assert!(validate_string_field("<script>alert(1)</script>", "feature", 100).is_err());
        assert!(validate_string_field("../../etc/passwd", "feature", 100).is_err());
    }

    #[test]
    fn accepts_plain_identifiers() {
        assert!(validate_string_field("alice-123", "user_id", 100).is_ok());
        assert!(validate_string_field("premium-plan", "plan_id", 100).is_ok());
    }

    #[test]
    fn enforces_max_length() {
        let long = "a".repeat(101);
        assert!(validate_string_field(&long, "plan_id", 100).is_err());
    }

    #[test]
    fn stablecoin_minimum_enforced() {
        assert!(validate_stablecoin_minimum(0.0, "USDT").is_err());
        assert!(validate_stablecoin_minimum(1.0, "USDT").is_ok());
        assert!(validate_stablecoin_minimum(0.0, "USD").is_ok());
    }

    #[test]
    fn currency_validation() {
        assert!(validate_currency("USD").is_ok());
        assert!(validate_currency("USDT").is_ok());
        assert!(validate_currency("usd").is_err());
        assert!(validate_currency("XXX").is_err());
    }
}
