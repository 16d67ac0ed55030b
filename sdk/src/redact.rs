//! Secret redaction applied to every log line and every error message surfaced
//! to a caller, so API keys, tokens, and on-chain secrets never leak through
//! logs or error text.

use once_cell::sync::Lazy;
use regex::Regex;

struct SecretPattern {
    regex: Regex,
    /// Whether the match has a capture group 1 to preserve (prefix) before redacting.
    keep_prefix: bool,
}

static SECRET_PATTERNS: Lazy<Vec<SecretPattern>> = Lazy::new(|| {
    let with_prefix = [
        r"(?i)(sk_live_[a-zA-Z0-9]+)",
        r"(?i)(sk_test_[a-zA-Z0-9]+)",
        r"(?i)(whsec_[a-zA-Z0-9]+)",
        r"(?i)(pi_[a-zA-Z0-9]+)",
        r"(?i)(ch_[a-zA-Z0-9]+)",
        r"(?i)(client-id:[a-zA-Z0-9\-]+)",
        r"(?i)(client_secret:[a-zA-Z0-9\-]+)",
        r"(?i)(key=)[a-zA-Z0-9\-_.]+",
        r"(?i)(client_secret=)[^&\s]+",
        r"(?i)(api_key=)[^&\s]+",
        r"(?i)(password=)[^&\s]+",
        r"(?i)(secret=)[^&\s]+",
        r"(?i)(token=)[^&\s]+",
        r"(?i)(access_token=)[^&\s]+",
        r"(?i)(Bearer )[a-zA-Z0-9\-_.]+",
        r"(?i)(Authorization: )[a-zA-Z0-9\-_.]+",
        r"(?i)(usdc|usdt|dai|busd|gusd)[:=][a-zA-Z0-9]+",
    ];
    let bare = [
        r"0x[a-fA-F0-9]{66}", // private key, 0x-prefixed
        r"0x[a-fA-F0-9]{64}", // tx hash
        r"0x[a-fA-F0-9]{40}", // wallet address
        r"\b[a-fA-F0-9]{64}\b",
    ];

    let mut patterns = Vec::with_capacity(with_prefix.len() + bare.len());
    for p in with_prefix {
        patterns.push(SecretPattern {
            regex: Regex::new(p).expect("static redaction pattern is valid"),
            keep_prefix: true,
        });
    }
    for p in bare {
        patterns.push(SecretPattern {
            regex: Regex::new(p).expect("static redaction pattern is valid"),
            keep_prefix: false,
        });
    }
    patterns
});

/// Redact secrets from a log/error message, preserving any matched prefix
/// (e.g. `api_key=`) so the redacted text still reads as structured.
#[must_use]
pub fn redact_message(message: &str) -> String {
    let mut out = message.to_string();
    for pattern in SECRET_PATTERNS.iter() {
        out = if pattern.keep_prefix {
            pattern
                .regex
                .replace_all(&out, "${1}***REDACTED***")
                .into_owned()
        } else {
            pattern.regex.replace_all(&out, "***REDACTED***").into_owned()
        };
    }
    out
}

/// A `tracing_subscriber` writer that redacts secrets before bytes reach the
/// underlying sink. Wrap any `Layer`'s writer with this to guarantee
/// redaction at the point logs leave the process, not just at call sites.
pub struct RedactingWriter<W> {
    inner: W,
}

impl<W> RedactingWriter<W> {
    pub const fn new(inner: W) -> Self {
        Self { inner }
    }
}

impl<W: std::io::Write> std::io::Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let text = String::from_utf8_lossy(buf);
        let redacted = redact_message(&text);
        self.inner.write_all(redacted.as_bytes())?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_stripe_secret_key() {
        let msg = "using key sk_live_abcdefghijklmnop1234 for charge";
        let redacted = redact_message(msg);
        assert!(redacted.contains("sk_live_***REDACTED***"));
        assert!(!redacted.contains("abcdefghijklmnop1234"));
    }

    #[test]
    fn redacts_bearer_token_preserving_prefix() {
        let msg = "Authorization header: Bearer abc123XYZ_token.value";
        let redacted = redact_message(msg);
        assert!(redacted.contains("Bearer ***REDACTED***"));
    }

    #[test]
    fn redacts_ethereum_private_key() {
        let msg = "private key 0xabcdefabcdefabcdefabcdefabcdefabcdefabcdefabcdefabcdefabcdefabcd leaked";
        let redacted = redact_message(msg);
        assert!(redacted.contains("***REDACTED***"));
        assert!(!redacted.contains("abcdefabcdefabcdefabcdefabcdefabcdefabcdefabcdefabcdefabcdefabcd"));
    }

    #[test]
    fn leaves_ordinary_messages_untouched() {
        let msg = "payment verified for user alice";
        assert_eq!(redact_message(msg), msg);
    }
}
