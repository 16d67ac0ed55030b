//! General utility functions shared across storage backends, providers, and
//! the access and billing core: id generation, time arithmetic, and nested
//! metadata access.

#![forbid(unsafe_code)]

use serde_json::Value;
use uuid::Uuid;

/// Generate a unique identifier with an optional prefix, e.g. `tx_5d41402a...`.
#[must_use]
pub fn generate_id(prefix: Option<&str>) -> String {
    let id = Uuid::new_v4().simple().to_string();
    match prefix {
        Some(p) => format!("{p}_{id}"),
        None => id,
    }
}

/// Format a duration in seconds as a human readable string.
///
/// # Examples
/// ```
/// use aiagent_payments_sdk::utils::format_duration;
///
/// assert_eq!(format_duration(30), "30s");
/// assert_eq!(format_duration(90), "1m 30s");
/// assert_eq!(format_duration(3661), "1h 1m 1s");
/// assert_eq!(format_duration(90061), "1d 1h 1m 1s");
/// ```
#[must_use]
pub fn format_duration(seconds: u64) -> String {
    let days = seconds / 86400;
    let hours = (seconds % 86400) / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if days > 0 {
        format!("{days}d {hours}h {minutes}m {secs}s")
    } else if hours > 0 {
        format!("{hours}h {minutes}m {secs}s")
    } else if minutes > 0 {
        format!("{minutes}m {secs}s")
    } else {
        format!("{secs}s")
    }
}

/// Read a value out of nested JSON `metadata` by a dotted key path, e.g. `"a.b.c"`.
#[must_use]
pub fn deep_get<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |current, key| current.get(key))
}

/// Set a value in nested JSON `metadata` by a dotted key path, creating
/// intermediate objects as needed. Fails silently (no-op) if an intermediate
/// segment is already a non-object value.
pub fn deep_set(value: &mut Value, path: &str, new_value: Value) {
    let mut segments = path.split('.').peekable();
    let mut current = value;
    while let Some(segment) = segments.next() {
        if !current.is_object() {
            *current = Value::Object(serde_json::Map::new());
        }
        let map = current.as_object_mut().expect("just ensured object");
        if segments.peek().is_none() {
            map.insert(segment.to_string(), new_value);
            return;
        }
        current = map.entry(segment.to_string()).or_insert_with(|| Value::Object(serde_json::Map::new()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_id_applies_prefix() {
        let id = generate_id(Some("tx"));
        assert!(id.starts_with("tx_"));
        assert!(generate_id(None).len() == 32);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(30), "30s");
        assert_eq!(format_duration(90), "1m 30s");
        assert_eq!(format_duration(3661), "1h 1m 1s");
        assert_eq!(format_duration(90061), "1d 1h 1m 1s");
        assert_eq!(format_duration(0), "0s");
    }

    #[test]
    fn deep_get_and_set_round_trip() {
        let mut value = serde_json::json!({});
        deep_set(&mut value, "a.b.c", serde_json::json!(42));
        assert_eq!(deep_get(&value, "a.b.c"), Some(&serde_json::json!(42)));
        assert_eq!(deep_get(&value, "a.b.missing"), None);
    }
}
