//! Tolerant extraction over upstream JSON whose field names vary by
//! PeerTube version (`displayName`/`display_name`, `videos_count`/
//! `videosCount`, …).
//!
//! Each helper probes an enumerated alias list rather than hard-coding one
//! field name.

use serde_json::Value;

/// Returns the first string value found under any of `keys`, checked in
/// order, at the top level of `value`.
pub fn first_str<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|key| value.get(key)?.as_str())
}

/// Like [`first_str`] but also descends into nested objects named in
/// `nested_keys` (e.g. `account.host`, `ownerAccount.host`).
pub fn first_str_nested<'a>(
    value: &'a Value,
    keys: &[&str],
    nested_keys: &[(&str, &str)],
) -> Option<&'a str> {
    if let Some(found) = first_str(value, keys) {
        return Some(found);
    }
    for (parent, child) in nested_keys {
        if let Some(found) = value.get(parent).and_then(|nested| nested.get(child)).and_then(Value::as_str) {
            return Some(found);
        }
    }
    None
}

pub fn first_i64(value: &Value, keys: &[&str]) -> Option<i64> {
    keys.iter().find_map(|key| {
        let field = value.get(key)?;
        field.as_i64().or_else(|| field.as_f64().map(|f| f as i64))
    })
}

/// Host identifier aliases an entry may carry: `host`, `hostname`, `url`,
/// `id`, `name`, or nested `account.host` / `ownerAccount.host`.
pub fn extract_entry_host(entry: &Value) -> Option<String> {
    const NESTED: &[(&str, &str)] = &[("account", "host"), ("ownerAccount", "host")];
    let raw = first_str_nested(entry, &["host", "hostname", "url", "id", "name"], NESTED)?;
    crate::hostnorm::normalize_host_fragment(raw)
}

pub fn extract_display_name(value: &Value) -> Option<String> {
    first_str(value, &["displayName", "display_name", "name"]).map(ToOwned::to_owned)
}

pub fn extract_videos_count(value: &Value) -> Option<i64> {
    first_i64(value, &["videos_count", "videosCount", "videosLength"])
}

pub fn extract_followers_count(value: &Value) -> Option<i64> {
    first_i64(value, &["followersCount", "followers_count"])
}

/// First defined numeric alias wins — no further normalization between a
/// bare number and a nested object.
pub fn extract_comments_count(value: &Value) -> Option<i64> {
    if let Some(n) = first_i64(value, &["commentsCount", "comments_count"]) {
        return Some(n);
    }
    value.get("comments").and_then(|field| {
        field.as_i64().or_else(|| field.get("total").and_then(Value::as_i64))
    })
}
