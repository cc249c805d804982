//! Bearer token discovery in the portal's web storage.

use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;

/// One `localStorage` / `sessionStorage` entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StorageEntry {
    pub key: String,
    pub value: String,
}

/// Dumps `localStorage` followed by `sessionStorage` as `[{key, value}]`.
pub const STORAGE_ENTRIES_JS: &str = r#"(() => {
  const dump = (storage) => {
    const out = [];
    for (let i = 0; i < storage.length; i++) {
      const key = storage.key(i);
      out.push({ key: key, value: storage.getItem(key) || '' });
    }
    return out;
  };
  return dump(window.localStorage).concat(dump(window.sessionStorage));
})()"#;

fn raw_token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{20,}$").expect("valid regex"))
}

/// Extract a bearer token from a storage entry.
///
/// Only entries whose value mentions `Bearer` or whose key mentions `token`
/// or `auth` are considered. JSON objects yield `access_token` or `token`,
/// JSON strings of the form `"Bearer xyz"` yield `xyz`, and non-JSON values
/// are accepted when they look like a bare token.
pub fn token_from_storage_entry(key: &str, value: &str) -> Option<String> {
    if value.is_empty()
        || !(value.contains("Bearer") || key.contains("token") || key.contains("auth"))
    {
        return None;
    }

    match serde_json::from_str::<serde_json::Value>(value) {
        Ok(serde_json::Value::Object(map)) => ["access_token", "token"]
            .iter()
            .find_map(|field| map.get(*field).and_then(|v| v.as_str()))
            .filter(|t| !t.is_empty())
            .map(str::to_string),
        Ok(serde_json::Value::String(s)) => s.strip_prefix("Bearer ").map(str::to_string),
        Ok(_) => None,
        Err(_) => raw_token_pattern()
            .is_match(value)
            .then(|| value.to_string()),
    }
}

/// First token found in `entries`, in storage order.
pub fn token_from_storage(entries: &[StorageEntry]) -> Option<String> {
    entries
        .iter()
        .find_map(|e| token_from_storage_entry(&e.key, &e.value))
}

/// Token from an `Authorization` header value.
pub fn token_from_authorization(header: &str) -> Option<String> {
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}
