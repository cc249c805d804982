//! Session cache for the harvested bearer token and cookies.
//!
//! The session lives in a single JSON file under the state directory and is
//! never written with permissions wider than 0600.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::fs::{remove_if_exists, write_private_file};

/// Authentication state captured from a browser login.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    /// Bearer token for the JSON API.
    #[serde(default)]
    pub token: Option<String>,

    /// Session cookies (name -> value).
    #[serde(default)]
    pub cookies: HashMap<String, String>,

    /// When the session was captured (Unix timestamp).
    #[serde(default)]
    pub captured_at: Option<i64>,

    /// Dashboard URL reached after login.
    #[serde(default)]
    pub session_url: Option<String>,
}

impl SessionData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    /// Whether the session carries a usable bearer token.
    pub fn has_token(&self) -> bool {
        self.token.as_deref().is_some_and(|t| !t.trim().is_empty())
    }

    /// Format cookies as a Cookie header value, sorted by name.
    pub fn cookie_header(&self) -> String {
        let mut pairs: Vec<_> = self.cookies.iter().collect();
        pairs.sort();
        pairs
            .into_iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// On-disk formats accepted when reading the session file.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredSession {
    Full(SessionData),
    RawToken(String),
}

/// Cache for session data, stored locally with owner-only permissions.
pub struct SessionCache {
    path: PathBuf,
}

impl SessionCache {
    /// Create a session cache backed by `path`.
    pub fn with_path(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the cached session. Missing, empty and unreadable files are "no session".
    pub fn get(&self) -> Result<Option<SessionData>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read session file: {}", self.path.display())
                });
            }
        };

        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }

        let session = match serde_json::from_str::<StoredSession>(trimmed) {
            Ok(StoredSession::Full(session)) => session,
            Ok(StoredSession::RawToken(token)) => SessionData::new().with_token(token),
            Err(_) if !trimmed.starts_with('{') && !trimmed.starts_with('"') => {
                SessionData::new().with_token(trimmed)
            }
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Ignoring unreadable session file"
                );
                return Ok(None);
            }
        };

        if !session.has_token() && session.cookies.is_empty() {
            return Ok(None);
        }
        Ok(Some(session))
    }

    /// Save session data, replacing any previous session.
    pub fn set(&self, session: &SessionData) -> Result<()> {
        let content =
            serde_json::to_string_pretty(session).context("Failed to serialize session")?;
        write_private_file(&self.path, content)
    }

    /// Drop the bearer token but keep cookies, so the next login can reuse them.
    pub fn clear_token(&self) -> Result<()> {
        match self.get()? {
            Some(mut session) => {
                session.token = None;
                self.set(&session)
            }
            None => Ok(()),
        }
    }

    /// Delete the session file. Returns whether a file was removed.
    pub fn delete(&self) -> Result<bool> {
        remove_if_exists(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn cache(dir: &TempDir) -> SessionCache {
        SessionCache::with_path(dir.path().join("state").join("session.json"))
    }

    #[test]
    fn round_trip_preserves_all_fields() -> Result<()> {
        let dir = TempDir::new()?;
        let cache = cache(&dir);
        let session = SessionData {
            token: Some("abc".to_string()),
            cookies: HashMap::from([("JSESSIONID".to_string(), "xyz".to_string())]),
            captured_at: Some(1_700_000_000),
            session_url: Some("https://mein.elba.raiffeisen.at/dashboard".to_string()),
        };

        cache.set(&session)?;
        assert_eq!(cache.get()?, Some(session));
        Ok(())
    }

    #[test]
    fn missing_and_empty_files_are_no_session() -> Result<()> {
        let dir = TempDir::new()?;
        let cache = cache(&dir);
        assert_eq!(cache.get()?, None);

        std::fs::create_dir_all(cache.path().parent().unwrap())?;
        std::fs::write(cache.path(), "  \n")?;
        assert_eq!(cache.get()?, None);

        std::fs::write(cache.path(), "{not json")?;
        assert_eq!(cache.get()?, None);
        Ok(())
    }

    #[test]
    fn legacy_token_formats_are_accepted() -> Result<()> {
        let dir = TempDir::new()?;
        let cache = cache(&dir);
        std::fs::create_dir_all(cache.path().parent().unwrap())?;

        std::fs::write(cache.path(), "\"eyJhbGciOiJSUzI1NiJ9.payload\"")?;
        assert_eq!(
            cache.get()?.and_then(|s| s.token).as_deref(),
            Some("eyJhbGciOiJSUzI1NiJ9.payload")
        );

        std::fs::write(cache.path(), "eyJhbGciOiJSUzI1NiJ9.raw\n")?;
        assert_eq!(
            cache.get()?.and_then(|s| s.token).as_deref(),
            Some("eyJhbGciOiJSUzI1NiJ9.raw")
        );

        std::fs::write(cache.path(), r#"{"token": "only-token"}"#)?;
        assert_eq!(
            cache.get()?.and_then(|s| s.token).as_deref(),
            Some("only-token")
        );
        Ok(())
    }

    #[test]
    fn clear_token_keeps_cookies() -> Result<()> {
        let dir = TempDir::new()?;
        let cache = cache(&dir);
        cache.set(&SessionData::new().with_token("t").with_cookie("a", "1"))?;

        cache.clear_token()?;
        let session = cache.get()?.unwrap();
        assert_eq!(session.token, None);
        assert_eq!(session.cookie_header(), "a=1");
        Ok(())
    }

    #[test]
    fn delete_removes_file() -> Result<()> {
        let dir = TempDir::new()?;
        let cache = cache(&dir);
        cache.set(&SessionData::new().with_token("t"))?;

        assert!(cache.delete()?);
        assert!(!cache.path().exists());
        assert!(!cache.delete()?);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn session_file_is_owner_only() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new()?;
        let cache = cache(&dir);
        cache.set(&SessionData::new().with_token("t"))?;

        let mode = std::fs::metadata(cache.path())?.permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
        Ok(())
    }

    #[test]
    fn cookie_header_is_sorted() {
        let session = SessionData::new()
            .with_cookie("b", "2")
            .with_cookie("a", "1");
        assert_eq!(session.cookie_header(), "a=1; b=2");
    }
}
