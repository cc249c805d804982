//! Credentials file backend.
//!
//! Reads the JSON format written by `elba setup` and the older dotenv format
//! (`ELBA_ID=...` / `ELBA_PIN=...`). Writes always produce JSON with
//! owner-only permissions.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use super::{CredentialStore, KEY_ELBA_ID, KEY_PIN};
use crate::fs::write_private_file;

pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> Result<BTreeMap<String, String>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read credentials file: {}", self.path.display())
                });
            }
        };

        if content.trim_start().starts_with('{') {
            let entries: BTreeMap<String, serde_json::Value> = serde_json::from_str(&content)
                .with_context(|| {
                    format!("Failed to parse credentials file: {}", self.path.display())
                })?;
            Ok(entries
                .into_iter()
                .filter_map(|(k, v)| match v {
                    serde_json::Value::String(s) => Some((k, s)),
                    serde_json::Value::Number(n) => Some((k, n.to_string())),
                    _ => None,
                })
                .collect())
        } else {
            Ok(parse_dotenv(&content))
        }
    }
}

/// Parse `KEY=VALUE` lines, mapping `ELBA_ID` / `ELBA_PIN` onto logical keys.
fn parse_dotenv(content: &str) -> BTreeMap<String, String> {
    let mut entries = BTreeMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = match key.trim() {
            "ELBA_ID" => KEY_ELBA_ID,
            "ELBA_PIN" => KEY_PIN,
            _ => continue,
        };
        entries.insert(key.to_string(), unquote(value.trim()).to_string());
    }
    entries
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|v| v.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }

    async fn get(&self, key: &str) -> Result<Option<SecretString>> {
        Ok(self
            .read_entries()?
            .remove(key)
            .filter(|v| !v.trim().is_empty())
            .map(SecretString::from))
    }

    async fn set(&self, key: &str, value: SecretString) -> Result<()> {
        // A legacy dotenv file is converted to JSON on first write.
        let mut entries = self.read_entries()?;
        entries.insert(key.to_string(), value.expose_secret().to_string());

        let content =
            serde_json::to_string_pretty(&entries).context("Failed to serialize credentials")?;
        write_private_file(&self.path, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[tokio::test]
    async fn reads_json_file() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("credentials.json");
        std::fs::write(&path, r#"{"elba_id": "ELVIE32V1234", "pin": "12345"}"#)?;

        let store = FileCredentialStore::new(&path);
        assert_eq!(
            store.get(KEY_ELBA_ID).await?.unwrap().expose_secret(),
            "ELVIE32V1234"
        );
        assert_eq!(store.get(KEY_PIN).await?.unwrap().expose_secret(), "12345");
        Ok(())
    }

    #[tokio::test]
    async fn reads_legacy_dotenv_file() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join(".env");
        let mut file = std::fs::File::create(&path)?;
        writeln!(file, "# ELBA login")?;
        writeln!(file, "export ELBA_ID=\"ELOOE01V5555\"")?;
        writeln!(file, "ELBA_PIN='01234'")?;
        writeln!(file, "OTHER=ignored")?;

        let store = FileCredentialStore::new(&path);
        assert_eq!(
            store.get(KEY_ELBA_ID).await?.unwrap().expose_secret(),
            "ELOOE01V5555"
        );
        assert_eq!(store.get(KEY_PIN).await?.unwrap().expose_secret(), "01234");
        Ok(())
    }

    #[tokio::test]
    async fn missing_file_has_no_credentials() -> Result<()> {
        let dir = TempDir::new()?;
        let store = FileCredentialStore::new(dir.path().join("nope.json"));
        assert!(store.get(KEY_ELBA_ID).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn set_writes_private_json() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("config").join("credentials.json");
        let store = FileCredentialStore::new(&path);

        store
            .set(KEY_ELBA_ID, SecretString::from("ELVIE38V77".to_string()))
            .await?;
        store
            .set(KEY_PIN, SecretString::from("99999".to_string()))
            .await?;

        let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
        assert_eq!(json["elba_id"], "ELVIE38V77");
        assert_eq!(json["pin"], "99999");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path)?.permissions().mode() & 0o777;
            assert_eq!(mode, 0o600);
        }
        Ok(())
    }
}
