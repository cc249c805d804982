//! Read-only credentials from `ELBA_ID` / `ELBA_PIN`.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use secrecy::SecretString;

use super::{CredentialStore, KEY_ELBA_ID, KEY_PIN};

/// Environment variable backend.
pub struct EnvCredentialStore {
    vars: HashMap<String, String>,
}

impl EnvCredentialStore {
    /// Snapshot `ELBA_ID` and `ELBA_PIN` from the process environment.
    pub fn from_process() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Snapshot the variables through an arbitrary lookup (useful for tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let vars = [env_var_for(KEY_ELBA_ID), env_var_for(KEY_PIN)]
            .into_iter()
            .flatten()
            .filter_map(|name| {
                lookup(name)
                    .filter(|v| !v.trim().is_empty())
                    .map(|v| (name.to_string(), v))
            })
            .collect();
        Self { vars }
    }
}

fn env_var_for(key: &str) -> Option<&'static str> {
    match key {
        KEY_ELBA_ID => Some("ELBA_ID"),
        KEY_PIN => Some("ELBA_PIN"),
        _ => None,
    }
}

#[async_trait]
impl CredentialStore for EnvCredentialStore {
    fn describe(&self) -> String {
        "environment (ELBA_ID/ELBA_PIN)".to_string()
    }

    async fn get(&self, key: &str) -> Result<Option<SecretString>> {
        Ok(env_var_for(key)
            .and_then(|name| self.vars.get(name))
            .map(|v| SecretString::from(v.clone())))
    }

    async fn set(&self, _key: &str, _value: SecretString) -> Result<()> {
        anyhow::bail!("Environment credentials are read-only")
    }

    fn supports_write(&self) -> bool {
        false
    }
}
