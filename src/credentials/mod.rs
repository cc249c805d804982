//! Credential storage abstraction.
//!
//! ELBA needs two secrets: the Verfügernummer (`elba_id`) and the PIN. They
//! come from environment variables or from a credentials file:
//!
//! ```json
//! { "elba_id": "ELVIE32V1234567", "pin": "12345" }
//! ```
//!
//! A legacy dotenv file with `ELBA_ID=` / `ELBA_PIN=` lines is read as well.

mod env;
mod file;
mod session;

pub use env::EnvCredentialStore;
pub use file::FileCredentialStore;
pub use session::{SessionCache, SessionData};

use std::fmt;

use anyhow::Result;
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::error::ElbaError;
use crate::region::{region_for_id, PREFIX_LEN};

/// Logical key for the Verfügernummer.
pub const KEY_ELBA_ID: &str = "elba_id";
/// Logical key for the PIN.
pub const KEY_PIN: &str = "pin";

const PIN_LEN: usize = 5;

/// A key-value store for credentials.
///
/// Implementations map the logical keys [`KEY_ELBA_ID`] and [`KEY_PIN`] onto
/// their own storage format.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Human-readable description of where credentials come from.
    fn describe(&self) -> String;

    /// Retrieve a credential by key. `Ok(None)` if the key doesn't exist.
    async fn get(&self, key: &str) -> Result<Option<SecretString>>;

    /// Store a credential.
    async fn set(&self, key: &str, value: SecretString) -> Result<()>;

    /// Check if this store supports writes.
    fn supports_write(&self) -> bool {
        true
    }
}

/// Validated login credentials.
#[derive(Clone)]
pub struct Credentials {
    elba_id: String,
    pin: SecretString,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("elba_id", &self.masked_id())
            .field("pin", &"[REDACTED]")
            .finish()
    }
}

impl Credentials {
    /// Build credentials, rejecting malformed IDs and PINs.
    pub fn new(elba_id: impl Into<String>, pin: SecretString) -> Result<Self, ElbaError> {
        let elba_id = elba_id.into().trim().to_string();

        if elba_id.len() < PREFIX_LEN || !elba_id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ElbaError::InvalidCredentials(format!(
                "ELBA ID must be at least {PREFIX_LEN} letters or digits"
            )));
        }
        if region_for_id(&elba_id).is_none() {
            return Err(ElbaError::InvalidCredentials(format!(
                "unknown region prefix {:?}",
                &elba_id[..PREFIX_LEN]
            )));
        }

        let pin_str = pin.expose_secret().trim();
        if pin_str.len() != PIN_LEN || !pin_str.chars().all(|c| c.is_ascii_digit()) {
            return Err(ElbaError::InvalidCredentials(format!(
                "PIN must be exactly {PIN_LEN} digits"
            )));
        }
        let pin = SecretString::from(pin_str.to_string());

        Ok(Self { elba_id, pin })
    }

    pub fn elba_id(&self) -> &str {
        &self.elba_id
    }

    pub fn pin(&self) -> &SecretString {
        &self.pin
    }

    /// Region label for the login dropdown. Always present for validated credentials.
    pub fn region(&self) -> &'static str {
        region_for_id(&self.elba_id).unwrap_or_default()
    }

    /// The ID prefix followed by an ellipsis, safe for logs.
    pub fn masked_id(&self) -> String {
        format!("{}...", &self.elba_id[..PREFIX_LEN])
    }

    /// Read credentials from the first store that has both keys.
    ///
    /// Stores that hold only one of the keys are skipped, so a stray
    /// `ELBA_ID` in the environment cannot shadow a complete file.
    pub async fn load(stores: &[&dyn CredentialStore]) -> Result<Self> {
        for store in stores {
            let id = store.get(KEY_ELBA_ID).await?;
            let pin = store.get(KEY_PIN).await?;

            if let (Some(id), Some(pin)) = (id, pin) {
                tracing::debug!(source = %store.describe(), "Loaded credentials");
                return Ok(Self::new(id.expose_secret(), pin)?);
            }
        }

        Err(ElbaError::MissingCredentials.into())
    }

    /// Write both keys to `store`.
    pub async fn save(&self, store: &dyn CredentialStore) -> Result<()> {
        if !store.supports_write() {
            anyhow::bail!("{} is read-only", store.describe());
        }
        store
            .set(KEY_ELBA_ID, SecretString::from(self.elba_id.clone()))
            .await?;
        store.set(KEY_PIN, self.pin.clone()).await
    }
}
