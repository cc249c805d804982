use anyhow::{Context, Result};
use dialoguer::console::Term;
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Input, Password};
use secrecy::SecretString;
use serde_json::json;
use tracing::info;

use crate::auth::Authenticator;
use crate::config::ResolvedConfig;
use crate::credentials::{Credentials, FileCredentialStore};
use crate::output::to_json;
use crate::region::region_for_id;
use crate::service::ElbaService;

/// Prompt for the ELBA ID and PIN and write them to the credentials file.
pub async fn setup(config: &ResolvedConfig) -> Result<String> {
    let theme = ColorfulTheme::default();
    let term = Term::stderr();

    let elba_id: String = Input::with_theme(&theme)
        .with_prompt("ELBA ID (Verfügernummer)")
        .validate_with(|input: &String| -> Result<(), String> {
            match region_for_id(input.trim()) {
                Some(_) => Ok(()),
                None => Err("Unknown region prefix (e.g. ELVIE32V...)".to_string()),
            }
        })
        .interact_text_on(&term)
        .context("Failed to read ELBA ID")?;

    let pin = Password::with_theme(&theme)
        .with_prompt("PIN (5 digits)")
        .interact_on(&term)
        .context("Failed to read PIN")?;

    let credentials = Credentials::new(elba_id, SecretString::from(pin))?;
    let store = FileCredentialStore::new(config.credentials_file.clone());
    credentials.save(&store).await?;
    info!(
        path = %store.path().display(),
        id = %credentials.masked_id(),
        "Credentials saved"
    );

    to_json(&json!({
        "success": true,
        "credentialsFile": store.path(),
        "region": credentials.region(),
    }))
}

/// Log in through the browser and cache the session.
pub async fn login<A: Authenticator>(service: &ElbaService<A>) -> Result<String> {
    let session = service.login().await?;
    to_json(&json!({
        "success": true,
        "sessionFile": service.session_cache().path(),
        "cookies": session.cookies.len(),
        "sessionUrl": session.session_url,
        "message": "Session captured successfully",
    }))
}

pub async fn logout<A: Authenticator>(service: &ElbaService<A>) -> Result<String> {
    let report = service.logout()?;
    let message = if report.removed_anything() {
        "Logged out"
    } else {
        "Nothing to remove"
    };
    to_json(&json!({
        "success": true,
        "removedSession": report.removed_session,
        "removedProfile": report.removed_profile,
        "message": message,
    }))
}

pub async fn status<A: Authenticator>(service: &ElbaService<A>) -> Result<String> {
    to_json(&service.status().await?)
}
