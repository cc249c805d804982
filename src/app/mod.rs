//! Command handlers behind the `elba` binary.
//!
//! Handlers return the text destined for stdout; progress goes to stderr.

mod banking;
mod session;

use std::path::PathBuf;

use anyhow::Result;
use chrono::NaiveDate;

use crate::auth::BrowserAuthenticator;
use crate::config::ResolvedConfig;
use crate::credentials::{CredentialStore, EnvCredentialStore, FileCredentialStore};
use crate::error::ElbaError;
use crate::service::ElbaService;

pub use banking::{
    accounts, download, portfolio, transactions, transactions_file_stem, DownloadArgs,
    TransactionsArgs, TransactionsExport,
};
pub use session::{login, logout, setup, status};

/// Name of the default download directory below the workspace.
pub const DOCUMENTS_DIR: &str = "elba-documents";

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%d.%m.%Y"];

/// Credential sources in resolution order: environment, then credentials file.
pub fn credential_stores(config: &ResolvedConfig) -> Vec<Box<dyn CredentialStore>> {
    vec![
        Box::new(EnvCredentialStore::from_process()),
        Box::new(FileCredentialStore::new(config.credentials_file.clone())),
    ]
}

/// Service wired to a real browser login.
pub fn build_service(config: ResolvedConfig) -> ElbaService<BrowserAuthenticator> {
    let authenticator = BrowserAuthenticator::new(
        credential_stores(&config),
        config.browser.clone(),
        config.profile_dir(),
    );
    ElbaService::new(config, authenticator)
}

/// Parse a CLI date given as `YYYY-MM-DD` or `DD.MM.YYYY`.
pub fn parse_date(value: &str) -> Result<NaiveDate, ElbaError> {
    let value = value.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        .ok_or_else(|| {
            ElbaError::InvalidArgument(format!(
                "invalid date {value:?}, expected YYYY-MM-DD or DD.MM.YYYY"
            ))
        })
}

fn parse_optional_date(value: Option<&str>) -> Result<Option<NaiveDate>, ElbaError> {
    value.map(parse_date).transpose()
}

/// `<workspace>/elba-documents`.
pub fn default_download_dir(config: &ResolvedConfig) -> PathBuf {
    config.workspace_dir.join(DOCUMENTS_DIR)
}
