//! Session-aware operations on top of [`ElbaClient`].
//!
//! Every API call runs with the cached session. When the bank rejects the
//! token, the session is refreshed through the [`Authenticator`] once and
//! the call is retried; a second rejection is reported to the user.

use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{NaiveDate, SecondsFormat};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::api::ElbaClient;
use crate::auth::{session_age, AuthStatus, Authenticator};
use crate::clock::{Clock, SystemClock};
use crate::config::ResolvedConfig;
use crate::credentials::{SessionCache, SessionData};
use crate::error::{is_session_expired, ElbaError};
use crate::fs::{remove_if_exists, write_file_atomic, write_private_file};
use crate::models::{AccountsReport, Document, Transaction};

/// Pause after every this many document downloads.
const DOWNLOAD_BATCH: usize = 10;
const DOWNLOAD_PAUSE: Duration = Duration::from_secs(1);

pub struct ElbaService<A: Authenticator> {
    config: ResolvedConfig,
    cache: SessionCache,
    authenticator: A,
    clock: Arc<dyn Clock>,
}

/// Result of `elba status`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub logged_in: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub session_file: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captured_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_secs: Option<i64>,
    pub cookies: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_url: Option<String>,
    pub profile_exists: bool,
}

/// Result of `elba logout`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutReport {
    pub removed_session: bool,
    pub removed_profile: bool,
}

impl LogoutReport {
    pub fn removed_anything(&self) -> bool {
        self.removed_session || self.removed_profile
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    Downloaded,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadedDocument {
    pub file: String,
    pub status: DownloadStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of `elba download`.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadReport {
    pub directory: PathBuf,
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub documents: Vec<DownloadedDocument>,
}

impl DownloadReport {
    fn new(directory: PathBuf) -> Self {
        Self {
            directory,
            downloaded: 0,
            skipped: 0,
            failed: 0,
            documents: Vec::new(),
        }
    }

    fn record(&mut self, entry: DownloadedDocument) {
        match entry.status {
            DownloadStatus::Downloaded => self.downloaded += 1,
            DownloadStatus::Skipped => self.skipped += 1,
            DownloadStatus::Failed => self.failed += 1,
        }
        self.documents.push(entry);
    }
}

impl<A: Authenticator> ElbaService<A> {
    pub fn new(config: ResolvedConfig, authenticator: A) -> Self {
        let cache = SessionCache::with_path(config.session_file());
        Self {
            config,
            cache,
            authenticator,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn session_cache(&self) -> &SessionCache {
        &self.cache
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Log in interactively, regardless of any cached session, and cache the result.
    pub async fn login(&self) -> Result<SessionData> {
        let session = self.authenticator.login().await?;
        self.cache.set(&session)?;
        info!(path = %self.cache.path().display(), "Session saved");
        Ok(session)
    }

    /// Remove the browser profile and the session file.
    pub fn logout(&self) -> Result<LogoutReport> {
        let removed_session = self.cache.delete()?;
        let removed_profile = remove_if_exists(&self.config.profile_dir())?;
        Ok(LogoutReport {
            removed_session,
            removed_profile,
        })
    }

    /// Describe the cached session without contacting the bank.
    pub async fn status(&self) -> Result<SessionStatus> {
        let session = self.cache.get()?;
        let status = self.authenticator.check_auth(session.as_ref()).await?;
        let now = self.clock.now();

        let (logged_in, reason) = match status {
            AuthStatus::Valid => (true, None),
            AuthStatus::Missing => (false, Some("No cached session".to_string())),
            AuthStatus::Expired { reason } => (false, Some(reason)),
        };

        Ok(SessionStatus {
            logged_in,
            reason,
            session_file: self.cache.path().to_path_buf(),
            captured_at: session
                .as_ref()
                .and_then(|s| s.captured_at)
                .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
                .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Secs, true)),
            age_secs: session
                .as_ref()
                .and_then(|s| session_age(s, now))
                .map(|age| age.num_seconds()),
            cookies: session.as_ref().map(|s| s.cookies.len()).unwrap_or(0),
            session_url: session.and_then(|s| s.session_url),
            profile_exists: self.config.profile_dir().exists(),
        })
    }

    async fn authenticate(&self, expired: bool) -> Result<SessionData> {
        if !self.config.auto_login {
            return Err(if expired {
                ElbaError::SessionExpired
            } else {
                ElbaError::NotLoggedIn
            }
            .into());
        }

        info!("Opening browser to log in");
        self.login().await
    }

    async fn session(&self) -> Result<SessionData> {
        match self.cache.get()? {
            Some(session) if session.has_token() => Ok(session),
            Some(_) => self.authenticate(true).await,
            None => self.authenticate(false).await,
        }
    }

    fn client(&self, session: SessionData) -> Result<ElbaClient> {
        ElbaClient::new(&self.config.api, session)
    }

    /// Run `op` with a client for the cached session, re-authenticating once
    /// if the bank reports the session as expired.
    pub async fn with_session<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: Fn(ElbaClient) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let session = self.session().await?;
        match op(self.client(session)?).await {
            Err(e) if is_session_expired(&e) => {
                warn!("Session expired, logging in again");
                self.cache.clear_token()?;
                let session = self.authenticate(true).await?;
                op(self.client(session)?).await
            }
            other => other,
        }
    }

    /// Accounts and balances of every product.
    pub async fn accounts(&self) -> Result<AccountsReport> {
        let (products, raw) = self
            .with_session(|client| async move { client.get_products().await })
            .await?;
        info!(count = products.len(), "Fetched products");

        let raw_path = if self.config.save_raw_payloads {
            Some(self.save_raw_payload("products-raw", &raw)?)
        } else {
            None
        };

        Ok(AccountsReport::new(
            self.clock
                .local_now()
                .to_rfc3339_opts(SecondsFormat::Secs, false),
            raw_path.map(|p| p.display().to_string()),
            &products,
        ))
    }

    fn save_raw_payload(&self, prefix: &str, payload: &Value) -> Result<PathBuf> {
        let stamp = self.clock.local_now().format("%Y-%m-%d-%H-%M-%S");
        let path = self.config.debug_dir().join(format!("{stamp}-{prefix}.json"));
        let content =
            serde_json::to_string_pretty(payload).context("Failed to serialize raw payload")?;
        write_private_file(&path, content)?;
        debug!(path = %path.display(), "Saved raw payload");
        Ok(path)
    }

    /// Transactions of one account between two dates (inclusive).
    pub async fn transactions(
        &self,
        iban: &str,
        from: NaiveDate,
        until: NaiveDate,
    ) -> Result<Vec<Transaction>> {
        validate_range(from, until)?;
        let iban = iban.trim();
        if iban.is_empty() {
            return Err(ElbaError::InvalidArgument("--account must not be empty".to_string()).into());
        }

        let limit = self.config.api.transaction_limit;
        let transactions = self
            .with_session(|client| async move {
                client.get_transactions(iban, from, until, limit).await
            })
            .await?;

        info!(count = transactions.len(), %from, %until, "Fetched transactions");
        if transactions.len() >= limit as usize {
            warn!(
                limit,
                "Result reached the transaction limit and may be truncated; narrow the date range"
            );
        }
        Ok(transactions)
    }

    /// Positions overview of a depot.
    pub async fn portfolio(&self, depot_id: &str, date: Option<NaiveDate>) -> Result<Value> {
        if depot_id.trim().is_empty() {
            return Err(
                ElbaError::InvalidArgument("--depot-id must not be empty".to_string()).into(),
            );
        }
        self.with_session(|client| async move { client.get_portfolio(depot_id.trim(), date).await })
            .await
    }

    /// Mailbox documents created between two dates.
    pub async fn documents(&self, from: NaiveDate, until: NaiveDate) -> Result<Vec<Document>> {
        validate_range(from, until)?;
        self.with_session(|client| async move { client.list_documents(from, until).await })
            .await
    }

    /// Download every mailbox document in the range into `directory`.
    ///
    /// Files that already exist are skipped. Documents that would map to the
    /// same file name within one run get ` (2)`, ` (3)`, ... suffixes.
    /// Individual download failures are recorded and do not stop the run.
    pub async fn download_documents(
        &self,
        from: NaiveDate,
        until: NaiveDate,
        directory: &Path,
    ) -> Result<DownloadReport> {
        let documents = self.documents(from, until).await?;
        info!(count = documents.len(), "Found documents");

        std::fs::create_dir_all(directory)
            .with_context(|| format!("Failed to create directory: {}", directory.display()))?;

        let mut report = DownloadReport::new(directory.to_path_buf());
        let mut used_names = HashSet::new();
        let total = documents.len();

        for (index, document) in documents.iter().enumerate() {
            let file = unique_file_name(&document.file_name(), &mut used_names);
            let target = directory.join(&file);

            let entry = if target.exists() {
                info!("[{}/{total}] skip {file} (already exists)", index + 1);
                DownloadedDocument {
                    file,
                    status: DownloadStatus::Skipped,
                    bytes: None,
                    error: None,
                }
            } else {
                match self
                    .with_session(|client| async move { client.download_document(document).await })
                    .await
                {
                    Ok(bytes) => {
                        write_file_atomic(&target, &bytes)?;
                        info!(
                            "[{}/{total}] ok {file} ({:.1} KB)",
                            index + 1,
                            bytes.len() as f64 / 1024.0
                        );
                        DownloadedDocument {
                            file,
                            status: DownloadStatus::Downloaded,
                            bytes: Some(bytes.len()),
                            error: None,
                        }
                    }
                    Err(e) if is_session_expired(&e) => return Err(e),
                    Err(e) => {
                        warn!("[{}/{total}] failed {file}: {e:#}", index + 1);
                        DownloadedDocument {
                            file,
                            status: DownloadStatus::Failed,
                            bytes: None,
                            error: Some(format!("{e:#}")),
                        }
                    }
                }
            };
            report.record(entry);

            if (index + 1) % DOWNLOAD_BATCH == 0 && index + 1 < total {
                tokio::time::sleep(DOWNLOAD_PAUSE).await;
            }
        }

        info!(
            downloaded = report.downloaded,
            skipped = report.skipped,
            failed = report.failed,
            "Download complete"
        );
        Ok(report)
    }
}

fn validate_range(from: NaiveDate, until: NaiveDate) -> Result<()> {
    if from > until {
        return Err(ElbaError::InvalidArgument(format!(
            "--from ({from}) must not be after --until ({until})"
        ))
        .into());
    }
    Ok(())
}

/// Reserve `name` in `used`, adding ` (n)` before the extension on collision.
pub fn unique_file_name(name: &str, used: &mut HashSet<String>) -> String {
    if used.insert(name.to_string()) {
        return name.to_string();
    }

    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, format!(".{ext}")),
        _ => (name, String::new()),
    };
    let mut n = 2;
    loop {
        let candidate = format!("{stem} ({n}){ext}");
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}
