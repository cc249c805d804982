//! pushTAN login through Chrome DevTools Protocol.
//!
//! Drives the SSO form with a persistent Chromium profile, waits for the
//! approval on the phone, then harvests the bearer token and cookies used by
//! [`crate::api::ElbaClient`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::fetch::{
    self, EventRequestPaused, RequestPattern, RequestStage,
};
use chromiumoxide::element::Element;
use chromiumoxide::Page;
use futures::StreamExt;
use secrecy::ExposeSecret;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::page::{PageProbe, PageState, PROBE_JS};
use super::token::{token_from_authorization, token_from_storage, StorageEntry, STORAGE_ENTRIES_JS};
use super::{Authenticator, DASHBOARD_URL, LOGIN_URL};
use crate::config::BrowserSettings;
use crate::credentials::{CredentialStore, Credentials, SessionData};
use crate::error::ElbaError;
use crate::fs::create_private_dir;
use crate::region::option_matches;

const REGION_SELECT: &str = r#"rds-select[formcontrolname="mandant"]"#;
const REGION_OPTION: &str = "rds-option";
const ID_INPUT: &str = r#"input[formcontrolname="verfuegerNr"]"#;
const PIN_INPUT: &str = r#"input[formcontrolname="pin"]"#;
const SUBMIT_BUTTON: &str = r#"button[type="submit"]:not([disabled])"#;
const PUSHTAN_CODE: &str = "p.rds-display-1";
const PRODUCT_CARD: &str = "banking-product-card";

const MAX_REGION_ATTEMPTS: usize = 20;
const SUBMIT_TIMEOUT: Duration = Duration::from_secs(10);
const PUSHTAN_CODE_TIMEOUT: Duration = Duration::from_secs(10);
const PRODUCT_CARD_TIMEOUT: Duration = Duration::from_secs(5);
const TOKEN_CAPTURE_TIMEOUT: Duration = Duration::from_secs(15);
const API_URL_PATTERN: &str = "*/api/*";

/// Logs in with a real browser. Credentials are read only when a login is needed.
pub struct BrowserAuthenticator {
    stores: Vec<Box<dyn CredentialStore>>,
    settings: BrowserSettings,
    profile_dir: PathBuf,
}

impl BrowserAuthenticator {
    pub fn new(
        stores: Vec<Box<dyn CredentialStore>>,
        settings: BrowserSettings,
        profile_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            stores,
            settings,
            profile_dir: profile_dir.into(),
        }
    }

    async fn credentials(&self) -> Result<Credentials> {
        let stores: Vec<&dyn CredentialStore> = self.stores.iter().map(|s| s.as_ref()).collect();
        Credentials::load(&stores).await
    }

    async fn run_in(&self, browser: &Browser, credentials: &Credentials) -> Result<SessionData> {
        let page = browser.new_page("about:blank").await?;
        LoginFlow {
            page: &page,
            credentials,
            approval_timeout: self.settings.approval_timeout,
        }
        .run()
        .await
    }
}

#[async_trait]
impl Authenticator for BrowserAuthenticator {
    async fn login(&self) -> Result<SessionData> {
        let credentials = self.credentials().await?;
        let chrome = self
            .settings
            .chrome_path
            .clone()
            .or_else(find_chrome)
            .ok_or(ElbaError::BrowserNotFound)?;

        create_private_dir(&self.profile_dir)?;
        info!(
            elba_id = %credentials.masked_id(),
            region = credentials.region(),
            headless = self.settings.headless,
            "Starting browser login"
        );

        let (mut browser, mut handler) =
            launch_browser(&chrome, &self.profile_dir, self.settings.headless).await?;
        let handler_task = tokio::spawn(async move {
            while (handler.next().await).is_some() {}
        });

        let result = self.run_in(&browser, &credentials).await;

        if let Err(e) = browser.close().await {
            debug!(error = %e, "Browser did not close cleanly");
        }
        handler_task.abort();

        result
    }
}

async fn launch_browser(
    chrome: &Path,
    profile_dir: &Path,
    headless: bool,
) -> Result<(Browser, chromiumoxide::handler::Handler)> {
    let mut builder = BrowserConfig::builder()
        .chrome_executable(chrome)
        .window_size(1280, 800)
        .viewport(None)
        .user_data_dir(profile_dir)
        .arg("--disable-blink-features=AutomationControlled")
        .arg("--disable-infobars")
        .arg("--no-first-run")
        .arg("--no-default-browser-check");
    if !headless {
        builder = builder.with_head();
    }

    let config = builder
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to configure browser: {e}"))?;

    Browser::launch(config)
        .await
        .context("Failed to launch browser")
}

struct LoginFlow<'a> {
    page: &'a Page,
    credentials: &'a Credentials,
    approval_timeout: Duration,
}

impl LoginFlow<'_> {
    async fn run(&self) -> Result<SessionData> {
        info!("Opening login page");
        self.page
            .goto(LOGIN_URL)
            .await
            .context("Failed to open the login page")?;
        tokio::time::sleep(Duration::from_secs(1)).await;

        match self.probe().await?.state() {
            PageState::ServiceUnavailable => return Err(ElbaError::ServiceUnavailable.into()),
            PageState::LoggedIn => info!("Already logged in"),
            PageState::SessionExpired => {
                warn!("Login page expired, restarting");
                if !self.click_button("Restart").await? {
                    debug!("No Restart button on the expired page");
                }
                tokio::time::sleep(Duration::from_secs(2)).await;
                self.submit_credentials().await?;
            }
            PageState::Rejected(_) | PageState::Pending => {
                tokio::time::sleep(Duration::from_secs(1)).await;
                if self.probe().await?.state() == PageState::LoggedIn {
                    info!("Already logged in");
                } else {
                    self.submit_credentials().await?;
                }
            }
        }

        self.finish().await
    }

    async fn probe(&self) -> Result<PageProbe> {
        self.page
            .evaluate(PROBE_JS)
            .await
            .context("Failed to inspect the page")?
            .into_value()
            .context("Unexpected page probe result")
    }

    async fn submit_credentials(&self) -> Result<()> {
        self.select_region().await?;
        self.fill_form().await?;
        self.show_pushtan_code().await;
        self.wait_for_approval().await
    }

    async fn select_region(&self) -> Result<()> {
        let region = self.credentials.region();
        info!(region, "Selecting region");

        let dropdown = self
            .page
            .find_element(REGION_SELECT)
            .await
            .context("Region dropdown not found")?;
        dropdown.click().await?;
        tokio::time::sleep(Duration::from_millis(500)).await;

        for _ in 0..MAX_REGION_ATTEMPTS {
            let options = self
                .page
                .find_elements(REGION_OPTION)
                .await
                .unwrap_or_default();
            for option in options {
                let text = option.inner_text().await.ok().flatten().unwrap_or_default();
                if option_matches(&text, region) {
                    debug!(option = %text.trim(), "Found region option");
                    option.click().await?;
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    return Ok(());
                }
            }

            dropdown.press_key("ArrowDown").await?;
            tokio::time::sleep(Duration::from_millis(200)).await;
        }

        Err(ElbaError::LoginRejected(format!("Region {region:?} not found in the dropdown")).into())
    }

    async fn fill_form(&self) -> Result<()> {
        info!("Entering credentials");
        let id_input = self
            .page
            .find_element(ID_INPUT)
            .await
            .context("ELBA ID field not found")?;
        id_input.click().await?;
        id_input.type_str(self.credentials.elba_id()).await?;

        let pin_input = self
            .page
            .find_element(PIN_INPUT)
            .await
            .context("PIN field not found")?;
        pin_input.click().await?;
        pin_input
            .type_str(self.credentials.pin().expose_secret())
            .await?;

        let submit = self
            .wait_for_selector(SUBMIT_BUTTON, SUBMIT_TIMEOUT)
            .await
            .ok_or_else(|| {
                ElbaError::LoginRejected("Continue button never became enabled".to_string())
            })?;
        // Form validation runs asynchronously after the last keystroke.
        tokio::time::sleep(Duration::from_secs(1)).await;
        submit.click().await?;
        Ok(())
    }

    async fn show_pushtan_code(&self) {
        match self
            .wait_for_selector(PUSHTAN_CODE, PUSHTAN_CODE_TIMEOUT)
            .await
        {
            Some(element) => {
                let code = element.inner_text().await.ok().flatten().unwrap_or_default();
                eprintln!();
                eprintln!("========================================");
                eprintln!("ELBA PUSHTAN CODE: {}", code.trim());
                eprintln!("Approve the login in your banking app.");
                eprintln!("========================================");
                eprintln!();
            }
            None => warn!("No pushTAN code shown, waiting for the result anyway"),
        }
    }

    async fn wait_for_approval(&self) -> Result<()> {
        info!(
            timeout_secs = self.approval_timeout.as_secs(),
            "Waiting for pushTAN approval"
        );
        let start = Instant::now();

        loop {
            // Probing fails while the page navigates; try again on the next tick.
            if let Ok(probe) = self.probe().await {
                match probe.state() {
                    PageState::LoggedIn => {
                        info!("Login approved");
                        return Ok(());
                    }
                    PageState::ServiceUnavailable => {
                        return Err(ElbaError::ServiceUnavailable.into());
                    }
                    PageState::SessionExpired => {
                        return Err(ElbaError::LoginRejected(
                            "Session expired during login".to_string(),
                        )
                        .into());
                    }
                    PageState::Rejected(message) => {
                        return Err(ElbaError::LoginRejected(message).into());
                    }
                    PageState::Pending => {}
                }
            }

            if start.elapsed() > self.approval_timeout {
                return Err(ElbaError::ApprovalTimeout(self.approval_timeout).into());
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    async fn finish(&self) -> Result<SessionData> {
        info!("Loading products dashboard");
        self.page
            .goto(DASHBOARD_URL)
            .await
            .context("Failed to open the dashboard")?;
        tokio::time::sleep(Duration::from_secs(3)).await;

        let probe = self.probe().await?;
        if probe.is_login_page() {
            return Err(ElbaError::LoginRejected(
                "Redirected back to the login page after approval".to_string(),
            )
            .into());
        }
        if self
            .wait_for_selector(PRODUCT_CARD, PRODUCT_CARD_TIMEOUT)
            .await
            .is_none()
        {
            warn!("Dashboard loaded but no product cards visible yet");
        }

        let token = self.extract_token().await?;
        let cookies: HashMap<String, String> = self
            .page
            .get_cookies()
            .await
            .context("Failed to read browser cookies")?
            .into_iter()
            .map(|c| (c.name, c.value))
            .collect();
        info!(cookies = cookies.len(), "Captured session");

        Ok(SessionData {
            token: Some(token),
            cookies,
            captured_at: Some(Utc::now().timestamp()),
            session_url: Some(probe.url),
        })
    }

    async fn extract_token(&self) -> Result<String> {
        let entries: Vec<StorageEntry> = self
            .page
            .evaluate(STORAGE_ENTRIES_JS)
            .await
            .context("Failed to read web storage")?
            .into_value()
            .context("Unexpected web storage dump")?;

        if let Some(token) = token_from_storage(&entries) {
            debug!("Found bearer token in web storage");
            return Ok(token);
        }

        info!("Token not in web storage, capturing it from API requests");
        self.capture_token_from_requests()
            .await?
            .ok_or_else(|| ElbaError::TokenNotFound.into())
    }

    /// Reload the dashboard and read the `Authorization` header of its API calls.
    async fn capture_token_from_requests(&self) -> Result<Option<String>> {
        let captured: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));

        self.page
            .execute(fetch::EnableParams {
                patterns: Some(vec![RequestPattern {
                    url_pattern: Some(API_URL_PATTERN.to_string()),
                    resource_type: None,
                    request_stage: Some(RequestStage::Request),
                }]),
                handle_auth_requests: None,
            })
            .await?;

        let mut request_events = self.page.event_listener::<EventRequestPaused>().await?;
        let page = self.page.clone();
        let sink = captured.clone();
        let intercept_task = tokio::spawn(async move {
            while let Some(event) = request_events.next().await {
                if let Some(headers) = event.request.headers.inner().as_object() {
                    let token = headers
                        .get("authorization")
                        .or_else(|| headers.get("Authorization"))
                        .and_then(|v| v.as_str())
                        .and_then(token_from_authorization);
                    if let Some(token) = token {
                        let mut guard = sink.lock().await;
                        if guard.is_none() {
                            debug!(url = %event.request.url, "Captured bearer token");
                            *guard = Some(token);
                        }
                    }
                }

                let _ = page
                    .execute(fetch::ContinueRequestParams {
                        request_id: event.request_id.clone(),
                        url: None,
                        method: None,
                        post_data: None,
                        headers: None,
                        intercept_response: None,
                    })
                    .await;
            }
        });

        self.page.reload().await?;

        let start = Instant::now();
        let token = loop {
            if let Some(token) = captured.lock().await.clone() {
                break Some(token);
            }
            if start.elapsed() > TOKEN_CAPTURE_TIMEOUT {
                break None;
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        };

        intercept_task.abort();
        if let Err(e) = self.page.execute(fetch::DisableParams::default()).await {
            debug!(error = %e, "Failed to disable request interception");
        }
        Ok(token)
    }

    async fn click_button(&self, label: &str) -> Result<bool> {
        let script = format!(
            r#"(() => {{
  const label = {};
  const button = Array.from(document.querySelectorAll('button'))
    .find((b) => (b.innerText || '').trim() === label);
  if (!button) return false;
  button.click();
  return true;
}})()"#,
            serde_json::to_string(label)?
        );
        self.page
            .evaluate(script.as_str())
            .await?
            .into_value()
            .context("Unexpected click result")
    }

    /// Poll for `selector` until it appears or `timeout` elapses.
    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Option<Element> {
        let start = Instant::now();
        loop {
            if let Ok(element) = self.page.find_element(selector).await {
                return Some(element);
            }
            if start.elapsed() > timeout {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }
}

/// Find a Chrome/Chromium executable on PATH or in well-known locations.
pub fn find_chrome() -> Option<PathBuf> {
    for name in [
        "google-chrome",
        "google-chrome-stable",
        "chromium",
        "chromium-browser",
    ] {
        if let Ok(output) = std::process::Command::new("which").arg(name).output() {
            if output.status.success() {
                let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !path.is_empty() {
                    return Some(PathBuf::from(path));
                }
            }
        }
    }

    [
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/snap/bin/chromium",
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
    ]
    .into_iter()
    .map(PathBuf::from)
    .find(|p| p.exists())
}
