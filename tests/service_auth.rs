use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use chrono::NaiveDate;
use elba::auth::Authenticator;
use elba::config::ResolvedConfig;
use elba::credentials::{SessionCache, SessionData};
use elba::error::{exit_code, find_elba_error, ElbaError};
use elba::service::{DownloadStatus, ElbaService};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PRODUCTS_PATH: &str = "/api/bankingws-widgetsystem/bankingws-ui/rest/produkte";
const DOCUMENTS_PATH: &str = "/api/bankingquer-dokumentenablage/dokumentenablage-ui/rest/dokumente";

struct MockAuthenticator {
    logins: Arc<AtomicUsize>,
    token: &'static str,
}

#[async_trait::async_trait]
impl Authenticator for MockAuthenticator {
    async fn login(&self) -> Result<SessionData> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        Ok(SessionData::new()
            .with_token(self.token)
            .with_cookie("JSESSIONID", "fresh"))
    }
}

fn load_config(dir: &Path, server: &MockServer, extra: &str) -> Result<ResolvedConfig> {
    let config_path = dir.join("elba.toml");
    std::fs::write(
        &config_path,
        format!(
            r#"
state_dir = "state"
credentials_file = "credentials.json"
workspace_dir = "workspace"
{extra}

[api]
base_url = "{}"
"#,
            server.uri()
        ),
    )?;
    ResolvedConfig::load_with_env(&config_path, |_| None)
}

fn service(
    config: ResolvedConfig,
    token: &'static str,
) -> (ElbaService<MockAuthenticator>, Arc<AtomicUsize>) {
    let logins = Arc::new(AtomicUsize::new(0));
    let authenticator = MockAuthenticator {
        logins: logins.clone(),
        token,
    };
    (ElbaService::new(config, authenticator), logins)
}

fn seed_session(config: &ResolvedConfig, token: &str) -> Result<()> {
    SessionCache::with_path(config.session_file()).set(&SessionData::new().with_token(token))
}

async fn mount_products(server: &MockServer, token: &str, status: u16) {
    Mock::given(method("GET"))
        .and(path(PRODUCTS_PATH))
        .and(header("authorization", format!("Bearer {token}").as_str()))
        .respond_with(ResponseTemplate::new(status).set_body_raw(
            r#"[{"type": "KONTO", "smallHeader": "Giro", "largeHeader": "Haushalt",
                 "uniqueId": "AT611904300234573201",
                 "details": {"betragKontoWaehrung": {"amount": 42.0, "currencyCode": "EUR"}}}]"#,
            "application/json",
        ))
        .mount(server)
        .await;
}

#[tokio::test]
async fn expired_session_is_refreshed_once_and_cached() -> Result<()> {
    let dir = TempDir::new()?;
    let server = MockServer::start().await;
    mount_products(&server, "stale", 401).await;
    mount_products(&server, "fresh", 200).await;

    let config = load_config(dir.path(), &server, "save_raw_payloads = false")?;
    seed_session(&config, "stale")?;
    let (service, logins) = service(config, "fresh");

    let report = service.accounts().await?;
    assert_eq!(report.accounts.len(), 1);
    assert_eq!(report.accounts[0].name, "Haushalt");
    assert!(report.raw_path.is_none());
    assert_eq!(logins.load(Ordering::SeqCst), 1);

    let cached = service.session_cache().get()?.unwrap();
    assert_eq!(cached.token.as_deref(), Some("fresh"));
    Ok(())
}

#[tokio::test]
async fn second_rejection_surfaces_session_expired() -> Result<()> {
    let dir = TempDir::new()?;
    let server = MockServer::start().await;
    mount_products(&server, "stale", 401).await;
    mount_products(&server, "also-stale", 401).await;

    let config = load_config(dir.path(), &server, "")?;
    seed_session(&config, "stale")?;
    let (service, logins) = service(config, "also-stale");

    let err = service.accounts().await.unwrap_err();
    assert!(matches!(find_elba_error(&err), Some(ElbaError::SessionExpired)));
    assert_eq!(exit_code(&err), 4);
    assert_eq!(logins.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn auto_login_disabled_never_opens_browser() -> Result<()> {
    let dir = TempDir::new()?;
    let server = MockServer::start().await;

    let config = load_config(dir.path(), &server, "auto_login = false")?;
    let (service, logins) = service(config, "fresh");

    let err = service.accounts().await.unwrap_err();
    assert!(matches!(find_elba_error(&err), Some(ElbaError::NotLoggedIn)));
    assert_eq!(logins.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn missing_session_logs_in_and_saves_raw_payload() -> Result<()> {
    let dir = TempDir::new()?;
    let server = MockServer::start().await;
    mount_products(&server, "fresh", 200).await;

    let config = load_config(dir.path(), &server, "")?;
    let debug_dir = config.debug_dir();
    let (service, logins) = service(config, "fresh");

    let report = service.accounts().await?;
    assert_eq!(logins.load(Ordering::SeqCst), 1);

    let raw_path = report.raw_path.expect("raw payload path");
    assert!(raw_path.ends_with("-products-raw.json"));
    assert!(Path::new(&raw_path).starts_with(&debug_dir));
    let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&raw_path)?)?;
    assert_eq!(raw[0]["uniqueId"], "AT611904300234573201");
    Ok(())
}

#[tokio::test]
async fn status_reports_cached_session_without_network() -> Result<()> {
    let dir = TempDir::new()?;
    let server = MockServer::start().await;

    let config = load_config(dir.path(), &server, "")?;
    let (service, _) = service(config.clone(), "fresh");

    let status = service.status().await?;
    assert!(!status.logged_in);
    assert_eq!(status.cookies, 0);

    SessionCache::with_path(config.session_file()).set(
        &SessionData::new()
            .with_token("t")
            .with_cookie("a", "1")
            .with_cookie("b", "2"),
    )?;
    let status = service.status().await?;
    assert!(status.logged_in);
    assert_eq!(status.cookies, 2);
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
    Ok(())
}

#[tokio::test]
async fn download_skips_existing_and_records_failures() -> Result<()> {
    let dir = TempDir::new()?;
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(format!("{DOCUMENTS_PATH}/filter")))
        .and(body_partial_json(json!({"skip": 0})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": [
            {"systemId": "DMS", "dokumentenId": "A", "versionsId": "1",
             "dateiName": "Kontoauszug", "erstellungsDatum": "2026-01-31T08:00:00"},
            {"systemId": "DMS", "dokumentenId": "B", "versionsId": "1",
             "dateiName": "Kontoauszug", "erstellungsDatum": "2026-01-31T09:00:00"},
            {"systemId": "DMS", "dokumentenId": "C", "versionsId": "2",
             "dateiName": "Info", "erstellungsDatum": "2026-02-01T08:00:00"},
            {"systemId": "DMS", "dokumentenId": "D", "versionsId": "1",
             "dateiName": "Alt", "erstellungsDatum": "2026-02-02T08:00:00"}
        ]})))
        .mount(&server)
        .await;

    for (id, version, status) in [("A", "1", 200), ("B", "1", 200), ("C", "2", 500)] {
        Mock::given(method("POST"))
            .and(path(format!("{DOCUMENTS_PATH}/DMS/{id}/{version}/download")))
            .respond_with(ResponseTemplate::new(status).set_body_bytes(format!("%PDF {id}")))
            .mount(&server)
            .await;
    }

    let config = load_config(dir.path(), &server, "")?;
    seed_session(&config, "fresh")?;
    let target = config.workspace_dir.join("docs");
    std::fs::create_dir_all(&target)?;
    std::fs::write(target.join("2026-02-02_Alt.pdf"), b"existing")?;

    let (service, logins) = service(config, "fresh");
    let report = service
        .download_documents(
            NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2026, 2, 28).unwrap(),
            &target,
        )
        .await?;

    assert_eq!(logins.load(Ordering::SeqCst), 0);
    assert_eq!((report.downloaded, report.skipped, report.failed), (2, 1, 1));

    let files: Vec<_> = report.documents.iter().map(|d| d.file.as_str()).collect();
    assert_eq!(
        files,
        [
            "2026-01-31_Kontoauszug.pdf",
            "2026-01-31_Kontoauszug (2).pdf",
            "2026-02-01_Info.pdf",
            "2026-02-02_Alt.pdf"
        ]
    );
    assert_eq!(report.documents[2].status, DownloadStatus::Failed);
    assert_eq!(std::fs::read(target.join("2026-01-31_Kontoauszug (2).pdf"))?, b"%PDF B");
    assert_eq!(std::fs::read(target.join("2026-02-02_Alt.pdf"))?, b"existing");

    let mut on_disk: Vec<_> = std::fs::read_dir(&target)?
        .map(|e| e.map(|e| e.file_name().to_string_lossy().into_owned()))
        .collect::<Result<_, _>>()?;
    on_disk.sort();
    assert_eq!(
        on_disk,
        [
            "2026-01-31_Kontoauszug (2).pdf",
            "2026-01-31_Kontoauszug.pdf",
            "2026-02-02_Alt.pdf"
        ]
    );
    Ok(())
}

#[tokio::test]
async fn reversed_range_is_rejected_before_any_request() -> Result<()> {
    let dir = TempDir::new()?;
    let server = MockServer::start().await;
    let config = load_config(dir.path(), &server, "")?;
    let (service, logins) = service(config, "fresh");

    let err = service
        .transactions(
            "AT611904300234573201",
            NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
        )
        .await
        .unwrap_err();
    assert_eq!(exit_code(&err), 64);
    assert_eq!(logins.load(Ordering::SeqCst), 0);
    Ok(())
}
