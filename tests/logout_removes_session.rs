use anyhow::Result;
use elba::auth::Authenticator;
use elba::config::ResolvedConfig;
use elba::credentials::{SessionCache, SessionData};
use elba::service::ElbaService;
use tempfile::TempDir;

struct NoLogin;

#[async_trait::async_trait]
impl Authenticator for NoLogin {
    async fn login(&self) -> Result<SessionData> {
        anyhow::bail!("login must not be called")
    }
}

fn config(dir: &TempDir) -> Result<ResolvedConfig> {
    let config_path = dir.path().join("elba.toml");
    std::fs::write(
        &config_path,
        "state_dir = \"state\"\ncredentials_file = \"credentials.json\"\n",
    )?;
    ResolvedConfig::load_with_env(&config_path, |_| None)
}

#[tokio::test]
async fn logout_removes_profile_and_session_file() -> Result<()> {
    let dir = TempDir::new()?;
    let config = config(&dir)?;

    let profile = config.profile_dir();
    std::fs::create_dir_all(profile.join("Default"))?;
    std::fs::write(profile.join("Default").join("Cookies"), b"sqlite")?;
    SessionCache::with_path(config.session_file())
        .set(&SessionData::new().with_token("t").with_cookie("a", "b"))?;

    let service = ElbaService::new(config.clone(), NoLogin);
    let report = service.logout()?;
    assert!(report.removed_session);
    assert!(report.removed_profile);
    assert!(!config.session_file().exists());
    assert!(!profile.exists());

    let status = service.status().await?;
    assert!(!status.logged_in);
    assert!(!status.profile_exists);
    Ok(())
}

#[tokio::test]
async fn logout_without_state_succeeds() -> Result<()> {
    let dir = TempDir::new()?;
    let service = ElbaService::new(config(&dir)?, NoLogin);

    let report = service.logout()?;
    assert!(!report.removed_anything());
    Ok(())
}
