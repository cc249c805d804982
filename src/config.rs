use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::duration::{deserialize_duration, serialize_duration};

pub const DEFAULT_BASE_URL: &str = "https://mein.elba.raiffeisen.at";

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/26.3 Safari/605.1.15";

fn default_true() -> bool {
    true
}

/// Default time to wait for pushTAN approval (2 minutes).
fn default_approval_timeout() -> Duration {
    Duration::from_secs(2 * 60)
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_transaction_limit() -> u32 {
    3001
}

/// Browser settings for the login flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    /// Run Chromium without a window. `--visible` overrides this.
    #[serde(default = "default_true")]
    pub headless: bool,

    /// Explicit Chrome/Chromium binary. Searched on PATH when unset.
    pub chrome_path: Option<PathBuf>,

    /// How long to wait for the pushTAN approval on the phone.
    #[serde(
        default = "default_approval_timeout",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub approval_timeout: Duration,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_path: None,
            approval_timeout: default_approval_timeout(),
        }
    }
}

/// HTTP API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum number of transactions requested per query.
    #[serde(default = "default_transaction_limit")]
    pub transaction_limit: u32,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            transaction_limit: default_transaction_limit(),
        }
    }
}

/// Contents of `elba.toml`. Every key is optional.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Session cache and browser profile location.
    pub state_dir: Option<PathBuf>,

    /// JSON (or legacy dotenv) credentials file.
    pub credentials_file: Option<PathBuf>,

    /// Root directory that output files must stay within.
    pub workspace_dir: Option<PathBuf>,

    /// Open the browser and log in when no valid session is cached.
    #[serde(default = "default_true")]
    pub auto_login: bool,

    /// Keep the raw products payload under `<state_dir>/debug`.
    #[serde(default = "default_true")]
    pub save_raw_payloads: bool,

    pub browser: BrowserSettings,

    pub api: ApiSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            state_dir: None,
            credentials_file: None,
            workspace_dir: None,
            auto_login: true,
            save_raw_payloads: true,
            browser: BrowserSettings::default(),
            api: ApiSettings::default(),
        }
    }
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load config from a file, or return the defaults if it doesn't exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}

/// Configuration with every path resolved to an absolute location.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub state_dir: PathBuf,
    pub credentials_file: PathBuf,
    pub workspace_dir: PathBuf,
    pub auto_login: bool,
    pub save_raw_payloads: bool,
    pub browser: BrowserSettings,
    pub api: ApiSettings,
}

/// Returns the default config file path.
///
/// Resolution order:
/// 1. `./elba.toml` if it exists in the current directory
/// 2. `~/.config/elba/elba.toml` (XDG config directory)
pub fn default_config_path() -> PathBuf {
    let local_config = PathBuf::from("elba.toml");
    if local_config.exists() {
        return local_config;
    }

    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("elba").join("elba.toml");
    }

    local_config
}

fn default_state_dir() -> Result<PathBuf> {
    Ok(dirs::data_dir()
        .context("Could not find data directory")?
        .join("elba"))
}

fn default_credentials_file() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .context("Could not find config directory")?
        .join("elba")
        .join("credentials.json"))
}

/// Expand a leading `~/` and resolve relative paths against `base`.
fn resolve_path(path: &Path, base: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

impl ResolvedConfig {
    /// Load `config_path` (if present) and apply `ELBA_*` environment overrides.
    pub fn load(config_path: &Path) -> Result<Self> {
        Self::load_with_env(config_path, |key| std::env::var(key).ok())
    }

    /// Like [`ResolvedConfig::load`] with an injectable environment lookup.
    pub fn load_with_env(
        config_path: &Path,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to get current directory")?;
        let config_path = resolve_path(config_path, &cwd);
        let config = Config::load_or_default(&config_path)?;

        let config_dir = config_path
            .parent()
            .context("Config path has no parent directory")?
            .to_path_buf();

        let state_dir = match &config.state_dir {
            Some(dir) => resolve_path(dir, &config_dir),
            None => default_state_dir()?,
        };
        let credentials_file = match &config.credentials_file {
            Some(file) => resolve_path(file, &config_dir),
            None => default_credentials_file()?,
        };
        let workspace_dir = match &config.workspace_dir {
            Some(dir) => resolve_path(dir, &config_dir),
            None => cwd.clone(),
        };

        let mut resolved = Self {
            state_dir,
            credentials_file,
            workspace_dir,
            auto_login: config.auto_login,
            save_raw_payloads: config.save_raw_payloads,
            browser: config.browser,
            api: config.api,
        };
        resolved.apply_env(&cwd, env);
        Ok(resolved)
    }

    fn apply_env(&mut self, cwd: &Path, env: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        if let Some(dir) = non_empty("ELBA_STATE_DIR") {
            self.state_dir = resolve_path(Path::new(&dir), cwd);
        }
        if let Some(file) = non_empty("ELBA_CREDENTIALS_FILE") {
            self.credentials_file = resolve_path(Path::new(&file), cwd);
        }
        if let Some(dir) = non_empty("ELBA_WORKSPACE") {
            self.workspace_dir = resolve_path(Path::new(&dir), cwd);
        }
        if let Some(chrome) = non_empty("ELBA_CHROME") {
            self.browser.chrome_path = Some(PathBuf::from(chrome));
        }
    }

    /// Persistent Chromium profile.
    pub fn profile_dir(&self) -> PathBuf {
        self.state_dir.join("profile")
    }

    /// Cached token, cookies and session URL.
    pub fn session_file(&self) -> PathBuf {
        self.state_dir.join("session.json")
    }

    /// Raw API payload dumps.
    pub fn debug_dir(&self) -> PathBuf {
        self.state_dir.join("debug")
    }
}
