//! Error vocabulary shared by the client, the login flow and the CLI.
//!
//! Most code returns `anyhow::Result` and attaches context as it goes. The
//! variants here mark the failures the user needs to act on differently, and
//! the CLI maps them to distinct exit codes via [`exit_code`].

use std::path::PathBuf;
use std::time::Duration;

use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum ElbaError {
    #[error("Credentials not found. Set ELBA_ID and ELBA_PIN or run `elba setup`.")]
    MissingCredentials,

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("Chrome/Chromium not found. Install it or set ELBA_CHROME.")]
    BrowserNotFound,

    #[error("Timed out after {}s waiting for pushTAN approval", .0.as_secs())]
    ApprovalTimeout(Duration),

    #[error("Login rejected: {0}")]
    LoginRejected(String),

    #[error("Could not extract a bearer token from the browser session")]
    TokenNotFound,

    #[error("No session found. Run `elba login` first.")]
    NotLoggedIn,

    #[error("Session expired. Run `elba login` to log in again.")]
    SessionExpired,

    #[error("ELBA is temporarily unavailable (503). Please try again later.")]
    ServiceUnavailable,

    #[error("API request failed ({status}): {body}")]
    Api { status: StatusCode, body: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Refusing to write outside the workspace: {}", .0.display())]
    UnsafeOutputPath(PathBuf),

    #[error("{0}")]
    InvalidArgument(String),
}

impl ElbaError {
    /// Process exit code for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            ElbaError::MissingCredentials | ElbaError::InvalidCredentials(_) => 2,
            ElbaError::BrowserNotFound
            | ElbaError::ApprovalTimeout(_)
            | ElbaError::LoginRejected(_)
            | ElbaError::TokenNotFound => 3,
            ElbaError::NotLoggedIn | ElbaError::SessionExpired => 4,
            ElbaError::ServiceUnavailable | ElbaError::Api { .. } | ElbaError::Network(_) => 5,
            ElbaError::UnsafeOutputPath(_) | ElbaError::InvalidArgument(_) => 64,
        }
    }
}

/// Find the first [`ElbaError`] in an error chain.
pub fn find_elba_error(err: &anyhow::Error) -> Option<&ElbaError> {
    err.chain().find_map(|cause| cause.downcast_ref::<ElbaError>())
}

/// Whether the error chain contains an expired-session failure.
pub fn is_session_expired(err: &anyhow::Error) -> bool {
    matches!(find_elba_error(err), Some(ElbaError::SessionExpired))
}

/// Exit code for an arbitrary error chain; `1` when no typed error is present.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    find_elba_error(err).map(ElbaError::exit_code).unwrap_or(1)
}
