//! Interactive authentication against the ELBA portal.
//!
//! Logging in requires a pushTAN approval on the user's phone, so a real
//! login always goes through a browser ([`BrowserAuthenticator`]). Everything
//! that only inspects state (page classification, token parsing) lives in
//! plain modules so it can be tested without Chromium.

#[cfg(feature = "browser")]
mod browser;
pub mod page;
pub mod token;

#[cfg(feature = "browser")]
pub use browser::{find_chrome, BrowserAuthenticator};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::credentials::SessionData;

/// SSO login entry point.
pub const LOGIN_URL: &str = "https://sso.raiffeisen.at/mein-login/identify";
/// Products dashboard reached after a successful login.
pub const DASHBOARD_URL: &str =
    "https://mein.elba.raiffeisen.at/bankingws-widgetsystem/meine-produkte/dashboard";
/// Host of the banking application.
pub const BANKING_HOST: &str = "mein.elba.raiffeisen.at";

/// Authentication status of a cached session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStatus {
    /// Session has a token and can be tried
    Valid,
    /// No session exists
    Missing,
    /// Session exists but is unusable
    Expired { reason: String },
}

/// Check a cached session without touching the network.
///
/// The bank does not publish token lifetimes, so a session with a token is
/// reported as valid until the API rejects it.
pub fn session_status(session: Option<&SessionData>) -> AuthStatus {
    match session {
        None => AuthStatus::Missing,
        Some(session) if session.has_token() => AuthStatus::Valid,
        Some(_) => AuthStatus::Expired {
            reason: "No bearer token in cached session".to_string(),
        },
    }
}

/// Age of a session relative to `now`, if its capture time is known.
pub fn session_age(session: &SessionData, now: DateTime<Utc>) -> Option<chrono::Duration> {
    session
        .captured_at
        .map(|captured| chrono::Duration::seconds((now.timestamp() - captured).max(0)))
}

/// Produces fresh sessions. The browser flow implements this; tests supply mocks.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Check a cached session. The default looks at the token only.
    async fn check_auth(&self, session: Option<&SessionData>) -> Result<AuthStatus> {
        Ok(session_status(session))
    }

    /// Perform an interactive login and return the captured session.
    async fn login(&self) -> Result<SessionData>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_reflects_token_presence() {
        assert_eq!(session_status(None), AuthStatus::Missing);
        assert_eq!(
            session_status(Some(&SessionData::new().with_token("t"))),
            AuthStatus::Valid
        );
        assert!(matches!(
            session_status(Some(&SessionData::new().with_cookie("a", "b"))),
            AuthStatus::Expired { .. }
        ));
    }

    #[test]
    fn age_is_never_negative() {
        let now = DateTime::from_timestamp(1_000, 0).unwrap();
        let mut session = SessionData::new();
        assert_eq!(session_age(&session, now), None);

        session.captured_at = Some(400);
        assert_eq!(session_age(&session, now), Some(chrono::Duration::seconds(600)));

        session.captured_at = Some(2_000);
        assert_eq!(session_age(&session, now), Some(chrono::Duration::zero()));
    }
}
