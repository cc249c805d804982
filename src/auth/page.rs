//! Classification of the login page while waiting for the pushTAN approval.

use serde::Deserialize;

use super::BANKING_HOST;

/// Snapshot of the page, produced by [`PROBE_JS`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageProbe {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    /// Visible text of the body.
    #[serde(default)]
    pub text: String,
    /// Text of `div#error_message` when it is visible.
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Collects [`PageProbe`] fields in the browser.
pub const PROBE_JS: &str = r#"(() => {
  const visible = (el) => !!el && !!(el.offsetWidth || el.offsetHeight || el.getClientRects().length);
  const err = document.querySelector('div#error_message');
  return {
    url: location.href,
    title: document.title || '',
    text: document.body ? document.body.innerText : '',
    errorMessage: visible(err) ? (err.innerText || '').trim() : null,
  };
})()"#;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageState {
    /// The banking application is loaded.
    LoggedIn,
    /// The bank answered with a 503 page.
    ServiceUnavailable,
    /// The SSO session timed out ("Session expired" / "Page Expired").
    SessionExpired,
    /// The bank rejected the login with a message.
    Rejected(String),
    /// Still waiting.
    Pending,
}

impl PageProbe {
    pub fn is_banking_host(&self) -> bool {
        self.url.contains(BANKING_HOST)
    }

    /// Whether the browser was sent back to the SSO login.
    pub fn is_login_page(&self) -> bool {
        self.url.contains("sso.raiffeisen.at") || self.url.contains("mein-login")
    }

    pub fn state(&self) -> PageState {
        if self.text.contains("Service Unavailable") || self.title.contains("503") {
            return PageState::ServiceUnavailable;
        }
        if self.is_banking_host() {
            return PageState::LoggedIn;
        }
        if self.text.contains("Session expired") || self.text.contains("Page Expired") {
            return PageState::SessionExpired;
        }
        if self.text.contains("Invalid signature data") {
            return PageState::Rejected("Invalid signature data were entered".to_string());
        }
        if let Some(message) = self.error_message.as_deref().filter(|m| !m.is_empty()) {
            return PageState::Rejected(message.to_string());
        }
        PageState::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe(url: &str, title: &str, text: &str) -> PageProbe {
        PageProbe {
            url: url.to_string(),
            title: title.to_string(),
            text: text.to_string(),
            error_message: None,
        }
    }

    #[test]
    fn classifies_login_outcomes() {
        assert_eq!(
            probe("https://mein.elba.raiffeisen.at/x", "ELBA", "").state(),
            PageState::LoggedIn
        );
        assert_eq!(
            probe("https://sso.raiffeisen.at/", "503 Service", "").state(),
            PageState::ServiceUnavailable
        );
        assert_eq!(
            probe("https://sso.raiffeisen.at/", "", "Page Expired. Restart").state(),
            PageState::SessionExpired
        );
        assert!(matches!(
            probe("https://sso.raiffeisen.at/", "", "Invalid signature data").state(),
            PageState::Rejected(_)
        ));
        assert_eq!(
            probe("https://sso.raiffeisen.at/mein-login/push", "Login", "Bitte bestätigen").state(),
            PageState::Pending
        );
    }

    #[test]
    fn visible_error_message_rejects() {
        let mut p = probe("https://sso.raiffeisen.at/", "", "");
        p.error_message = Some("Verfügernummer oder PIN falsch".to_string());
        assert_eq!(
            p.state(),
            PageState::Rejected("Verfügernummer oder PIN falsch".to_string())
        );
    }

    #[test]
    fn probe_deserializes_from_script_result() {
        let p: PageProbe = serde_json::from_str(
            r#"{"url": "https://sso.raiffeisen.at/mein-login/identify", "title": "Login", "text": "", "errorMessage": null}"#,
        )
        .unwrap();
        assert!(p.is_login_page());
        assert!(!p.is_banking_host());
    }
}
