//! ELBA JSON API client using raw HTTP requests.
//!
//! The client replays the bearer token and cookies harvested from a browser
//! session (see [`crate::auth`]) against the portal's internal REST
//! endpoints. It does not log in by itself: an expired token surfaces as
//! [`ElbaError::SessionExpired`] and the caller decides whether to re-authenticate.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::ApiSettings;
use crate::credentials::SessionData;
use crate::error::ElbaError;
use crate::models::{Document, DocumentList, Product, Transaction};

const PRODUCTS_PATH: &str = "/api/bankingws-widgetsystem/bankingws-ui/rest/produkte";
const TRANSACTIONS_PATH: &str = "/api/bankingzv-umsatz/umsatz-ui/rest/kontoumsaetze";
const PORTFOLIO_PATH: &str =
    "/api/bankingwp-depotzentrale/depotzentrale-ui/rest/positionsuebersicht";
const DOCUMENTS_PATH: &str = "/api/bankingquer-dokumentenablage/dokumentenablage-ui/rest/dokumente";

/// Page size of the documents filter endpoint.
pub const DOCUMENT_PAGE_SIZE: usize = 50;

/// Longest error body echoed back in [`ElbaError::Api`].
const MAX_ERROR_BODY: usize = 500;

/// ELBA API client.
pub struct ElbaClient {
    client: Client,
    base_url: String,
    session: SessionData,
}

#[derive(Debug, Deserialize)]
struct TransactionsResponse {
    #[serde(default)]
    kontoumsaetze: Vec<Transaction>,
}

impl ElbaClient {
    /// Create a client for `session` using the configured base URL and user agent.
    pub fn new(settings: &ApiSettings, session: SessionData) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&settings.user_agent)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            session,
        })
    }

    /// Point the client at a different host (used by tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn session(&self) -> &SessionData {
        &self.session
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let token = self
            .session
            .token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or(ElbaError::SessionExpired)?;

        let mut req = self
            .client
            .request(method, self.url(path))
            .header("accept", "application/json, text/plain, */*")
            .header("authorization", format!("Bearer {token}"));

        if !self.session.cookies.is_empty() {
            req = req.header("cookie", self.session.cookie_header());
        }
        Ok(req)
    }

    /// Send the request and map failure statuses onto [`ElbaError`].
    async fn send(&self, req: RequestBuilder) -> Result<Response> {
        let response = req
            .send()
            .await
            .map_err(|e| ElbaError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        match status {
            StatusCode::UNAUTHORIZED => Err(ElbaError::SessionExpired.into()),
            StatusCode::SERVICE_UNAVAILABLE => Err(ElbaError::ServiceUnavailable.into()),
            _ => {
                let body = response.text().await.unwrap_or_default();
                let body: String = body.chars().take(MAX_ERROR_BODY).collect();
                Err(ElbaError::Api { status, body }.into())
            }
        }
    }

    async fn request<T: for<'de> Deserialize<'de>>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<T> {
        let mut req = self.authorized(method, path)?;
        if let Some(body) = body {
            req = req.json(body);
        }

        let response = self.send(req).await?;
        let body = response
            .text()
            .await
            .map_err(|e| ElbaError::Network(e.to_string()))?;
        serde_json::from_str(&body)
            .with_context(|| format!("Failed to parse JSON response from {path}"))
    }

    /// Fetch all banking products. Returns the parsed products and the raw payload.
    pub async fn get_products(&self) -> Result<(Vec<Product>, Value)> {
        let raw: Value = self
            .request(
                Method::GET,
                &format!("{PRODUCTS_PATH}?skipImages=true"),
                None,
            )
            .await?;

        let products = Vec::<Product>::deserialize(&raw).context("Unexpected products payload")?;
        tracing::debug!(count = products.len(), "Fetched products");
        Ok((products, raw))
    }

    /// Fetch booked and pending transactions of one account, inclusive of both dates.
    pub async fn get_transactions(
        &self,
        iban: &str,
        from: NaiveDate,
        until: NaiveDate,
        limit: u32,
    ) -> Result<Vec<Transaction>> {
        let body = transactions_request(iban, from, until, limit);
        let response: TransactionsResponse = self
            .request(Method::POST, TRANSACTIONS_PATH, Some(&body))
            .await?;
        Ok(response.kontoumsaetze)
    }

    /// Positions overview of a depot, optionally as of `date`.
    pub async fn get_portfolio(&self, depot_id: &str, date: Option<NaiveDate>) -> Result<Value> {
        let mut path = format!("{PORTFOLIO_PATH}/{}", urlencoding::encode(depot_id));
        if let Some(date) = date {
            path.push_str(&format!("/{}", date.format("%Y-%m-%d")));
        }
        self.request(Method::GET, &path, None).await
    }

    /// One page of mailbox documents created between `from` and `until`.
    pub async fn list_documents_page(
        &self,
        from: NaiveDate,
        until: NaiveDate,
        skip: usize,
    ) -> Result<Vec<Document>> {
        let body = json!({
            "von": format!("{}T00:00:00", from.format("%Y-%m-%d")),
            "bis": format!("{}T00:00:00", until.format("%Y-%m-%d")),
            "skip": skip,
            "limit": DOCUMENT_PAGE_SIZE,
        });
        let list: DocumentList = self
            .request(Method::POST, &format!("{DOCUMENTS_PATH}/filter"), Some(&body))
            .await?;
        Ok(list.into_documents())
    }

    /// All mailbox documents in the date range, following pagination until a short page.
    pub async fn list_documents(&self, from: NaiveDate, until: NaiveDate) -> Result<Vec<Document>> {
        let mut documents = Vec::new();
        loop {
            let page = self
                .list_documents_page(from, until, documents.len())
                .await?;
            let page_len = page.len();
            documents.extend(page);

            tracing::debug!(page_len, total = documents.len(), "Fetched documents page");
            if page_len < DOCUMENT_PAGE_SIZE {
                break;
            }
        }
        Ok(documents)
    }

    /// Download the PDF bytes of a document.
    pub async fn download_document(&self, document: &Document) -> Result<Vec<u8>> {
        let segments = document
            .download_segments()
            .context("Document has no systemId/dokumentenId")?;
        let path = segments
            .iter()
            .map(|s| urlencoding::encode(s).into_owned())
            .collect::<Vec<_>>()
            .join("/");

        let req = self
            .authorized(Method::POST, &format!("{DOCUMENTS_PATH}/{path}/download"))?
            .json(&json!({}));
        let response = self.send(req).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ElbaError::Network(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// Request body of the transactions search.
pub fn transactions_request(iban: &str, from: NaiveDate, until: NaiveDate, limit: u32) -> Value {
    json!({
        "predicate": {
            "buchungVon": format!("{}T00:00:00.000", from.format("%Y-%m-%d")),
            "buchungBis": format!("{}T23:59:59.999", until.format("%Y-%m-%d")),
            "neuanlageBis": null,
            "idBis": null,
            "betragVon": null,
            "betragBis": null,
            "betragsrichtung": "BEIDE",
            "kategorieCodes": null,
            "kategorieCodesNotIn": false,
            "hashtags": null,
            "ibans": [iban],
            "pending": true,
            "folgenummernKarteByIban": null,
        },
        "limit": limit,
    })
}
