use anyhow::Result;
use chrono::NaiveDate;
use elba::api::{ElbaClient, DOCUMENT_PAGE_SIZE};
use elba::config::ApiSettings;
use elba::credentials::SessionData;
use elba::error::{find_elba_error, is_session_expired, ElbaError};
use elba::models::Document;
use serde_json::json;
use wiremock::matchers::{body_json, body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PRODUCTS_PATH: &str = "/api/bankingws-widgetsystem/bankingws-ui/rest/produkte";
const TRANSACTIONS_PATH: &str = "/api/bankingzv-umsatz/umsatz-ui/rest/kontoumsaetze";
const DOCUMENTS_PATH: &str = "/api/bankingquer-dokumentenablage/dokumentenablage-ui/rest/dokumente";

fn client(server: &MockServer) -> Result<ElbaClient> {
    let session = SessionData::new()
        .with_token("test-token")
        .with_cookie("XSRF-TOKEN", "x1")
        .with_cookie("JSESSIONID", "abc");
    Ok(ElbaClient::new(&ApiSettings::default(), session)?.with_base_url(server.uri()))
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[tokio::test]
async fn products_request_carries_session_headers() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(PRODUCTS_PATH))
        .and(query_param("skipImages", "true"))
        .and(header("authorization", "Bearer test-token"))
        .and(header("cookie", "JSESSIONID=abc; XSRF-TOKEN=x1"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"[{"type": "KONTO", "smallHeader": "Giro", "largeHeader": "Haushalt",
                 "uniqueId": "AT611904300234573201",
                 "details": {"betragKontoWaehrung": {"amount": 10.5, "currencyCode": "EUR"}}}]"#,
            "application/json",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let (products, raw) = client(&server)?.get_products().await?;
    assert_eq!(products.len(), 1);
    assert_eq!(products[0].identifier(), Some("AT611904300234573201"));
    assert_eq!(raw[0]["largeHeader"], "Haushalt");
    Ok(())
}

#[tokio::test]
async fn transactions_request_body_and_response() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(TRANSACTIONS_PATH))
        .and(body_partial_json(json!({
            "predicate": {
                "buchungVon": "2026-01-01T00:00:00.000",
                "buchungBis": "2026-01-31T23:59:59.999",
                "ibans": ["AT611904300234573201"],
                "betragsrichtung": "BEIDE",
                "pending": true
            },
            "limit": 3001
        })))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"{"kontoumsaetze": [
                {"id": 1, "buchungstag": "2026-01-05", "betrag": {"amount": -12.3, "currency": "EUR"}},
                {"id": 2, "buchungstag": "2026-01-07", "betrag": 99.0},
                {"id": "3", "kategorieCode": 7, "betrag": {"amount": -1.5, "currency": "EUR", "precision": 2}}
            ]}"#,
            "application/json",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let txs = client(&server)?
        .get_transactions("AT611904300234573201", date(2026, 1, 1), date(2026, 1, 31), 3001)
        .await?;
    assert_eq!(txs.len(), 3);
    assert_eq!(txs[0].id(), Some("1"));
    assert_eq!(txs[0].raw()["id"], 1);
    assert_eq!(txs[1].amount().and_then(|b| b.value()), Some(99.0));
    assert_eq!(txs[2].csv_record()[8], "7");
    assert_eq!(txs[2].raw()["betrag"]["precision"], 2);
    Ok(())
}

#[tokio::test]
async fn documents_are_paginated_until_short_page() -> Result<()> {
    let server = MockServer::start().await;

    let full_page: Vec<_> = (0..DOCUMENT_PAGE_SIZE)
        .map(|i| json!({"systemId": "DMS", "dokumentenId": format!("D{i}"), "dateiName": format!("Doc {i}")}))
        .collect();

    Mock::given(method("POST"))
        .and(path(format!("{DOCUMENTS_PATH}/filter")))
        .and(body_partial_json(json!({"skip": 0, "limit": 50, "von": "2026-01-01T00:00:00"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"dokumente": full_page})))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!("{DOCUMENTS_PATH}/filter")))
        .and(body_partial_json(json!({"skip": 50})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"systemId": "DMS", "dokumentenId": "LAST"}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let docs = client(&server)?
        .list_documents(date(2026, 1, 1), date(2026, 2, 1))
        .await?;
    assert_eq!(docs.len(), DOCUMENT_PAGE_SIZE + 1);
    assert_eq!(docs.last().and_then(|d| d.dokumenten_id.as_deref()), Some("LAST"));
    Ok(())
}

#[tokio::test]
async fn signed_documents_download_without_version_segment() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(format!("{DOCUMENTS_PATH}/EAZWIEN/D%201/download")))
        .and(body_json(json!({})))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.7".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let document = Document {
        system_id: Some("EAZWIEN".to_string()),
        dokumenten_id: Some("D 1".to_string()),
        versions_id: Some("3".to_string()),
        ..Default::default()
    };
    let bytes = client(&server)?.download_document(&document).await?;
    assert_eq!(bytes, b"%PDF-1.7");
    Ok(())
}

#[tokio::test]
async fn unauthorized_maps_to_session_expired() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(PRODUCTS_PATH))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = client(&server)?.get_products().await.unwrap_err();
    assert!(is_session_expired(&err));
    Ok(())
}

#[tokio::test]
async fn other_errors_keep_status_and_truncated_body() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(PRODUCTS_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("x".repeat(2000)))
        .mount(&server)
        .await;

    let err = client(&server)?.get_products().await.unwrap_err();
    match find_elba_error(&err) {
        Some(ElbaError::Api { status, body }) => {
            assert_eq!(status.as_u16(), 500);
            assert_eq!(body.len(), 500);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(elba::error::exit_code(&err), 5);
    Ok(())
}
