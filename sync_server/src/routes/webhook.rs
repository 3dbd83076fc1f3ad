//! Zendesk webhook handler: authenticate, store, process.
//!
//! Responses: 403 bad secret (nothing stored), 400 unusable payload (stored),
//! 500 processing failed (stored with its error), 200 processed.

use axum::body::Bytes;
use axum::http::{header, HeaderMap, StatusCode};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use super::SyncRouterState;
use crate::error::ValidationError;

type HmacSha256 = Hmac<Sha256>;

/// The shared secret, from the query string or a form-encoded body.
#[derive(Debug, Default, Deserialize)]
pub struct SecretParams {
    pub secret: Option<String>,
}

/// Handle an incoming Zendesk webhook delivery.
pub async fn handle_webhook(
    state: &SyncRouterState,
    query: SecretParams,
    headers: &HeaderMap,
    body: Bytes,
) -> (StatusCode, String) {
    let secret = query.secret.or_else(|| form_secret(headers, &body));
    if !validate_secret(&state.webhook_secret, secret.as_deref()) {
        tracing::warn!("Webhook secret validation failed");
        return (StatusCode::FORBIDDEN, "Forbidden".to_string());
    }

    let event = match state.ledger.store(&body).await {
        Ok(event) => event,
        Err(e) => {
            return match e.downcast_ref::<ValidationError>() {
                Some(validation) => (StatusCode::BAD_REQUEST, validation.to_string()),
                None => {
                    tracing::error!("Failed to store webhook event: {e:#}");
                    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
                }
            };
        }
    };

    // processing runs detached so a dropped request still records the
    // event's outcome and releases the ticket lock
    let ledger = state.ledger.clone();
    let processing = tokio::spawn(async move { ledger.begin_processing(&event).await });
    match processing.await {
        Ok(Ok(_)) => (StatusCode::OK, "OK".to_string()),
        Ok(Err(_)) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string()),
        Err(e) => {
            tracing::error!("Webhook processing task failed: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
        }
    }
}

fn form_secret(headers: &HeaderMap, body: &[u8]) -> Option<String> {
    let content_type = headers.get(header::CONTENT_TYPE)?.to_str().ok()?;
    if !content_type.starts_with("application/x-www-form-urlencoded") {
        return None;
    }
    serde_urlencoded::from_bytes::<SecretParams>(body)
        .ok()?
        .secret
}

/// Compare the presented secret against the configured one in constant time.
///
/// Both sides are MACed under the configured secret so the comparison
/// runs over fixed-length tags.
pub fn validate_secret(expected: &str, given: Option<&str>) -> bool {
    let Some(given) = given else {
        return false;
    };
    if expected.is_empty() {
        return false;
    }

    let tag = |value: &str| {
        HmacSha256::new_from_slice(expected.as_bytes()).map(|mut mac| {
            mac.update(value.as_bytes());
            mac
        })
    };
    let (Ok(given_mac), Ok(expected_mac)) = (tag(given), tag(expected)) else {
        return false;
    };
    given_mac
        .verify_slice(&expected_mac.finalize().into_bytes())
        .is_ok()
}

/// Metric label for a webhook response.
pub fn outcome_label(status: StatusCode) -> &'static str {
    match status {
        StatusCode::OK => "processed",
        StatusCode::FORBIDDEN => "forbidden",
        StatusCode::BAD_REQUEST => "invalid",
        _ => "failed",
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::routes::sync_router;
    use crate::services::event_service::EventLedger;
    use crate::store::MemoryStore;
    use crate::testing::{self, FakeRemote, RecordingSubscriber};

    struct App {
        store: Arc<MemoryStore>,
        remote: Arc<FakeRemote>,
        router: axum::Router,
    }

    fn app(secret: &str) -> App {
        app_with_remote(secret, FakeRemote::new())
    }

    fn app_with_remote(secret: &str, remote: FakeRemote) -> App {
        let store = Arc::new(MemoryStore::new());
        let remote = Arc::new(remote);
        let sync = testing::ticket_sync(&store, &remote, Arc::new(RecordingSubscriber::default()));
        let ledger = EventLedger::new(store.clone(), Arc::new(sync), 64 * 1024);
        let router = sync_router(SyncRouterState {
            ledger: Arc::new(ledger),
            webhook_secret: Arc::from(secret),
        });
        App {
            store,
            remote,
            router,
        }
    }

    async fn post(router: axum::Router, uri: &str, body: &'static str) -> (StatusCode, String) {
        let response = router
            .oneshot(
                Request::post(uri)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[test]
    fn secret_comparison() {
        assert!(validate_secret("s3cret", Some("s3cret")));
        assert!(!validate_secret("s3cret", Some("s3cre")));
        assert!(!validate_secret("s3cret", None));
        assert!(!validate_secret("", Some("")));
    }

    #[tokio::test]
    async fn wrong_secret_is_forbidden_and_not_stored() {
        let app = app("s3cret");
        let (status, _) = post(app.router, "/webhook?secret=nope", r#"{"id": 1}"#).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(app.store.events().await.is_empty());
    }

    #[tokio::test]
    async fn unconfigured_secret_rejects_everything() {
        let app = app("");
        let (status, _) = post(app.router, "/webhook?secret=", r#"{"id": 1}"#).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn malformed_body_is_a_bad_request_with_a_stored_event() {
        let app = app("s3cret");
        let (status, message) = post(app.router, "/webhook?secret=s3cret", "{{nope").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(message, ValidationError::DataMalformed.to_string());
        assert_eq!(app.store.events().await.len(), 1);
    }

    #[tokio::test]
    async fn missing_ticket_id_is_a_bad_request() {
        let app = app("s3cret");
        let (status, message) = post(app.router, "/webhook?secret=s3cret", "{}").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(message, ValidationError::NoTicketId.to_string());
        assert_eq!(app.store.events().await.len(), 1);
    }

    #[tokio::test]
    async fn processing_failure_is_a_server_error_recorded_on_the_event() {
        let app = app("s3cret");
        let (status, _) = post(app.router, "/webhook?secret=s3cret", r#"{"id": 123}"#).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let events = app.store.events().await;
        assert!(events[0].error.is_some());
    }

    #[tokio::test]
    async fn valid_delivery_syncs_the_ticket() {
        let app = app("s3cret");
        app.remote.put_ticket(testing::remote_ticket(123, 1));
        let (status, message) =
            post(app.router, "/webhook?secret=s3cret", r#"{"id": "123"}"#).await;
        assert_eq!((status, message.as_str()), (StatusCode::OK, "OK"));
        assert_eq!(app.store.ticket_count().await, 1);
        assert!(app.store.events().await[0].processing_ok());
    }

    #[tokio::test]
    async fn dropped_request_still_records_the_outcome() {
        let remote = FakeRemote::new().with_fetch_delay(Duration::from_millis(200));
        let app = app_with_remote("s3cret", remote);
        app.remote.put_ticket(testing::remote_ticket(123, 1));

        let request = post(app.router, "/webhook?secret=s3cret", r#"{"id": 123}"#);
        // the client gives up while the ticket fetch is still in flight
        assert!(tokio::time::timeout(Duration::from_millis(50), request)
            .await
            .is_err());

        tokio::time::sleep(Duration::from_millis(500)).await;
        let events = app.store.events().await;
        assert_eq!(events.len(), 1);
        assert!(events[0].ticket_id.is_some(), "outcome never recorded");
        assert!(events[0].processing_ok());
    }

    #[tokio::test]
    async fn secret_may_come_from_a_form_body() {
        let app = app("s3cret");
        let response = app
            .router
            .oneshot(
                Request::post("/webhook")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from("secret=s3cret"))
                    .unwrap(),
            )
            .await
            .unwrap();
        // authenticated, but a form body is not a JSON ticket payload
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(app.store.events().await.len(), 1);
    }
}
