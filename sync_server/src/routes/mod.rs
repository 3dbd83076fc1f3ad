//! HTTP routes: the Zendesk webhook.

pub mod webhook;

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::services::event_service::EventLedger;

/// Shared state for route handlers.
#[derive(Clone)]
pub struct SyncRouterState {
    pub ledger: Arc<EventLedger>,
    pub webhook_secret: Arc<str>,
}

/// Build the sync server's Axum router (nested at `/zendesk`).
pub fn sync_router(state: SyncRouterState) -> Router {
    Router::new()
        .route("/webhook", post(webhook_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn webhook_handler(
    State(state): State<SyncRouterState>,
    Query(query): Query<webhook::SecretParams>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, String) {
    let (status, message) = webhook::handle_webhook(&state, query, &headers, body).await;
    crate::metrics::webhook_received(webhook::outcome_label(status));
    (status, message)
}
