//! zendesk.event: Ledger entry for one inbound webhook delivery.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::zendesk_events;

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = zendesk_events)]
pub struct Event {
    pub id: i64,
    /// Request body as received, truncated to the configured cap.
    pub raw_data: Vec<u8>,
    pub payload_sha256: String,
    pub json: Option<serde_json::Value>,
    pub remote_ticket_id: Option<i64>,
    /// Set once processing resolved the delivery to a local ticket.
    pub ticket_id: Option<i64>,
    /// Full error chain when processing failed; `None` on success or
    /// before processing.
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    pub fn processing_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Insertable)]
#[diesel(table_name = zendesk_events)]
pub struct NewEvent {
    pub raw_data: Vec<u8>,
    pub payload_sha256: String,
    pub json: Option<serde_json::Value>,
    pub remote_ticket_id: Option<i64>,
}

/// Outcome written back to an event once processing finishes.
#[derive(Debug, Clone, PartialEq, AsChangeset)]
#[diesel(table_name = zendesk_events, treat_none_as_null = true)]
pub struct EventOutcome {
    pub ticket_id: Option<i64>,
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}
