//! Webhook event ledger: store every delivery, then process it.
//!
//! Each delivery becomes exactly one row before anything else can fail.
//! Processing records its outcome on that row, so a failed event shows the
//! full error chain and can be replayed later.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::ValidationError;
use crate::models::event::{Event, EventOutcome, NewEvent};
use crate::models::ticket::Ticket;
use crate::services::sync_service::TicketSync;
use crate::store::SyncStore;

pub struct EventLedger {
    store: Arc<dyn SyncStore>,
    sync: Arc<TicketSync>,
    max_payload_bytes: usize,
}

impl EventLedger {
    pub fn new(store: Arc<dyn SyncStore>, sync: Arc<TicketSync>, max_payload_bytes: usize) -> Self {
        Self {
            store,
            sync,
            max_payload_bytes,
        }
    }

    /// Persist a raw delivery.
    ///
    /// The row is written whether or not the body parses. A body that is not
    /// JSON, or lacks an integer ticket `id`, is stored and then reported as
    /// a [`ValidationError`] inside the returned error.
    pub async fn store(&self, raw: &[u8]) -> anyhow::Result<Event> {
        let parsed = parse_payload(raw);
        let (json, remote_ticket_id) = match &parsed {
            Ok((json, id)) => (Some(json.clone()), Some(*id)),
            Err((json, _)) => (json.clone(), None),
        };
        let raw_data = raw[..raw.len().min(self.max_payload_bytes)].to_vec();

        let event = self
            .store
            .insert_event(NewEvent {
                raw_data,
                payload_sha256: hex::encode(Sha256::digest(raw)),
                json,
                remote_ticket_id,
            })
            .await?;

        tracing::info!(
            event_id = event.id,
            remote_ticket_id = ?event.remote_ticket_id,
            bytes = raw.len(),
            "Webhook event stored"
        );

        match parsed {
            Ok(_) => Ok(event),
            Err((_, validation)) => {
                tracing::warn!(event_id = event.id, code = validation.code(), "{validation}");
                Err(validation.into())
            }
        }
    }

    /// Process a stored event and record the outcome on it.
    ///
    /// Success links the event to its local ticket and clears any earlier
    /// error. Failure stores the full error chain and returns the error.
    pub async fn begin_processing(&self, event: &Event) -> anyhow::Result<Ticket> {
        match self.process(event).await {
            Ok(ticket) => {
                self.store
                    .record_outcome(
                        event.id,
                        EventOutcome {
                            ticket_id: Some(ticket.id),
                            error: None,
                            updated_at: Utc::now(),
                        },
                    )
                    .await?;
                tracing::info!(event_id = event.id, ticket_id = ticket.id, "Event processed");
                Ok(ticket)
            }
            Err(e) => {
                crate::metrics::event_failed();
                tracing::error!(event_id = event.id, "Event processing failed: {e:#}");
                let recorded = self
                    .store
                    .record_outcome(
                        event.id,
                        EventOutcome {
                            ticket_id: event.ticket_id,
                            error: Some(format!("{e:?}")),
                            updated_at: Utc::now(),
                        },
                    )
                    .await;
                if let Err(record_err) = recorded {
                    tracing::error!(event_id = event.id, "Could not record failure: {record_err:#}");
                }
                Err(e)
            }
        }
    }

    async fn process(&self, event: &Event) -> anyhow::Result<Ticket> {
        let ticket_id = event.remote_ticket_id.ok_or(ValidationError::NoTicketId)?;
        self.sync.sync_ticket_id(ticket_id).await
    }

    /// Re-run processing for a stored event, e.g. after fixing the cause of
    /// an earlier failure.
    pub async fn replay(&self, event_id: i64) -> anyhow::Result<Ticket> {
        let event = self
            .store
            .get_event(event_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("event {event_id} not found"))?;
        tracing::info!(event_id, previously_failed = !event.processing_ok(), "Replaying event");
        self.begin_processing(&event).await
    }
}

/// Extract the JSON document and ticket id from a delivery.
///
/// On failure, returns whatever JSON could be parsed with the reason.
fn parse_payload(raw: &[u8]) -> Result<(Value, i64), (Option<Value>, ValidationError)> {
    let json: Value =
        serde_json::from_slice(raw).map_err(|_| (None, ValidationError::DataMalformed))?;
    match ticket_id(&json) {
        Some(id) => Ok((json, id)),
        None => Err((Some(json), ValidationError::NoTicketId)),
    }
}

/// Zendesk placeholders render `{{ticket.id}}` as a string, so integer
/// strings are accepted alongside numbers.
fn ticket_id(json: &Value) -> Option<i64> {
    match json.get("id")? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
