//! zendesk.ticket: Local mirror of a Zendesk ticket.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use super::text_enum;
use crate::schema::zendesk_tickets;

text_enum! {
    pub enum TicketStatus ("ticket status") {
        New => "new",
        Open => "open",
        Pending => "pending",
        Hold => "hold",
        Solved => "solved",
        Closed => "closed",
    }
}

text_enum! {
    pub enum TicketPriority ("ticket priority") {
        Urgent => "urgent",
        High => "high",
        Normal => "normal",
        Low => "low",
    }
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = zendesk_tickets)]
pub struct Ticket {
    pub id: i64,
    pub zendesk_id: i64,
    /// Local id of the requesting [`ZendeskUser`](super::user::ZendeskUser).
    pub requester_id: i64,
    pub subject: Option<String>,
    pub url: Option<String>,
    pub status: TicketStatus,
    pub priority: Option<TicketPriority>,
    // custom fields and tags are kept as delivered, uninterpreted
    pub custom_fields: Option<serde_json::Value>,
    pub tags: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Mirrored ticket fields as delivered by the remote.
///
/// `priority: None` means the remote omitted it; an existing local priority
/// is then kept rather than nulled.
#[derive(Debug, Clone, PartialEq, Insertable)]
#[diesel(table_name = zendesk_tickets)]
pub struct NewTicket {
    pub zendesk_id: i64,
    pub requester_id: i64,
    pub subject: Option<String>,
    pub url: Option<String>,
    pub status: TicketStatus,
    pub priority: Option<TicketPriority>,
    pub custom_fields: Option<serde_json::Value>,
    pub tags: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl NewTicket {
    /// Overwrite the mirrored fields of an existing row in place.
    pub fn apply_to(&self, ticket: &mut Ticket) {
        ticket.requester_id = self.requester_id;
        ticket.subject = self.subject.clone();
        ticket.url = self.url.clone();
        ticket.status = self.status;
        if self.priority.is_some() {
            ticket.priority = self.priority;
        }
        ticket.custom_fields = self.custom_fields.clone();
        ticket.tags = self.tags.clone();
        ticket.created_at = self.created_at;
        ticket.updated_at = self.updated_at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_status_is_rejected() {
        assert_eq!("Open".parse::<TicketStatus>().unwrap(), TicketStatus::Open);
        let err = "escalated".parse::<TicketStatus>().unwrap_err();
        assert_eq!(err.value, "escalated");
        assert!("meh".parse::<TicketPriority>().is_err());
    }

    #[test]
    fn status_serializes_as_lowercase_text() {
        let json = serde_json::to_value(TicketStatus::Hold).unwrap();
        assert_eq!(json, serde_json::json!("hold"));
    }
}
