//! Change notifications emitted after a ticket is reconciled.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::comment::Comment;
use crate::models::ticket::Ticket;

/// Pre/post snapshots of one reconciliation pass.
///
/// Carried on every notification so subscribers can diff whatever the
/// built-in detectors don't look at (tags, individual custom fields, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeContext {
    pub pre_ticket: Option<Ticket>,
    pub post_ticket: Ticket,
    pub pre_comments: Vec<Comment>,
    pub post_comments: Vec<Comment>,
    /// The row was created by this pass and the ticket has no comments yet.
    pub is_new_ticket: bool,
}

impl ChangeContext {
    pub fn new(
        pre_ticket: Option<Ticket>,
        post_ticket: Ticket,
        pre_comments: Vec<Comment>,
        post_comments: Vec<Comment>,
        created: bool,
    ) -> Self {
        // a ticket seen for the first time with replies already on it is
        // reported as an update carrying those replies
        let is_new_ticket = created && post_comments.is_empty();
        Self {
            pre_ticket,
            post_ticket,
            pre_comments,
            post_comments,
            is_new_ticket,
        }
    }
}

/// Old and new value of a changed ticket field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub old: serde_json::Value,
    pub new: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TicketUpdates {
    /// Comments absent before this pass, in canonical order.
    pub new_comments: Vec<Comment>,
    pub updated_fields: BTreeMap<String, FieldChange>,
}

impl TicketUpdates {
    pub fn is_empty(&self) -> bool {
        self.new_comments.is_empty() && self.updated_fields.is_empty()
    }
}

/// Exactly one of these is emitted per successful reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TicketNotification {
    TicketCreated {
        ticket: Ticket,
        context: ChangeContext,
    },
    TicketUpdated {
        ticket: Ticket,
        updates: TicketUpdates,
        context: ChangeContext,
    },
}

impl TicketNotification {
    pub fn ticket(&self) -> &Ticket {
        match self {
            Self::TicketCreated { ticket, .. } | Self::TicketUpdated { ticket, .. } => ticket,
        }
    }

    pub fn context(&self) -> &ChangeContext {
        match self {
            Self::TicketCreated { context, .. } | Self::TicketUpdated { context, .. } => context,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::TicketCreated { .. } => "created",
            Self::TicketUpdated { .. } => "updated",
        }
    }
}
