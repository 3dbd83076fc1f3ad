//! Classify a reconciliation pass from its pre/post snapshots.

use std::collections::{BTreeMap, HashSet};

use serde_json::Value;

use crate::events::ticket::{ChangeContext, FieldChange, TicketNotification, TicketUpdates};
use crate::models::comment::Comment;
use crate::models::ticket::Ticket;

/// Bookkeeping timestamps; they change on every remote touch.
const IGNORED_FIELDS: &[&str] = &["created_at", "updated_at"];

pub fn detect_new_ticket(context: &ChangeContext) -> bool {
    context.is_new_ticket
}

/// Comments present after the pass but not before, in canonical order.
pub fn detect_new_comments(context: &ChangeContext) -> Vec<Comment> {
    if context.is_new_ticket || context.post_comments.len() <= context.pre_comments.len() {
        return Vec::new();
    }
    let seen: HashSet<i64> = context.pre_comments.iter().map(|c| c.zendesk_id).collect();
    context
        .post_comments
        .iter()
        .filter(|c| !seen.contains(&c.zendesk_id))
        .cloned()
        .collect()
}

/// Top-level ticket fields whose serialized value changed.
pub fn detect_updated_fields(context: &ChangeContext) -> BTreeMap<String, FieldChange> {
    if context.is_new_ticket {
        return BTreeMap::new();
    }
    match &context.pre_ticket {
        Some(pre) => diff_tickets(pre, &context.post_ticket),
        None => BTreeMap::new(),
    }
}

fn diff_tickets(pre: &Ticket, post: &Ticket) -> BTreeMap<String, FieldChange> {
    let (Value::Object(old), Value::Object(new)) = (to_value(pre), to_value(post)) else {
        return BTreeMap::new();
    };
    new.into_iter()
        .filter(|(field, _)| !IGNORED_FIELDS.contains(&field.as_str()))
        .filter_map(|(field, new_value)| {
            let old_value = old.get(&field).cloned().unwrap_or(Value::Null);
            (old_value != new_value).then(|| {
                (
                    field,
                    FieldChange {
                        old: old_value,
                        new: new_value,
                    },
                )
            })
        })
        .collect()
}

fn to_value(ticket: &Ticket) -> Value {
    // Ticket holds only plain data, so serialization cannot fail
    serde_json::to_value(ticket).unwrap_or(Value::Null)
}

/// Run every detector and build the single notification for this pass.
pub fn classify(context: ChangeContext) -> TicketNotification {
    let ticket = context.post_ticket.clone();
    if detect_new_ticket(&context) {
        return TicketNotification::TicketCreated { ticket, context };
    }
    let updates = TicketUpdates {
        new_comments: detect_new_comments(&context),
        updated_fields: detect_updated_fields(&context),
    };
    TicketNotification::TicketUpdated {
        ticket,
        updates,
        context,
    }
}
