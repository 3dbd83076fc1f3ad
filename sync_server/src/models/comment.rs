//! zendesk.comment: A public reply or private note on a ticket.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::zendesk_comments;

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = zendesk_comments)]
pub struct Comment {
    pub id: i64,
    pub zendesk_id: i64,
    pub ticket_id: i64,
    pub author_id: i64,
    pub body: Option<String>,
    pub html_body: Option<String>,
    /// Absent for comment types without text, e.g. voice transcriptions.
    pub plain_body: Option<String>,
    pub public: bool,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    /// Canonical ordering key: creation time, then Zendesk id.
    pub fn sort_key(&self) -> (DateTime<Utc>, i64) {
        (self.created_at, self.zendesk_id)
    }
}

/// Sort comments into canonical order in place.
pub fn sort_canonical(comments: &mut [Comment]) {
    comments.sort_by_key(Comment::sort_key);
}

#[derive(Debug, Clone, PartialEq, Insertable, AsChangeset)]
#[diesel(table_name = zendesk_comments, treat_none_as_null = true)]
pub struct NewComment {
    pub zendesk_id: i64,
    pub ticket_id: i64,
    pub author_id: i64,
    pub body: Option<String>,
    pub html_body: Option<String>,
    pub plain_body: Option<String>,
    pub public: bool,
    pub created_at: DateTime<Utc>,
}
