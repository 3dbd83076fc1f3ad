//! Zendesk API boundary: the remote state we reconcile from.
//!
//! The sync core only sees the traits here; [`zendesk::ZendeskClient`] is the
//! production implementation.

pub mod zendesk;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RemoteError;
use crate::models::ticket::{TicketPriority, TicketStatus};
use crate::models::user::UserRole;

/// A Zendesk user as returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteUser {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
    pub role: UserRole,
    #[serde(default)]
    pub photo: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    /// Identifier of the local account, when the host pushed one.
    #[serde(default)]
    pub external_id: Option<String>,
}

fn default_active() -> bool {
    true
}

/// A ticket with its requester resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteTicket {
    pub id: i64,
    pub url: Option<String>,
    pub subject: Option<String>,
    pub status: TicketStatus,
    /// `None` when the response omitted priority.
    pub priority: Option<TicketPriority>,
    pub custom_fields: Option<serde_json::Value>,
    pub tags: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub requester: RemoteUser,
}

/// A ticket comment with its author resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteComment {
    pub id: i64,
    /// `-1` for comments authored by Zendesk itself.
    pub author_id: i64,
    /// `None` only for system-authored comments.
    pub author: Option<RemoteUser>,
    pub body: Option<String>,
    pub html_body: Option<String>,
    pub plain_body: Option<String>,
    pub public: bool,
    pub created_at: DateTime<Utc>,
    pub attachments: Vec<RemoteAttachment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteAttachment {
    pub id: i64,
    pub file_name: String,
    pub content_url: String,
    pub content_type: String,
    pub size: i64,
    #[serde(default)]
    pub width: Option<i32>,
    #[serde(default)]
    pub height: Option<i32>,
    #[serde(default)]
    pub inline: bool,
    #[serde(default)]
    pub thumbnails: Vec<RemoteThumbnail>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteThumbnail {
    pub id: i64,
    pub file_name: String,
    pub content_url: String,
    pub content_type: String,
    pub size: i64,
    #[serde(default)]
    pub width: Option<i32>,
    #[serde(default)]
    pub height: Option<i32>,
}

/// A login identity (email, phone, ...) attached to a Zendesk user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteIdentity {
    pub id: i64,
    pub user_id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub primary: bool,
}

/// Writable user attributes for create/update calls.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UserFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified: Option<bool>,
}

/// Criteria for a user search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserSearch {
    ExternalId(String),
    Email(String),
}

/// Read-only view of the remote ticket graph.
#[async_trait]
pub trait RemoteSnapshotFetcher: Send + Sync {
    async fn get_ticket(&self, ticket_id: i64) -> Result<RemoteTicket, RemoteError>;

    /// Every comment on the ticket, fetched in one pass across all pages.
    async fn get_comments(&self, ticket_id: i64) -> Result<Vec<RemoteComment>, RemoteError>;
}

/// Remote user management used when pushing local accounts to Zendesk.
#[async_trait]
pub trait RemoteUserDirectory: Send + Sync {
    async fn search_users(&self, criteria: &UserSearch) -> Result<Vec<RemoteUser>, RemoteError>;

    /// Fails with [`RemoteError::Duplicate`] when a unique value is taken.
    async fn create_user(&self, fields: &UserFields) -> Result<RemoteUser, RemoteError>;

    async fn update_user(&self, user_id: i64, fields: &UserFields)
        -> Result<RemoteUser, RemoteError>;

    async fn list_identities(&self, user_id: i64) -> Result<Vec<RemoteIdentity>, RemoteError>;

    async fn make_primary_identity(&self, user_id: i64, identity_id: i64)
        -> Result<(), RemoteError>;
}
