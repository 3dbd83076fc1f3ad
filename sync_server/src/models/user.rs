//! zendesk.user: Cached mirror of a Zendesk actor (requester, agent, author).

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use super::text_enum;
use crate::schema::zendesk_users;

/// Zendesk id used for comments the platform itself authored (merges,
/// automations). Never a real user.
pub const SYSTEM_USER_ZENDESK_ID: i64 = -1;
pub const SYSTEM_USER_NAME: &str = "Zendesk";

text_enum! {
    /// Zendesk user role.
    pub enum UserRole ("user role") {
        EndUser => "end-user",
        Agent => "agent",
        Admin => "admin",
    }
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = zendesk_users)]
pub struct ZendeskUser {
    pub id: i64,
    pub zendesk_id: i64,
    pub name: Option<String>,
    pub alias: Option<String>,
    pub email: Option<String>,
    pub active: bool,
    pub role: UserRole,
    pub photo: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    /// Local account this Zendesk user was resolved to, if any.
    pub account_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Insertable, AsChangeset)]
#[diesel(table_name = zendesk_users, treat_none_as_null = true)]
pub struct NewZendeskUser {
    pub zendesk_id: i64,
    pub name: Option<String>,
    pub alias: Option<String>,
    pub email: Option<String>,
    pub active: bool,
    pub role: UserRole,
    pub photo: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub account_id: Option<i64>,
}

impl NewZendeskUser {
    /// The placeholder author for system-generated comments.
    pub fn system(now: DateTime<Utc>) -> Self {
        Self {
            zendesk_id: SYSTEM_USER_ZENDESK_ID,
            name: Some(SYSTEM_USER_NAME.to_string()),
            alias: None,
            email: None,
            active: true,
            role: UserRole::Admin,
            photo: None,
            created_at: now,
            account_id: None,
        }
    }
}
