//! Host application accounts that Zendesk users may be linked to.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::{account_emails, accounts};

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = accounts)]
pub struct Account {
    pub id: i64,
    pub name: Option<String>,
    pub email: Option<String>,
    pub active: bool,
}

impl Account {
    /// Identifier pushed to Zendesk as the user's `external_id`.
    pub fn external_id(&self) -> String {
        self.id.to_string()
    }
}

/// An address owned by an account, as tracked by email verification.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = account_emails)]
pub struct AccountEmail {
    pub id: i64,
    pub account_id: i64,
    pub email: String,
    pub verified: bool,
    pub is_primary: bool,
}
