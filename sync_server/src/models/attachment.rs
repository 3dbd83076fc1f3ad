//! zendesk.attachment + zendesk.photo: Files on a comment and their thumbnails.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::{zendesk_attachments, zendesk_photos};

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = zendesk_attachments)]
pub struct Attachment {
    pub id: i64,
    pub zendesk_id: i64,
    pub comment_id: i64,
    pub file_name: String,
    pub content_url: String,
    pub content_type: String,
    pub size: i64,
    pub width: Option<i32>,
    pub height: Option<i32>,
    /// Referenced inside the comment body rather than offered as a download.
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq, Insertable, AsChangeset)]
#[diesel(table_name = zendesk_attachments, treat_none_as_null = true)]
pub struct NewAttachment {
    pub zendesk_id: i64,
    pub comment_id: i64,
    pub file_name: String,
    pub content_url: String,
    pub content_type: String,
    pub size: i64,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = zendesk_photos)]
pub struct Photo {
    pub id: i64,
    pub zendesk_id: i64,
    pub attachment_id: i64,
    pub file_name: String,
    pub content_url: String,
    pub content_type: String,
    pub size: i64,
    pub width: Option<i32>,
    pub height: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Insertable, AsChangeset)]
#[diesel(table_name = zendesk_photos, treat_none_as_null = true)]
pub struct NewPhoto {
    pub zendesk_id: i64,
    pub attachment_id: i64,
    pub file_name: String,
    pub content_url: String,
    pub content_type: String,
    pub size: i64,
    pub width: Option<i32>,
    pub height: Option<i32>,
}
