//! Fixtures and fakes shared by unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;

use crate::error::RemoteError;
use crate::events::ticket::TicketNotification;
use crate::models::comment::Comment;
use crate::models::ticket::{NewTicket, Ticket, TicketPriority, TicketStatus};
use crate::models::user::{UserRole, SYSTEM_USER_ZENDESK_ID};
use crate::remote::{
    RemoteAttachment, RemoteComment, RemoteIdentity, RemoteSnapshotFetcher, RemoteThumbnail,
    RemoteTicket, RemoteUser, RemoteUserDirectory, UserFields, UserSearch,
};
use crate::services::dispatch::{Dispatcher, TicketSubscriber};
use crate::services::lock_service::TicketLocks;
use crate::services::sync_service::TicketSync;
use crate::services::ticket_service::TicketReconciler;
use crate::services::user_service::UserReconciler;
use crate::store::pg::{build_pool, DbPool};
use crate::store::MemoryStore;

static MIGRATED: tokio::sync::OnceCell<()> = tokio::sync::OnceCell::const_new();

/// A migrated pool on `DATABASE_URL`, or `None` when no database is
/// configured and the calling test should be skipped.
pub async fn test_pool(max_size: usize) -> Option<DbPool> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping Postgres test");
        return None;
    };
    let pool = build_pool(&url, max_size, Duration::from_secs(10)).unwrap();
    MIGRATED
        .get_or_init(|| async {
            let mut conn = pool.get().await.unwrap();
            crate::migration::run_migration(&mut conn).await.unwrap();
        })
        .await;
    Some(pool)
}

/// An id no earlier run against the same database has used.
pub fn unique_id() -> i64 {
    static NEXT: AtomicI64 = AtomicI64::new(0);
    let micros = Utc::now().timestamp_micros() % 1_000_000_000_000;
    micros * 1000 + NEXT.fetch_add(1, Ordering::SeqCst)
}

/// A fixed point in time plus `secs`.
pub fn ts(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
}

pub fn new_ticket_row(zendesk_id: i64, requester_id: i64) -> NewTicket {
    NewTicket {
        zendesk_id,
        requester_id,
        subject: Some("Printer on fire".into()),
        url: None,
        status: TicketStatus::Open,
        priority: None,
        custom_fields: None,
        tags: None,
        created_at: ts(0),
        updated_at: Some(ts(0)),
    }
}

pub fn ticket_row(id: i64, zendesk_id: i64) -> Ticket {
    let new = new_ticket_row(zendesk_id, 1);
    Ticket {
        id,
        zendesk_id,
        requester_id: new.requester_id,
        subject: new.subject,
        url: new.url,
        status: new.status,
        priority: new.priority,
        custom_fields: new.custom_fields,
        tags: new.tags,
        created_at: new.created_at,
        updated_at: new.updated_at,
    }
}

pub fn comment_row(zendesk_id: i64, ticket_id: i64, offset_secs: i64) -> Comment {
    Comment {
        id: zendesk_id,
        zendesk_id,
        ticket_id,
        author_id: 1,
        body: Some(format!("comment {zendesk_id}")),
        html_body: None,
        plain_body: Some(format!("comment {zendesk_id}")),
        public: true,
        created_at: ts(offset_secs),
    }
}

pub fn remote_user(id: i64) -> RemoteUser {
    RemoteUser {
        id,
        name: Some(format!("User {id}")),
        alias: None,
        email: Some(format!("user{id}@example.com")),
        active: true,
        role: UserRole::EndUser,
        photo: None,
        created_at: ts(0),
        external_id: None,
    }
}

pub fn remote_ticket(id: i64, requester_id: i64) -> RemoteTicket {
    RemoteTicket {
        id,
        url: Some(format!("https://example.zendesk.com/api/v2/tickets/{id}.json")),
        subject: Some("Printer on fire".into()),
        status: TicketStatus::Open,
        priority: Some(TicketPriority::Normal),
        custom_fields: Some(json!([])),
        tags: Some(json!(["printer"])),
        created_at: ts(0),
        updated_at: Some(ts(60)),
        requester: remote_user(requester_id),
    }
}

pub fn remote_comment(id: i64, author_id: i64, offset_secs: i64) -> RemoteComment {
    RemoteComment {
        id,
        author_id,
        author: Some(remote_user(author_id)),
        body: Some(format!("comment {id}")),
        html_body: Some(format!("<p>comment {id}</p>")),
        plain_body: Some(format!("comment {id}")),
        public: true,
        created_at: ts(offset_secs),
        attachments: Vec::new(),
    }
}

/// A comment Zendesk authored itself, e.g. a merge notice.
pub fn system_comment(id: i64, offset_secs: i64) -> RemoteComment {
    RemoteComment {
        author_id: SYSTEM_USER_ZENDESK_ID,
        author: None,
        public: false,
        ..remote_comment(id, SYSTEM_USER_ZENDESK_ID, offset_secs)
    }
}

/// An image attachment with a single thumbnail (id + 1).
pub fn remote_attachment(id: i64) -> RemoteAttachment {
    RemoteAttachment {
        id,
        file_name: "screenshot.png".into(),
        content_url: format!("https://example.zendesk.com/attachments/token/{id}"),
        content_type: "image/png".into(),
        size: 2048,
        width: Some(800),
        height: Some(600),
        inline: false,
        thumbnails: vec![RemoteThumbnail {
            id: id + 1,
            file_name: "screenshot_thumb.png".into(),
            content_url: format!("https://example.zendesk.com/attachments/token/{}", id + 1),
            content_type: "image/png".into(),
            size: 512,
            width: Some(80),
            height: Some(60),
        }],
    }
}

pub fn email_identity(id: i64, user_id: i64, value: &str, primary: bool) -> RemoteIdentity {
    RemoteIdentity {
        id,
        user_id,
        kind: "email".into(),
        value: value.into(),
        verified: true,
        primary,
    }
}

impl RemoteComment {
    pub fn with_attachment(mut self, attachment: RemoteAttachment) -> Self {
        self.attachments.push(attachment);
        self
    }
}

/// A full sync pipeline over the memory store and a fake remote.
pub fn ticket_sync(
    store: &Arc<MemoryStore>,
    remote: &Arc<FakeRemote>,
    subscriber: Arc<dyn TicketSubscriber>,
) -> TicketSync {
    let reconciler = TicketReconciler::new(
        store.clone(),
        remote.clone(),
        UserReconciler::new(store.clone(), store.clone()),
    );
    let mut dispatcher = Dispatcher::new();
    dispatcher.subscribe(subscriber);
    TicketSync::new(
        store.clone(),
        remote.clone(),
        reconciler,
        TicketLocks::local(),
        dispatcher,
    )
}

/// Collects every notification it receives.
#[derive(Default)]
pub struct RecordingSubscriber {
    received: Mutex<Vec<TicketNotification>>,
}

impl RecordingSubscriber {
    pub fn received(&self) -> Vec<TicketNotification> {
        self.received.lock().unwrap().clone()
    }
}

#[async_trait]
impl TicketSubscriber for RecordingSubscriber {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn notify(&self, notification: &TicketNotification) -> anyhow::Result<()> {
        self.received.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

#[derive(Default)]
struct FakeState {
    tickets: HashMap<i64, RemoteTicket>,
    comments: HashMap<i64, Vec<RemoteComment>>,
    users: Vec<RemoteUser>,
    identities: Vec<RemoteIdentity>,
    create_failure: Option<RemoteError>,
    created: Vec<UserFields>,
    updated: Vec<(i64, UserFields)>,
    made_primary: Vec<(i64, i64)>,
    next_user_id: i64,
}

/// Scripted stand-in for the Zendesk API.
#[derive(Default)]
pub struct FakeRemote {
    state: Mutex<FakeState>,
    fetch_delay: Option<Duration>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every ticket fetch, widening race windows.
    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = Some(delay);
        self
    }

    pub fn put_ticket(&self, ticket: RemoteTicket) {
        self.state.lock().unwrap().tickets.insert(ticket.id, ticket);
    }

    pub fn put_comments(&self, ticket_id: i64, comments: Vec<RemoteComment>) {
        self.state
            .lock()
            .unwrap()
            .comments
            .insert(ticket_id, comments);
    }

    pub fn put_user(&self, user: RemoteUser) {
        self.state.lock().unwrap().users.push(user);
    }

    pub fn put_identity(&self, identity: RemoteIdentity) {
        self.state.lock().unwrap().identities.push(identity);
    }

    /// Fail the next `create_user` call with `error`.
    pub fn fail_create_with(&self, error: RemoteError) {
        self.state.lock().unwrap().create_failure = Some(error);
    }

    pub fn created(&self) -> Vec<UserFields> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn updated(&self) -> Vec<(i64, UserFields)> {
        self.state.lock().unwrap().updated.clone()
    }

    pub fn made_primary(&self) -> Vec<(i64, i64)> {
        self.state.lock().unwrap().made_primary.clone()
    }
}

#[async_trait]
impl RemoteSnapshotFetcher for FakeRemote {
    async fn get_ticket(&self, ticket_id: i64) -> Result<RemoteTicket, RemoteError> {
        if let Some(delay) = self.fetch_delay {
            tokio::time::sleep(delay).await;
        }
        let ticket = self.state.lock().unwrap().tickets.get(&ticket_id).cloned();
        ticket.ok_or_else(|| RemoteError::NotFound(format!("ticket {ticket_id}")))
    }

    async fn get_comments(&self, ticket_id: i64) -> Result<Vec<RemoteComment>, RemoteError> {
        let comments = self.state.lock().unwrap().comments.get(&ticket_id).cloned();
        Ok(comments.unwrap_or_default())
    }
}

#[async_trait]
impl RemoteUserDirectory for FakeRemote {
    async fn search_users(&self, criteria: &UserSearch) -> Result<Vec<RemoteUser>, RemoteError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .users
            .iter()
            .filter(|u| match criteria {
                UserSearch::ExternalId(id) => u.external_id.as_deref() == Some(id.as_str()),
                UserSearch::Email(email) => u
                    .email
                    .as_deref()
                    .is_some_and(|e| e.eq_ignore_ascii_case(email)),
            })
            .cloned()
            .collect())
    }

    async fn create_user(&self, fields: &UserFields) -> Result<RemoteUser, RemoteError> {
        let mut state = self.state.lock().unwrap();
        if let Some(error) = state.create_failure.take() {
            return Err(error);
        }
        state.next_user_id += 1;
        let user = RemoteUser {
            name: fields.name.clone(),
            email: fields.email.clone(),
            external_id: fields.external_id.clone(),
            ..remote_user(10_000 + state.next_user_id)
        };
        state.created.push(fields.clone());
        state.users.push(user.clone());
        Ok(user)
    }

    async fn update_user(
        &self,
        user_id: i64,
        fields: &UserFields,
    ) -> Result<RemoteUser, RemoteError> {
        let mut state = self.state.lock().unwrap();
        state.updated.push((user_id, fields.clone()));
        let user = state
            .users
            .iter_mut()
            .find(|u| u.id == user_id)
            .ok_or_else(|| RemoteError::NotFound(format!("user {user_id}")))?;
        if fields.name.is_some() {
            user.name = fields.name.clone();
        }
        if fields.external_id.is_some() {
            user.external_id = fields.external_id.clone();
        }
        Ok(user.clone())
    }

    async fn list_identities(&self, user_id: i64) -> Result<Vec<RemoteIdentity>, RemoteError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .identities
            .iter()
            .filter(|i| i.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn make_primary_identity(
        &self,
        user_id: i64,
        identity_id: i64,
    ) -> Result<(), RemoteError> {
        let mut state = self.state.lock().unwrap();
        state.made_primary.push((user_id, identity_id));
        for identity in state.identities.iter_mut().filter(|i| i.user_id == user_id) {
            identity.primary = identity.id == identity_id;
        }
        Ok(())
    }
}
