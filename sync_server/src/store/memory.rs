//! In-process storage, for development without Postgres and for tests.
//!
//! Offers no cross-process guarantees; one process owns the data.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use super::{parse_account_id, AccountDirectory, SyncStore};
use crate::models::account::{Account, AccountEmail};
use crate::models::attachment::{Attachment, NewAttachment, NewPhoto, Photo};
use crate::models::comment::{sort_canonical, Comment, NewComment};
use crate::models::event::{Event, EventOutcome, NewEvent};
use crate::models::ticket::{NewTicket, Ticket};
use crate::models::user::{NewZendeskUser, ZendeskUser};

#[derive(Default)]
struct MemoryState {
    next_id: i64,
    // mirror tables keyed by zendesk_id, ledger keyed by local id
    users: BTreeMap<i64, ZendeskUser>,
    tickets: BTreeMap<i64, Ticket>,
    comments: BTreeMap<i64, Comment>,
    attachments: BTreeMap<i64, Attachment>,
    photos: BTreeMap<i64, Photo>,
    events: BTreeMap<i64, Event>,
    accounts: BTreeMap<i64, Account>,
    account_emails: Vec<AccountEmail>,
}

impl MemoryState {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    email_verification: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_email_verification(mut self, enabled: bool) -> Self {
        self.email_verification = enabled;
        self
    }

    /// Register a host account (standalone or test setups).
    pub async fn add_account(&self, account: Account, emails: Vec<(String, bool)>) {
        let mut state = self.state.lock().await;
        for (idx, (email, verified)) in emails.into_iter().enumerate() {
            let id = state.allocate_id();
            state.account_emails.push(AccountEmail {
                id,
                account_id: account.id,
                email,
                verified,
                is_primary: idx == 0,
            });
        }
        state.accounts.insert(account.id, account);
    }
}

#[cfg(test)]
impl MemoryStore {
    pub async fn user_count(&self) -> usize {
        self.state.lock().await.users.len()
    }

    pub async fn ticket_count(&self) -> usize {
        self.state.lock().await.tickets.len()
    }

    pub async fn comment_count(&self) -> usize {
        self.state.lock().await.comments.len()
    }

    pub async fn attachment_count(&self) -> usize {
        self.state.lock().await.attachments.len()
    }

    pub async fn photo_count(&self) -> usize {
        self.state.lock().await.photos.len()
    }

    pub async fn events(&self) -> Vec<Event> {
        self.state.lock().await.events.values().cloned().collect()
    }

    pub async fn find_user(&self, zendesk_id: i64) -> Option<ZendeskUser> {
        self.state.lock().await.users.get(&zendesk_id).cloned()
    }
}

#[async_trait]
impl SyncStore for MemoryStore {
    async fn upsert_user(&self, user: NewZendeskUser) -> anyhow::Result<ZendeskUser> {
        let mut state = self.state.lock().await;
        let id = match state.users.get(&user.zendesk_id) {
            Some(existing) => existing.id,
            None => state.allocate_id(),
        };
        let row = ZendeskUser {
            id,
            zendesk_id: user.zendesk_id,
            name: user.name,
            alias: user.alias,
            email: user.email,
            active: user.active,
            role: user.role,
            photo: user.photo,
            created_at: user.created_at,
            account_id: user.account_id,
        };
        state.users.insert(row.zendesk_id, row.clone());
        Ok(row)
    }

    async fn get_or_create_user(&self, user: NewZendeskUser) -> anyhow::Result<ZendeskUser> {
        {
            let state = self.state.lock().await;
            if let Some(existing) = state.users.get(&user.zendesk_id) {
                return Ok(existing.clone());
            }
        }
        self.upsert_user(user).await
    }

    async fn find_ticket(&self, zendesk_id: i64) -> anyhow::Result<Option<Ticket>> {
        Ok(self.state.lock().await.tickets.get(&zendesk_id).cloned())
    }

    async fn upsert_ticket(&self, ticket: NewTicket) -> anyhow::Result<(Ticket, bool)> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state.tickets.get_mut(&ticket.zendesk_id) {
            ticket.apply_to(existing);
            return Ok((existing.clone(), false));
        }
        let row = Ticket {
            id: state.allocate_id(),
            zendesk_id: ticket.zendesk_id,
            requester_id: ticket.requester_id,
            subject: ticket.subject,
            url: ticket.url,
            status: ticket.status,
            priority: ticket.priority,
            custom_fields: ticket.custom_fields,
            tags: ticket.tags,
            created_at: ticket.created_at,
            updated_at: ticket.updated_at,
        };
        state.tickets.insert(row.zendesk_id, row.clone());
        Ok((row, true))
    }

    async fn list_comments(&self, ticket_id: i64) -> anyhow::Result<Vec<Comment>> {
        let state = self.state.lock().await;
        let mut comments: Vec<Comment> = state
            .comments
            .values()
            .filter(|c| c.ticket_id == ticket_id)
            .cloned()
            .collect();
        sort_canonical(&mut comments);
        Ok(comments)
    }

    async fn upsert_comment(&self, comment: NewComment) -> anyhow::Result<Comment> {
        let mut state = self.state.lock().await;
        let id = match state.comments.get(&comment.zendesk_id) {
            Some(existing) => existing.id,
            None => state.allocate_id(),
        };
        let row = Comment {
            id,
            zendesk_id: comment.zendesk_id,
            ticket_id: comment.ticket_id,
            author_id: comment.author_id,
            body: comment.body,
            html_body: comment.html_body,
            plain_body: comment.plain_body,
            public: comment.public,
            created_at: comment.created_at,
        };
        state.comments.insert(row.zendesk_id, row.clone());
        Ok(row)
    }

    async fn upsert_attachment(&self, attachment: NewAttachment) -> anyhow::Result<Attachment> {
        let mut state = self.state.lock().await;
        let id = match state.attachments.get(&attachment.zendesk_id) {
            Some(existing) => existing.id,
            None => state.allocate_id(),
        };
        let row = Attachment {
            id,
            zendesk_id: attachment.zendesk_id,
            comment_id: attachment.comment_id,
            file_name: attachment.file_name,
            content_url: attachment.content_url,
            content_type: attachment.content_type,
            size: attachment.size,
            width: attachment.width,
            height: attachment.height,
            inline: attachment.inline,
        };
        state.attachments.insert(row.zendesk_id, row.clone());
        Ok(row)
    }

    async fn upsert_photo(&self, photo: NewPhoto) -> anyhow::Result<Photo> {
        let mut state = self.state.lock().await;
        let id = match state.photos.get(&photo.zendesk_id) {
            Some(existing) => existing.id,
            None => state.allocate_id(),
        };
        let row = Photo {
            id,
            zendesk_id: photo.zendesk_id,
            attachment_id: photo.attachment_id,
            file_name: photo.file_name,
            content_url: photo.content_url,
            content_type: photo.content_type,
            size: photo.size,
            width: photo.width,
            height: photo.height,
        };
        state.photos.insert(row.zendesk_id, row.clone());
        Ok(row)
    }

    async fn insert_event(&self, event: NewEvent) -> anyhow::Result<Event> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let row = Event {
            id: state.allocate_id(),
            raw_data: event.raw_data,
            payload_sha256: event.payload_sha256,
            json: event.json,
            remote_ticket_id: event.remote_ticket_id,
            ticket_id: None,
            error: None,
            created_at: now,
            updated_at: now,
        };
        state.events.insert(row.id, row.clone());
        Ok(row)
    }

    async fn record_outcome(&self, event_id: i64, outcome: EventOutcome) -> anyhow::Result<Event> {
        let mut state = self.state.lock().await;
        let event = state
            .events
            .get_mut(&event_id)
            .ok_or_else(|| anyhow::anyhow!("event {event_id} not found"))?;
        event.ticket_id = outcome.ticket_id;
        event.error = outcome.error;
        event.updated_at = outcome.updated_at;
        Ok(event.clone())
    }

    async fn get_event(&self, event_id: i64) -> anyhow::Result<Option<Event>> {
        Ok(self.state.lock().await.events.get(&event_id).cloned())
    }
}

#[async_trait]
impl AccountDirectory for MemoryStore {
    async fn find_by_external_id(&self, external_id: &str) -> anyhow::Result<Option<i64>> {
        let Some(account_id) = parse_account_id(external_id) else {
            return Ok(None);
        };
        let state = self.state.lock().await;
        Ok(state.accounts.get(&account_id).map(|a| a.id))
    }

    async fn get_account(&self, account_id: i64) -> anyhow::Result<Option<Account>> {
        Ok(self.state.lock().await.accounts.get(&account_id).cloned())
    }

    async fn account_emails(&self, account_id: i64) -> anyhow::Result<Option<Vec<AccountEmail>>> {
        if !self.email_verification {
            return Ok(None);
        }
        let state = self.state.lock().await;
        Ok(Some(
            state
                .account_emails
                .iter()
                .filter(|e| e.account_id == account_id)
                .cloned()
                .collect(),
        ))
    }
}
