//! Local storage strategies.
//!
//! Every write is an update-or-create keyed on `zendesk_id`; the unique
//! constraints in the schema are the final guard against duplicate rows.

pub mod memory;
pub mod pg;

use async_trait::async_trait;

use crate::models::account::{Account, AccountEmail};
use crate::models::attachment::{Attachment, NewAttachment, NewPhoto, Photo};
use crate::models::comment::{Comment, NewComment};
use crate::models::event::{Event, EventOutcome, NewEvent};
use crate::models::ticket::{NewTicket, Ticket};
use crate::models::user::{NewZendeskUser, ZendeskUser};

pub use memory::MemoryStore;
pub use pg::PgStore;

/// Mirror and ledger persistence.
#[async_trait]
pub trait SyncStore: Send + Sync {
    /// Update-or-create by `zendesk_id`, overwriting every mirrored field.
    async fn upsert_user(&self, user: NewZendeskUser) -> anyhow::Result<ZendeskUser>;

    /// Create the row only if no user with that `zendesk_id` exists yet.
    async fn get_or_create_user(&self, user: NewZendeskUser) -> anyhow::Result<ZendeskUser>;

    async fn find_ticket(&self, zendesk_id: i64) -> anyhow::Result<Option<Ticket>>;

    /// Update-or-create by `zendesk_id`. Returns whether the row was created.
    /// A `None` priority leaves the stored priority untouched.
    async fn upsert_ticket(&self, ticket: NewTicket) -> anyhow::Result<(Ticket, bool)>;

    /// Comments of a ticket in canonical `(created_at, zendesk_id)` order.
    async fn list_comments(&self, ticket_id: i64) -> anyhow::Result<Vec<Comment>>;

    async fn upsert_comment(&self, comment: NewComment) -> anyhow::Result<Comment>;

    async fn upsert_attachment(&self, attachment: NewAttachment) -> anyhow::Result<Attachment>;

    async fn upsert_photo(&self, photo: NewPhoto) -> anyhow::Result<Photo>;

    async fn insert_event(&self, event: NewEvent) -> anyhow::Result<Event>;

    async fn record_outcome(&self, event_id: i64, outcome: EventOutcome) -> anyhow::Result<Event>;

    async fn get_event(&self, event_id: i64) -> anyhow::Result<Option<Event>>;
}

/// The host application's account store.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// Resolve a Zendesk `external_id` to a local account id.
    async fn find_by_external_id(&self, external_id: &str) -> anyhow::Result<Option<i64>>;

    async fn get_account(&self, account_id: i64) -> anyhow::Result<Option<Account>>;

    /// Addresses known to email verification, or `None` when that
    /// subsystem is not integrated.
    async fn account_emails(&self, account_id: i64) -> anyhow::Result<Option<Vec<AccountEmail>>>;
}

/// Parse an external id into a local account id.
pub(crate) fn parse_account_id(external_id: &str) -> Option<i64> {
    external_id.trim().parse().ok()
}
