//! Postgres storage via diesel-async.

use std::time::Duration;

use async_trait::async_trait;
use deadpool::Runtime;
use diesel::prelude::*;
use diesel_async::pooled_connection::deadpool::Pool;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use super::{parse_account_id, AccountDirectory, SyncStore};
use crate::models::account::{Account, AccountEmail};
use crate::models::attachment::{Attachment, NewAttachment, NewPhoto, Photo};
use crate::models::comment::{Comment, NewComment};
use crate::models::event::{Event, EventOutcome, NewEvent};
use crate::models::ticket::{NewTicket, Ticket};
use crate::models::user::{NewZendeskUser, ZendeskUser};
use crate::schema::{
    account_emails, accounts, zendesk_attachments, zendesk_comments, zendesk_events,
    zendesk_photos, zendesk_tickets, zendesk_users,
};

pub type DbPool = Pool<AsyncPgConnection>;

/// Build a connection pool whose checkouts fail after `wait_timeout`
/// instead of queueing forever.
pub fn build_pool(
    database_url: &str,
    max_size: usize,
    wait_timeout: Duration,
) -> anyhow::Result<DbPool> {
    let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
    Pool::builder(manager)
        .max_size(max_size)
        .wait_timeout(Some(wait_timeout))
        .runtime(Runtime::Tokio1)
        .build()
        .map_err(|e| anyhow::anyhow!("diesel pool: {e}"))
}

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
    /// Whether `account_emails` is maintained by an email verification flow.
    email_verification: bool,
}

impl PgStore {
    pub fn new(pool: DbPool, email_verification: bool) -> Self {
        Self {
            pool,
            email_verification,
        }
    }

    async fn conn(
        &self,
    ) -> anyhow::Result<diesel_async::pooled_connection::deadpool::Object<AsyncPgConnection>> {
        self.pool
            .get()
            .await
            .map_err(|e| anyhow::anyhow!("diesel pool: {e}"))
    }
}

#[async_trait]
impl SyncStore for PgStore {
    async fn upsert_user(&self, user: NewZendeskUser) -> anyhow::Result<ZendeskUser> {
        let mut conn = self.conn().await?;
        let result = diesel::insert_into(zendesk_users::table)
            .values(&user)
            .on_conflict(zendesk_users::zendesk_id)
            .do_update()
            .set(&user)
            .get_result::<ZendeskUser>(&mut conn)
            .await?;
        Ok(result)
    }

    async fn get_or_create_user(&self, user: NewZendeskUser) -> anyhow::Result<ZendeskUser> {
        let mut conn = self.conn().await?;
        diesel::insert_into(zendesk_users::table)
            .values(&user)
            .on_conflict(zendesk_users::zendesk_id)
            .do_nothing()
            .execute(&mut conn)
            .await?;
        let result = zendesk_users::table
            .filter(zendesk_users::zendesk_id.eq(user.zendesk_id))
            .first::<ZendeskUser>(&mut conn)
            .await?;
        Ok(result)
    }

    async fn find_ticket(&self, zendesk_id: i64) -> anyhow::Result<Option<Ticket>> {
        let mut conn = self.conn().await?;
        let result = zendesk_tickets::table
            .filter(zendesk_tickets::zendesk_id.eq(zendesk_id))
            .first::<Ticket>(&mut conn)
            .await
            .optional()?;
        Ok(result)
    }

    async fn upsert_ticket(&self, ticket: NewTicket) -> anyhow::Result<(Ticket, bool)> {
        let mut conn = self.conn().await?;

        // A conflicting insert returns no row; fall through to the update.
        let inserted = diesel::insert_into(zendesk_tickets::table)
            .values(&ticket)
            .on_conflict(zendesk_tickets::zendesk_id)
            .do_nothing()
            .get_result::<Ticket>(&mut conn)
            .await
            .optional()?;
        if let Some(created) = inserted {
            return Ok((created, true));
        }

        let target =
            zendesk_tickets::table.filter(zendesk_tickets::zendesk_id.eq(ticket.zendesk_id));
        let changes = (
            zendesk_tickets::requester_id.eq(ticket.requester_id),
            zendesk_tickets::subject.eq(ticket.subject.clone()),
            zendesk_tickets::url.eq(ticket.url.clone()),
            zendesk_tickets::status.eq(ticket.status),
            zendesk_tickets::custom_fields.eq(ticket.custom_fields.clone()),
            zendesk_tickets::tags.eq(ticket.tags.clone()),
            zendesk_tickets::created_at.eq(ticket.created_at),
            zendesk_tickets::updated_at.eq(ticket.updated_at),
        );
        let updated = match ticket.priority {
            Some(priority) => {
                diesel::update(target)
                    .set((changes, zendesk_tickets::priority.eq(priority)))
                    .get_result::<Ticket>(&mut conn)
                    .await?
            }
            None => {
                diesel::update(target)
                    .set(changes)
                    .get_result::<Ticket>(&mut conn)
                    .await?
            }
        };
        Ok((updated, false))
    }

    async fn list_comments(&self, ticket_id: i64) -> anyhow::Result<Vec<Comment>> {
        let mut conn = self.conn().await?;
        let results = zendesk_comments::table
            .filter(zendesk_comments::ticket_id.eq(ticket_id))
            .order((
                zendesk_comments::created_at.asc(),
                zendesk_comments::zendesk_id.asc(),
            ))
            .load::<Comment>(&mut conn)
            .await?;
        Ok(results)
    }

    async fn upsert_comment(&self, comment: NewComment) -> anyhow::Result<Comment> {
        let mut conn = self.conn().await?;
        let result = diesel::insert_into(zendesk_comments::table)
            .values(&comment)
            .on_conflict(zendesk_comments::zendesk_id)
            .do_update()
            .set(&comment)
            .get_result::<Comment>(&mut conn)
            .await?;
        Ok(result)
    }

    async fn upsert_attachment(&self, attachment: NewAttachment) -> anyhow::Result<Attachment> {
        let mut conn = self.conn().await?;
        let result = diesel::insert_into(zendesk_attachments::table)
            .values(&attachment)
            .on_conflict(zendesk_attachments::zendesk_id)
            .do_update()
            .set(&attachment)
            .get_result::<Attachment>(&mut conn)
            .await?;
        Ok(result)
    }

    async fn upsert_photo(&self, photo: NewPhoto) -> anyhow::Result<Photo> {
        let mut conn = self.conn().await?;
        let result = diesel::insert_into(zendesk_photos::table)
            .values(&photo)
            .on_conflict(zendesk_photos::zendesk_id)
            .do_update()
            .set(&photo)
            .get_result::<Photo>(&mut conn)
            .await?;
        Ok(result)
    }

    async fn insert_event(&self, event: NewEvent) -> anyhow::Result<Event> {
        let mut conn = self.conn().await?;
        let result = diesel::insert_into(zendesk_events::table)
            .values(&event)
            .get_result::<Event>(&mut conn)
            .await?;
        Ok(result)
    }

    async fn record_outcome(&self, event_id: i64, outcome: EventOutcome) -> anyhow::Result<Event> {
        let mut conn = self.conn().await?;
        let result = diesel::update(zendesk_events::table.find(event_id))
            .set(&outcome)
            .get_result::<Event>(&mut conn)
            .await?;
        Ok(result)
    }

    async fn get_event(&self, event_id: i64) -> anyhow::Result<Option<Event>> {
        let mut conn = self.conn().await?;
        let result = zendesk_events::table
            .find(event_id)
            .first::<Event>(&mut conn)
            .await
            .optional()?;
        Ok(result)
    }
}

#[async_trait]
impl AccountDirectory for PgStore {
    async fn find_by_external_id(&self, external_id: &str) -> anyhow::Result<Option<i64>> {
        let Some(account_id) = parse_account_id(external_id) else {
            return Ok(None);
        };
        let mut conn = self.conn().await?;
        let result = accounts::table
            .find(account_id)
            .select(accounts::id)
            .first::<i64>(&mut conn)
            .await
            .optional()?;
        Ok(result)
    }

    async fn get_account(&self, account_id: i64) -> anyhow::Result<Option<Account>> {
        let mut conn = self.conn().await?;
        let result = accounts::table
            .find(account_id)
            .first::<Account>(&mut conn)
            .await
            .optional()?;
        Ok(result)
    }

    async fn account_emails(&self, account_id: i64) -> anyhow::Result<Option<Vec<AccountEmail>>> {
        if !self.email_verification {
            return Ok(None);
        }
        let mut conn = self.conn().await?;
        let results = account_emails::table
            .filter(account_emails::account_id.eq(account_id))
            .order((account_emails::is_primary.desc(), account_emails::id.asc()))
            .load::<AccountEmail>(&mut conn)
            .await?;
        Ok(Some(results))
    }
}
