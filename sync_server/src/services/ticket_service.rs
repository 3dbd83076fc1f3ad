//! Write one remote ticket graph into the local mirror.
//!
//! Order matters: users before the ticket that references them, the ticket
//! before its comments, comments before attachments, attachments before
//! photos. Every write is keyed on `zendesk_id`, so running the same
//! snapshot twice leaves the store unchanged.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::models::attachment::{NewAttachment, NewPhoto};
use crate::models::comment::NewComment;
use crate::models::ticket::{NewTicket, Ticket};
use crate::models::user::SYSTEM_USER_ZENDESK_ID;
use crate::remote::{RemoteComment, RemoteSnapshotFetcher, RemoteTicket, RemoteUser};
use crate::services::user_service::UserReconciler;
use crate::store::SyncStore;

pub struct TicketReconciler {
    store: Arc<dyn SyncStore>,
    fetcher: Arc<dyn RemoteSnapshotFetcher>,
    users: UserReconciler,
}

impl TicketReconciler {
    pub fn new(
        store: Arc<dyn SyncStore>,
        fetcher: Arc<dyn RemoteSnapshotFetcher>,
        users: UserReconciler,
    ) -> Self {
        Self {
            store,
            fetcher,
            users,
        }
    }

    /// Mirror `remote` and all of its comments.
    ///
    /// Returns the local ticket and whether this call created it.
    pub async fn reconcile(&self, remote: &RemoteTicket) -> anyhow::Result<(Ticket, bool)> {
        let mut comments = self.fetcher.get_comments(remote.id).await?;
        comments.sort_by_key(|c| (c.created_at, c.id));

        // local ids of every referenced user, by zendesk id
        let mut local_users: HashMap<i64, i64> = HashMap::new();
        for user in distinct_users(remote, &comments)? {
            let local = self.users.reconcile(user).await?;
            local_users.insert(local.zendesk_id, local.id);
        }
        if comments.iter().any(|c| c.author_id == SYSTEM_USER_ZENDESK_ID) {
            let system = self.users.system_user().await?;
            local_users.insert(system.zendesk_id, system.id);
        }

        let requester_id = local_id(&local_users, remote.requester.id)?;
        let (ticket, created) = self
            .store
            .upsert_ticket(NewTicket {
                zendesk_id: remote.id,
                requester_id,
                subject: remote.subject.clone(),
                url: remote.url.clone(),
                status: remote.status,
                priority: remote.priority,
                custom_fields: remote.custom_fields.clone(),
                tags: remote.tags.clone(),
                created_at: remote.created_at,
                updated_at: remote.updated_at,
            })
            .await?;

        for comment in &comments {
            let author_id = local_id(&local_users, comment.author_id)?;
            self.mirror_comment(ticket.id, author_id, comment).await?;
        }

        tracing::info!(
            zendesk_id = ticket.zendesk_id,
            ticket_id = ticket.id,
            created,
            comments = comments.len(),
            "Ticket mirrored"
        );

        Ok((ticket, created))
    }

    async fn mirror_comment(
        &self,
        ticket_id: i64,
        author_id: i64,
        comment: &RemoteComment,
    ) -> anyhow::Result<()> {
        let local = self
            .store
            .upsert_comment(NewComment {
                zendesk_id: comment.id,
                ticket_id,
                author_id,
                body: comment.body.clone(),
                html_body: comment.html_body.clone(),
                plain_body: comment.plain_body.clone(),
                public: comment.public,
                created_at: comment.created_at,
            })
            .await?;

        for attachment in &comment.attachments {
            let local_attachment = self
                .store
                .upsert_attachment(NewAttachment {
                    zendesk_id: attachment.id,
                    comment_id: local.id,
                    file_name: attachment.file_name.clone(),
                    content_url: attachment.content_url.clone(),
                    content_type: attachment.content_type.clone(),
                    size: attachment.size,
                    width: attachment.width,
                    height: attachment.height,
                    inline: attachment.inline,
                })
                .await?;

            for thumbnail in &attachment.thumbnails {
                self.store
                    .upsert_photo(NewPhoto {
                        zendesk_id: thumbnail.id,
                        attachment_id: local_attachment.id,
                        file_name: thumbnail.file_name.clone(),
                        content_url: thumbnail.content_url.clone(),
                        content_type: thumbnail.content_type.clone(),
                        size: thumbnail.size,
                        width: thumbnail.width,
                        height: thumbnail.height,
                    })
                    .await?;
            }
        }

        Ok(())
    }
}

/// Requester and comment authors, one per zendesk id, in id order.
/// System-authored comments contribute no user.
fn distinct_users<'a>(
    ticket: &'a RemoteTicket,
    comments: &'a [RemoteComment],
) -> anyhow::Result<Vec<&'a RemoteUser>> {
    let mut users = BTreeMap::new();
    users.insert(ticket.requester.id, &ticket.requester);
    for comment in comments {
        if comment.author_id == SYSTEM_USER_ZENDESK_ID {
            continue;
        }
        let author = comment.author.as_ref().ok_or_else(|| {
            anyhow::anyhow!(
                "comment {} on ticket {} has no resolved author {}",
                comment.id,
                ticket.id,
                comment.author_id
            )
        })?;
        users.insert(author.id, author);
    }
    Ok(users.into_values().collect())
}

fn local_id(local_users: &HashMap<i64, i64>, zendesk_id: i64) -> anyhow::Result<i64> {
    local_users
        .get(&zendesk_id)
        .copied()
        .ok_or_else(|| anyhow::anyhow!("user {zendesk_id} was not mirrored"))
}
