//! Fetch, reconcile, classify and dispatch one ticket under its lock.

use std::sync::Arc;
use std::time::Instant;

use crate::events::ticket::ChangeContext;
use crate::models::ticket::Ticket;
use crate::remote::{RemoteSnapshotFetcher, RemoteTicket};
use crate::services::change_service;
use crate::services::dispatch::Dispatcher;
use crate::services::lock_service::TicketLocks;
use crate::services::ticket_service::TicketReconciler;
use crate::store::SyncStore;

pub struct TicketSync {
    store: Arc<dyn SyncStore>,
    fetcher: Arc<dyn RemoteSnapshotFetcher>,
    reconciler: TicketReconciler,
    locks: TicketLocks,
    dispatcher: Dispatcher,
}

impl TicketSync {
    pub fn new(
        store: Arc<dyn SyncStore>,
        fetcher: Arc<dyn RemoteSnapshotFetcher>,
        reconciler: TicketReconciler,
        locks: TicketLocks,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            store,
            fetcher,
            reconciler,
            locks,
            dispatcher,
        }
    }

    /// Bring the local mirror of `ticket_id` up to date with Zendesk.
    ///
    /// Fetching happens inside the lock so that of two concurrent calls the
    /// second observes the first one's writes as its "before" state.
    pub async fn sync_ticket_id(&self, ticket_id: i64) -> anyhow::Result<Ticket> {
        self.locks
            .with_lock(ticket_id, || async {
                let started = Instant::now();
                let remote = self.fetcher.get_ticket(ticket_id).await?;
                let ticket = self.sync_ticket(&remote).await?;
                crate::metrics::sync_duration(started.elapsed().as_millis() as u64);
                Ok(ticket)
            })
            .await
    }

    /// Reconcile an already fetched ticket and emit its notification.
    /// Callers are expected to hold the ticket's lock.
    pub async fn sync_ticket(&self, remote: &RemoteTicket) -> anyhow::Result<Ticket> {
        let pre_ticket = self.store.find_ticket(remote.id).await?;
        let pre_comments = match &pre_ticket {
            Some(ticket) => self.store.list_comments(ticket.id).await?,
            None => Vec::new(),
        };

        let (ticket, created) = self.reconciler.reconcile(remote).await?;
        let post_comments = self.store.list_comments(ticket.id).await?;

        let context =
            ChangeContext::new(pre_ticket, ticket.clone(), pre_comments, post_comments, created);
        let notification = change_service::classify(context);
        crate::metrics::ticket_synced(notification.kind());
        self.dispatcher.dispatch(&notification).await?;

        Ok(ticket)
    }
}
