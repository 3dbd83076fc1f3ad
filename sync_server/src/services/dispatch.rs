//! Fan-out of ticket notifications to subscribers.

use std::sync::Arc;

use async_trait::async_trait;

use crate::events::ticket::TicketNotification;

/// Receives one notification per successful reconciliation.
///
/// Subscribers run in the webhook's request path: an error fails the
/// event, which is recorded and retried by the next delivery.
#[async_trait]
pub trait TicketSubscriber: Send + Sync {
    fn name(&self) -> &'static str;

    async fn notify(&self, notification: &TicketNotification) -> anyhow::Result<()>;
}

#[derive(Default, Clone)]
pub struct Dispatcher {
    subscribers: Vec<Arc<dyn TicketSubscriber>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, subscriber: Arc<dyn TicketSubscriber>) {
        self.subscribers.push(subscriber);
    }

    /// Deliver in registration order, stopping at the first failure.
    pub async fn dispatch(&self, notification: &TicketNotification) -> anyhow::Result<()> {
        for subscriber in &self.subscribers {
            subscriber.notify(notification).await.map_err(|e| {
                e.context(format!(
                    "subscriber {} failed on ticket {}",
                    subscriber.name(),
                    notification.ticket().zendesk_id
                ))
            })?;
        }
        Ok(())
    }
}

/// Logs every notification.
pub struct LogSubscriber;

#[async_trait]
impl TicketSubscriber for LogSubscriber {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn notify(&self, notification: &TicketNotification) -> anyhow::Result<()> {
        let ticket = notification.ticket();
        match notification {
            TicketNotification::TicketCreated { .. } => {
                tracing::info!(
                    zendesk_id = ticket.zendesk_id,
                    requester_id = ticket.requester_id,
                    "Ticket created"
                );
            }
            TicketNotification::TicketUpdated { updates, .. } if updates.is_empty() => {
                tracing::debug!(zendesk_id = ticket.zendesk_id, "Ticket resynced, nothing changed");
            }
            TicketNotification::TicketUpdated { updates, .. } => {
                tracing::info!(
                    zendesk_id = ticket.zendesk_id,
                    new_comments = updates.new_comments.len(),
                    total_comments = notification.context().post_comments.len(),
                    fields = ?updates.updated_fields.keys().collect::<Vec<_>>(),
                    "Ticket updated"
                );
            }
        }
        Ok(())
    }
}
