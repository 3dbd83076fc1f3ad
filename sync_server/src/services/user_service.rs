//! Mirror Zendesk users locally and link them to host accounts.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::OnceCell;

use crate::models::user::{NewZendeskUser, ZendeskUser};
use crate::remote::RemoteUser;
use crate::store::{AccountDirectory, SyncStore};

pub struct UserReconciler {
    store: Arc<dyn SyncStore>,
    accounts: Arc<dyn AccountDirectory>,
    system_user: OnceCell<ZendeskUser>,
}

impl UserReconciler {
    pub fn new(store: Arc<dyn SyncStore>, accounts: Arc<dyn AccountDirectory>) -> Self {
        Self {
            store,
            accounts,
            system_user: OnceCell::new(),
        }
    }

    /// Update-or-create the local mirror of `remote`.
    ///
    /// The account link follows the remote `external_id`; an id that doesn't
    /// resolve to a local account clears the link.
    pub async fn reconcile(&self, remote: &RemoteUser) -> anyhow::Result<ZendeskUser> {
        let account_id = match remote.external_id.as_deref() {
            Some(external_id) => self.accounts.find_by_external_id(external_id).await?,
            None => None,
        };

        let user = self
            .store
            .upsert_user(NewZendeskUser {
                zendesk_id: remote.id,
                name: remote.name.clone(),
                alias: remote.alias.clone(),
                email: remote.email.clone(),
                active: remote.active,
                role: remote.role,
                photo: remote.photo.clone(),
                created_at: remote.created_at,
                account_id,
            })
            .await?;

        tracing::debug!(
            zendesk_id = user.zendesk_id,
            account_id = ?user.account_id,
            "User synced"
        );

        Ok(user)
    }

    /// The local stand-in for comments Zendesk authored itself.
    pub async fn system_user(&self) -> anyhow::Result<&ZendeskUser> {
        self.system_user
            .get_or_try_init(|| async {
                self.store
                    .get_or_create_user(NewZendeskUser::system(Utc::now()))
                    .await
            })
            .await
    }
}
