//! Push local accounts into Zendesk as users.

use std::sync::Arc;

use crate::error::RemoteError;
use crate::models::account::Account;
use crate::models::user::ZendeskUser;
use crate::remote::{RemoteUser, RemoteUserDirectory, UserFields, UserSearch};
use crate::services::user_service::UserReconciler;
use crate::store::AccountDirectory;

/// Outcome of looking an account up remotely.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub user: Option<RemoteUser>,
    /// The match came from a strong identifier (external id or verified
    /// email) rather than a best guess.
    pub definite: bool,
}

impl Resolution {
    fn none() -> Self {
        Self {
            user: None,
            definite: false,
        }
    }

    fn found(user: RemoteUser, definite: bool) -> Self {
        Self {
            user: Some(user),
            definite,
        }
    }
}

pub struct AccountPusher {
    remote: Arc<dyn RemoteUserDirectory>,
    accounts: Arc<dyn AccountDirectory>,
    users: UserReconciler,
}

impl AccountPusher {
    pub fn new(
        remote: Arc<dyn RemoteUserDirectory>,
        accounts: Arc<dyn AccountDirectory>,
        users: UserReconciler,
    ) -> Self {
        Self {
            remote,
            accounts,
            users,
        }
    }

    /// Find the remote user for `account`: by external id, then by the
    /// account's tracked emails, then by its primary email.
    pub async fn resolve(&self, account: &Account) -> anyhow::Result<Resolution> {
        if let Some(user) = self.search_external_id(account).await? {
            return Ok(Resolution::found(user, true));
        }

        if let Some(emails) = self.accounts.account_emails(account.id).await? {
            for email in emails {
                if let Some(user) = self.search(UserSearch::Email(email.email.clone())).await? {
                    return Ok(Resolution::found(user, email.verified));
                }
            }
        }

        if let Some(email) = &account.email {
            if let Some(user) = self.search(UserSearch::Email(email.clone())).await? {
                return Ok(Resolution::found(user, false));
            }
        }

        Ok(Resolution::none())
    }

    /// Create the remote user for `account`.
    ///
    /// A duplicate-value rejection means another writer created it first;
    /// that user is looked up by external id and returned instead.
    pub async fn create_remote_user(&self, account: &Account) -> anyhow::Result<RemoteUser> {
        match self.remote.create_user(&user_fields(account)).await {
            Ok(user) => {
                tracing::info!(account_id = account.id, zendesk_id = user.id, "Remote user created");
                Ok(user)
            }
            Err(RemoteError::Duplicate(detail)) => {
                tracing::info!(
                    account_id = account.id,
                    %detail,
                    "Remote user already exists, resolving by external id"
                );
                self.search_external_id(account).await?.ok_or_else(|| {
                    anyhow::anyhow!(
                        "remote reported a duplicate for account {} but no user has external id {}",
                        account.id,
                        account.external_id()
                    )
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Make sure `account_id` exists in Zendesk and mirror the result.
    ///
    /// Definite matches are updated with the account's details and get its
    /// email made primary. Weak matches are left untouched remotely: an
    /// unverified address is not enough to claim someone else's user.
    pub async fn push_account(&self, account_id: i64) -> anyhow::Result<ZendeskUser> {
        let account = self
            .accounts
            .get_account(account_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("account {account_id} not found"))?;

        let resolution = self.resolve(&account).await?;
        let remote = match resolution.user {
            None => self.create_remote_user(&account).await?,
            Some(user) if resolution.definite => {
                let user = self.remote.update_user(user.id, &user_fields(&account)).await?;
                self.ensure_primary_email(&account, &user).await?;
                user
            }
            Some(user) => {
                tracing::warn!(
                    account_id,
                    zendesk_id = user.id,
                    "Only a weak match found, remote user left unchanged"
                );
                user
            }
        };

        self.users.reconcile(&remote).await
    }

    async fn ensure_primary_email(&self, account: &Account, user: &RemoteUser) -> anyhow::Result<()> {
        let Some(email) = &account.email else {
            return Ok(());
        };
        let identities = self.remote.list_identities(user.id).await?;
        let identity = identities
            .iter()
            .find(|i| i.kind == "email" && i.value.eq_ignore_ascii_case(email));
        if let Some(identity) = identity.filter(|i| !i.primary) {
            self.remote.make_primary_identity(user.id, identity.id).await?;
            tracing::info!(zendesk_id = user.id, identity_id = identity.id, "Primary email updated");
        }
        Ok(())
    }

    async fn search_external_id(&self, account: &Account) -> anyhow::Result<Option<RemoteUser>> {
        self.search(UserSearch::ExternalId(account.external_id())).await
    }

    async fn search(&self, criteria: UserSearch) -> anyhow::Result<Option<RemoteUser>> {
        let users = self.remote.search_users(&criteria).await?;
        Ok(users.into_iter().next())
    }
}

fn user_fields(account: &Account) -> UserFields {
    UserFields {
        name: account.name.clone(),
        email: account.email.clone(),
        external_id: Some(account.external_id()),
        verified: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::testing::{self, FakeRemote};

    fn account(id: i64, email: &str) -> Account {
        Account {
            id,
            name: Some("Ada Lovelace".into()),
            email: Some(email.into()),
            active: true,
        }
    }

    fn pusher(store: &Arc<MemoryStore>, remote: &Arc<FakeRemote>) -> AccountPusher {
        AccountPusher::new(
            remote.clone(),
            store.clone(),
            UserReconciler::new(store.clone(), store.clone()),
        )
    }

    fn remote_user(id: i64, external_id: Option<&str>, email: &str) -> RemoteUser {
        let mut user = testing::remote_user(id);
        user.external_id = external_id.map(str::to_string);
        user.email = Some(email.into());
        user
    }

    #[tokio::test]
    async fn external_id_match_is_definite() {
        let store = Arc::new(MemoryStore::new());
        let remote = Arc::new(FakeRemote::new());
        remote.put_user(remote_user(7, Some("42"), "other@example.com"));

        let resolution = pusher(&store, &remote)
            .resolve(&account(42, "ada@example.com"))
            .await
            .unwrap();
        assert_eq!(resolution.user.map(|u| u.id), Some(7));
        assert!(resolution.definite);
    }

    #[tokio::test]
    async fn email_matches_follow_verification() {
        let store = Arc::new(MemoryStore::new().with_email_verification(true));
        let remote = Arc::new(FakeRemote::new());
        remote.put_user(remote_user(8, None, "old@example.com"));
        remote.put_user(remote_user(9, None, "ada@example.com"));
        let ada = account(42, "ada@example.com");
        store
            .add_account(
                ada.clone(),
                vec![("old@example.com".into(), true), ("ada@example.com".into(), false)],
            )
            .await;

        let resolution = pusher(&store, &remote).resolve(&ada).await.unwrap();
        assert_eq!(resolution.user.map(|u| u.id), Some(8));
        assert!(resolution.definite);
    }

    #[tokio::test]
    async fn primary_email_match_is_weak() {
        let store = Arc::new(MemoryStore::new());
        let remote = Arc::new(FakeRemote::new());
        remote.put_user(remote_user(9, None, "ada@example.com"));

        let resolution = pusher(&store, &remote)
            .resolve(&account(42, "ada@example.com"))
            .await
            .unwrap();
        assert_eq!(resolution.user.map(|u| u.id), Some(9));
        assert!(!resolution.definite);
    }

    #[tokio::test]
    async fn no_match_is_none_and_not_definite() {
        let store = Arc::new(MemoryStore::new());
        let remote = Arc::new(FakeRemote::new());
        let resolution = pusher(&store, &remote)
            .resolve(&account(42, "ada@example.com"))
            .await
            .unwrap();
        assert_eq!(resolution, Resolution::none());
    }

    #[tokio::test]
    async fn duplicate_on_create_recovers_the_existing_user() {
        let store = Arc::new(MemoryStore::new());
        let remote = Arc::new(FakeRemote::new());
        // another writer won the race: the user exists but create still fails
        remote.put_user(remote_user(7, Some("42"), "ada@example.com"));
        remote.fail_create_with(RemoteError::Duplicate("Email is already being used".into()));

        let user = pusher(&store, &remote)
            .create_remote_user(&account(42, "ada@example.com"))
            .await
            .unwrap();
        assert_eq!(user.id, 7);
    }

    #[tokio::test]
    async fn other_validation_errors_propagate() {
        let store = Arc::new(MemoryStore::new());
        let remote = Arc::new(FakeRemote::new());
        remote.fail_create_with(RemoteError::Validation("Name is too long".into()));

        let err = pusher(&store, &remote)
            .create_remote_user(&account(42, "ada@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RemoteError>(),
            Some(RemoteError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn push_creates_and_links_a_missing_user() {
        let store = Arc::new(MemoryStore::new());
        let remote = Arc::new(FakeRemote::new());
        store.add_account(account(42, "ada@example.com"), vec![]).await;

        let user = pusher(&store, &remote).push_account(42).await.unwrap();
        assert_eq!(user.account_id, Some(42));
        assert_eq!(remote.created().len(), 1);
        assert_eq!(remote.created()[0].external_id.as_deref(), Some("42"));
    }

    #[tokio::test]
    async fn push_updates_definite_match_and_promotes_email() {
        let store = Arc::new(MemoryStore::new());
        let remote = Arc::new(FakeRemote::new());
        store.add_account(account(42, "ada@example.com"), vec![]).await;
        remote.put_user(remote_user(7, Some("42"), "old@example.com"));
        remote.put_identity(testing::email_identity(70, 7, "old@example.com", true));
        remote.put_identity(testing::email_identity(71, 7, "Ada@Example.com", false));

        pusher(&store, &remote).push_account(42).await.unwrap();
        assert_eq!(remote.updated().len(), 1);
        assert_eq!(remote.made_primary(), vec![(7, 71)]);
        assert!(remote.created().is_empty());
    }

    #[tokio::test]
    async fn push_leaves_weak_match_alone() {
        let store = Arc::new(MemoryStore::new());
        let remote = Arc::new(FakeRemote::new());
        store.add_account(account(42, "ada@example.com"), vec![]).await;
        remote.put_user(remote_user(9, None, "ada@example.com"));

        let user = pusher(&store, &remote).push_account(42).await.unwrap();
        assert_eq!(user.zendesk_id, 9);
        assert_eq!(user.account_id, None);
        assert!(remote.updated().is_empty());
        assert!(remote.created().is_empty());
    }
}
