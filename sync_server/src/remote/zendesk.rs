//! Zendesk REST client (API token auth, JSON).

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{
    RemoteAttachment, RemoteComment, RemoteIdentity, RemoteSnapshotFetcher, RemoteTicket,
    RemoteUser, RemoteUserDirectory, UserFields, UserSearch,
};
use crate::error::RemoteError;
use crate::models::user::SYSTEM_USER_ZENDESK_ID;

/// Follow at most this many comment pages for a single ticket.
const MAX_COMMENT_PAGES: usize = 100;

#[derive(Clone)]
pub struct ZendeskClient {
    http: reqwest::Client,
    base_url: String,
    email: String,
    token: String,
}

impl ZendeskClient {
    pub fn new(
        base_url: &str,
        email: &str,
        token: &str,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("zendesk-sync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            email: email.to_string(),
            token: token.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v2/{}", self.base_url, path)
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .basic_auth(format!("{}/token", self.email), Some(&self.token))
            .header("Accept", "application/json")
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, RemoteError> {
        let resp = self.authed(self.http.get(url)).send().await?;
        decode(resp).await
    }

    async fn get_user(&self, user_id: i64) -> Result<RemoteUser, RemoteError> {
        let envelope: UserEnvelope = self.get_json(&self.url(&format!("users/{user_id}.json"))).await?;
        Ok(envelope.user)
    }
}

/// Decode a successful response or classify the failure.
async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, RemoteError> {
    let status = resp.status();
    let bytes = resp.bytes().await?;
    if !status.is_success() {
        let body = String::from_utf8_lossy(&bytes).to_string();
        return Err(classify_failure(status.as_u16(), body));
    }
    serde_json::from_slice(&bytes).map_err(|e| RemoteError::Decode(e.to_string()))
}

/// Map a non-2xx response onto the remote error taxonomy.
pub(crate) fn classify_failure(status: u16, body: String) -> RemoteError {
    match status {
        404 => RemoteError::NotFound(body),
        422 if has_duplicate_detail(&body) => RemoteError::Duplicate(body),
        422 => RemoteError::Validation(body),
        _ => RemoteError::Status { status, body },
    }
}

/// Zendesk reports uniqueness violations as
/// `{"details": {"<field>": [{"error": "DuplicateValue", ..}]}}`.
fn has_duplicate_detail(body: &str) -> bool {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return false;
    };
    value["details"]
        .as_object()
        .map(|fields| {
            fields.values().any(|errors| {
                errors
                    .as_array()
                    .map(|list| list.iter().any(|e| e["error"] == "DuplicateValue"))
                    .unwrap_or(false)
            })
        })
        .unwrap_or(false)
}

// ── Wire records ──

#[derive(Debug, Deserialize)]
struct UserEnvelope {
    user: RemoteUser,
}

#[derive(Debug, Deserialize)]
struct UsersEnvelope {
    #[serde(default)]
    users: Vec<RemoteUser>,
}

#[derive(Debug, Deserialize)]
struct IdentitiesEnvelope {
    #[serde(default)]
    identities: Vec<RemoteIdentity>,
}

#[derive(Debug, Deserialize)]
struct TicketEnvelope {
    ticket: TicketRecord,
    #[serde(default)]
    users: Vec<RemoteUser>,
}

#[derive(Debug, Deserialize)]
struct TicketRecord {
    id: i64,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    subject: Option<String>,
    status: String,
    #[serde(default)]
    priority: Option<String>,
    requester_id: i64,
    #[serde(default)]
    custom_fields: Option<serde_json::Value>,
    #[serde(default)]
    tags: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

impl TicketRecord {
    fn into_remote(self, requester: RemoteUser) -> Result<RemoteTicket, RemoteError> {
        let status = self
            .status
            .parse()
            .map_err(|e: crate::error::UnknownVariant| RemoteError::Decode(e.to_string()))?;
        let priority = match self.priority.as_deref() {
            None | Some("") => None,
            Some(raw) => Some(
                raw.parse()
                    .map_err(|e: crate::error::UnknownVariant| RemoteError::Decode(e.to_string()))?,
            ),
        };
        Ok(RemoteTicket {
            id: self.id,
            url: self.url,
            subject: self.subject,
            status,
            priority,
            custom_fields: self.custom_fields,
            tags: self.tags,
            created_at: self.created_at,
            updated_at: self.updated_at,
            requester,
        })
    }
}

#[derive(Debug, Deserialize)]
struct CommentsPage {
    #[serde(default)]
    comments: Vec<CommentRecord>,
    #[serde(default)]
    users: Vec<RemoteUser>,
    #[serde(default)]
    next_page: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CommentRecord {
    id: i64,
    author_id: i64,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    html_body: Option<String>,
    #[serde(default)]
    plain_body: Option<String>,
    public: bool,
    created_at: DateTime<Utc>,
    #[serde(default)]
    attachments: Vec<RemoteAttachment>,
}

impl CommentRecord {
    fn into_remote(self, author: Option<RemoteUser>) -> RemoteComment {
        RemoteComment {
            id: self.id,
            author_id: self.author_id,
            author,
            body: self.body,
            html_body: self.html_body,
            plain_body: self.plain_body,
            public: self.public,
            created_at: self.created_at,
            attachments: self.attachments,
        }
    }
}

/// Follow `next_page` links from `first` until the listing ends.
///
/// A listing still advertising more pages after `max_pages` is an error,
/// never a silently truncated result.
async fn collect_pages<F, Fut>(
    first: String,
    max_pages: usize,
    mut fetch: F,
) -> Result<Vec<CommentsPage>, RemoteError>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<CommentsPage, RemoteError>>,
{
    let mut pages = Vec::new();
    let mut next = Some(first);
    while let Some(url) = next.take() {
        if pages.len() == max_pages {
            return Err(RemoteError::TooManyPages { url, max_pages });
        }
        let mut page = fetch(url).await?;
        next = page.next_page.take();
        pages.push(page);
    }
    Ok(pages)
}

#[async_trait]
impl RemoteSnapshotFetcher for ZendeskClient {
    async fn get_ticket(&self, ticket_id: i64) -> Result<RemoteTicket, RemoteError> {
        let envelope: TicketEnvelope = self
            .get_json(&self.url(&format!("tickets/{ticket_id}.json?include=users")))
            .await?;
        let requester_id = envelope.ticket.requester_id;
        let requester = match envelope.users.into_iter().find(|u| u.id == requester_id) {
            Some(user) => user,
            None => self.get_user(requester_id).await?,
        };
        envelope.ticket.into_remote(requester)
    }

    async fn get_comments(&self, ticket_id: i64) -> Result<Vec<RemoteComment>, RemoteError> {
        let first = self.url(&format!("tickets/{ticket_id}/comments.json?include=users"));
        let pages = collect_pages(first, MAX_COMMENT_PAGES, |url| async move {
            self.get_json::<CommentsPage>(&url).await
        })
        .await?;

        let mut records = Vec::new();
        let mut users: HashMap<i64, RemoteUser> = HashMap::new();
        for page in pages {
            users.extend(page.users.into_iter().map(|u| (u.id, u)));
            records.extend(page.comments);
        }

        let mut comments = Vec::with_capacity(records.len());
        for record in records {
            let author = if record.author_id == SYSTEM_USER_ZENDESK_ID {
                None
            } else if let Some(user) = users.get(&record.author_id) {
                Some(user.clone())
            } else {
                let user = self.get_user(record.author_id).await?;
                users.insert(user.id, user.clone());
                Some(user)
            };
            comments.push(record.into_remote(author));
        }
        Ok(comments)
    }
}

#[async_trait]
impl RemoteUserDirectory for ZendeskClient {
    async fn search_users(&self, criteria: &UserSearch) -> Result<Vec<RemoteUser>, RemoteError> {
        let query = match criteria {
            UserSearch::ExternalId(external_id) => vec![("external_id", external_id.clone())],
            UserSearch::Email(email) => vec![("query", format!("email:{email}"))],
        };
        let resp = self
            .authed(self.http.get(self.url("users/search.json")))
            .query(&query)
            .send()
            .await?;
        let envelope: UsersEnvelope = decode(resp).await?;
        Ok(envelope.users)
    }

    async fn create_user(&self, fields: &UserFields) -> Result<RemoteUser, RemoteError> {
        let resp = self
            .authed(self.http.post(self.url("users.json")))
            .json(&serde_json::json!({ "user": fields }))
            .send()
            .await?;
        let envelope: UserEnvelope = decode(resp).await?;
        Ok(envelope.user)
    }

    async fn update_user(
        &self,
        user_id: i64,
        fields: &UserFields,
    ) -> Result<RemoteUser, RemoteError> {
        let resp = self
            .authed(self.http.put(self.url(&format!("users/{user_id}.json"))))
            .json(&serde_json::json!({ "user": fields }))
            .send()
            .await?;
        let envelope: UserEnvelope = decode(resp).await?;
        Ok(envelope.user)
    }

    async fn list_identities(&self, user_id: i64) -> Result<Vec<RemoteIdentity>, RemoteError> {
        let envelope: IdentitiesEnvelope = self
            .get_json(&self.url(&format!("users/{user_id}/identities.json")))
            .await?;
        Ok(envelope.identities)
    }

    async fn make_primary_identity(
        &self,
        user_id: i64,
        identity_id: i64,
    ) -> Result<(), RemoteError> {
        let resp = self
            .authed(self.http.put(self.url(&format!(
                "users/{user_id}/identities/{identity_id}/make_primary.json"
            ))))
            .send()
            .await?;
        let _: serde_json::Value = decode(resp).await?;
        Ok(())
    }
}
