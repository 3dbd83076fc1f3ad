//! Sync server configuration, loaded from environment variables.

use std::time::Duration;

/// Which [`SyncStore`](crate::store::SyncStore) backs the server.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreKind {
    Postgres,
    Memory,
}

#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// Shared secret the webhook must present. Empty rejects every request.
    pub webhook_secret: String,
    /// Zendesk API root, e.g. `https://acme.zendesk.com`.
    pub api_url: String,
    /// Agent email for API token auth.
    pub api_email: String,
    pub api_token: String,
    pub store: StoreKind,
    /// Serialize syncs across processes with Postgres advisory locks.
    pub advisory_locks: bool,
    /// Whether `account_emails` is maintained by an email verification flow.
    pub verified_emails: bool,
    /// Raw payloads are stored truncated to this many bytes.
    pub max_payload_bytes: usize,
    pub http_timeout: Duration,
    /// Connections for store queries.
    pub db_pool_size: usize,
    /// Connections reserved for holding advisory locks, kept apart from the
    /// store pool so lock holders can always reach the database.
    pub lock_pool_size: usize,
    /// How long a caller waits for a free pooled connection.
    pub db_wait_timeout: Duration,
    /// How long a sync waits to acquire a ticket's advisory lock.
    pub lock_timeout: Duration,
}

impl SyncConfig {
    pub fn from_env() -> Self {
        let webhook_secret = std::env::var("ZENDESK_WEBHOOK_SECRET").unwrap_or_default();
        let subdomain = std::env::var("ZENDESK_SUBDOMAIN").unwrap_or_default();
        let api_url = std::env::var("ZENDESK_API_URL")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| format!("https://{subdomain}.zendesk.com"));
        let api_email = std::env::var("ZENDESK_EMAIL").unwrap_or_default();
        let api_token = std::env::var("ZENDESK_TOKEN").unwrap_or_default();
        let store = match std::env::var("ZENDESK_STORE").as_deref() {
            Ok("memory") => StoreKind::Memory,
            Ok("postgres") | Ok("") | Err(_) => StoreKind::Postgres,
            Ok(other) => {
                tracing::warn!("Unknown ZENDESK_STORE `{other}`, using postgres");
                StoreKind::Postgres
            }
        };
        let advisory_locks = env_flag("ZENDESK_ADVISORY_LOCKS", true);
        let verified_emails = env_flag("ZENDESK_VERIFIED_EMAILS", false);
        let max_payload_bytes = std::env::var("ZENDESK_MAX_PAYLOAD_BYTES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(64 * 1024);
        let http_timeout = std::env::var("ZENDESK_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(30));
        let db_pool_size = env_size("ZENDESK_DB_POOL_SIZE", 10);
        let lock_pool_size = env_size("ZENDESK_LOCK_POOL_SIZE", db_pool_size);
        let db_wait_timeout = env_secs("ZENDESK_DB_WAIT_TIMEOUT_SECS", 30);
        let lock_timeout = env_secs("ZENDESK_LOCK_TIMEOUT_SECS", 60);

        if webhook_secret.is_empty() {
            tracing::warn!("ZENDESK_WEBHOOK_SECRET not set -- all webhook requests will be rejected");
        }
        if subdomain.is_empty() && std::env::var("ZENDESK_API_URL").is_err() {
            tracing::warn!("ZENDESK_SUBDOMAIN not set -- remote API calls will fail");
        }
        if api_token.is_empty() {
            tracing::warn!("ZENDESK_TOKEN not set -- remote API calls will be unauthenticated");
        }

        Self {
            webhook_secret,
            api_url,
            api_email,
            api_token,
            store,
            advisory_locks,
            verified_emails,
            max_payload_bytes,
            http_timeout,
            db_pool_size,
            lock_pool_size,
            db_wait_timeout,
            lock_timeout,
        }
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(value) => matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

/// Positive integer from the environment, else `default`.
fn env_size(name: &str, default: usize) -> usize {
    match std::env::var(name).ok().map(|s| s.trim().parse::<usize>()) {
        Some(Ok(n)) if n > 0 => n,
        Some(_) => {
            tracing::warn!("Invalid {name}, using {default}");
            default
        }
        None => default,
    }
}

fn env_secs(name: &str, default: u64) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(default))
}
