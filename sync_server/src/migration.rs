//! Schema migration for the Zendesk mirror tables.

use diesel_async::AsyncPgConnection;
use diesel_async::SimpleAsyncConnection;

/// SQL migration for the mirror and ledger tables.
///
/// Idempotent. The `accounts` tables belong to the host application and are
/// only created here so the service can run standalone.
pub const MIGRATION_SQL: &str = r#"
-- ================================================================
-- Host accounts (owned by the embedding application)
-- ================================================================

CREATE TABLE IF NOT EXISTS accounts (
    id              BIGSERIAL PRIMARY KEY,
    name            VARCHAR(255),
    email           VARCHAR(254),
    active          BOOLEAN NOT NULL DEFAULT TRUE
);

CREATE TABLE IF NOT EXISTS account_emails (
    id              BIGSERIAL PRIMARY KEY,
    account_id      BIGINT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
    email           VARCHAR(254) NOT NULL,
    verified        BOOLEAN NOT NULL DEFAULT FALSE,
    is_primary      BOOLEAN NOT NULL DEFAULT FALSE
);

CREATE INDEX IF NOT EXISTS idx_account_emails_account ON account_emails (account_id);

-- ================================================================
-- Zendesk mirror
-- ================================================================

CREATE TABLE IF NOT EXISTS zendesk_users (
    id              BIGSERIAL PRIMARY KEY,
    zendesk_id      BIGINT NOT NULL UNIQUE,
    name            TEXT,
    alias           TEXT,
    email           VARCHAR(254),
    active          BOOLEAN NOT NULL DEFAULT TRUE,
    role            VARCHAR(8) NOT NULL,
    photo           JSONB,
    created_at      TIMESTAMPTZ NOT NULL,
    account_id      BIGINT REFERENCES accounts(id)
);

CREATE INDEX IF NOT EXISTS idx_zendesk_users_account ON zendesk_users (account_id);

CREATE TABLE IF NOT EXISTS zendesk_tickets (
    id              BIGSERIAL PRIMARY KEY,
    zendesk_id      BIGINT NOT NULL UNIQUE,
    requester_id    BIGINT NOT NULL REFERENCES zendesk_users(id) ON DELETE CASCADE,
    subject         TEXT,
    url             TEXT,
    status          VARCHAR(8) NOT NULL,
    priority        VARCHAR(8),
    custom_fields   JSONB,
    tags            JSONB,
    created_at      TIMESTAMPTZ NOT NULL,
    updated_at      TIMESTAMPTZ
);

CREATE INDEX IF NOT EXISTS idx_zendesk_tickets_requester ON zendesk_tickets (requester_id);
CREATE INDEX IF NOT EXISTS idx_zendesk_tickets_status ON zendesk_tickets (status);

CREATE TABLE IF NOT EXISTS zendesk_comments (
    id              BIGSERIAL PRIMARY KEY,
    zendesk_id      BIGINT NOT NULL UNIQUE,
    ticket_id       BIGINT NOT NULL REFERENCES zendesk_tickets(id) ON DELETE CASCADE,
    author_id       BIGINT NOT NULL REFERENCES zendesk_users(id) ON DELETE CASCADE,
    body            TEXT,
    html_body       TEXT,
    plain_body      TEXT,
    public          BOOLEAN NOT NULL,
    created_at      TIMESTAMPTZ NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_zendesk_comments_ticket ON zendesk_comments (ticket_id, created_at, zendesk_id);

CREATE TABLE IF NOT EXISTS zendesk_attachments (
    id              BIGSERIAL PRIMARY KEY,
    zendesk_id      BIGINT NOT NULL UNIQUE,
    comment_id      BIGINT NOT NULL REFERENCES zendesk_comments(id) ON DELETE CASCADE,
    file_name       TEXT NOT NULL,
    content_url     TEXT NOT NULL,
    content_type    VARCHAR(255) NOT NULL,
    size            BIGINT NOT NULL,
    width           INTEGER,
    height          INTEGER,
    inline          BOOLEAN NOT NULL DEFAULT FALSE
);

CREATE INDEX IF NOT EXISTS idx_zendesk_attachments_comment ON zendesk_attachments (comment_id);

CREATE TABLE IF NOT EXISTS zendesk_photos (
    id              BIGSERIAL PRIMARY KEY,
    zendesk_id      BIGINT NOT NULL UNIQUE,
    attachment_id   BIGINT NOT NULL REFERENCES zendesk_attachments(id) ON DELETE CASCADE,
    file_name       TEXT NOT NULL,
    content_url     TEXT NOT NULL,
    content_type    VARCHAR(255) NOT NULL,
    size            BIGINT NOT NULL,
    width           INTEGER,
    height          INTEGER
);

CREATE INDEX IF NOT EXISTS idx_zendesk_photos_attachment ON zendesk_photos (attachment_id);

-- ================================================================
-- Webhook ledger
-- ================================================================

CREATE TABLE IF NOT EXISTS zendesk_events (
    id              BIGSERIAL PRIMARY KEY,
    raw_data        BYTEA NOT NULL,
    payload_sha256  VARCHAR(64) NOT NULL,
    json            JSONB,
    remote_ticket_id BIGINT,
    ticket_id       BIGINT REFERENCES zendesk_tickets(id) ON DELETE SET NULL,
    error           TEXT,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_zendesk_events_remote_ticket ON zendesk_events (remote_ticket_id);
CREATE INDEX IF NOT EXISTS idx_zendesk_events_created ON zendesk_events (created_at DESC);
"#;

/// Run the mirror migration.
pub async fn run_migration(conn: &mut AsyncPgConnection) -> anyhow::Result<()> {
    conn.batch_execute(MIGRATION_SQL)
        .await
        .map_err(|e| anyhow::anyhow!("zendesk migration failed: {e}"))?;
    Ok(())
}
