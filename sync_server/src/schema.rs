//! Diesel table definitions for the Zendesk mirror.
//!
//! Tables: zendesk_users, zendesk_tickets, zendesk_comments,
//! zendesk_attachments, zendesk_photos, zendesk_events, plus the host
//! application's accounts / account_emails which users are linked to.
//! Every mirrored table carries a unique `zendesk_id` used as the upsert key.

diesel::table! {
    accounts (id) {
        id -> Int8,
        name -> Nullable<Varchar>,
        email -> Nullable<Varchar>,
        active -> Bool,
    }
}

diesel::table! {
    account_emails (id) {
        id -> Int8,
        account_id -> Int8,
        email -> Varchar,
        verified -> Bool,
        is_primary -> Bool,
    }
}

diesel::table! {
    zendesk_users (id) {
        id -> Int8,
        zendesk_id -> Int8,
        name -> Nullable<Text>,
        alias -> Nullable<Text>,
        email -> Nullable<Varchar>,
        active -> Bool,
        role -> Varchar,
        photo -> Nullable<Jsonb>,
        created_at -> Timestamptz,
        account_id -> Nullable<Int8>,
    }
}

diesel::table! {
    zendesk_tickets (id) {
        id -> Int8,
        zendesk_id -> Int8,
        requester_id -> Int8,
        subject -> Nullable<Text>,
        url -> Nullable<Text>,
        status -> Varchar,
        priority -> Nullable<Varchar>,
        custom_fields -> Nullable<Jsonb>,
        tags -> Nullable<Jsonb>,
        created_at -> Timestamptz,
        updated_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    zendesk_comments (id) {
        id -> Int8,
        zendesk_id -> Int8,
        ticket_id -> Int8,
        author_id -> Int8,
        body -> Nullable<Text>,
        html_body -> Nullable<Text>,
        plain_body -> Nullable<Text>,
        public -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    zendesk_attachments (id) {
        id -> Int8,
        zendesk_id -> Int8,
        comment_id -> Int8,
        file_name -> Text,
        content_url -> Text,
        content_type -> Varchar,
        size -> Int8,
        width -> Nullable<Int4>,
        height -> Nullable<Int4>,
        inline -> Bool,
    }
}

diesel::table! {
    zendesk_photos (id) {
        id -> Int8,
        zendesk_id -> Int8,
        attachment_id -> Int8,
        file_name -> Text,
        content_url -> Text,
        content_type -> Varchar,
        size -> Int8,
        width -> Nullable<Int4>,
        height -> Nullable<Int4>,
    }
}

diesel::table! {
    zendesk_events (id) {
        id -> Int8,
        raw_data -> Bytea,
        payload_sha256 -> Varchar,
        json -> Nullable<Jsonb>,
        remote_ticket_id -> Nullable<Int8>,
        ticket_id -> Nullable<Int8>,
        error -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

// Foreign key relationships
diesel::joinable!(account_emails -> accounts (account_id));
diesel::joinable!(zendesk_users -> accounts (account_id));
diesel::joinable!(zendesk_tickets -> zendesk_users (requester_id));
diesel::joinable!(zendesk_comments -> zendesk_tickets (ticket_id));
diesel::joinable!(zendesk_comments -> zendesk_users (author_id));
diesel::joinable!(zendesk_attachments -> zendesk_comments (comment_id));
diesel::joinable!(zendesk_photos -> zendesk_attachments (attachment_id));
diesel::joinable!(zendesk_events -> zendesk_tickets (ticket_id));

diesel::allow_tables_to_appear_in_same_query!(
    accounts,
    account_emails,
    zendesk_users,
    zendesk_tickets,
    zendesk_comments,
    zendesk_attachments,
    zendesk_photos,
    zendesk_events,
);
