//! Sync services: user/ticket reconciliation, change detection, locking,
//! the event ledger and account push.

pub mod account_service;
pub mod change_service;
pub mod dispatch;
pub mod event_service;
pub mod lock_service;
pub mod sync_service;
pub mod ticket_service;
pub mod user_service;
