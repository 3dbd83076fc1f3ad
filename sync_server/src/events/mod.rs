//! Notifications published to downstream subscribers.

pub mod ticket;
