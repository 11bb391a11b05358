//! Daemon plumbing: the poller worker, notification delivery, and signal
//! handling.

pub mod notifications;
pub mod poller;
#[cfg(feature = "daemon")]
pub mod signals;
