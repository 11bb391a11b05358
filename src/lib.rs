#![forbid(unsafe_code)]

//! drivewatch — background monitor for removable USB storage.
//!
//! Tracks partition attach/detach events from the platform hotplug subsystem
//! and watches free space on mounted devices:
//! 1. **Hotplug monitor** — udev subscription filtered to block-subsystem
//!    partitions, with a polling and an observer delivery mode
//! 2. **Event funnel** — audit notifications plus removable-only filtering
//!    in front of a bounded event queue
//! 3. **Poller** — a single worker reconciling the device registry and
//!    reporting free-space deltas between samples
//!
//! # Library usage
//!
//! Use the [`prelude`] for convenient access to the most common types:
//!
//! ```rust,no_run
//! use drivewatch::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use drivewatch::core::config::Config;
//! use drivewatch::hotplug::queue::EventQueue;
//! ```

pub mod prelude;

pub mod core;
pub mod daemon;
pub mod device;
pub mod hotplug;
pub mod platform;
