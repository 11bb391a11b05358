//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use drivewatch::prelude::*;
//! ```

// Core
pub use crate::core::bytes::convert_bytes;
pub use crate::core::config::{Config, MonitorMode};
pub use crate::core::errors::{DwError, Result};

// Platform
pub use crate::platform::pal::{DiskUsage, MockPlatform, Platform, detect_platform};

// Hotplug
pub use crate::hotplug::descriptor::{DeviceAction, DeviceDescriptor};
pub use crate::hotplug::funnel::EventFunnel;
pub use crate::hotplug::monitor::{DeviceMonitor, ObserverHandle};
pub use crate::hotplug::queue::EventQueue;
pub use crate::hotplug::source::{HotplugSource, ScriptedSource};

// Device registry
pub use crate::device::record::DeviceRecord;

// Daemon
pub use crate::daemon::notifications::{
    NotificationEvent, NotificationLevel, NotificationManager,
};
pub use crate::daemon::poller::{Poller, PollerHandle};
