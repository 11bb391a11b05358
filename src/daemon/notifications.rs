//! Multi-channel notification system: journal and file channels.
//!
//! Dispatches structured notifications through configured channels with
//! min-level filtering. Each channel is fire-and-forget — notification
//! failures are logged but never block the monitor or the poller.

#![allow(missing_docs)]

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::bytes::convert_bytes;
use crate::hotplug::descriptor::{DeviceAction, DeviceDescriptor};

// ──────────────────── notification level ────────────────────

/// Severity level for notification filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

impl fmt::Display for NotificationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

// ──────────────────── notification events ────────────────────

/// A structured notification event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationEvent {
    /// Raw hotplug event audit line, emitted for every filesystem-bearing
    /// event regardless of removable-only filtering.
    DeviceEvent {
        action: DeviceAction,
        device_node: String,
        fs_label: Option<String>,
        vendor: Option<String>,
        model: Option<String>,
        bus_type: Option<String>,
        fs_type: Option<String>,
    },
    /// Free space on a mounted drive changed between two samples.
    DriveModified {
        device_node: String,
        fs_label: Option<String>,
        vendor: Option<String>,
        model: Option<String>,
        /// "Size Added" when space was consumed, "Size Removed" when freed.
        change: String,
        bytes: u64,
    },
    /// A tracked record failed an unexpected probe and was dropped.
    DeviceEvicted {
        device_node: String,
        details: String,
    },
    MonitorStarted {
        version: String,
        mode: String,
        seeded_devices: usize,
    },
    MonitorStopped {
        reason: String,
        uptime_secs: u64,
    },
    Error {
        code: String,
        message: String,
    },
}

impl NotificationEvent {
    /// Build the audit event for a raw hotplug observation.
    #[must_use]
    pub fn device_event(descriptor: &DeviceDescriptor) -> Self {
        Self::DeviceEvent {
            action: descriptor.action,
            device_node: descriptor.device_node.clone(),
            fs_label: descriptor.fs_label.clone(),
            vendor: descriptor.vendor.clone(),
            model: descriptor.model.clone(),
            bus_type: descriptor.bus_type.clone(),
            fs_type: descriptor.fs_type.clone(),
        }
    }

    /// The severity level of this event (for min-level filtering).
    #[must_use]
    pub const fn level(&self) -> NotificationLevel {
        match self {
            Self::DeviceEvent { .. }
            | Self::DriveModified { .. }
            | Self::MonitorStarted { .. }
            | Self::MonitorStopped { .. } => NotificationLevel::Info,
            Self::DeviceEvicted { .. } => NotificationLevel::Warning,
            Self::Error { .. } => NotificationLevel::Error,
        }
    }

    /// Short human-readable summary line.
    #[must_use]
    pub fn summary(&self) -> String {
        let display = |value: &Option<String>| value.clone().unwrap_or_else(|| "-".to_string());
        match self {
            Self::DeviceEvent {
                action,
                device_node,
                fs_label,
                vendor,
                model,
                bus_type,
                fs_type,
            } => format!(
                "Action: {action} {device_node} (label={}, vendor={}, model={}, bus={}, fs={})",
                display(fs_label),
                display(vendor),
                display(model),
                display(bus_type),
                display(fs_type),
            ),
            Self::DriveModified {
                device_node,
                fs_label,
                vendor,
                model,
                change,
                bytes,
            } => format!(
                "Drive modification on {device_node} (label={}, vendor={}, model={}) {change}: {}",
                display(fs_label),
                display(vendor),
                display(model),
                convert_bytes(*bytes),
            ),
            Self::DeviceEvicted {
                device_node,
                details,
            } => format!("Dropped {device_node} from tracking: {details}"),
            Self::MonitorStarted {
                version,
                mode,
                seeded_devices,
            } => format!(
                "drivewatch v{version} started in {mode} mode, {seeded_devices} devices already present"
            ),
            Self::MonitorStopped {
                reason,
                uptime_secs,
            } => {
                let hours = uptime_secs / 3600;
                let minutes = (uptime_secs % 3600) / 60;
                format!("drivewatch stopped ({reason}) after {hours}h {minutes}m")
            }
            Self::Error { code, message } => format!("[{code}] {message}"),
        }
    }
}

// ──────────────────── configuration ────────────────────

/// Top-level notification configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NotificationConfig {
    /// Master switch for all notifications.
    pub enabled: bool,
    /// Which channel names to activate.
    pub channels: Vec<String>,
    pub file: FileConfig,
    pub journal: JournalConfig,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            channels: vec!["journal".to_string()],
            file: FileConfig::default(),
            journal: JournalConfig::default(),
        }
    }
}

/// File notification settings (append-only JSONL).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FileConfig {
    pub path: PathBuf,
}

impl Default for FileConfig {
    fn default() -> Self {
        let home = std::env::var_os("HOME").map_or_else(|| PathBuf::from("/tmp"), PathBuf::from);
        Self {
            path: home
                .join(".local")
                .join("share")
                .join("drivewatch")
                .join("notifications.jsonl"),
        }
    }
}

/// Journal notification settings (systemd journal via stderr).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct JournalConfig {
    pub min_level: NotificationLevel,
}

impl Default for JournalConfig {
    fn default() -> Self {
        // Audit logging of raw device events is the point of this daemon,
        // so the journal defaults to Info rather than Warning.
        Self {
            min_level: NotificationLevel::Info,
        }
    }
}

// ──────────────────── JSONL record ────────────────────

/// A single notification record written to the JSONL file.
#[derive(Debug, Serialize)]
struct NotificationRecord {
    ts: String,
    level: NotificationLevel,
    summary: String,
    #[serde(flatten)]
    event: NotificationEvent,
}

// ──────────────────── notification channels ────────────────────

/// A notification channel that can dispatch events.
trait Channel: Send + Sync {
    fn name(&self) -> &'static str;
    fn send(&self, event: &NotificationEvent);
}

// ──── File (append-only JSONL) ────

struct FileChannel {
    path: PathBuf,
}

impl FileChannel {
    fn new(config: &FileConfig) -> Self {
        Self {
            path: config.path.clone(),
        }
    }
}

impl Channel for FileChannel {
    fn name(&self) -> &'static str {
        "file"
    }

    fn send(&self, event: &NotificationEvent) {
        let record = NotificationRecord {
            ts: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            level: event.level(),
            summary: event.summary(),
            event: event.clone(),
        };

        let Ok(json) = serde_json::to_string(&record) else {
            return;
        };

        if let Some(parent) = self.path.parent() {
            let _ = fs::create_dir_all(parent);
        }

        let file = {
            let mut opts = OpenOptions::new();
            opts.create(true).append(true);
            #[cfg(unix)]
            {
                use std::os::unix::fs::OpenOptionsExt as _;
                opts.mode(0o600);
            }
            opts.open(&self.path)
        };

        if let Ok(mut f) = file {
            let _ = writeln!(f, "{json}");
        }
    }
}

// ──── Journal (systemd structured stderr) ────

struct JournalChannel {
    min_level: NotificationLevel,
}

impl JournalChannel {
    const fn new(config: &JournalConfig) -> Self {
        Self {
            min_level: config.min_level,
        }
    }
}

impl Channel for JournalChannel {
    fn name(&self) -> &'static str {
        "journal"
    }

    fn send(&self, event: &NotificationEvent) {
        if event.level() < self.min_level {
            return;
        }

        // systemd captures stderr and annotates with PRIORITY via
        // SyslogIdentifier.
        let priority = match event.level() {
            NotificationLevel::Error => "ERR",
            NotificationLevel::Warning => "WARNING",
            NotificationLevel::Info => "INFO",
        };

        eprintln!("[DW-NOTIFY] [{priority}] {}", event.summary());
    }
}

// ──────────────────── notification manager ────────────────────

/// Coordinates dispatching notification events to all enabled channels.
///
/// Dispatch takes `&self` so the manager can sit behind an `Arc` shared by
/// the event-producing context and the poller worker. Each channel's
/// `send()` is fire-and-forget; failures never propagate.
pub struct NotificationManager {
    channels: Vec<Box<dyn Channel>>,
    enabled: bool,
}

impl NotificationManager {
    /// Build a manager from configuration.
    #[must_use]
    pub fn from_config(config: &NotificationConfig) -> Self {
        if !config.enabled {
            return Self::disabled();
        }

        let mut channels: Vec<Box<dyn Channel>> = Vec::new();
        for channel_name in &config.channels {
            match channel_name.as_str() {
                "file" => channels.push(Box::new(FileChannel::new(&config.file))),
                "journal" => channels.push(Box::new(JournalChannel::new(&config.journal))),
                _ => {
                    // Unknown channel name — skip silently.
                }
            }
        }

        Self {
            channels,
            enabled: true,
        }
    }

    /// Create a disabled (no-op) manager.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            channels: Vec::new(),
            enabled: false,
        }
    }

    /// Dispatch a notification event to all enabled channels.
    pub fn notify(&self, event: &NotificationEvent) {
        if !self.enabled {
            return;
        }

        for channel in &self.channels {
            channel.send(event);
        }
    }

    /// Number of active channels.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Whether the manager is enabled.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// List the names of active channels.
    #[must_use]
    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name()).collect()
    }
}

// ──────────────────── tests ────────────────────
