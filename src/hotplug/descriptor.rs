//! Immutable snapshot of a hotplug event's properties.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Action kind reported by the hotplug subsystem for a device event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceAction {
    Add,
    Remove,
    Change,
    Move,
    /// Bind/unbind and anything else the kernel may grow later.
    Other,
}

impl DeviceAction {
    /// Canonical lowercase name, matching the kernel's ACTION property.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Remove => "remove",
            Self::Change => "change",
            Self::Move => "move",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for DeviceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(target_os = "linux")]
impl From<udev::EventType> for DeviceAction {
    fn from(value: udev::EventType) -> Self {
        match value {
            udev::EventType::Add => Self::Add,
            udev::EventType::Remove => Self::Remove,
            udev::EventType::Change => Self::Change,
            _ => Self::Other,
        }
    }
}

/// Immutable property snapshot of one device event, captured at delivery
/// time. The `device_node` is the correlation key between add/remove events
/// and registry entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub action: DeviceAction,
    pub device_node: String,
    pub fs_label: Option<String>,
    pub vendor: Option<String>,
    pub model: Option<String>,
    pub bus_type: Option<String>,
    pub fs_type: Option<String>,
}

impl DeviceDescriptor {
    /// Bare descriptor with just an action and a node; display metadata is
    /// filled in by the capture path (or by test setup).
    #[must_use]
    pub fn new(action: DeviceAction, device_node: impl Into<String>) -> Self {
        Self {
            action,
            device_node: device_node.into(),
            fs_label: None,
            vendor: None,
            model: None,
            bus_type: None,
            fs_type: None,
        }
    }

    /// Whether the device reports a USB bus type (removable-only filtering).
    #[must_use]
    pub fn is_usb(&self) -> bool {
        self.bus_type.as_deref() == Some("usb")
    }

    /// Whether the device node carries a filesystem (a usable partition,
    /// not a raw disk).
    #[must_use]
    pub const fn has_filesystem(&self) -> bool {
        self.fs_type.is_some()
    }

    /// Copy of this descriptor rewritten as a synthetic `add` event, used
    /// when enumerating devices already present at startup.
    #[must_use]
    pub fn as_synthetic_add(&self) -> Self {
        let mut copy = self.clone();
        copy.action = DeviceAction::Add;
        copy
    }

    /// Capture a descriptor from a udev device. Returns `None` when the
    /// device has no node to correlate events by.
    #[cfg(target_os = "linux")]
    #[must_use]
    pub fn from_udev(action: DeviceAction, device: &udev::Device) -> Option<Self> {
        let property = |key: &str| {
            device
                .property_value(key)
                .map(|value| value.to_string_lossy().into_owned())
        };
        Some(Self {
            action,
            device_node: device.devnode()?.to_string_lossy().into_owned(),
            fs_label: property("ID_FS_LABEL"),
            vendor: property("ID_VENDOR"),
            model: property("ID_MODEL"),
            bus_type: property("ID_BUS"),
            fs_type: property("ID_FS_TYPE"),
        })
    }
}
