//! Hotplug event sources: the udev-backed subscription and a scripted
//! in-memory source for deterministic tests.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::core::errors::Result;
use crate::hotplug::descriptor::{DeviceAction, DeviceDescriptor};

/// Subscription to the platform hotplug subsystem.
///
/// `wait_event` is the blocking primitive both monitor modes are built on;
/// `enumerate` answers the startup question "which partitions already
/// exist?".
pub trait HotplugSource: Send {
    /// Snapshot of currently-present partition devices on the bus.
    fn enumerate(&mut self) -> Result<Vec<DeviceDescriptor>>;

    /// Wait up to `timeout` for the next raw event. `Ok(None)` means the
    /// timeout elapsed without an event.
    fn wait_event(&mut self, timeout: Duration) -> Result<Option<DeviceDescriptor>>;

    /// Whether the source exposes a pollable descriptor. Probed once when
    /// an observer starts, to pick its wait strategy.
    fn pollable(&self) -> bool {
        true
    }
}

/// Live udev subscription filtered to block-subsystem partition events.
#[cfg(target_os = "linux")]
pub struct UdevSource {
    socket: udev::MonitorSocket,
}

#[cfg(target_os = "linux")]
impl UdevSource {
    /// Bind a netlink monitor socket filtered to `block`/`partition`.
    pub fn new() -> Result<Self> {
        let socket = udev::MonitorBuilder::new()
            .and_then(|builder| builder.match_subsystem_devtype("block", "partition"))
            .and_then(udev::MonitorBuilder::listen)
            .map_err(|error| crate::core::errors::DwError::Hotplug {
                details: error.to_string(),
            })?;
        Ok(Self { socket })
    }
}

#[cfg(target_os = "linux")]
impl HotplugSource for UdevSource {
    fn enumerate(&mut self) -> Result<Vec<DeviceDescriptor>> {
        use crate::core::errors::DwError;

        let hotplug_err = |error: std::io::Error| DwError::Hotplug {
            details: error.to_string(),
        };

        let mut enumerator = udev::Enumerator::new().map_err(hotplug_err)?;
        enumerator.match_subsystem("block").map_err(hotplug_err)?;
        enumerator
            .match_property("DEVTYPE", "partition")
            .map_err(hotplug_err)?;
        let devices = enumerator.scan_devices().map_err(hotplug_err)?;
        Ok(devices
            .filter_map(|device| DeviceDescriptor::from_udev(DeviceAction::Add, &device))
            .collect())
    }

    fn wait_event(&mut self, timeout: Duration) -> Result<Option<DeviceDescriptor>> {
        use std::os::fd::AsFd;

        use nix::poll::{PollFd, PollFlags, PollTimeout, poll};

        use crate::core::errors::DwError;

        let millis = u16::try_from(timeout.as_millis()).unwrap_or(u16::MAX);
        let mut fds = [PollFd::new(self.socket.as_fd(), PollFlags::POLLIN)];
        let ready = match poll(&mut fds, PollTimeout::from(millis)) {
            Ok(n) => n,
            // Interrupted by a signal: report "no event" and let the caller
            // re-check its stop flag.
            Err(nix::errno::Errno::EINTR) => return Ok(None),
            Err(errno) => {
                return Err(DwError::Hotplug {
                    details: errno.to_string(),
                });
            }
        };
        if ready == 0 {
            return Ok(None);
        }
        Ok(self.socket.iter().next().and_then(|event| {
            DeviceDescriptor::from_udev(event.event_type().into(), &event.device())
        }))
    }
}

/// Deterministic in-memory source: yields a scripted sequence of events and
/// a fixed enumeration answer.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    present: Vec<DeviceDescriptor>,
    events: VecDeque<DeviceDescriptor>,
    stop_when_drained: Option<Arc<AtomicBool>>,
}

impl ScriptedSource {
    #[must_use]
    pub fn new(present: Vec<DeviceDescriptor>, events: Vec<DeviceDescriptor>) -> Self {
        Self {
            present,
            events: events.into(),
            stop_when_drained: None,
        }
    }

    /// Raise `flag` once the scripted events run out, so a monitor loop
    /// driven by this source terminates on its own.
    #[must_use]
    pub fn stop_when_drained(mut self, flag: Arc<AtomicBool>) -> Self {
        self.stop_when_drained = Some(flag);
        self
    }
}

impl HotplugSource for ScriptedSource {
    fn enumerate(&mut self) -> Result<Vec<DeviceDescriptor>> {
        Ok(self.present.clone())
    }

    fn wait_event(&mut self, _timeout: Duration) -> Result<Option<DeviceDescriptor>> {
        match self.events.pop_front() {
            Some(descriptor) => Ok(Some(descriptor)),
            None => {
                if let Some(flag) = &self.stop_when_drained {
                    flag.store(true, Ordering::Relaxed);
                }
                Ok(None)
            }
        }
    }
}
