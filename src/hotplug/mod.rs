//! Hotplug subsystem: udev event source, descriptor normalization, the
//! filtering funnel, the bounded event queue, and the device monitor driving
//! them in polling or observer mode.

pub mod descriptor;
pub mod funnel;
pub mod monitor;
pub mod queue;
pub mod source;
