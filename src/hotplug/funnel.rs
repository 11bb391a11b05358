//! Event funnel: the single filtering/forwarding path applied to every raw
//! device event, regardless of which delivery mechanism produced it.

use std::sync::Arc;

use crate::daemon::notifications::{NotificationEvent, NotificationManager};
use crate::hotplug::descriptor::{DeviceAction, DeviceDescriptor};
use crate::hotplug::queue::EventQueue;

/// Decides, for one raw observation, whether the event is notification-worthy
/// and/or queue-worthy. Shared by the blocking poll loop and the observer
/// callback so neither duplicates filter logic.
#[derive(Clone)]
pub struct EventFunnel {
    queue: EventQueue,
    notifier: Arc<NotificationManager>,
    only_removable: bool,
}

impl EventFunnel {
    #[must_use]
    pub fn new(queue: EventQueue, notifier: Arc<NotificationManager>, only_removable: bool) -> Self {
        Self {
            queue,
            notifier,
            only_removable,
        }
    }

    /// Run the full funnel on a raw observation:
    ///
    /// 1. events without a filesystem type are discarded outright;
    /// 2. everything else gets an audit notification — including non-USB
    ///    devices that the next step then drops (intentional audit trail);
    /// 3. removable-only mode discards non-USB devices;
    /// 4. add/remove events are enqueued for the poller.
    pub fn observe(&self, descriptor: &DeviceDescriptor) {
        if !descriptor.has_filesystem() {
            return;
        }
        self.notifier
            .notify(&NotificationEvent::device_event(descriptor));
        if self.only_removable && !descriptor.is_usb() {
            return;
        }
        self.check_action(descriptor);
    }

    /// Enqueue the event if its action mutates the registry. Called directly
    /// (bypassing the filesystem-type filter) for synthetic add events built
    /// from the startup enumeration.
    ///
    /// Insertion blocks while the queue is full; the producing context
    /// stalls until the poller drains.
    pub fn check_action(&self, descriptor: &DeviceDescriptor) {
        match descriptor.action {
            DeviceAction::Add | DeviceAction::Remove => {
                self.queue.push(descriptor.action, descriptor.clone());
            }
            DeviceAction::Change | DeviceAction::Move | DeviceAction::Other => {}
        }
    }
}
