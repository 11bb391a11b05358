//! Poller worker: drains queued hotplug events into the device registry and
//! refreshes every tracked record once per cycle.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crate::core::errors::{DwError, Result};
use crate::daemon::notifications::{NotificationEvent, NotificationManager};
use crate::device::record::DeviceRecord;
use crate::hotplug::descriptor::{DeviceAction, DeviceDescriptor};
use crate::hotplug::queue::EventQueue;
use crate::platform::pal::Platform;

const STOP_CHECK_SLICE: Duration = Duration::from_millis(100);

/// Single worker that owns the device registry. One cycle per interval:
/// drain pending queue events, then refresh every tracked record.
pub struct Poller {
    queue: EventQueue,
    platform: Arc<dyn Platform>,
    notifier: Arc<NotificationManager>,
    interval: Duration,
    stop: Arc<AtomicBool>,
    registry: HashMap<String, DeviceRecord>,
}

impl Poller {
    #[must_use]
    pub fn new(
        queue: EventQueue,
        platform: Arc<dyn Platform>,
        notifier: Arc<NotificationManager>,
        interval: Duration,
    ) -> Self {
        Self {
            queue,
            platform,
            notifier,
            interval,
            stop: Arc::new(AtomicBool::new(false)),
            registry: HashMap::new(),
        }
    }

    /// Replace the stop flag with an externally owned one.
    #[must_use]
    pub fn with_stop(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    #[must_use]
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Number of currently tracked devices.
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.registry.len()
    }

    /// Whether a device node is currently tracked.
    #[must_use]
    pub fn contains(&self, device_node: &str) -> bool {
        self.registry.contains_key(device_node)
    }

    /// Spawn the worker on its own thread.
    pub fn spawn(mut self) -> Result<PollerHandle> {
        let stop = Arc::clone(&self.stop);
        let join = thread::Builder::new()
            .name("dw-poller".to_string())
            .spawn(move || self.run())
            .map_err(|error| DwError::Runtime {
                details: format!("failed to spawn poller thread: {error}"),
            })?;
        Ok(PollerHandle {
            stop,
            join: Some(join),
        })
    }

    /// Cycle loop: drain, refresh, sleep. The sleep is sliced so a stop
    /// request is honored well before a full interval elapses.
    pub fn run(&mut self) {
        while !self.stop.load(Ordering::Relaxed) {
            self.run_cycle();
            let mut remaining = self.interval;
            while !remaining.is_zero() && !self.stop.load(Ordering::Relaxed) {
                let slice = remaining.min(STOP_CHECK_SLICE);
                thread::sleep(slice);
                remaining -= slice;
            }
        }
    }

    /// One drain-then-refresh cycle.
    pub fn run_cycle(&mut self) {
        self.drain_events();
        self.refresh_registry();
    }

    /// Apply every queued event to the registry. Only drains what is already
    /// pending; an empty queue never stalls the cycle.
    fn drain_events(&mut self) {
        loop {
            if self.queue.is_empty() {
                break;
            }
            let Some((action, descriptor)) = self.queue.pop_timeout(self.interval) else {
                break;
            };
            match action {
                DeviceAction::Add => self.track(&descriptor),
                DeviceAction::Remove => {
                    // Absence is fine: the device may never have passed the
                    // funnel filters, or was evicted earlier.
                    self.registry.remove(&descriptor.device_node);
                }
                DeviceAction::Change | DeviceAction::Move | DeviceAction::Other => {}
            }
        }
    }

    /// Insert a fresh record for an attached device, discarding any stale
    /// record for the same node, and probe it immediately so the first
    /// snapshot lands in the same cycle as the attach.
    fn track(&mut self, descriptor: &DeviceDescriptor) {
        let mut record = DeviceRecord::new(descriptor, Arc::clone(&self.platform));
        match Self::refresh_record(&self.notifier, &mut record) {
            Ok(()) => {
                self.registry
                    .insert(descriptor.device_node.clone(), record);
            }
            Err(error) => self.evict_notice(&descriptor.device_node, &error),
        }
    }

    /// Refresh every tracked record. A failing record is evicted; one bad
    /// device never aborts the cycle for the rest.
    fn refresh_registry(&mut self) {
        let mut evicted = Vec::new();
        for (node, record) in &mut self.registry {
            if let Err(error) = Self::refresh_record(&self.notifier, record) {
                evicted.push((node.clone(), error));
            }
        }
        for (node, error) in evicted {
            self.registry.remove(&node);
            self.evict_notice(&node, &error);
        }
    }

    /// Advance one record: resolve its mount point if still unmounted, then
    /// sample storage and report any free-space delta.
    ///
    /// Retryable failures (mount table unreadable, path vanished) are
    /// contained so the record gets another chance next cycle; anything else
    /// propagates and the caller evicts.
    fn refresh_record(notifier: &NotificationManager, record: &mut DeviceRecord) -> Result<()> {
        if !record.is_mounted() {
            match record.resolve_mount() {
                Ok(_) => {}
                Err(error) if error.is_retryable() => {
                    notifier.notify(&NotificationEvent::Error {
                        code: error.code().to_string(),
                        message: error.to_string(),
                    });
                    return Ok(());
                }
                Err(error) => return Err(error),
            }
        }
        if record.is_mounted() {
            record.sample_storage()?;
            record.report_delta(notifier);
        }
        Ok(())
    }

    fn evict_notice(&self, device_node: &str, error: &DwError) {
        self.notifier.notify(&NotificationEvent::DeviceEvicted {
            device_node: device_node.to_string(),
            details: error.to_string(),
        });
    }
}

/// Handle to a running poller thread.
pub struct PollerHandle {
    stop: Arc<AtomicBool>,
    join: Option<thread::JoinHandle<()>>,
}

impl PollerHandle {
    /// Request the worker to stop and wait for it to exit. Idempotent.
    pub fn destroy(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.destroy();
    }
}
