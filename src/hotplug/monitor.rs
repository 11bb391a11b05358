//! Device monitor: owns the hotplug subscription and feeds the event funnel
//! in one of two mutually exclusive delivery modes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crate::core::errors::{DwError, Result};
use crate::daemon::notifications::{NotificationEvent, NotificationManager};
use crate::hotplug::funnel::EventFunnel;
use crate::hotplug::source::HotplugSource;

/// How an observer thread waits for events. Chosen once when the observer
/// starts: fd-based waiting when the source exposes a pollable descriptor,
/// otherwise short yielding sleeps between non-blocking reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaitStrategy {
    FdPoll,
    Yielding,
}

const YIELD_SLEEP: Duration = Duration::from_millis(10);

/// Tracks attach/detach events from a hotplug source and forwards them
/// through the event funnel.
///
/// Two operating modes, selected once and never switched at runtime:
/// [`DeviceMonitor::run_polling`] (blocking loop on the calling thread) and
/// [`DeviceMonitor::spawn_observer`] (callback-driven observer thread).
pub struct DeviceMonitor<S: HotplugSource> {
    source: S,
    funnel: EventFunnel,
    notifier: Arc<NotificationManager>,
    stop: Arc<AtomicBool>,
    poll_timeout: Duration,
    seeded: bool,
}

impl<S: HotplugSource + 'static> DeviceMonitor<S> {
    #[must_use]
    pub fn new(
        source: S,
        funnel: EventFunnel,
        notifier: Arc<NotificationManager>,
        poll_timeout: Duration,
    ) -> Self {
        Self {
            source,
            funnel,
            notifier,
            stop: Arc::new(AtomicBool::new(false)),
            poll_timeout,
            seeded: false,
        }
    }

    /// Cooperative stop flag observed by whichever mode is running. Setting
    /// it does not interrupt an in-flight wait; exit latency is bounded by
    /// the poll timeout.
    #[must_use]
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Replace the stop flag with an externally owned one, so a single flag
    /// (e.g. the signal handler's) can stop the monitor alongside the rest
    /// of the daemon.
    #[must_use]
    pub fn with_stop(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    /// Enumerate partitions already present on the bus and enqueue a
    /// synthetic `add` for every USB one, so devices attached before process
    /// start are tracked even though no live event for them will arrive.
    ///
    /// Runs at most once; both mode entry points call it implicitly.
    pub fn seed_existing(&mut self) -> Result<usize> {
        if self.seeded {
            return Ok(0);
        }
        self.seeded = true;
        let mut seeded = 0;
        for descriptor in self.source.enumerate()? {
            if descriptor.is_usb() {
                self.funnel.check_action(&descriptor.as_synthetic_add());
                seeded += 1;
            }
        }
        Ok(seeded)
    }

    /// Synchronous mode: blocking wait loop on the calling thread. Returns
    /// once the stop flag is observed.
    pub fn run_polling(mut self) -> Result<()> {
        self.seed_existing()?;
        while !self.stop.load(Ordering::Relaxed) {
            self.step(WaitStrategy::FdPoll);
        }
        Ok(())
    }

    /// Asynchronous mode: spawn an observer thread that runs the same
    /// filtering logic for every delivered event. The wait strategy is a
    /// one-time capability probe of the source, not a per-event decision.
    pub fn spawn_observer(mut self) -> Result<ObserverHandle> {
        self.seed_existing()?;
        let strategy = if self.source.pollable() {
            WaitStrategy::FdPoll
        } else {
            WaitStrategy::Yielding
        };
        let stop = Arc::clone(&self.stop);
        let join = thread::Builder::new()
            .name("dw-observer".to_string())
            .spawn(move || {
                while !self.stop.load(Ordering::Relaxed) {
                    self.step(strategy);
                }
            })
            .map_err(|error| DwError::Runtime {
                details: format!("failed to spawn observer thread: {error}"),
            })?;
        Ok(ObserverHandle {
            stop,
            join: Some(join),
        })
    }

    /// One wait-and-funnel step. Source failures are reported and absorbed;
    /// they never tear down the subscription loop.
    fn step(&mut self, strategy: WaitStrategy) {
        let timeout = match strategy {
            WaitStrategy::FdPoll => self.poll_timeout,
            WaitStrategy::Yielding => Duration::ZERO,
        };
        match self.source.wait_event(timeout) {
            Ok(Some(descriptor)) => self.funnel.observe(&descriptor),
            Ok(None) => {
                if strategy == WaitStrategy::Yielding {
                    thread::sleep(YIELD_SLEEP);
                }
            }
            Err(error) => {
                self.notifier.notify(&NotificationEvent::Error {
                    code: error.code().to_string(),
                    message: error.to_string(),
                });
                thread::sleep(self.poll_timeout);
            }
        }
    }
}

/// Handle to a running observer thread.
pub struct ObserverHandle {
    stop: Arc<AtomicBool>,
    join: Option<thread::JoinHandle<()>>,
}

impl ObserverHandle {
    /// Request the observer to stop and wait for it to exit. Idempotent.
    pub fn destroy(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for ObserverHandle {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::DeviceMonitor;
    use crate::daemon::notifications::NotificationManager;
    use crate::hotplug::descriptor::{DeviceAction, DeviceDescriptor};
    use crate::hotplug::funnel::EventFunnel;
    use crate::hotplug::queue::EventQueue;
    use crate::hotplug::source::ScriptedSource;

    fn usb_partition(action: DeviceAction, node: &str) -> DeviceDescriptor {
        let mut descriptor = DeviceDescriptor::new(action, node);
        descriptor.bus_type = Some("usb".to_string());
        descriptor.fs_type = Some("vfat".to_string());
        descriptor
    }

    fn monitor_parts(only_removable: bool) -> (EventQueue, EventFunnel, Arc<NotificationManager>) {
        let queue = EventQueue::with_capacity(10);
        let notifier = Arc::new(NotificationManager::disabled());
        let funnel = EventFunnel::new(queue.clone(), Arc::clone(&notifier), only_removable);
        (queue, funnel, notifier)
    }

    #[test]
    fn seeding_enqueues_only_usb_partitions_as_adds() {
        let (queue, funnel, notifier) = monitor_parts(true);
        let mut internal = DeviceDescriptor::new(DeviceAction::Add, "/dev/sda1");
        internal.bus_type = Some("ata".to_string());
        let mut pre_attached = usb_partition(DeviceAction::Change, "/dev/sdb1");
        // Pre-existing devices are seeded even without a filesystem
        // property; only the bus type is checked.
        pre_attached.fs_type = None;

        let source = ScriptedSource::new(vec![internal, pre_attached], vec![]);
        let mut monitor =
            DeviceMonitor::new(source, funnel, notifier, Duration::from_millis(10));

        let seeded = monitor.seed_existing().expect("enumeration");
        assert_eq!(seeded, 1);
        let (action, descriptor) = queue.pop_timeout(Duration::from_millis(10)).unwrap();
        assert_eq!(action, DeviceAction::Add);
        assert_eq!(descriptor.device_node, "/dev/sdb1");
        assert!(queue.is_empty());
    }

    #[test]
    fn seeding_runs_at_most_once() {
        let (queue, funnel, notifier) = monitor_parts(true);
        let source = ScriptedSource::new(vec![usb_partition(DeviceAction::Add, "/dev/sdb1")], vec![]);
        let mut monitor =
            DeviceMonitor::new(source, funnel, notifier, Duration::from_millis(10));

        assert_eq!(monitor.seed_existing().expect("first"), 1);
        assert_eq!(monitor.seed_existing().expect("second"), 0);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn polling_mode_funnels_scripted_events_until_stopped() {
        let (queue, funnel, notifier) = monitor_parts(true);
        let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let source = ScriptedSource::new(
            vec![],
            vec![
                usb_partition(DeviceAction::Add, "/dev/sdb1"),
                usb_partition(DeviceAction::Remove, "/dev/sdb1"),
            ],
        )
        .stop_when_drained(Arc::clone(&stop));
        let monitor =
            DeviceMonitor::new(source, funnel, notifier, Duration::ZERO).with_stop(stop);

        monitor.run_polling().expect("polling loop");
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn observer_mode_funnels_events_and_destroy_joins() {
        let (queue, funnel, notifier) = monitor_parts(true);
        let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let source = ScriptedSource::new(
            vec![],
            vec![
                usb_partition(DeviceAction::Add, "/dev/sdb1"),
                usb_partition(DeviceAction::Add, "/dev/sdc1"),
            ],
        )
        .stop_when_drained(Arc::clone(&stop));
        let monitor = DeviceMonitor::new(source, funnel, notifier, Duration::from_millis(1))
            .with_stop(stop);

        let mut handle = monitor.spawn_observer().expect("observer thread");
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while queue.len() < 2 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        handle.destroy();
        handle.destroy(); // idempotent

        assert_eq!(queue.len(), 2);
        let (_, first) = queue.pop_timeout(Duration::from_millis(10)).unwrap();
        assert_eq!(first.device_node, "/dev/sdb1");
    }
}
