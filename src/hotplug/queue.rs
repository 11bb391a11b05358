//! Bounded FIFO bridging the event-producing context to the poller worker.

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};

use crate::hotplug::descriptor::{DeviceAction, DeviceDescriptor};

/// One queued hotplug event awaiting reconciliation.
pub type QueuedEvent = (DeviceAction, DeviceDescriptor);

/// Bounded event queue. Insertion blocks the producing context when the
/// queue is full (backpressure against event bursts); removal waits up to a
/// caller-supplied timeout so the poller's drain phase does not busy-spin.
///
/// Clones share the same underlying channel.
#[derive(Debug, Clone)]
pub struct EventQueue {
    tx: Sender<QueuedEvent>,
    rx: Receiver<QueuedEvent>,
}

impl EventQueue {
    /// Create a queue holding at most `capacity` pending events.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity);
        Self { tx, rx }
    }

    /// Insert an event, blocking while the queue is full. Returns `false`
    /// only if every consumer handle is gone.
    pub fn push(&self, action: DeviceAction, descriptor: DeviceDescriptor) -> bool {
        self.tx.send((action, descriptor)).is_ok()
    }

    /// Remove one event, waiting up to `timeout` for one to appear.
    #[must_use]
    pub fn pop_timeout(&self, timeout: Duration) -> Option<QueuedEvent> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Whether no event is currently pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Number of pending events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rx.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    use super::EventQueue;
    use crate::hotplug::descriptor::{DeviceAction, DeviceDescriptor};

    fn event(node: &str) -> DeviceDescriptor {
        DeviceDescriptor::new(DeviceAction::Add, node)
    }

    #[test]
    fn pop_preserves_fifo_order() {
        let queue = EventQueue::with_capacity(10);
        assert!(queue.push(DeviceAction::Add, event("/dev/sdb1")));
        assert!(queue.push(DeviceAction::Remove, event("/dev/sdb1")));

        let (first, _) = queue.pop_timeout(Duration::from_millis(10)).unwrap();
        let (second, _) = queue.pop_timeout(Duration::from_millis(10)).unwrap();
        assert_eq!(first, DeviceAction::Add);
        assert_eq!(second, DeviceAction::Remove);
        assert!(queue.pop_timeout(Duration::from_millis(10)).is_none());
    }

    #[test]
    fn eleventh_insertion_blocks_until_one_is_drained() {
        let queue = EventQueue::with_capacity(10);
        let pushed = Arc::new(AtomicUsize::new(0));

        let producer = {
            let queue = queue.clone();
            let pushed = Arc::clone(&pushed);
            thread::spawn(move || {
                for i in 0..11 {
                    assert!(queue.push(DeviceAction::Add, event(&format!("/dev/sd{i}"))));
                    pushed.fetch_add(1, Ordering::SeqCst);
                }
            })
        };

        // Give the producer time to fill the queue and hit backpressure.
        thread::sleep(Duration::from_millis(100));
        assert_eq!(pushed.load(Ordering::SeqCst), 10, "11th push must block");

        // Draining one event unblocks the stalled insertion.
        assert!(queue.pop_timeout(Duration::from_millis(10)).is_some());
        producer.join().expect("producer thread");
        assert_eq!(pushed.load(Ordering::SeqCst), 11);
        assert_eq!(queue.len(), 10);
    }
}
