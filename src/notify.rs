//! Latest-value broadcast for tick and activity notifications.
//!
//! Publishing never blocks. Each subscriber owns a single slot that is
//! overwritten on every publish, plus a wake-up channel of capacity one.
//! A subscriber that falls behind sees only the most recent value.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use arc_swap::{ArcSwap, ArcSwapOption};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TrySendError};

struct Slot<T> {
    value: ArcSwapOption<T>,
    closed: AtomicBool,
}

/// Publisher side of a slot. Only the broadcast holds the sender, so a
/// subscriber notices when the broadcast is dropped.
struct Entry<T> {
    slot: Arc<Slot<T>>,
    wake: Sender<()>,
}

pub struct Broadcast<T> {
    latest: ArcSwapOption<T>,
    entries: ArcSwap<Vec<Arc<Entry<T>>>>,
}

impl<T> Broadcast<T> {
    pub fn new() -> Self {
        Self {
            latest: ArcSwapOption::empty(),
            entries: ArcSwap::from_pointee(Vec::new()),
        }
    }

    pub fn publish(&self, value: T) {
        let value = Arc::new(value);
        self.latest.store(Some(value.clone()));

        for entry in self.entries.load().iter() {
            if entry.slot.closed.load(Ordering::Relaxed) {
                continue;
            }
            entry.slot.value.store(Some(value.clone()));
            if let Err(TrySendError::Disconnected(())) = entry.wake.try_send(()) {
                entry.slot.closed.store(true, Ordering::Relaxed);
            }
        }
    }

    /// New subscribers start with the last published value, if any.
    pub fn subscribe(&self) -> Subscription<T> {
        let (wake, wake_rx) = channel::bounded(1);
        let slot = Arc::new(Slot {
            value: ArcSwapOption::empty(),
            closed: AtomicBool::new(false),
        });
        let entry = Arc::new(Entry {
            slot: slot.clone(),
            wake,
        });

        self.entries.rcu(|entries| {
            let mut next: Vec<_> = entries
                .iter()
                .filter(|e| !e.slot.closed.load(Ordering::Relaxed))
                .cloned()
                .collect();
            next.push(entry.clone());
            next
        });

        // Registered first, so a concurrent publish either fills the slot
        // itself or is already visible in `latest`.
        if let Some(latest) = self.latest.load_full() {
            let previous = slot.value.compare_and_swap(&None::<Arc<T>>, Some(latest));
            if previous.is_none() {
                let _ = entry.wake.try_send(());
            }
        }

        Subscription { slot, wake_rx }
    }

    pub fn subscriber_count(&self) -> usize {
        self.entries
            .load()
            .iter()
            .filter(|e| !e.slot.closed.load(Ordering::Relaxed))
            .count()
    }
}

impl<T> Default for Broadcast<T> {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Subscription<T> {
    slot: Arc<Slot<T>>,
    wake_rx: Receiver<()>,
}

impl<T: Clone> Subscription<T> {
    /// Takes the pending value without waiting.
    pub fn try_recv(&self) -> Option<T> {
        let _ = self.wake_rx.try_recv();
        self.take()
    }

    /// Waits for the next value. `None` once the publisher is gone.
    pub fn recv(&self) -> Option<T> {
        loop {
            if let Some(value) = self.take() {
                return Some(value);
            }
            self.wake_rx.recv().ok()?;
        }
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<T> {
        loop {
            if let Some(value) = self.take() {
                return Some(value);
            }
            match self.wake_rx.recv_timeout(timeout) {
                Ok(()) => continue,
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => {
                    return self.take();
                }
            }
        }
    }

    fn take(&self) -> Option<T> {
        self.slot.value.swap(None).map(|v| (*v).clone())
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.slot.closed.store(true, Ordering::Relaxed);
    }
}

/// What the dispatcher tells the outside world.
pub struct Observers {
    /// Every step boundary, whether or not anything played.
    pub ticks: Broadcast<u8>,
    /// Pulses `true` on ticks that dispatched at least one pool event.
    /// Sequencer steps do not count.
    pub activity: Broadcast<bool>,
}

impl Observers {
    pub fn new() -> Self {
        Self {
            ticks: Broadcast::new(),
            activity: Broadcast::new(),
        }
    }
}

impl Default for Observers {
    fn default() -> Self {
        Self::new()
    }
}
