use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::events::{MidiEvent, STEPS_PER_CYCLE};

const STEPS: usize = STEPS_PER_CYCLE as usize;

#[derive(Default)]
struct Slots {
    /// One insertion-ordered list per step. The sequence number orders
    /// events across steps for `peek_all`.
    by_step: [Vec<(u64, MidiEvent)>; STEPS],
    next_seq: u64,
}

impl Slots {
    fn len(&self) -> usize {
        self.by_step.iter().map(Vec::len).sum()
    }
}

/// Pending events keyed by the step they should sound on.
///
/// Every mutation goes through one mutex, so enqueue, drain and clear
/// never interleave: an event is handed out by exactly one drain, and a
/// `clear` removes everything enqueued before it. The lock is only held
/// for vector pushes and swaps.
#[derive(Default)]
pub struct EventPool {
    slots: Mutex<Slots>,
    size: AtomicUsize,
}

impl EventPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, event: MidiEvent) {
        let mut slots = self.slots.lock();
        let seq = slots.next_seq;
        slots.next_seq += 1;
        slots.by_step[step_slot(event.step_index)].push((seq, event));
        self.size.fetch_add(1, Ordering::Relaxed);
        drop(slots);

        tracing::trace!(
            source = ?event.source,
            note = event.note_number,
            velocity = event.velocity,
            step = event.step_index,
            "enqueued"
        );
    }

    pub fn enqueue_all<I>(&self, events: I)
    where
        I: IntoIterator<Item = MidiEvent>,
    {
        let mut slots = self.slots.lock();
        let mut added = 0;
        for event in events {
            let seq = slots.next_seq;
            slots.next_seq += 1;
            slots.by_step[step_slot(event.step_index)].push((seq, event));
            added += 1;
        }
        self.size.fetch_add(added, Ordering::Relaxed);
        drop(slots);

        tracing::trace!(count = added, "enqueued batch");
    }

    /// Removes and returns every event for `step`, oldest first.
    pub fn drain_for_step(&self, step: u8) -> Vec<MidiEvent> {
        let taken = {
            let mut slots = self.slots.lock();
            let taken = std::mem::take(&mut slots.by_step[step_slot(step)]);
            self.size.fetch_sub(taken.len(), Ordering::Relaxed);
            taken
        };

        if !taken.is_empty() {
            tracing::trace!(step, count = taken.len(), "drained step");
        }
        taken.into_iter().map(|(_, event)| event).collect()
    }

    /// Removes every pending event for `note` on any step, oldest first.
    pub fn drain_for_note(&self, note: u8) -> Vec<MidiEvent> {
        let mut taken = Vec::new();
        {
            let mut slots = self.slots.lock();
            for slot in slots.by_step.iter_mut() {
                slot.retain(|entry| {
                    if entry.1.note_number == note {
                        taken.push(*entry);
                        false
                    } else {
                        true
                    }
                });
            }
            self.size.fetch_sub(taken.len(), Ordering::Relaxed);
        }

        taken.sort_unstable_by_key(|(seq, _)| *seq);
        taken.into_iter().map(|(_, event)| event).collect()
    }

    /// Snapshot of everything pending, in insertion order.
    pub fn peek_all(&self) -> Vec<MidiEvent> {
        let mut all: Vec<(u64, MidiEvent)> = {
            let slots = self.slots.lock();
            slots.by_step.iter().flatten().copied().collect()
        };
        all.sort_unstable_by_key(|(seq, _)| *seq);
        all.into_iter().map(|(_, event)| event).collect()
    }

    /// Snapshot of steps `from..=to`, walked in step order. When `from` is
    /// greater than `to` the range wraps past the end of the cycle.
    pub fn peek_range(&self, from: u8, to: u8) -> Vec<MidiEvent> {
        let from = step_slot(from);
        let to = step_slot(to);
        let span = (to + STEPS - from) % STEPS + 1;

        let slots = self.slots.lock();
        (0..span)
            .map(|offset| (from + offset) % STEPS)
            .flat_map(|step| slots.by_step[step].iter().map(|(_, event)| *event))
            .collect()
    }

    pub fn clear(&self) {
        let mut slots = self.slots.lock();
        let dropped = slots.len();
        for slot in slots.by_step.iter_mut() {
            slot.clear();
        }
        self.size.store(0, Ordering::Relaxed);
        drop(slots);

        tracing::debug!(dropped, "event pool cleared");
    }

    /// Pending event count. Exact whenever no other thread is mutating.
    pub fn size(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }
}

fn step_slot(step: u8) -> usize {
    (step % STEPS_PER_CYCLE) as usize
}
