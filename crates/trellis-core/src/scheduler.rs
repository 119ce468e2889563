//! One-shot deferred callbacks ordered by deadline.
//!
//! This is the host's `after(delay, callback)` primitive. Callbacks run once;
//! a repeating job such as a poller schedules its next run from inside the
//! callback.
//!
//! The scheduler only stores callbacks. The [`EventLoop`](crate::EventLoop)
//! takes ready ones out one at a time and runs them without holding the
//! scheduler lock, so a callback may schedule or cancel others.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

use slotmap::{SlotMap, new_key_type};

use crate::event_loop::HostCallback;

new_key_type! {
    /// A unique identifier for a scheduled callback.
    pub struct TimerId;
}

struct TimerData {
    deadline: Instant,
    callback: HostCallback,
}

/// An entry in the deadline queue (min-heap by deadline, then insertion).
#[derive(Debug, Clone, Copy)]
struct QueueEntry {
    id: TimerId,
    deadline: Instant,
    seq: u64,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap.
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Pending one-shot callbacks.
pub(crate) struct Scheduler {
    timers: SlotMap<TimerId, TimerData>,
    queue: BinaryHeap<QueueEntry>,
    next_seq: u64,
}

impl Scheduler {
    pub(crate) fn new() -> Self {
        Self {
            timers: SlotMap::with_key(),
            queue: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    /// Schedule `callback` to run once `delay` has elapsed.
    pub(crate) fn schedule(&mut self, delay: Duration, callback: HostCallback) -> TimerId {
        let deadline = Instant::now() + delay;
        let id = self.timers.insert(TimerData { deadline, callback });
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(QueueEntry { id, deadline, seq });
        id
    }

    /// Drop a pending callback. Returns `false` if it already ran or was
    /// cancelled.
    pub(crate) fn cancel(&mut self, id: TimerId) -> bool {
        self.timers.remove(id).is_some()
    }

    pub(crate) fn is_pending(&self, id: TimerId) -> bool {
        self.timers.contains_key(id)
    }

    /// The sequence number the next scheduled callback will get.
    ///
    /// Passing it to [`pop_ready`](Self::pop_ready) excludes callbacks
    /// scheduled after this point.
    pub(crate) fn watermark(&self) -> u64 {
        self.next_seq
    }

    /// Remove and return the earliest callback due at `now` that was
    /// scheduled before `watermark`.
    pub(crate) fn pop_ready(&mut self, now: Instant, watermark: u64) -> Option<HostCallback> {
        self.prune();
        let entry = *self.queue.peek()?;
        if entry.deadline > now || entry.seq >= watermark {
            return None;
        }
        self.queue.pop();
        tracing::trace!(target: "trellis_core::scheduler", id = ?entry.id, "callback due");
        self.timers.remove(entry.id).map(|timer| timer.callback)
    }

    /// Time until the earliest pending deadline, if any.
    pub(crate) fn time_until_next(&mut self) -> Option<Duration> {
        self.prune();
        self.queue
            .peek()
            .map(|entry| entry.deadline.saturating_duration_since(Instant::now()))
    }

    pub(crate) fn pending_count(&self) -> usize {
        self.timers.len()
    }

    /// Drop queue entries whose callbacks were cancelled.
    fn prune(&mut self) {
        while let Some(entry) = self.queue.peek() {
            match self.timers.get(entry.id) {
                Some(timer) if timer.deadline == entry.deadline => break,
                _ => {
                    self.queue.pop();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    fn push(order: &Arc<Mutex<Vec<u32>>>, value: u32) -> HostCallback {
        let order = order.clone();
        Box::new(move || {
            order.lock().push(value);
            Ok(())
        })
    }

    fn run_ready(scheduler: &mut Scheduler) -> usize {
        let now = Instant::now();
        let watermark = scheduler.watermark();
        let mut count = 0;
        while let Some(callback) = scheduler.pop_ready(now, watermark) {
            callback().unwrap();
            count += 1;
        }
        count
    }

    #[test]
    fn runs_once_after_delay() {
        let mut scheduler = Scheduler::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let id = scheduler.schedule(Duration::from_millis(10), push(&order, 1));

        assert!(scheduler.is_pending(id));
        assert_eq!(run_ready(&mut scheduler), 0);

        std::thread::sleep(Duration::from_millis(15));
        assert_eq!(run_ready(&mut scheduler), 1);
        assert_eq!(*order.lock(), vec![1]);
        assert!(!scheduler.is_pending(id));
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[test]
    fn cancelled_callbacks_never_run() {
        let mut scheduler = Scheduler::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let id = scheduler.schedule(Duration::ZERO, push(&order, 1));

        assert!(scheduler.cancel(id));
        assert!(!scheduler.cancel(id));
        assert_eq!(run_ready(&mut scheduler), 0);
        assert!(order.lock().is_empty());
        assert!(scheduler.time_until_next().is_none());
    }

    #[test]
    fn deadline_order_then_insertion_order() {
        let mut scheduler = Scheduler::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        scheduler.schedule(Duration::from_millis(20), push(&order, 3));
        scheduler.schedule(Duration::ZERO, push(&order, 1));
        scheduler.schedule(Duration::ZERO, push(&order, 2));

        std::thread::sleep(Duration::from_millis(25));
        run_ready(&mut scheduler);
        assert_eq!(*order.lock(), vec![1, 2, 3]);
    }

    #[test]
    fn watermark_excludes_later_callbacks() {
        let mut scheduler = Scheduler::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        scheduler.schedule(Duration::ZERO, push(&order, 1));
        let watermark = scheduler.watermark();
        scheduler.schedule(Duration::ZERO, push(&order, 2));

        let now = Instant::now();
        while let Some(callback) = scheduler.pop_ready(now, watermark) {
            callback().unwrap();
        }
        assert_eq!(*order.lock(), vec![1]);
        assert_eq!(scheduler.pending_count(), 1);
    }

    #[test]
    fn time_until_next_is_bounded_by_delay() {
        let mut scheduler = Scheduler::new();
        assert!(scheduler.time_until_next().is_none());
        scheduler.schedule(Duration::from_millis(100), Box::new(|| Ok(())));
        let wait = scheduler.time_until_next().unwrap();
        assert!(wait <= Duration::from_millis(100));
        assert!(wait > Duration::from_millis(50));
    }
}
