/*!
 * Timeout Set
 * Per-thread collection of scheduled timeouts: a deadline heap plus a list
 * of relative timeouts awaiting absolutization
 */

use crate::queue::ThreadEventQueue;
use crate::time::heap::TimerHeap;
use crate::time::timeout::{Slot, Timeout, When};
use std::mem;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub(crate) struct TimeoutSet {
    heap: TimerHeap,
    relative: Vec<Arc<dyn Timeout>>,
}

impl TimeoutSet {
    pub fn new() -> Self {
        TimeoutSet {
            heap: TimerHeap::new(),
            relative: Vec::new(),
        }
    }

    /// Earliest deadline currently in the heap. Relative timeouts do not
    /// participate until they are absolutized.
    pub fn next_timer_expiration(&self) -> Option<Instant> {
        self.heap.peek_min().map(|entry| entry.at)
    }

    /// Insert with a fixed deadline. The timeout must not already be
    /// scheduled.
    pub fn schedule_absolute(&mut self, timeout: Arc<dyn Timeout>, at: Instant) {
        {
            let mut schedule = timeout.schedule_cell().lock();
            debug_assert!(!schedule.is_scheduled());
            schedule.when = When::At(at);
        }
        self.heap.insert(at, timeout);
    }

    /// Append to the relative-pending list; the deadline is fixed at the
    /// start of the next loop iteration. Zero-duration reloads use this so
    /// they reappear next iteration instead of re-firing in the current one.
    pub fn schedule_relative(&mut self, timeout: Arc<dyn Timeout>, after: Duration) {
        {
            let mut schedule = timeout.schedule_cell().lock();
            debug_assert!(!schedule.is_scheduled());
            schedule.when = When::In(after);
            schedule.slot = Slot::Relative(self.relative.len());
        }
        self.relative.push(timeout);
    }

    /// Fix a deadline for every relative-pending timeout and move it into
    /// the heap. Called exactly once at the start of each loop iteration,
    /// before the next-expiration is computed.
    pub fn absolutize_relative_timeouts(&mut self, now: Instant) {
        for timeout in mem::take(&mut self.relative) {
            let at = {
                let mut schedule = timeout.schedule_cell().lock();
                let at = match schedule.when {
                    When::In(duration) => now + duration,
                    // Already absolute; nothing left to resolve.
                    When::At(at) => at,
                };
                schedule.when = When::At(at);
                schedule.slot = Slot::Detached;
                at
            };
            self.heap.insert(at, timeout);
        }
    }

    /// Pop and fire every timeout whose deadline has passed. A timeout that
    /// re-schedules itself from `fire` lands strictly after `now` (or in the
    /// relative list) and cannot re-fire within the same call. Returns the
    /// number fired.
    pub fn fire_expired(&mut self, now: Instant, queue: &ThreadEventQueue) -> usize {
        let mut fired = 0;
        while let Some(entry) = self.heap.peek_min() {
            if entry.at > now {
                break;
            }
            let entry = self.heap.pop_min().expect("peeked entry vanished");
            entry.timeout.schedule_cell().lock().slot = Slot::Detached;
            fired += 1;
            entry.timeout.fire(self, queue, now);
        }
        fired
    }

    /// Remove a scheduled timeout in O(log n). Detached timeouts are left
    /// alone.
    pub fn unschedule(&mut self, timeout: &Arc<dyn Timeout>) {
        let slot = {
            let mut schedule = timeout.schedule_cell().lock();
            mem::replace(&mut schedule.slot, Slot::Detached)
        };
        match slot {
            Slot::Detached => {}
            Slot::Relative(index) => {
                let last = self.relative.len() - 1;
                self.relative.swap(index, last);
                if index != last {
                    self.relative[index].schedule_cell().lock().slot = Slot::Relative(index);
                }
                let removed = self.relative.pop().expect("relative list underflow");
                debug_assert_eq!(
                    Arc::as_ptr(&removed) as *const (),
                    Arc::as_ptr(timeout) as *const ()
                );
            }
            Slot::Heap(index) => {
                self.heap.remove(index);
            }
        }
    }

    /// Detach everything and empty both structures.
    pub fn clear(&mut self) {
        self.heap.clear();
        for timeout in self.relative.drain(..) {
            timeout.schedule_cell().lock().slot = Slot::Detached;
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.heap.len() + self.relative.len()
    }
}
