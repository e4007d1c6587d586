/*!
 * Timer Heap
 * Binary min-heap keyed by deadline, with index write-back for O(log n) removal
 */

use crate::time::timeout::{Slot, Timeout};
use std::sync::Arc;
use std::time::Instant;

pub(crate) struct HeapEntry {
    pub at: Instant,
    pub timeout: Arc<dyn Timeout>,
}

/// Min-heap over absolute deadlines.
///
/// Every sift records the entry's current index back into its schedule cell,
/// so a scheduled timeout always knows its own heap position and can be
/// removed without a linear scan.
pub(crate) struct TimerHeap {
    entries: Vec<HeapEntry>,
}

impl TimerHeap {
    pub fn new() -> Self {
        TimerHeap {
            entries: Vec::new(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn peek_min(&self) -> Option<&HeapEntry> {
        self.entries.first()
    }

    pub fn insert(&mut self, at: Instant, timeout: Arc<dyn Timeout>) {
        self.entries.push(HeapEntry { at, timeout });
        self.sift_up(self.entries.len() - 1);
    }

    pub fn pop_min(&mut self) -> Option<HeapEntry> {
        if self.entries.is_empty() {
            return None;
        }
        let entry = self.entries.swap_remove(0);
        if !self.entries.is_empty() {
            self.sift_down(0);
        }
        Some(entry)
    }

    /// Remove the entry at `index`. The caller has already detached the
    /// removed timeout's slot; only the displaced entry is re-seated.
    pub fn remove(&mut self, index: usize) -> HeapEntry {
        let entry = self.entries.swap_remove(index);
        if index < self.entries.len() {
            let settled = self.sift_up(index);
            if settled == index {
                self.sift_down(index);
            }
        }
        entry
    }

    /// Detach every entry and empty the heap.
    pub fn clear(&mut self) {
        for entry in self.entries.drain(..) {
            entry.timeout.schedule_cell().lock().slot = Slot::Detached;
        }
    }

    fn write_slot(&self, index: usize) {
        self.entries[index].timeout.schedule_cell().lock().slot = Slot::Heap(index);
    }

    fn sift_up(&mut self, mut index: usize) -> usize {
        while index > 0 {
            let parent = (index - 1) / 2;
            if self.entries[index].at >= self.entries[parent].at {
                break;
            }
            self.entries.swap(index, parent);
            self.write_slot(index);
            index = parent;
        }
        self.write_slot(index);
        index
    }

    fn sift_down(&mut self, mut index: usize) -> usize {
        loop {
            let left = 2 * index + 1;
            let right = left + 1;
            let mut smallest = index;
            if left < self.entries.len() && self.entries[left].at < self.entries[smallest].at {
                smallest = left;
            }
            if right < self.entries.len() && self.entries[right].at < self.entries[smallest].at {
                smallest = right;
            }
            if smallest == index {
                break;
            }
            self.entries.swap(index, smallest);
            self.write_slot(index);
            index = smallest;
        }
        self.write_slot(index);
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::ThreadEventQueue;
    use crate::time::set::TimeoutSet;
    use crate::time::timeout::{Schedule, Timeout};
    use parking_lot::Mutex;
    use std::time::Duration;

    struct Plain {
        schedule: Mutex<Schedule>,
    }

    impl Plain {
        fn new() -> Arc<Self> {
            Arc::new(Plain {
                schedule: Mutex::new(Schedule::new()),
            })
        }
    }

    impl Timeout for Plain {
        fn schedule_cell(&self) -> &Mutex<Schedule> {
            &self.schedule
        }

        fn fire(self: Arc<Self>, _set: &mut TimeoutSet, _queue: &ThreadEventQueue, _now: Instant) {}
    }

    #[test]
    fn test_pop_min_yields_ascending_deadlines() {
        let base = Instant::now();
        let mut heap = TimerHeap::new();
        for offset in [30u64, 10, 50, 20, 40] {
            heap.insert(base + Duration::from_millis(offset), Plain::new());
        }

        let mut order = Vec::new();
        while let Some(entry) = heap.pop_min() {
            order.push(entry.at);
        }
        let mut sorted = order.clone();
        sorted.sort();
        assert_eq!(order, sorted);
    }

    #[test]
    fn test_index_write_back_tracks_positions() {
        let base = Instant::now();
        let mut heap = TimerHeap::new();
        let timeouts: Vec<_> = (0..6)
            .map(|i| {
                let t = Plain::new();
                heap.insert(base + Duration::from_millis(i * 10), t.clone());
                t
            })
            .collect();

        for t in &timeouts {
            let slot = t.schedule.lock().slot;
            let Slot::Heap(index) = slot else {
                panic!("expected heap slot, got {slot:?}");
            };
            let at_index = Arc::as_ptr(&heap.entries[index].timeout) as *const ();
            assert_eq!(at_index, Arc::as_ptr(t) as *const ());
        }
    }

    #[test]
    fn test_remove_by_index_keeps_heap_order() {
        let base = Instant::now();
        let mut heap = TimerHeap::new();
        let victim = Plain::new();
        heap.insert(base + Duration::from_millis(30), victim.clone());
        for offset in [10u64, 50, 20, 40] {
            heap.insert(base + Duration::from_millis(offset), Plain::new());
        }

        let slot = victim.schedule.lock().slot;
        let Slot::Heap(index) = slot else {
            panic!("victim not in heap");
        };
        victim.schedule.lock().slot = Slot::Detached;
        heap.remove(index);
        assert_eq!(heap.len(), 4);

        let mut order = Vec::new();
        while let Some(entry) = heap.pop_min() {
            order.push(entry.at);
        }
        let mut sorted = order.clone();
        sorted.sort();
        assert_eq!(order, sorted);
        assert_eq!(order.len(), 4);
        assert!(!order.contains(&(base + Duration::from_millis(30))));
    }
}
