/*!
 * Timeout State
 * Discriminated scheduling state shared by everything a timeout set holds
 */

use crate::queue::ThreadEventQueue;
use crate::time::set::TimeoutSet;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// When a timeout should fire.
///
/// The two cases are mutually exclusive: a relative timeout has no absolute
/// deadline until the set absolutizes it at the start of an iteration.
#[derive(Debug, Clone, Copy)]
pub(crate) enum When {
    /// Fixed deadline; the timeout lives in the min-heap.
    At(Instant),
    /// Pending duration; the timeout lives in the relative list.
    In(Duration),
}

/// Where a timeout currently sits inside its set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Slot {
    /// Not scheduled anywhere.
    Detached,
    /// Position in the relative-pending list.
    Relative(usize),
    /// Index in the min-heap.
    Heap(usize),
}

/// A timeout's complete scheduling state. Mutated only under the owning
/// thread's timeout-set lock; the inner mutex keeps the slot write-backs
/// sound when a cross-thread unregister races with the owner.
#[derive(Debug)]
pub(crate) struct Schedule {
    pub when: When,
    pub slot: Slot,
}

impl Schedule {
    pub fn new() -> Self {
        Schedule {
            when: When::In(Duration::ZERO),
            slot: Slot::Detached,
        }
    }

    #[inline]
    pub fn is_scheduled(&self) -> bool {
        self.slot != Slot::Detached
    }
}

/// Anything a [`TimeoutSet`] can schedule and expire.
pub(crate) trait Timeout: Send + Sync {
    fn schedule_cell(&self) -> &Mutex<Schedule>;

    /// Called by [`TimeoutSet::fire_expired`] after the timeout has been
    /// popped and marked detached. The implementation may re-schedule itself
    /// into `set` and post events onto `queue`.
    fn fire(self: Arc<Self>, set: &mut TimeoutSet, queue: &ThreadEventQueue, now: Instant);
}
