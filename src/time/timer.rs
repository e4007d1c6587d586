/*!
 * Timer
 * Reloading timeout bound to a receiver through a weak reference
 */

use crate::core::traits::EventReceiver;
use crate::core::types::{Event, TimerId};
use crate::queue::ThreadEventQueue;
use crate::time::set::TimeoutSet;
use crate::time::timeout::{Schedule, Timeout, When};
use ahash::RandomState;
use dashmap::DashMap;
use log::trace;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::thread::ThreadId;
use std::time::{Duration, Instant};

static NEXT_TIMER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide id resolution table.
///
/// Entries are weak so a thread exiting with live timers does not pin their
/// allocations; dead entries are pruned when that thread's data is torn down.
static TIMER_TABLE: OnceLock<DashMap<TimerId, Weak<Timer>, RandomState>> = OnceLock::new();

pub(crate) fn timer_table() -> &'static DashMap<TimerId, Weak<Timer>, RandomState> {
    TIMER_TABLE.get_or_init(|| DashMap::with_hasher(RandomState::new()))
}

pub(crate) struct Timer {
    id: TimerId,
    interval: Duration,
    should_reload: bool,
    fire_when_hidden: bool,
    owner: Weak<dyn EventReceiver>,
    owner_thread: ThreadId,
    is_being_deleted: AtomicBool,
    schedule: Mutex<Schedule>,
}

impl Timer {
    pub fn new(
        owner: Weak<dyn EventReceiver>,
        owner_thread: ThreadId,
        interval: Duration,
        should_reload: bool,
        fire_when_hidden: bool,
    ) -> Arc<Self> {
        let id = TimerId(NEXT_TIMER_ID.fetch_add(1, Ordering::SeqCst));
        let timer = Arc::new(Timer {
            id,
            interval,
            should_reload,
            fire_when_hidden,
            owner,
            owner_thread,
            is_being_deleted: AtomicBool::new(false),
            schedule: Mutex::new(Schedule::new()),
        });
        timer_table().insert(id, Arc::downgrade(&timer));
        timer
    }

    #[inline]
    pub fn id(&self) -> TimerId {
        self.id
    }

    #[inline]
    pub fn owner_thread(&self) -> ThreadId {
        self.owner_thread
    }

    /// First caller wins the right to unschedule and drop this timer;
    /// concurrent and repeated unregisters become no-ops.
    pub fn claim_for_deletion(&self) -> bool {
        self.is_being_deleted
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl Timeout for Timer {
    fn schedule_cell(&self) -> &Mutex<Schedule> {
        &self.schedule
    }

    fn fire(self: Arc<Self>, set: &mut TimeoutSet, queue: &ThreadEventQueue, now: Instant) {
        let Some(owner) = self.owner.upgrade() else {
            // Orphaned timer; it stops rescheduling and is reclaimed when
            // the application unregisters it or the thread exits.
            trace!("timer {:?} owner is gone, not rescheduling", self.id);
            return;
        };

        if self.should_reload {
            let fired_at = match self.schedule.lock().when {
                When::At(at) => at,
                When::In(_) => now,
            };
            let mut next = fired_at + self.interval;
            if next <= now {
                // We fell behind; re-anchor at now instead of replaying
                // every missed interval.
                next = now + self.interval;
            }
            if next != now {
                set.schedule_absolute(self.clone(), next);
            } else {
                // Zero interval: a deadline of `now` would re-expire inside
                // the current fire pass, so queue it for the next iteration.
                set.schedule_relative(self.clone(), Duration::ZERO);
            }
        }

        if self.fire_when_hidden || owner.is_visible_for_timer_purposes() {
            queue.post_weak(self.owner.clone(), Event::Timer { timer: self.id });
        }
    }
}
