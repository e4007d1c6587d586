/*!
 * Thread Event Queue
 * Per-thread FIFO of (receiver, event) pairs drained by the owning loop
 */

use crate::core::traits::EventReceiver;
use crate::core::types::Event;
use crate::registry;
use crossbeam_queue::SegQueue;
use log::debug;
use std::sync::{Arc, Weak};

struct QueuedEvent {
    receiver: Weak<dyn EventReceiver>,
    event: Event,
}

/// FIFO event queue owned by one thread's loop.
///
/// Posting is lock-free and safe from any thread; processing happens only on
/// the owning thread. Cross-thread posters pair the enqueue with a wake-pipe
/// token so the target loop observes the event on its next iteration.
pub struct ThreadEventQueue {
    events: SegQueue<QueuedEvent>,
}

impl ThreadEventQueue {
    pub(crate) fn new() -> Self {
        ThreadEventQueue {
            events: SegQueue::new(),
        }
    }

    /// The calling thread's queue, created on first use.
    pub fn current() -> Arc<ThreadEventQueue> {
        registry::current().queue().clone()
    }

    /// Enqueue `event` for `receiver`. The receiver is held weakly; if it is
    /// dropped before processing, the event is discarded.
    pub fn post_event<R>(&self, receiver: &Arc<R>, event: Event)
    where
        R: EventReceiver + 'static,
    {
        self.post_weak(Arc::downgrade(receiver) as Weak<dyn EventReceiver>, event);
    }

    pub(crate) fn post_weak(&self, receiver: Weak<dyn EventReceiver>, event: Event) {
        self.events.push(QueuedEvent { receiver, event });
    }

    #[must_use]
    pub fn has_pending_events(&self) -> bool {
        !self.events.is_empty()
    }

    /// Drain the events that were queued when processing began and deliver
    /// each to its receiver. Events posted by receivers during processing
    /// stay queued for the next pump. Returns the number delivered.
    pub fn process(&self) -> usize {
        let batch = self.events.len();
        let mut processed = 0;
        for _ in 0..batch {
            let Some(queued) = self.events.pop() else {
                break;
            };
            match queued.receiver.upgrade() {
                Some(receiver) => {
                    receiver.event(queued.event);
                    processed += 1;
                }
                None => {
                    debug!("dropping {:?} for dead receiver", queued.event);
                }
            }
        }
        processed
    }
}
