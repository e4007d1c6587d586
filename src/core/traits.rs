/*!
 * Core Traits
 * The receiver seam between the loop and application objects
 */

use crate::core::types::Event;

/// An object that events can be delivered to.
///
/// Receivers are held by the runtime only through `Weak` references: a timer
/// or queued event whose receiver has been dropped is silently discarded.
/// Receivers must tolerate delivery from the loop thread that owns them.
pub trait EventReceiver: Send + Sync {
    /// Deliver one event. Called on the owning loop's thread during
    /// [`process`](crate::queue::ThreadEventQueue::process).
    fn event(&self, event: Event);

    /// Whether timers owned by this receiver should currently deliver their
    /// events. Timers registered without the fire-when-hidden flag consult
    /// this before posting; the timer keeps rescheduling either way.
    fn is_visible_for_timer_purposes(&self) -> bool {
        true
    }
}
