/*!
 * evcore
 * Per-thread event loop runtime
 *
 * Each participating thread owns an independent event loop that multiplexes
 * four event sources in one blocking poll(2) call: timers, file-descriptor
 * readiness, cross-thread wakeups, and process signals. Loops cooperate only
 * through a narrow wake-pipe token protocol and a process-wide signal-handler
 * registry; everything else is thread-local.
 */

pub mod core;
pub mod event_loop;
pub mod notify;
pub mod queue;
pub mod signals;

mod registry;
mod sys;
mod time;
mod wake;

pub use crate::core::errors::{LoopError, LoopResult};
pub use crate::core::traits::EventReceiver;
pub use crate::core::types::{Event, NotificationType, PumpMode, SignalHandlerId, TimerId};
pub use event_loop::{EventLoop, EventLoopManager};
pub use notify::Notifier;
pub use queue::ThreadEventQueue;
