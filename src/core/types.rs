/*!
 * Core Types
 * Identifier tokens, pump modes, notification masks, and the event payload
 */

use std::any::Any;
use std::fmt;
use std::os::fd::RawFd;

/// Opaque token identifying a registered timer.
///
/// Pointer-sized, non-zero, unique for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub(crate) u64);

impl TimerId {
    #[inline]
    #[must_use]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// Opaque token identifying a registered signal handler. Always non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SignalHandlerId(pub(crate) u64);

impl SignalHandlerId {
    #[inline]
    #[must_use]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// How a single loop iteration should wait for work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpMode {
    /// Block until at least one event source becomes ready.
    WaitForEvents,
    /// Poll with a zero timeout and return immediately.
    DontWait,
}

/// Bit mask of file-descriptor conditions a notifier is interested in, and
/// the conditions reported back when it activates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NotificationType(u8);

impl NotificationType {
    pub const NONE: NotificationType = NotificationType(0);
    pub const READ: NotificationType = NotificationType(0b0001);
    pub const WRITE: NotificationType = NotificationType(0b0010);
    pub const HANG_UP: NotificationType = NotificationType(0b0100);
    pub const ERROR: NotificationType = NotificationType(0b1000);

    #[inline]
    #[must_use]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    #[must_use]
    pub fn contains(self, other: NotificationType) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Interest bits for a poll descriptor. Only READ and WRITE translate to
    /// requested events; HANG_UP and ERROR are always reported by the OS.
    #[must_use]
    pub(crate) fn to_poll_events(self) -> libc::c_short {
        let mut events = 0;
        if self.contains(NotificationType::READ) {
            events |= libc::POLLIN;
        }
        if self.contains(NotificationType::WRITE) {
            events |= libc::POLLOUT;
        }
        events
    }

    /// Translate reported poll bits back into a notification mask.
    /// A hangup implies readability so readers can observe EOF.
    #[must_use]
    pub(crate) fn from_poll_revents(revents: libc::c_short) -> NotificationType {
        let mut type_ = NotificationType::NONE;
        if revents & libc::POLLIN != 0 {
            type_ |= NotificationType::READ;
        }
        if revents & libc::POLLOUT != 0 {
            type_ |= NotificationType::WRITE;
        }
        if revents & libc::POLLHUP != 0 {
            type_ |= NotificationType::READ | NotificationType::HANG_UP;
        }
        if revents & libc::POLLERR != 0 {
            type_ |= NotificationType::ERROR;
        }
        type_
    }
}

impl std::ops::BitOr for NotificationType {
    type Output = Self;

    fn bitor(self, other: Self) -> Self {
        NotificationType(self.0 | other.0)
    }
}

impl std::ops::BitOrAssign for NotificationType {
    fn bitor_assign(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

impl std::ops::BitAnd for NotificationType {
    type Output = Self;

    fn bitand(self, other: Self) -> Self {
        NotificationType(self.0 & other.0)
    }
}

/// An application event delivered to an [`EventReceiver`].
///
/// [`EventReceiver`]: crate::core::traits::EventReceiver
pub enum Event {
    /// A registered timer expired.
    Timer { timer: TimerId },
    /// A registered notifier's file descriptor became ready.
    NotifierActivation {
        fd: RawFd,
        activations: NotificationType,
    },
    /// An application-defined payload posted through the event queue.
    Custom(Box<dyn Any + Send>),
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Timer { timer } => f.debug_struct("Timer").field("timer", timer).finish(),
            Event::NotifierActivation { fd, activations } => f
                .debug_struct("NotifierActivation")
                .field("fd", fd)
                .field("activations", activations)
                .finish(),
            Event::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}
