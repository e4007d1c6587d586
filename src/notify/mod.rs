/*!
 * Notifier Module
 * File-descriptor readiness sources and the per-thread poll bookkeeping
 */

use crate::core::limits::INLINE_POLL_SLOTS;
use crate::core::traits::EventReceiver;
use crate::core::types::NotificationType;
use ahash::RandomState;
use log::debug;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::os::fd::RawFd;
use std::sync::{Arc, Weak};
use std::thread::ThreadId;

/// Binds a file descriptor and an interest mask to a receiver.
///
/// The notifier does not own the descriptor; the application must keep it
/// open while registered and unregister before closing it. A notifier is
/// registered with at most one thread's loop at a time; changing the fd or
/// the mask requires unregistering and registering again.
pub struct Notifier {
    fd: RawFd,
    type_: NotificationType,
    receiver: Weak<dyn EventReceiver>,
    owner_thread: Mutex<Option<ThreadId>>,
}

impl Notifier {
    pub fn new<R>(fd: RawFd, type_: NotificationType, receiver: &Arc<R>) -> Self
    where
        R: EventReceiver + 'static,
    {
        Notifier {
            fd,
            type_,
            receiver: Arc::downgrade(receiver) as Weak<dyn EventReceiver>,
            owner_thread: Mutex::new(None),
        }
    }

    #[inline]
    #[must_use]
    pub fn fd(&self) -> RawFd {
        self.fd
    }

    #[inline]
    #[must_use]
    pub fn notification_type(&self) -> NotificationType {
        self.type_
    }

    #[must_use]
    pub fn owner_thread(&self) -> Option<ThreadId> {
        *self.owner_thread.lock()
    }

    pub(crate) fn set_owner_thread(&self, owner: Option<ThreadId>) {
        *self.owner_thread.lock() = owner;
    }

    pub(crate) fn receiver(&self) -> Weak<dyn EventReceiver> {
        self.receiver.clone()
    }
}

/// One thread's poll descriptors and the notifiers behind them.
///
/// Slot 0 is always the wake-pipe read end; every other slot corresponds 1:1
/// to a registered notifier.
pub(crate) struct NotifierSet {
    poll_fds: Vec<libc::pollfd>,
    by_fd: HashMap<RawFd, Arc<Notifier>, RandomState>,
}

impl NotifierSet {
    pub fn new(wake_read_fd: RawFd) -> Self {
        let mut poll_fds = Vec::with_capacity(INLINE_POLL_SLOTS);
        poll_fds.push(libc::pollfd {
            fd: wake_read_fd,
            events: libc::POLLIN,
            revents: 0,
        });
        NotifierSet {
            poll_fds,
            by_fd: HashMap::with_hasher(RandomState::new()),
        }
    }

    pub fn insert(&mut self, notifier: Arc<Notifier>) {
        let fd = notifier.fd();
        if self.by_fd.insert(fd, notifier.clone()).is_some() {
            // Replacing a stale registration; drop its poll slot so the
            // one-slot-per-notifier invariant holds.
            debug!("replacing existing notifier registration for fd {fd}");
            self.poll_fds.retain(|pfd| pfd.fd != fd);
        }
        self.poll_fds.push(libc::pollfd {
            fd,
            events: notifier.notification_type().to_poll_events(),
            revents: 0,
        });
    }

    pub fn remove_fd(&mut self, fd: RawFd) {
        self.by_fd.remove(&fd);
        // Slot 0 belongs to the wake pipe and never matches a notifier fd.
        self.poll_fds.retain(|pfd| pfd.fd != fd);
    }

    pub fn lookup(&self, fd: RawFd) -> Option<&Arc<Notifier>> {
        self.by_fd.get(&fd)
    }

    /// Copy of the poll descriptors with cleared revents, taken so the lock
    /// is not held across the blocking poll call.
    pub fn snapshot(&self) -> Vec<libc::pollfd> {
        self.poll_fds
            .iter()
            .map(|pfd| libc::pollfd {
                fd: pfd.fd,
                events: pfd.events,
                revents: 0,
            })
            .collect()
    }

    #[cfg(test)]
    pub fn slot_count(&self) -> usize {
        self.poll_fds.len()
    }
}
