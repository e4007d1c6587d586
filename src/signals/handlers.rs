/*!
 * Signal Handler List
 * All callbacks registered for one signal number, with staged mutation
 * during dispatch and restore-on-drop of the original OS disposition
 */

use crate::sys;
use log::info;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::mem;

/// An application callback invoked with the signal number on the loop thread.
pub(crate) type HandlerFn = std::sync::Arc<dyn Fn(libc::c_int) + Send + Sync>;

struct HandlerState {
    /// Handlers invoked on dispatch, in ascending-id (registration) order.
    active: BTreeMap<u64, HandlerFn>,
    /// Changes staged while a dispatch is running. `Some` is a pending add,
    /// `None` a pending removal.
    pending: BTreeMap<u64, Option<HandlerFn>>,
    dispatching: bool,
}

/// Callbacks for one signal number.
///
/// Held by `Arc`: the dispatcher keeps its own reference while invoking
/// callbacks so a callback unregistering the last handler cannot free the
/// list out from under it. Dropping the final reference restores the
/// original OS disposition.
pub(crate) struct SignalHandlers {
    signal: libc::c_int,
    original: libc::sighandler_t,
    state: Mutex<HandlerState>,
}

impl SignalHandlers {
    pub fn new(signal: libc::c_int, original: libc::sighandler_t) -> Self {
        SignalHandlers {
            signal,
            original,
            state: Mutex::new(HandlerState {
                active: BTreeMap::new(),
                pending: BTreeMap::new(),
                dispatching: false,
            }),
        }
    }

    #[inline]
    pub fn signal(&self) -> libc::c_int {
        self.signal
    }

    /// Register `handler` under `id`. Mid-dispatch additions take effect
    /// when the current dispatch completes.
    pub fn add(&self, id: u64, handler: HandlerFn) {
        let mut state = self.state.lock();
        if state.dispatching {
            state.pending.insert(id, Some(handler));
        } else {
            state.active.insert(id, handler);
        }
    }

    /// Remove the handler with `id`, returning whether it was present.
    /// Mid-dispatch removals are staged as tombstones; the handler will not
    /// be invoked by any later dispatch.
    pub fn remove(&self, id: u64) -> bool {
        let mut state = self.state.lock();
        if state.dispatching {
            if state.active.contains_key(&id) {
                state.pending.insert(id, None);
                return true;
            }
            return match state.pending.get_mut(&id) {
                Some(pending) => {
                    if pending.is_some() {
                        *pending = None;
                        true
                    } else {
                        // Already tombstoned.
                        false
                    }
                }
                None => false,
            };
        }
        state.active.remove(&id).is_some()
    }

    /// Whether any handler remains, counting staged additions as present and
    /// tombstoned actives as gone.
    pub fn is_empty(&self) -> bool {
        let state = self.state.lock();
        if state.dispatching {
            if state.pending.values().any(|entry| entry.is_some()) {
                return false;
            }
            return state
                .active
                .keys()
                .all(|id| matches!(state.pending.get(id), Some(None)));
        }
        state.active.is_empty()
    }

    /// Invoke every active handler, then apply the changes staged while they
    /// ran. Nested dispatch (a callback pumping the loop into another
    /// delivery of the same signal) defers the pending merge to the
    /// outermost call.
    pub fn dispatch(&self) {
        let (snapshot, outermost) = {
            let mut state = self.state.lock();
            let outermost = !state.dispatching;
            state.dispatching = true;
            let snapshot: Vec<HandlerFn> = state.active.values().cloned().collect();
            (snapshot, outermost)
        };

        for handler in snapshot {
            handler(self.signal);
        }

        if outermost {
            let mut state = self.state.lock();
            for (id, entry) in mem::take(&mut state.pending) {
                match entry {
                    Some(handler) => {
                        state.active.insert(id, handler);
                    }
                    None => {
                        state.active.remove(&id);
                    }
                }
            }
            state.dispatching = false;
        }
    }
}

impl Drop for SignalHandlers {
    fn drop(&mut self) {
        sys::restore_signal_handler(self.signal, self.original);
        info!(
            "restored original disposition for signal {} after last handler removal",
            self.signal
        );
    }
}
