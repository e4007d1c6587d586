/*!
 * Signal Bridge
 * Process-wide handler table plus the async-signal-safe routing plane
 *
 * Two planes with a pipe between them: the OS handler runs in signal context
 * and may only touch atomics, getpid, and write; it forwards the signal
 * number as a wake-pipe token. The loop thread drains the token and runs the
 * registered callbacks outside signal context.
 */

use crate::core::errors::LoopError;
use crate::core::types::SignalHandlerId;
use crate::registry;
use crate::signals::handlers::SignalHandlers;
use crate::sys;
use ahash::RandomState;
use log::{debug, error, info};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

/// Where forwarded signal tokens go: the wake pipe of the thread that
/// installed the first OS-level handler. `wake_fd == -1` means unset; the
/// next installation re-captures it. The pid guards the fork window between
/// handler installation and exec.
pub(crate) struct SignalTarget {
    pub pid: AtomicI32,
    pub wake_fd: AtomicI32,
}

static SIGNAL_TARGET: SignalTarget = SignalTarget {
    pid: AtomicI32::new(0),
    wake_fd: AtomicI32::new(-1),
};

static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

static TABLE: OnceLock<Mutex<HashMap<libc::c_int, Arc<SignalHandlers>, RandomState>>> =
    OnceLock::new();

fn table() -> &'static Mutex<HashMap<libc::c_int, Arc<SignalHandlers>, RandomState>> {
    TABLE.get_or_init(|| Mutex::new(HashMap::with_hasher(RandomState::new())))
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum RouteOutcome {
    /// Token written to the target wake pipe.
    Forwarded,
    /// getpid() disagreed with the recorded pid: we are a fresh fork, the
    /// pid was reconciled and the token dropped.
    PidReconciled,
    /// No wake pipe recorded; nothing to do.
    NoTarget,
}

/// The async-signal-safe core of the OS handler, factored for testability.
/// Touches only atomics, getpid, and write.
pub(crate) fn route_signal(signal: libc::c_int, target: &SignalTarget) -> RouteOutcome {
    let wake_fd = target.wake_fd.load(Ordering::Acquire);
    if wake_fd < 0 {
        return RouteOutcome::NoTarget;
    }
    let current = sys::getpid();
    if current != target.pid.load(Ordering::Relaxed) {
        // Window between fork() and exec(): a signal delivered to the child
        // must not be routed into the parent's loop.
        target.pid.store(current, Ordering::Relaxed);
        return RouteOutcome::PidReconciled;
    }
    if sys::write_token(wake_fd, signal).is_err() {
        // The loop can no longer observe signals; nothing recoverable can be
        // done from signal context.
        unsafe { libc::abort() };
    }
    RouteOutcome::Forwarded
}

extern "C" fn handle_signal(signal: libc::c_int) {
    route_signal(signal, &SIGNAL_TARGET);
}

/// Record the calling thread's wake pipe as the signal delivery target if
/// none is set. Pid is published before the fd so the routing plane never
/// observes a target with a stale pid.
fn capture_signal_target() {
    let data = registry::current();
    SIGNAL_TARGET.pid.store(data.pid(), Ordering::Relaxed);
    let _ = SIGNAL_TARGET.wake_fd.compare_exchange(
        -1,
        data.wake_write_fd(),
        Ordering::Release,
        Ordering::Relaxed,
    );
}

/// Forget the delivery target if it still points at `fd`. Called when the
/// owning thread's data is torn down so the routing plane never writes to a
/// closed descriptor.
pub(crate) fn release_signal_target_fd(fd: RawFd) {
    let _ = SIGNAL_TARGET
        .wake_fd
        .compare_exchange(fd, -1, Ordering::AcqRel, Ordering::Relaxed);
}

/// Register `handler` for `signal`. The first registration for a signal
/// installs the process-wide OS handler, saving the previous disposition.
/// Returns a non-zero id for [`unregister_signal`].
///
/// Callable from any thread; tokens are delivered through the wake pipe of
/// the thread that first installed any OS-level handler.
pub fn register_signal<F>(signal: libc::c_int, handler: F) -> SignalHandlerId
where
    F: Fn(libc::c_int) + Send + Sync + 'static,
{
    assert!(signal != 0, "signal number must be non-zero");

    let id = NEXT_HANDLER_ID.fetch_add(1, Ordering::SeqCst);
    let mut entries = table().lock();
    let entry = match entries.get(&signal) {
        Some(entry) => entry.clone(),
        None => {
            capture_signal_target();
            let original = match sys::install_signal_handler(signal, handle_signal) {
                Ok(original) => original,
                Err(err) => {
                    let err = LoopError::SignalInstall {
                        signal,
                        source: err,
                    };
                    error!("{err}");
                    panic!("{err}");
                }
            };
            info!("installed OS handler for signal {signal}");
            let entry = Arc::new(SignalHandlers::new(signal, original));
            entries.insert(signal, entry.clone());
            entry
        }
    };
    entry.add(id, Arc::new(handler));
    debug!("registered handler {id} for signal {signal}");
    SignalHandlerId(id)
}

/// Remove the handler registered under `id`. Unknown ids are ignored. When
/// the last handler for a signal goes away the original OS disposition is
/// restored (deferred to the end of dispatch if one is running).
pub fn unregister_signal(id: SignalHandlerId) {
    assert!(id.0 != 0, "handler id must be non-zero");

    let mut entries = table().lock();
    let mut empty_signal = None;
    for entry in entries.values() {
        if entry.remove(id.0) {
            debug!("unregistered handler {} for signal {}", id.0, entry.signal());
            if entry.is_empty() {
                empty_signal = Some(entry.signal());
            }
            break;
        }
    }
    if let Some(signal) = empty_signal {
        entries.remove(&signal);
        if entries.is_empty() {
            // Let the next installation pick a live delivery target.
            SIGNAL_TARGET.wake_fd.store(-1, Ordering::Release);
        }
    }
}

/// Run every callback registered for `signal`. Called by the loop driver
/// when a non-zero token comes off the wake pipe.
pub(crate) fn dispatch_signal(signal: libc::c_int) {
    // Clone the entry out of the table so callbacks may freely register and
    // unregister handlers, including the last one for this very signal.
    let entry = table().lock().get(&signal).cloned();
    match entry {
        Some(entry) => entry.dispatch(),
        None => debug!("ignoring signal {signal} with no registered handlers"),
    }
}
