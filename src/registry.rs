/*!
 * Per-Thread Registry
 * Process-wide map from thread identity to that thread's loop state
 */

use crate::notify::NotifierSet;
use crate::queue::ThreadEventQueue;
use crate::signals;
use crate::sys;
use crate::time::{timer_table, TimeoutSet};
use crate::wake::WakePipe;
use ahash::RandomState;
use log::{debug, error};
use parking_lot::{Mutex, RwLock};
use std::cell::RefCell;
use std::collections::HashMap;
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, ThreadId};

/// Everything one thread's loop needs: its timers, notifiers, wake pipe,
/// and event queue. Created lazily on first access from the thread and torn
/// down when the thread exits.
pub(crate) struct ThreadData {
    thread: ThreadId,
    pid: AtomicI32,
    wake_pipe: WakePipe,
    pub timeouts: Mutex<TimeoutSet>,
    pub pollables: Mutex<NotifierSet>,
    queue: Arc<ThreadEventQueue>,
}

impl ThreadData {
    fn new(thread: ThreadId) -> Arc<Self> {
        let wake_pipe = match WakePipe::new() {
            Ok(pipe) => pipe,
            Err(err) => {
                // Without a wake pipe the loop cannot be woken or receive
                // signals; there is no degraded mode to fall back to.
                error!("{err}");
                panic!("{err}");
            }
        };
        let pollables = Mutex::new(NotifierSet::new(wake_pipe.read_fd()));
        debug!("created loop state for {thread:?}");
        Arc::new(ThreadData {
            thread,
            pid: AtomicI32::new(sys::getpid()),
            wake_pipe,
            timeouts: Mutex::new(TimeoutSet::new()),
            pollables,
            queue: Arc::new(ThreadEventQueue::new()),
        })
    }

    #[inline]
    pub fn thread(&self) -> ThreadId {
        self.thread
    }

    #[inline]
    pub fn pid(&self) -> i32 {
        self.pid.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn queue(&self) -> &Arc<ThreadEventQueue> {
        &self.queue
    }

    #[inline]
    pub fn wake_write_fd(&self) -> RawFd {
        self.wake_pipe.write_fd()
    }

    #[inline]
    pub fn wake_pipe(&self) -> &WakePipe {
        &self.wake_pipe
    }

    /// Request an extra iteration of this thread's loop. Safe from any
    /// thread.
    pub fn wake(&self) {
        self.wake_pipe.wake();
    }
}

fn registry() -> &'static RwLock<HashMap<ThreadId, Arc<ThreadData>, RandomState>> {
    static REGISTRY: OnceLock<RwLock<HashMap<ThreadId, Arc<ThreadData>, RandomState>>> =
        OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(HashMap::with_hasher(RandomState::new())))
}

/// Removes this thread's entry when the thread exits.
struct ThreadDataGuard(Arc<ThreadData>);

impl Drop for ThreadDataGuard {
    fn drop(&mut self) {
        let data = &self.0;
        registry().write().remove(&data.thread);

        // Detach and drop every timer this thread still owns, then prune the
        // now-dead entries from the id table.
        data.timeouts.lock().clear();
        timer_table().retain(|_, weak| weak.upgrade().is_some());

        // If signal delivery pointed at this thread's pipe, unset it before
        // the descriptors close.
        signals::release_signal_target_fd(data.wake_write_fd());
        debug!("tore down loop state for {:?}", data.thread);
    }
}

thread_local! {
    static CURRENT: RefCell<Option<ThreadDataGuard>> = const { RefCell::new(None) };
}

/// The calling thread's loop state, created and registered on first use.
pub(crate) fn current() -> Arc<ThreadData> {
    CURRENT.with(|slot| {
        let mut slot = slot.borrow_mut();
        match slot.as_ref() {
            Some(guard) => guard.0.clone(),
            None => {
                let data = ThreadData::new(thread::current().id());
                registry().write().insert(data.thread(), data.clone());
                *slot = Some(ThreadDataGuard(data.clone()));
                data
            }
        }
    })
}

/// Another thread's loop state, if that thread still has one.
pub(crate) fn for_thread(thread: ThreadId) -> Option<Arc<ThreadData>> {
    registry().read().get(&thread).cloned()
}
