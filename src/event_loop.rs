/*!
 * Event Loop
 * The per-thread loop driver and the process-wide registration surface
 *
 * One iteration does exactly one blocking poll(2) over the thread's poll
 * set. Everything else is bookkeeping on either side of it: absolutize
 * relative timers, compute the poll timeout, drain the wake pipe, turn
 * readiness into events, fire expired timers, and flush the event queue.
 */

use crate::core::errors::LoopError;
use crate::core::limits::MAX_POLL_TIMEOUT_MS;
use crate::core::traits::EventReceiver;
use crate::core::types::{Event, NotificationType, PumpMode, SignalHandlerId, TimerId};
use crate::notify::Notifier;
use crate::registry::{self, ThreadData};
use crate::signals;
use crate::sys;
use crate::time::{timer_table, Timer, Timeout};
use log::{debug, error, trace};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

/// Process-wide registration surface.
///
/// Timers and notifiers are bound to the calling thread's loop; signal
/// handlers are process-wide. All registrations can be reversed from any
/// thread; reversals against a thread that has already exited are no-ops.
pub struct EventLoopManager;

impl EventLoopManager {
    /// A loop instance for the calling thread. Typically one per thread,
    /// though multiple instances share the same underlying thread state.
    #[must_use]
    pub fn make_implementation() -> EventLoop {
        let data = registry::current();
        EventLoop {
            thread: data.thread(),
            data,
            exit_requested: AtomicBool::new(false),
            exit_code: AtomicI32::new(0),
        }
    }

    /// Schedule a timer on the calling thread's loop. The first expiry is
    /// `interval` from now; a reloading timer keeps expiring every
    /// `interval` after that.
    pub fn register_timer<R>(
        receiver: &Arc<R>,
        interval: Duration,
        should_reload: bool,
        fire_when_hidden: bool,
    ) -> TimerId
    where
        R: EventReceiver + 'static,
    {
        let data = registry::current();
        let timer = Timer::new(
            Arc::downgrade(receiver) as Weak<dyn EventReceiver>,
            data.thread(),
            interval,
            should_reload,
            fire_when_hidden,
        );
        let id = timer.id();
        data.timeouts
            .lock()
            .schedule_absolute(timer, Instant::now() + interval);
        trace!("registered timer {id:?} ({interval:?}, reload: {should_reload})");
        id
    }

    /// Cancel a timer. Safe to call from any thread and safe to call more
    /// than once; only the first caller unschedules. A no-op if the owning
    /// thread has already exited.
    pub fn unregister_timer(id: TimerId) {
        // The map guard must be released before the remove below.
        let upgraded = timer_table().get(&id).and_then(|weak| weak.upgrade());
        let timer = match upgraded {
            Some(timer) => timer,
            None => {
                timer_table().remove(&id);
                return;
            }
        };
        if !timer.claim_for_deletion() {
            return;
        }
        timer_table().remove(&id);

        if let Some(data) = registry::for_thread(timer.owner_thread()) {
            let timeout = timer.clone() as Arc<dyn Timeout>;
            data.timeouts.lock().unschedule(&timeout);
        }
        trace!("unregistered timer {id:?}");
    }

    /// Watch a file descriptor on the calling thread's loop. The notifier's
    /// receiver gets a [`Event::NotifierActivation`] whenever the readiness
    /// reported by the OS intersects the notifier's mask.
    pub fn register_notifier(notifier: &Arc<Notifier>) {
        let data = registry::current();
        notifier.set_owner_thread(Some(data.thread()));
        data.pollables.lock().insert(notifier.clone());
        debug!("registered notifier for fd {}", notifier.fd());
    }

    /// Stop watching. A no-op if the notifier is unregistered or its owning
    /// thread has exited.
    pub fn unregister_notifier(notifier: &Notifier) {
        let Some(owner) = notifier.owner_thread() else {
            return;
        };
        let Some(data) = registry::for_thread(owner) else {
            return;
        };
        data.pollables.lock().remove_fd(notifier.fd());
        notifier.set_owner_thread(None);
        debug!("unregistered notifier for fd {}", notifier.fd());
    }

    /// Register a process-wide callback for `signal`. See
    /// [`signals::register_signal`].
    pub fn register_signal<F>(signal: libc::c_int, handler: F) -> SignalHandlerId
    where
        F: Fn(libc::c_int) + Send + Sync + 'static,
    {
        signals::register_signal(signal, handler)
    }

    /// Remove a signal callback by id. See [`signals::unregister_signal`].
    pub fn unregister_signal(id: SignalHandlerId) {
        signals::unregister_signal(id);
    }

    /// Hook invoked after an event is posted. Present for parity with other
    /// loop backends; this implementation needs no post-notification work.
    pub fn did_post_event() {}
}

/// One thread's event loop.
///
/// `exec`, `pump`, and event processing must happen on the thread that
/// created the instance; `quit`, `post_event`, and `wake` are safe from any
/// thread.
pub struct EventLoop {
    thread: ThreadId,
    data: Arc<ThreadData>,
    exit_requested: AtomicBool,
    exit_code: AtomicI32,
}

impl EventLoop {
    /// Run until [`quit`](EventLoop::quit), then return the exit code.
    pub fn exec(&self) -> i32 {
        loop {
            if self.exit_requested.load(Ordering::Acquire) {
                return self.exit_code.load(Ordering::Acquire);
            }
            self.pump(PumpMode::WaitForEvents);
        }
    }

    /// Run one iteration of the loop and flush the event queue. Returns the
    /// number of events processed.
    pub fn pump(&self, mode: PumpMode) -> usize {
        wait_for_events(&self.data, mode);
        self.data.queue().process()
    }

    /// Ask `exec` to return `code` at the next iteration boundary. Pair
    /// with [`wake`](EventLoop::wake) when calling from another thread.
    pub fn quit(&self, code: i32) {
        self.exit_code.store(code, Ordering::Release);
        self.exit_requested.store(true, Ordering::Release);
    }

    /// Enqueue an event for this loop's thread. When called from another
    /// thread, the target loop is woken so it observes the event on its
    /// next iteration.
    pub fn post_event<R>(&self, receiver: &Arc<R>, event: Event)
    where
        R: EventReceiver + 'static,
    {
        self.data.queue().post_event(receiver, event);
        if thread::current().id() != self.thread {
            self.data.wake();
        }
        EventLoopManager::did_post_event();
    }

    /// Force an extra loop iteration. Safe from any thread.
    pub fn wake(&self) {
        self.data.wake();
    }
}

/// Clamp a deadline distance into poll(2)'s millisecond range.
fn poll_timeout_for(deadline: Instant, now: Instant) -> libc::c_int {
    let remaining = deadline.saturating_duration_since(now);
    remaining.as_millis().min(MAX_POLL_TIMEOUT_MS) as libc::c_int
}

/// One loop iteration up to, but not including, event-queue processing.
fn wait_for_events(data: &ThreadData, mode: PumpMode) {
    loop {
        let has_pending_events = data.queue().has_pending_events();

        let iteration_start = Instant::now();
        let timeout_ms = {
            let mut timeouts = data.timeouts.lock();
            timeouts.absolutize_relative_timeouts(iteration_start);
            if mode == PumpMode::DontWait || has_pending_events {
                0
            } else {
                match timeouts.next_timer_expiration() {
                    Some(deadline) => poll_timeout_for(deadline, iteration_start),
                    // Nothing scheduled; block until a descriptor or the
                    // wake pipe becomes ready.
                    None => -1,
                }
            }
        };

        // The poll set is copied out so the lock is not held across the
        // blocking call; descriptors unregistered mid-poll are skipped when
        // readiness is translated below.
        let mut poll_fds = data.pollables.lock().snapshot();
        let marked = match sys::poll(&mut poll_fds, timeout_ms) {
            Ok(marked) => marked,
            Err(err) => {
                let err = LoopError::Poll(err);
                error!("{err}");
                panic!("{err}");
            }
        };
        let poll_end = Instant::now();

        // Wake pipe first: signal tokens and wake requests.
        if poll_fds[0].revents & libc::POLLIN != 0 {
            let drain = data.wake_pipe().drain();
            let mut wake_requested = false;
            for &token in drain.tokens() {
                if token != 0 {
                    signals::dispatch_signal(token);
                } else {
                    wake_requested = true;
                }
            }
            // A full batch with no explicit wake means more tokens may be
            // waiting; restart so they cannot be starved by a long poll.
            if drain.filled_batch() && !wake_requested {
                continue;
            }
        }

        if marked > 0 {
            let pollables = data.pollables.lock();
            for poll_fd in &poll_fds[1..] {
                if poll_fd.revents == 0 {
                    continue;
                }
                let Some(notifier) = pollables.lookup(poll_fd.fd) else {
                    continue;
                };
                let activations = NotificationType::from_poll_revents(poll_fd.revents)
                    & notifier.notification_type();
                if !activations.is_empty() {
                    data.queue().post_weak(
                        notifier.receiver(),
                        Event::NotifierActivation {
                            fd: poll_fd.fd,
                            activations,
                        },
                    );
                }
            }
        }

        data.timeouts.lock().fire_expired(poll_end, data.queue());
        return;
    }
}
