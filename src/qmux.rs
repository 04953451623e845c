use std::sync::{Arc, Condvar, Mutex};
use std::time::Instant;

use log::trace;

use crate::error::{QueueError, Result};
use crate::interest::Interest;
use crate::timeout::Timeout;

/// The object-safe half of a poll registration: something a [`QMux`] can
/// bind itself to and later ask "are you ready now?".
///
/// [`crate::poll_handle::PollHandle<T>`] is the only implementor; the
/// trait exists so `QMux::poll` can take a slice of heterogeneous queue
/// types (`&[&dyn PollSource]`), the Rust-typed stand-in for a C-style
/// array of void-pointer poll descriptors (spec.md §4.3).
pub trait PollSource: Send + Sync {
    /// Whether this source currently has a real (non-null) queue bound.
    /// A poll set made up entirely of null-queue sources is invalid
    /// (spec.md §4.3 step 2).
    fn has_queue(&self) -> bool;
    /// Zeros this source's last readiness snapshot. The agent consumer
    /// loop calls this on every handle before each `poll` (spec.md §4.4).
    fn reset(&self);
    /// Readiness snapshot + observer bind, run once per source before
    /// sleeping. Returns `true` if the source is already ready.
    fn pre_wait(&self, qmux: &Arc<QMuxCore>) -> bool;
    /// Readiness snapshot + observer unbind, run once per source after
    /// waking (or after skipping the sleep because something was already
    /// ready). Returns `true` if the source is ready.
    fn post_wait(&self) -> bool;
}

struct QMuxState {
    woken: bool,
}

/// The shared, reference-counted core a [`QMux`] hands out to every CBQ it
/// currently has bound as an observer. A CBQ holds this by `Arc` so a
/// dropped `QMux` is never dereferenced — the binding is cleared on every
/// notification delivery (spec.md §3 invariant I5) well before that could
/// matter, but the `Arc` means it would be harmless even if it weren't.
pub struct QMuxCore {
    state: Mutex<QMuxState>,
    cond: Condvar,
}

impl QMuxCore {
    /// Called by a bound CBQ when its state changes in a way the
    /// registered interest cares about.
    pub(crate) fn notify(&self) {
        let mut state = self.state.lock().unwrap();
        state.woken = true;
        self.cond.notify_all();
    }
}

/// A poll multiplexer: blocks a thread until at least one of several
/// heterogeneous queues becomes ready, or the deadline elapses.
///
/// Cheap to `Clone` — a handle onto a shared [`QMuxCore`], matching the
/// `Cbq` handle shape.
#[derive(Clone)]
pub struct QMux {
    core: Arc<QMuxCore>,
}

impl QMux {
    pub fn new() -> QMux {
        QMux {
            core: Arc::new(QMuxCore {
                state: Mutex::new(QMuxState { woken: false }),
                cond: Condvar::new(),
            }),
        }
    }

    /// Lock-ordering discipline (spec.md §5): this method never holds the
    /// `QMux`'s own lock while calling into a CBQ, and never calls into a
    /// CBQ while another CBQ's lock is held — each `pre_wait`/`post_wait`
    /// call below takes and releases its queue's lock independently.
    ///
    /// Algorithm (spec.md §4.3), repeated against the same deadline until
    /// something is actually ready or the deadline genuinely elapses:
    /// 1. Reset the wake flag.
    /// 2. Pre-wait snapshot every source (this binds each unready source as
    ///    an observer); if any is already ready, skip the sleep.
    /// 3. Otherwise sleep on the internal condvar until woken or the
    ///    deadline elapses.
    /// 4. Post-wait snapshot every source (this erases every binding made
    ///    in step 2, ready or not). If none is ready and the wait genuinely
    ///    timed out, return timed-out; if none is ready but we were merely
    ///    signaled (a spurious wakeup or a notification some other thread
    ///    already consumed), loop back to step 2 with the remaining
    ///    deadline instead of returning early.
    pub fn poll(&self, sources: &[&dyn PollSource], timeout: Timeout) -> Result<usize> {
        if sources.is_empty() || sources.iter().all(|s| !s.has_queue()) {
            return Err(QueueError::InvalidArgs);
        }
        let deadline = timeout.deadline(Instant::now());

        loop {
            {
                let mut state = self.core.state.lock().unwrap();
                state.woken = false;
            }

            let already_ready = sources.iter().filter(|s| s.pre_wait(&self.core)).count();

            let timed_out = if already_ready > 0 {
                trace!("{} source(s) already ready, skipping sleep", already_ready);
                false
            } else {
                let mut state = self.core.state.lock().unwrap();
                loop {
                    if state.woken {
                        break false;
                    }
                    match deadline.remaining(Instant::now()) {
                        Err(()) => break true,
                        Ok(None) => state = self.core.cond.wait(state).unwrap(),
                        Ok(Some(d)) => {
                            let (next, _timed_out) = self.core.cond.wait_timeout(state, d).unwrap();
                            state = next;
                        }
                    }
                }
            };

            let ready = sources.iter().filter(|s| s.post_wait()).count();
            if ready > 0 {
                return Ok(ready);
            }
            if timed_out {
                return Err(QueueError::TimedOut);
            }
            trace!("woken with nothing ready (spurious wakeup or stolen notification), re-polling");
        }
    }
}

impl Default for QMux {
    fn default() -> QMux {
        QMux::new()
    }
}
