use std::sync::{Arc, Mutex};

use crate::cbq::Cbq;
use crate::error::{QueueError, Result};
use crate::interest::Interest;
use crate::qmux::{PollSource, QMuxCore};

struct State<T: Send> {
    queue: Option<Cbq<T>>,
    interest: Interest,
    size: usize,
    remaining: usize,
    operational: bool,
}

/// A reusable (queue, interest) registration, spec.md §4.2.
///
/// Its queue reference is nullable and swappable at runtime — a null
/// queue always reports size/remaining `0` and is simply skipped by
/// [`crate::qmux::QMux::poll`] — which is what lets the bridge-queue
/// registry pre-create a fixed set of handles and rebind them instead of
/// allocating one per poll call on the hot agent/dataplane loop path.
pub struct PollHandle<T: Send> {
    state: Mutex<State<T>>,
}

impl<T: Send> PollHandle<T> {
    pub fn new(queue: Option<Cbq<T>>, interest: Interest) -> PollHandle<T> {
        let interest = if queue.is_none() { Interest::none() } else { interest };
        PollHandle {
            state: Mutex::new(State {
                queue,
                interest,
                size: 0,
                remaining: 0,
                operational: false,
            }),
        }
    }

    /// Rebinds this handle to a different queue (or to none). Rejects a
    /// non-operational queue rather than silently accepting a dead one.
    pub fn set_queue(&self, queue: Option<Cbq<T>>) -> Result<()> {
        if let Some(q) = &queue {
            if !q.is_operational() {
                return Err(QueueError::NotOperational);
            }
        }
        let mut state = self.state.lock().unwrap();
        if queue.is_none() {
            state.interest = Interest::none();
        }
        state.queue = queue;
        Ok(())
    }

    /// Sets the interest mask. Auto-downgrades to [`Interest::none`] when
    /// the handle currently has no bound queue.
    pub fn set_interest(&self, interest: Interest) {
        let mut state = self.state.lock().unwrap();
        state.interest = if state.queue.is_none() { Interest::none() } else { interest };
    }

    pub fn get_queue(&self) -> Option<Cbq<T>> {
        self.state.lock().unwrap().queue.clone()
    }

    pub fn interest(&self) -> Interest {
        self.state.lock().unwrap().interest
    }

    /// The queue size as of the last `poll` this handle took part in.
    pub fn size(&self) -> usize {
        self.state.lock().unwrap().size
    }

    /// The remaining capacity as of the last `poll` this handle took part in.
    pub fn remaining_capacity(&self) -> usize {
        self.state.lock().unwrap().remaining
    }

    /// Zeros both snapshot fields. The agent consumer loop (spec.md §4.4)
    /// calls this on every handle before each `poll`.
    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap();
        state.size = 0;
        state.remaining = 0;
        state.operational = false;
    }

    pub fn is_readable(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.operational && state.interest.is_readable() && state.size > 0
    }

    pub fn is_writable(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.operational && state.interest.is_writable() && state.remaining > 0
    }

}

impl<T: Send> PollSource for PollHandle<T> {
    fn has_queue(&self) -> bool {
        self.state.lock().unwrap().queue.is_some()
    }

    fn reset(&self) {
        PollHandle::reset(self)
    }

    fn pre_wait(&self, qmux: &Arc<QMuxCore>) -> bool {
        let (queue, interest) = {
            let state = self.state.lock().unwrap();
            (state.queue.clone(), state.interest)
        };
        let queue = match queue {
            Some(q) => q,
            None => return false,
        };
        let snap = queue.pre_wait_snapshot(qmux, interest);
        let mut state = self.state.lock().unwrap();
        state.size = snap.size;
        state.remaining = snap.remaining;
        state.operational = snap.operational;
        snap.operational
            && ((interest.is_readable() && snap.size > 0) || (interest.is_writable() && snap.remaining > 0))
    }

    fn post_wait(&self) -> bool {
        let queue = { self.state.lock().unwrap().queue.clone() };
        let queue = match queue {
            Some(q) => q,
            None => return false,
        };
        let snap = queue.post_wait_snapshot();
        let mut state = self.state.lock().unwrap();
        state.size = snap.size;
        state.remaining = snap.remaining;
        state.operational = snap.operational;
        snap.operational
            && ((state.interest.is_readable() && snap.size > 0) || (state.interest.is_writable() && snap.remaining > 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueueConfig;
    use crate::qmux::QMux;
    use crate::timeout::Timeout;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn poll_wakes_when_data_arrives() {
        let q: Cbq<i32> = Cbq::new(QueueConfig::new(4)).unwrap();
        let handle = PollHandle::new(Some(q.clone()), Interest::readable());
        let qmux = QMux::new();

        let producer = {
            let q = q.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(30));
                q.put(7, Timeout::NonBlocking).unwrap();
            })
        };

        let ready = qmux
            .poll(&[&handle], Timeout::Bounded(Duration::from_secs(2)))
            .unwrap();
        assert_eq!(ready, 1);
        assert!(handle.is_readable());

        producer.join().unwrap();
    }

    #[test]
    fn poll_returns_immediately_when_already_ready() {
        let q: Cbq<i32> = Cbq::new(QueueConfig::new(4)).unwrap();
        q.put(1, Timeout::NonBlocking).unwrap();
        let handle = PollHandle::new(Some(q), Interest::readable());
        let qmux = QMux::new();

        let ready = qmux.poll(&[&handle], Timeout::NonBlocking).unwrap();
        assert_eq!(ready, 1);
    }

    #[test]
    fn null_queue_handle_is_always_skipped() {
        let handle: PollHandle<i32> = PollHandle::new(None, Interest::readable_writable());
        assert_eq!(handle.interest(), Interest::none());
        let qmux = QMux::new();
        let ready = qmux.poll(&[&handle], Timeout::NonBlocking);
        assert!(ready.is_err());
    }

    #[test]
    fn set_queue_rejects_shutdown_queue() {
        let q: Cbq<i32> = Cbq::new(QueueConfig::new(2)).unwrap();
        q.shutdown(true).unwrap();
        let handle: PollHandle<i32> = PollHandle::new(None, Interest::readable());
        assert_eq!(handle.set_queue(Some(q)), Err(QueueError::NotOperational));
    }
}
