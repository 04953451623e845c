use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Instant;

use log::{debug, trace, warn};

use crate::config::{Disposer, QueueConfig};
use crate::error::{QueueError, Result};
use crate::interest::Interest;
use crate::qmux::QMuxCore;
use crate::timeout::{Deadline, Timeout};

/// The rebasing threshold from spec.md §4.1.2: once `write_index` grows
/// past this point, both indices are rebased down by the same multiple of
/// `capacity + 1` so that physical slot addressing and relative ordering
/// are preserved without ever overflowing `usize`.
const REBASE_THRESHOLD: usize = usize::MAX / 2;

/// A bounded, multi-producer/multi-consumer circular buffer with blocking,
/// timed, and non-blocking `put`/`get`, an external wakeup barrier, and an
/// optional single-observer binding to a [`crate::qmux::QMux`].
///
/// See spec.md §4.1 for the full contract. `Cbq` is cheap to `Clone` — it
/// is a handle onto a shared, reference-counted core, matching the
/// `Arc<Inner>` shape used by `BlockQueue`/`MessagesQueue` in the teacher
/// crate's `plus` module.
pub struct Cbq<T: Send> {
    inner: Arc<CbqInner<T>>,
}

struct CbqInner<T> {
    shared: Mutex<Shared<T>>,
    /// Signaled when space frees up (after a `get`, `clear`, or `shutdown`).
    cond_put: Condvar,
    /// Signaled when elements become available (after a `put`, `clear`, or `shutdown`).
    cond_get: Condvar,
    /// Signaled when a wakeup barrier clears.
    cond_awakened: Condvar,
    disposer: Option<Disposer<T>>,
}

struct Shared<T> {
    slots: Vec<Option<T>>,
    capacity: usize,
    read_index: usize,
    write_index: usize,
    count: usize,
    operational: bool,
    waking: bool,
    waiters: usize,
    observer: Option<(Arc<QMuxCore>, Interest)>,
}

impl<T> Shared<T> {
    fn modulus(&self) -> usize {
        self.capacity + 1
    }

    /// Index rebasing (spec.md §4.1.2). Subtracts the same multiple of
    /// `capacity + 1` from both counters so `read_index % modulus` and
    /// `write_index % modulus` are unchanged (physical slot identity is
    /// preserved) while neither counter keeps climbing forever.
    fn rebase(&mut self) {
        if self.write_index >= REBASE_THRESHOLD {
            let modulus = self.modulus();
            let k = self.read_index / modulus;
            self.read_index -= k * modulus;
            self.write_index -= k * modulus;
        }
    }
}

/// A point-in-time readiness snapshot, handed back to [`crate::poll_handle`]
/// during a [`crate::qmux::QMux::poll`] pass.
pub(crate) struct CbqSnapshot {
    pub size: usize,
    pub remaining: usize,
    pub operational: bool,
}

/// Outcome of one "try, else wait" cycle of the blocking algorithm
/// (spec.md §4.1.1, steps 3–4).
enum Park {
    /// State changed (or a spurious wakeup occurred); re-evaluate the loop.
    Retry,
    TimedOut,
    WokenByBarrier,
}

impl<T: Send> Cbq<T> {
    /// Allocates `capacity + 1` slots (spec.md §4.1: the extra slot is a
    /// storage safety margin for index rebasing, not part of the logical
    /// capacity). Fails with [`QueueError::InvalidArgs`] on zero capacity.
    pub fn new(config: QueueConfig<T>) -> Result<Cbq<T>> {
        if config.capacity == 0 {
            return Err(QueueError::InvalidArgs);
        }
        let mut slots = Vec::new();
        slots
            .try_reserve_exact(config.capacity + 1)
            .map_err(|_| QueueError::NoMemory)?;
        slots.resize_with(config.capacity + 1, || None);

        Ok(Cbq {
            inner: Arc::new(CbqInner {
                shared: Mutex::new(Shared {
                    slots,
                    capacity: config.capacity,
                    read_index: 0,
                    write_index: 0,
                    count: 0,
                    operational: true,
                    waking: false,
                    waiters: 0,
                    observer: None,
                }),
                cond_put: Condvar::new(),
                cond_get: Condvar::new(),
                cond_awakened: Condvar::new(),
                disposer: config.disposer,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Shared<T>> {
        self.inner.shared.lock().unwrap()
    }

    /// Parks the calling thread on `cond` until the state changes, the
    /// deadline elapses, or an external [`Cbq::wakeup`] releases it.
    ///
    /// Implements the Open Question normalisation from spec.md §9: a
    /// thread that finds `waking` already true *before* it would start
    /// waiting is treated exactly like one woken mid-wait — it still goes
    /// through the decrement-and-maybe-signal bookkeeping of step 3 in
    /// §4.1.4, rather than silently sleeping through an already-delivered
    /// broadcast.
    fn park<'a>(
        &self,
        mut guard: MutexGuard<'a, Shared<T>>,
        cond: &Condvar,
        deadline: Deadline,
    ) -> (MutexGuard<'a, Shared<T>>, Park) {
        guard.waiters += 1;
        if guard.waking {
            guard.waiters -= 1;
            self.ack_wakeup(&mut guard);
            return (guard, Park::WokenByBarrier);
        }

        let remaining = match deadline.remaining(Instant::now()) {
            Err(()) => {
                guard.waiters -= 1;
                return (guard, Park::TimedOut);
            }
            Ok(r) => r,
        };

        trace!("parking thread, remaining={:?}", remaining);
        guard = match remaining {
            None => cond.wait(guard).unwrap(),
            Some(d) => cond.wait_timeout(guard, d).unwrap().0,
        };
        guard.waiters -= 1;

        if guard.waking {
            self.ack_wakeup(&mut guard);
            (guard, Park::WokenByBarrier)
        } else {
            (guard, Park::Retry)
        }
    }

    /// Step 3 of the wakeup barrier (spec.md §4.1.4): the last departing
    /// waiter clears `waking` and signals the originator.
    fn ack_wakeup(&self, guard: &mut MutexGuard<'_, Shared<T>>) {
        if guard.waiters == 0 {
            guard.waking = false;
            self.inner.cond_awakened.notify_all();
        }
    }

    fn notify_after_put(&self, guard: &mut MutexGuard<'_, Shared<T>>) {
        // notify_all rather than notify_one: get_n callers may be blocked
        // with differing `min` thresholds, so a single insertion can only
        // be judged to satisfy one of several waiters by re-running each
        // one's own condition.
        self.inner.cond_get.notify_all();
        self.notify_observer(guard, Interest::readable(), false);
    }

    fn notify_after_get(&self, guard: &mut MutexGuard<'_, Shared<T>>) {
        self.inner.cond_put.notify_all();
        self.notify_observer(guard, Interest::writable(), false);
    }

    /// Signals the bound QMUX observer, if any, and if its registered
    /// mask intersects `changed` (or if `force`, regardless of mask —
    /// used by `shutdown`, which notifies every observer). Per spec.md
    /// §3 invariant I5, a delivered notification always clears the
    /// binding; one that doesn't match the registered mask is left bound.
    fn notify_observer(&self, guard: &mut MutexGuard<'_, Shared<T>>, changed: Interest, force: bool) {
        if let Some((qmux, mask)) = guard.observer.take() {
            if force || !mask.intersect(changed).is_empty() {
                qmux.notify();
            } else {
                guard.observer = Some((qmux, mask));
            }
        }
    }

    /// Invokes this queue's configured disposer (if any) on `elt`.
    ///
    /// `drain_and_dispose` covers residual elements discarded by `clear`
    /// and `shutdown`; this is the counterpart for an element that a
    /// consumer loop drained normally via `get`/`get_n` and has finished
    /// with — spec.md's free-proc contract requires the disposer to run
    /// after consumption too, not only on elements that never made it out
    /// of the queue. A queue with no configured disposer makes this a
    /// no-op: `elt`'s own `Drop` already runs when it goes out of scope.
    pub fn dispose(&self, elt: T) {
        if let Some(disposer) = &self.inner.disposer {
            disposer(elt);
        }
    }

    fn drain_and_dispose(&self, guard: &mut MutexGuard<'_, Shared<T>>, dispose: bool) {
        let modulus = guard.modulus();
        for i in 0..guard.count {
            let idx = (guard.read_index + i) % modulus;
            if let Some(elt) = guard.slots[idx].take() {
                if dispose {
                    if let Some(disposer) = &self.inner.disposer {
                        disposer(elt);
                    }
                }
            }
        }
        guard.count = 0;
        guard.read_index = 0;
        guard.write_index = 0;
    }

    /// Inserts one element. See spec.md §4.1 operations table.
    pub fn put(&self, elt: T, timeout: Timeout) -> Result<()> {
        let deadline = timeout.deadline(Instant::now());
        let mut guard = self.lock();
        let mut elt = Some(elt);
        loop {
            guard.rebase();
            if !guard.operational {
                return Err(QueueError::NotOperational);
            }
            if guard.count < guard.capacity {
                let idx = guard.write_index % guard.modulus();
                guard.slots[idx] = elt.take();
                guard.write_index += 1;
                guard.count += 1;
                self.notify_after_put(&mut guard);
                return Ok(());
            }

            let (g, outcome) = self.park(guard, &self.inner.cond_put, deadline);
            guard = g;
            match outcome {
                Park::Retry => continue,
                Park::TimedOut => return Err(QueueError::TimedOut),
                Park::WokenByBarrier => return Err(QueueError::WakeupRequested),
            }
        }
    }

    /// Inserts up to `items.len()` elements, draining `items` from the
    /// front as they're accepted. The count of elements actually
    /// transferred is both the `Ok` value on full success and, on
    /// `TimedOut`, recoverable from how much shorter `items` became.
    ///
    /// - `Timeout::NonBlocking`: inserts as many as fit right now and
    ///   returns `Ok(actual)` even if `actual < items.len()`.
    /// - `Timeout::Infinite`: waits as needed until every element is inserted.
    /// - `Timeout::Bounded`: inserts everything within the deadline, or
    ///   returns `Err(TimedOut)` with the partial transfer already
    ///   reflected in `items`.
    pub fn put_n(&self, items: &mut VecDeque<T>, timeout: Timeout) -> Result<usize> {
        if items.is_empty() {
            return Ok(0);
        }
        let deadline = timeout.deadline(Instant::now());
        let mut guard = self.lock();
        let mut inserted = 0usize;
        loop {
            guard.rebase();
            if !guard.operational {
                return Err(QueueError::NotOperational);
            }

            let space = guard.capacity - guard.count;
            let take = space.min(items.len());
            if take > 0 {
                for _ in 0..take {
                    let elt = items.pop_front().expect("take bounded by items.len()");
                    let idx = guard.write_index % guard.modulus();
                    guard.slots[idx] = Some(elt);
                    guard.write_index += 1;
                    guard.count += 1;
                }
                inserted += take;
                self.notify_after_put(&mut guard);
            }

            if items.is_empty() {
                return Ok(inserted);
            }
            if matches!(deadline, Deadline::Elapsed) {
                return Ok(inserted);
            }

            let (g, outcome) = self.park(guard, &self.inner.cond_put, deadline);
            guard = g;
            match outcome {
                Park::Retry => continue,
                Park::TimedOut => {
                    warn!("put_n timed out with {} of {} inserted", inserted, inserted + items.len());
                    return Err(QueueError::TimedOut);
                }
                Park::WokenByBarrier => return Err(QueueError::WakeupRequested),
            }
        }
    }

    /// Removes one element. See spec.md §4.1 operations table.
    pub fn get(&self, timeout: Timeout) -> Result<T> {
        let deadline = timeout.deadline(Instant::now());
        let mut guard = self.lock();
        loop {
            guard.rebase();
            if !guard.operational {
                return Err(QueueError::NotOperational);
            }
            if guard.count > 0 {
                let idx = guard.read_index % guard.modulus();
                let elt = guard.slots[idx].take().expect("count > 0 implies a live slot");
                guard.read_index += 1;
                guard.count -= 1;
                self.notify_after_get(&mut guard);
                return Ok(elt);
            }

            let (g, outcome) = self.park(guard, &self.inner.cond_get, deadline);
            guard = g;
            match outcome {
                Park::Retry => continue,
                Park::TimedOut => return Err(QueueError::TimedOut),
                Park::WokenByBarrier => return Err(QueueError::WakeupRequested),
            }
        }
    }

    /// Removes between `min` and `max` elements, appending them to `out`.
    /// `min == max` is fully blocking; `min == 1` means "as many as
    /// available but at least one". Timeout conventions mirror
    /// [`Cbq::put_n`].
    pub fn get_n(&self, out: &mut VecDeque<T>, max: usize, min: usize, timeout: Timeout) -> Result<usize> {
        if max == 0 {
            return Ok(0);
        }
        let min = min.min(max);
        let deadline = timeout.deadline(Instant::now());
        let mut guard = self.lock();
        let mut taken = 0usize;
        loop {
            guard.rebase();
            if !guard.operational {
                return Err(QueueError::NotOperational);
            }

            let wanted = max - taken;
            let take = guard.count.min(wanted);
            if take > 0 {
                for _ in 0..take {
                    let idx = guard.read_index % guard.modulus();
                    let elt = guard.slots[idx].take().expect("take bounded by count");
                    guard.read_index += 1;
                    guard.count -= 1;
                    out.push_back(elt);
                }
                taken += take;
                self.notify_after_get(&mut guard);
            }

            if taken >= min || taken >= max {
                return Ok(taken);
            }
            if matches!(deadline, Deadline::Elapsed) {
                return Ok(taken);
            }

            let (g, outcome) = self.park(guard, &self.inner.cond_get, deadline);
            guard = g;
            match outcome {
                Park::Retry => continue,
                Park::TimedOut => return Err(QueueError::TimedOut),
                Park::WokenByBarrier => return Err(QueueError::WakeupRequested),
            }
        }
    }

    /// Returns up to `max` elements without removing them, waiting for at
    /// least `min` to become available. Never notifies writable-interest
    /// observers, since nothing was consumed.
    pub fn peek_n(&self, out: &mut VecDeque<T>, max: usize, min: usize, timeout: Timeout) -> Result<usize>
    where
        T: Clone,
    {
        if max == 0 {
            return Ok(0);
        }
        let min = min.min(max);
        let deadline = timeout.deadline(Instant::now());
        let mut guard = self.lock();
        loop {
            guard.rebase();
            if !guard.operational {
                return Err(QueueError::NotOperational);
            }

            let take = guard.count.min(max);
            if take >= min || matches!(deadline, Deadline::Elapsed) {
                for i in 0..take {
                    let idx = (guard.read_index + i) % guard.modulus();
                    let elt = guard.slots[idx].clone().expect("take bounded by count");
                    out.push_back(elt);
                }
                return Ok(take);
            }

            let (g, outcome) = self.park(guard, &self.inner.cond_get, deadline);
            guard = g;
            match outcome {
                Park::Retry => continue,
                Park::TimedOut => return Err(QueueError::TimedOut),
                Park::WokenByBarrier => return Err(QueueError::WakeupRequested),
            }
        }
    }

    /// Returns one element without removing it.
    pub fn peek(&self, timeout: Timeout) -> Result<T>
    where
        T: Clone,
    {
        let mut out = VecDeque::with_capacity(1);
        self.peek_n(&mut out, 1, 1, timeout)?;
        out.pop_front().ok_or(QueueError::TimedOut)
    }

    pub fn size(&self) -> Result<usize> {
        let guard = self.lock();
        if !guard.operational {
            return Err(QueueError::NotOperational);
        }
        Ok(guard.count)
    }

    pub fn remaining_capacity(&self) -> Result<usize> {
        let guard = self.lock();
        if !guard.operational {
            return Err(QueueError::NotOperational);
        }
        Ok(guard.capacity - guard.count)
    }

    pub fn max_capacity(&self) -> Result<usize> {
        let guard = self.lock();
        if !guard.operational {
            return Err(QueueError::NotOperational);
        }
        Ok(guard.capacity)
    }

    pub fn is_full(&self) -> Result<bool> {
        let guard = self.lock();
        if !guard.operational {
            return Err(QueueError::NotOperational);
        }
        Ok(guard.count == guard.capacity)
    }

    pub fn is_empty(&self) -> Result<bool> {
        let guard = self.lock();
        if !guard.operational {
            return Err(QueueError::NotOperational);
        }
        Ok(guard.count == 0)
    }

    /// The sole observer that never fails post-shutdown.
    pub fn is_operational(&self) -> bool {
        self.lock().operational
    }

    /// Drops all elements (disposing them if `dispose` is set), resets
    /// both indices, and wakes blocked writers and readers whose
    /// condition changed. Per the unified policy in spec.md §9 resolving
    /// the clear-notification Open Question, both readable- and
    /// writable-interest observers are notified, since both the queue's
    /// size and its remaining capacity changed — this holds even when the
    /// queue was already empty (spec.md S5): a bound observer is still
    /// notified, it just observes that nothing arrived.
    pub fn clear(&self, dispose: bool) -> Result<()> {
        let mut guard = self.lock();
        if guard.count > 0 {
            debug!("clearing {} elements (dispose={})", guard.count, dispose);
            self.drain_and_dispose(&mut guard, dispose);
        }
        self.inner.cond_put.notify_all();
        self.inner.cond_get.notify_all();
        self.notify_observer(&mut guard, Interest::readable() | Interest::writable(), false);
        Ok(())
    }

    /// Sets `is_operational` false (idempotent), disposes residual
    /// elements, and wakes every blocked thread and the bound observer.
    /// Shutdown is terminal: once this returns, the queue can never be
    /// revived.
    pub fn shutdown(&self, dispose: bool) -> Result<()> {
        let mut guard = self.lock();
        if !guard.operational {
            return Ok(());
        }
        debug!("shutting down queue, disposing {} residual elements", guard.count);
        guard.operational = false;
        self.drain_and_dispose(&mut guard, dispose);
        self.inner.cond_put.notify_all();
        self.inner.cond_get.notify_all();
        self.notify_observer(&mut guard, Interest::readable() | Interest::writable(), true);
        Ok(())
    }

    /// The external unblock barrier (spec.md §4.1.4): wakes every thread
    /// currently blocked in this queue and waits until all of them have
    /// acknowledged leaving the wait before returning.
    pub fn wakeup(&self, timeout: Timeout) -> Result<()> {
        let deadline = timeout.deadline(Instant::now());
        let mut guard = self.lock();

        if guard.waking {
            debug!("wakeup already in progress, joining");
            let (_g, res) = self.wait_for_awakened_clear(guard, deadline);
            return res;
        }

        debug!("starting wakeup barrier for {} waiter(s)", guard.waiters);
        guard.waking = true;
        self.inner.cond_put.notify_all();
        self.inner.cond_get.notify_all();

        if guard.waiters == 0 {
            guard.waking = false;
            return Ok(());
        }

        let (_g, res) = self.wait_for_awakened_clear(guard, deadline);
        res
    }

    fn wait_for_awakened_clear<'a>(
        &self,
        mut guard: MutexGuard<'a, Shared<T>>,
        deadline: Deadline,
    ) -> (MutexGuard<'a, Shared<T>>, Result<()>) {
        loop {
            if !guard.waking {
                return (guard, Ok(()));
            }
            match deadline.remaining(Instant::now()) {
                Err(()) => return (guard, Err(QueueError::TimedOut)),
                Ok(None) => guard = self.inner.cond_awakened.wait(guard).unwrap(),
                Ok(Some(d)) => guard = self.inner.cond_awakened.wait_timeout(guard, d).unwrap().0,
            }
        }
    }

    /// Shuts the queue down and releases this handle. Other clones of the
    /// same `Cbq` remain valid handles onto an already-shut-down queue.
    pub fn destroy(self, dispose: bool) -> Result<()> {
        self.shutdown(dispose)
    }

    /// Pre-wait snapshot (spec.md §4.3 step 1): reads size/remaining,
    /// decides readiness against `interest`, and — if not ready — binds
    /// `qmux` as this queue's sole observer with the unsatisfied portion
    /// of `interest`. If already ready, any existing binding is erased.
    pub(crate) fn pre_wait_snapshot(&self, qmux: &Arc<QMuxCore>, interest: Interest) -> CbqSnapshot {
        let mut guard = self.lock();
        guard.rebase();
        if !guard.operational {
            guard.observer = None;
            return CbqSnapshot {
                size: 0,
                remaining: 0,
                operational: false,
            };
        }

        let size = guard.count;
        let remaining = guard.capacity - guard.count;
        let ready = (interest.is_readable() && size > 0) || (interest.is_writable() && remaining > 0);
        if ready {
            guard.observer = None;
        } else {
            guard.observer = Some((qmux.clone(), interest));
        }
        CbqSnapshot {
            size,
            remaining,
            operational: true,
        }
    }

    /// Post-wait snapshot (spec.md §4.3 step 4): refreshes the snapshot
    /// and unconditionally erases any observer binding.
    pub(crate) fn post_wait_snapshot(&self) -> CbqSnapshot {
        let mut guard = self.lock();
        guard.rebase();
        guard.observer = None;
        if !guard.operational {
            return CbqSnapshot {
                size: 0,
                remaining: 0,
                operational: false,
            };
        }
        CbqSnapshot {
            size: guard.count,
            remaining: guard.capacity - guard.count,
            operational: true,
        }
    }
}

impl<T: Send> Clone for Cbq<T> {
    fn clone(&self) -> Cbq<T> {
        Cbq {
            inner: self.inner.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;
    use std::thread;
    use std::time::Duration;

    fn cbq<T: Send>(capacity: usize) -> Cbq<T> {
        Cbq::new(QueueConfig::new(capacity)).unwrap()
    }

    #[test]
    fn s1_put_get_roundtrip_and_full_timeout() {
        let q: Cbq<i32> = cbq(4);
        for v in [1, 2, 3, 4] {
            q.put(v, Timeout::NonBlocking).unwrap();
        }
        assert_eq!(q.put(5, Timeout::NonBlocking), Err(QueueError::TimedOut));

        let mut out = VecDeque::new();
        let n = q.get_n(&mut out, 10, 1, Timeout::NonBlocking).unwrap();
        assert_eq!(n, 4);
        assert_eq!(out, VecDeque::from(vec![1, 2, 3, 4]));

        q.put(5, Timeout::NonBlocking).unwrap();
        assert_eq!(q.get(Timeout::NonBlocking).unwrap(), 5);
    }

    #[test]
    fn s2_shutdown_races_blocked_get_n() {
        let disposed = Arc::new(Mutex::new(0));
        let disposed2 = disposed.clone();
        let q: Cbq<i32> = Cbq::new(
            QueueConfig::new(1).with_disposer(Arc::new(move |_v: i32| {
                *disposed2.lock().unwrap() += 1;
            })),
        )
        .unwrap();
        q.put(42, Timeout::NonBlocking).unwrap();

        let q2 = q.clone();
        let (tx, rx) = channel();
        let handle = thread::spawn(move || {
            let mut out = VecDeque::new();
            let res = q2.get_n(&mut out, 2, 2, Timeout::Infinite);
            tx.send(res).unwrap();
        });

        thread::sleep(Duration::from_millis(50));
        q.shutdown(true).unwrap();

        assert_eq!(rx.recv().unwrap(), Err(QueueError::NotOperational));
        handle.join().unwrap();
        assert_eq!(*disposed.lock().unwrap(), 1);
    }

    #[test]
    fn s3_wakeup_barrier_releases_all_waiters() {
        let q: Cbq<i32> = cbq(2);
        let q_a = q.clone();
        let q_b = q.clone();

        let (tx, rx) = channel();
        let tx_b = tx.clone();
        let a = thread::spawn(move || tx.send(q_a.get(Timeout::Infinite)).unwrap());
        let b = thread::spawn(move || tx_b.send(q_b.get(Timeout::Infinite)).unwrap());

        thread::sleep(Duration::from_millis(50));
        let res = q.wakeup(Timeout::Bounded(Duration::from_secs(1)));
        assert_eq!(res, Ok(()));

        assert_eq!(rx.recv().unwrap(), Err(QueueError::WakeupRequested));
        assert_eq!(rx.recv().unwrap(), Err(QueueError::WakeupRequested));
        a.join().unwrap();
        b.join().unwrap();
    }

    #[test]
    fn p3_bounded_under_concurrent_producers() {
        let q: Cbq<i32> = cbq(8);
        let producers: Vec<_> = (0..4)
            .map(|p| {
                let q = q.clone();
                thread::spawn(move || {
                    for i in 0..50 {
                        q.put(p * 1000 + i, Timeout::Infinite).unwrap();
                    }
                })
            })
            .collect();

        let consumer = {
            let q = q.clone();
            thread::spawn(move || {
                let mut received = 0;
                while received < 200 {
                    if let Ok(_v) = q.get(Timeout::Bounded(Duration::from_millis(200))) {
                        received += 1;
                        assert!(q.size().unwrap() <= 8);
                    }
                }
            })
        };

        for p in producers {
            p.join().unwrap();
        }
        consumer.join().unwrap();
        assert_eq!(q.size().unwrap(), 0);
    }

    #[test]
    fn peek_then_get_are_identical() {
        let q: Cbq<i32> = cbq(4);
        for v in [10, 20, 30] {
            q.put(v, Timeout::NonBlocking).unwrap();
        }

        let mut peeked = VecDeque::new();
        q.peek_n(&mut peeked, 3, 1, Timeout::NonBlocking).unwrap();

        let mut gotten = VecDeque::new();
        q.get_n(&mut gotten, 3, 1, Timeout::NonBlocking).unwrap();

        assert_eq!(peeked, gotten);
        assert_eq!(q.size().unwrap(), 0);
    }

    #[test]
    fn shutdown_is_terminal_and_idempotent() {
        let q: Cbq<i32> = cbq(2);
        q.shutdown(true).unwrap();
        assert!(!q.is_operational());
        assert_eq!(q.put(1, Timeout::NonBlocking), Err(QueueError::NotOperational));
        assert_eq!(q.get(Timeout::NonBlocking), Err(QueueError::NotOperational));
        assert_eq!(q.shutdown(true), Ok(()));
    }

    #[test]
    fn zero_capacity_is_invalid() {
        let err = Cbq::<i32>::new(QueueConfig::new(0)).unwrap_err();
        assert_eq!(err, QueueError::InvalidArgs);
    }
}
