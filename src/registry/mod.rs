//! The bridge-queue registry: a process-wide `dpid → bridge entry` map
//! (spec.md §4.4).

mod entry;

pub use entry::{BridgeEntry, BridgeEntryHandle, Role};

use std::sync::atomic::AtomicUsize;
use std::sync::{Arc, RwLock};

use indexmap::IndexMap;
use log::{debug, info, warn};

use crate::cbq::Cbq;
use crate::config::{BridgeQueueInfo, QueueConfig};
use crate::error::{QueueError, Result};
use crate::interest::Interest;
use crate::poll_handle::PollHandle;
use crate::qmux::PollSource;

/// Which side of a bridge entry's poll handles a consumer loop wants
/// (spec.md §4.4's `snapshot_polls(..., side)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// All three agent-side handles (`up`, `data`, `down`) per entry.
    Agent,
    /// Only the dataplane-side handle on `down_q` per entry.
    Dataplane,
}

/// Point-in-time size/remaining-capacity telemetry for one bridge's three queues.
#[cfg(feature = "stats")]
#[derive(Debug, Clone, Copy)]
pub struct BridgeQueueStats {
    pub up_size: usize,
    pub up_remaining: usize,
    pub data_size: usize,
    pub data_remaining: usize,
    pub down_size: usize,
    pub down_remaining: usize,
}

/// Process-wide map from `dpid` to a bridge's three queues, used by the
/// agent wait loop and the dataplane drain loop (spec.md §4.4).
///
/// `IndexMap` gives deterministic iteration order for `snapshot_entries`
/// and `clear_all`, which plain `HashMap` doesn't — useful for
/// reproducible test runs and logs, the same reason the teacher crate's
/// `ttl_cache` module reaches for it.
pub struct BridgeQueueRegistry<E: Send, P: Send> {
    entries: RwLock<IndexMap<u64, Arc<BridgeEntry<E, P>>>>,
}

impl<E: Send, P: Send> BridgeQueueRegistry<E, P> {
    pub fn new() -> BridgeQueueRegistry<E, P> {
        BridgeQueueRegistry {
            entries: RwLock::new(IndexMap::new()),
        }
    }

    /// Creates the three CBQs for `dpid` at the capacities/batch sizes in
    /// `info`, plus the four pre-created poll handles. Fails with
    /// [`QueueError::AlreadyExists`] if `dpid` is already registered.
    pub fn register(&self, dpid: u64, name: impl Into<String>, info: BridgeQueueInfo) -> Result<()> {
        let mut entries = self.entries.write().unwrap();
        if entries.contains_key(&dpid) {
            return Err(QueueError::AlreadyExists);
        }

        let up_q = Cbq::new(QueueConfig::new(info.up.capacity))?;
        let data_q = Cbq::new(QueueConfig::new(info.data.capacity))?;
        let down_q = Cbq::new(QueueConfig::new(info.down.capacity))?;

        let up_poll = Arc::new(PollHandle::new(Some(up_q.clone()), Interest::readable()));
        let data_poll = Arc::new(PollHandle::new(Some(data_q.clone()), Interest::readable()));
        let down_poll = Arc::new(PollHandle::new(Some(down_q.clone()), Interest::readable()));
        let down_poll_dp = Arc::new(PollHandle::new(Some(down_q.clone()), Interest::readable()));

        let name = name.into();
        info!("registering bridge dpid={dpid} name={name}");
        entries.insert(
            dpid,
            Arc::new(BridgeEntry {
                dpid,
                name,
                up_q,
                data_q,
                down_q,
                up_poll,
                data_poll,
                down_poll,
                down_poll_dp,
                up_batch: AtomicUsize::new(info.up.max_batch),
                data_batch: AtomicUsize::new(info.data.max_batch),
                down_batch: AtomicUsize::new(info.down.max_batch),
            }),
        );
        Ok(())
    }

    /// Shuts down all three queues (running their disposers over any
    /// residual elements) and drops the entry from the map. Any
    /// [`BridgeEntryHandle`]s already checked out via `lookup` continue
    /// to work until dropped — see [`BridgeEntryHandle`]'s own docs.
    pub fn unregister(&self, dpid: u64) -> Result<()> {
        let entry = {
            let mut entries = self.entries.write().unwrap();
            entries.shift_remove(&dpid).ok_or(QueueError::NotFound)?
        };
        debug!("unregistering bridge dpid={dpid}, shutting down its queues");
        entry.up_q.shutdown(true)?;
        entry.data_q.shutdown(true)?;
        entry.down_q.shutdown(true)?;
        Ok(())
    }

    /// Checks out a handle to `dpid`'s entry, incrementing its refcount
    /// (see [`BridgeEntryHandle`]).
    pub fn lookup(&self, dpid: u64) -> Result<BridgeEntryHandle<E, P>> {
        let entries = self.entries.read().unwrap();
        entries
            .get(&dpid)
            .cloned()
            .map(BridgeEntryHandle)
            .ok_or(QueueError::NotFound)
    }

    /// Releases a checked-out handle. Provided for parity with spec.md's
    /// named operation; dropping the handle directly has the identical
    /// effect.
    pub fn entry_free(&self, _handle: BridgeEntryHandle<E, P>) {}

    /// Copies up to `max` live entries, each incrementing its refcount.
    /// The agent's wait loop calls this once per iteration to build the
    /// poll set.
    pub fn snapshot_entries(&self, max: usize) -> Vec<BridgeEntryHandle<E, P>> {
        let entries = self.entries.read().unwrap();
        entries.values().take(max).cloned().map(BridgeEntryHandle).collect()
    }

    /// Flattens `entries`' poll handles for the requested `side`: 3 per
    /// entry for [`Side::Agent`], 1 per entry for [`Side::Dataplane`].
    pub fn snapshot_polls<'a>(
        &self,
        entries: &'a [BridgeEntryHandle<E, P>],
        side: Side,
    ) -> Vec<&'a dyn PollSource> {
        match side {
            Side::Agent => entries
                .iter()
                .flat_map(|e| {
                    [
                        &*e.up_poll as &dyn PollSource,
                        &*e.data_poll as &dyn PollSource,
                        &*e.down_poll as &dyn PollSource,
                    ]
                })
                .collect(),
            Side::Dataplane => entries.iter().map(|e| &*e.down_poll_dp as &dyn PollSource).collect(),
        }
    }

    pub fn set_max_batches(&self, dpid: u64, role: Role, n: usize) -> Result<()> {
        let handle = self.lookup(dpid)?;
        handle.set_max_batch(role, n);
        Ok(())
    }

    /// Clears one of `dpid`'s three queues.
    pub fn clear(&self, dpid: u64, role: Role, dispose: bool) -> Result<()> {
        let handle = self.lookup(dpid)?;
        match role {
            Role::Upstream => handle.up_q.clear(dispose),
            Role::Data => handle.data_q.clear(dispose),
            Role::Downstream => handle.down_q.clear(dispose),
        }
    }

    #[cfg(feature = "stats")]
    pub fn stats(&self, dpid: u64) -> Result<BridgeQueueStats> {
        let handle = self.lookup(dpid)?;
        Ok(BridgeQueueStats {
            up_size: handle.up_q.size()?,
            up_remaining: handle.up_q.remaining_capacity()?,
            data_size: handle.data_q.size()?,
            data_remaining: handle.data_q.remaining_capacity()?,
            down_size: handle.down_q.size()?,
            down_remaining: handle.down_q.remaining_capacity()?,
        })
    }

    /// Clears every queue of every registered bridge.
    pub fn clear_all(&self, dispose: bool) {
        let entries = self.entries.read().unwrap();
        for entry in entries.values() {
            let _ = entry.up_q.clear(dispose);
            let _ = entry.data_q.clear(dispose);
            let _ = entry.down_q.clear(dispose);
        }
    }

    /// Shuts down and drops every registered bridge.
    pub fn destroy(&self, dispose: bool) {
        let mut entries = self.entries.write().unwrap();
        warn!("destroying bridge-queue registry ({} entries)", entries.len());
        for (_, entry) in entries.drain(..) {
            let _ = entry.up_q.shutdown(dispose);
            let _ = entry.data_q.shutdown(dispose);
            let _ = entry.down_q.shutdown(dispose);
        }
    }
}

impl<E: Send, P: Send> Default for BridgeQueueRegistry<E, P> {
    fn default() -> Self {
        BridgeQueueRegistry::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueueLimits;
    use crate::timeout::Timeout;

    #[derive(Debug, Clone, PartialEq)]
    struct EventRec(u32);
    #[derive(Debug, Clone, PartialEq)]
    struct PacketRec(u32);

    fn registry() -> BridgeQueueRegistry<EventRec, PacketRec> {
        BridgeQueueRegistry::new()
    }

    fn info(capacity: usize) -> BridgeQueueInfo {
        BridgeQueueInfo {
            up: QueueLimits::new(capacity, capacity),
            data: QueueLimits::new(capacity, capacity),
            down: QueueLimits::new(capacity, capacity),
        }
    }

    #[test]
    fn s6_register_produce_snapshot_drain_unregister() {
        let reg = registry();
        reg.register(1, "br0", info(16)).unwrap();
        assert_eq!(reg.register(1, "br0", info(16)), Err(QueueError::AlreadyExists));

        let handle = reg.lookup(1).unwrap();
        for i in 0..5 {
            handle.up_q.put(EventRec(i), Timeout::NonBlocking).unwrap();
        }
        for i in 0..3 {
            handle.data_q.put(PacketRec(i), Timeout::NonBlocking).unwrap();
        }
        for i in 0..2 {
            handle.down_q.put(EventRec(100 + i), Timeout::NonBlocking).unwrap();
        }

        let entries = reg.snapshot_entries(8);
        assert_eq!(entries.len(), 1);

        assert_eq!(entries[0].up_q.size().unwrap(), 5);
        assert_eq!(entries[0].data_q.size().unwrap(), 3);
        assert_eq!(entries[0].down_q.size().unwrap(), 2);

        reg.unregister(1).unwrap();
        assert!(matches!(reg.lookup(1), Err(QueueError::NotFound)));
        assert!(!handle.up_q.is_operational());
    }

    #[test]
    fn unregister_unknown_dpid_is_not_found() {
        let reg = registry();
        assert_eq!(reg.unregister(42), Err(QueueError::NotFound));
    }
}
