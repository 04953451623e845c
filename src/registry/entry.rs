use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::cbq::Cbq;
use crate::poll_handle::PollHandle;

/// Which of a bridge entry's three queues an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Upstream,
    Data,
    Downstream,
}

/// A bridge's three queues plus their four pre-created poll handles
/// (spec.md §4.4). Owned by the registry; reference-counted because the
/// agent and dataplane consumer loops both take transient snapshots.
pub struct BridgeEntry<E: Send, P: Send> {
    pub dpid: u64,
    pub name: String,
    pub up_q: Cbq<E>,
    pub data_q: Cbq<P>,
    pub down_q: Cbq<E>,
    /// Agent-side poll handle on `up_q`.
    pub up_poll: Arc<PollHandle<E>>,
    /// Agent-side poll handle on `data_q`.
    pub data_poll: Arc<PollHandle<P>>,
    /// Agent-side poll handle on `down_q`.
    pub down_poll: Arc<PollHandle<E>>,
    /// Dataplane-side poll handle on `down_q`.
    pub down_poll_dp: Arc<PollHandle<E>>,
    pub(super) up_batch: AtomicUsize,
    pub(super) data_batch: AtomicUsize,
    pub(super) down_batch: AtomicUsize,
}

impl<E: Send, P: Send> BridgeEntry<E, P> {
    pub fn max_batch(&self, role: Role) -> usize {
        match role {
            Role::Upstream => self.up_batch.load(Ordering::Relaxed),
            Role::Data => self.data_batch.load(Ordering::Relaxed),
            Role::Downstream => self.down_batch.load(Ordering::Relaxed),
        }
    }

    pub(super) fn set_max_batch(&self, role: Role, n: usize) {
        match role {
            Role::Upstream => self.up_batch.store(n, Ordering::Relaxed),
            Role::Data => self.data_batch.store(n, Ordering::Relaxed),
            Role::Downstream => self.down_batch.store(n, Ordering::Relaxed),
        }
    }
}

/// A checked-out reference to a [`BridgeEntry`].
///
/// This is `entry_free`'s Rust-native replacement (spec.md §4.4,
/// §8): `lookup` is the refcount increment, and letting a
/// `BridgeEntryHandle` drop — whether explicitly via [`drop`] or simply
/// by going out of scope — is the refcount decrement. There is
/// deliberately no custom [`Drop`] impl here: the handle is a thin
/// newtype over `Arc<BridgeEntry<E, P>>`, and `Arc`'s own strong-count
/// bookkeeping already *is* the refcount spec.md describes. The registry
/// holds one internal `Arc` clone per live `dpid`; every outstanding
/// `BridgeEntryHandle` is one more, and the underlying entry (including
/// its three CBQs) is only actually freed once the registry has removed
/// its own clone (via `unregister`) *and* every checked-out handle has
/// been dropped.
pub struct BridgeEntryHandle<E: Send, P: Send>(pub(super) Arc<BridgeEntry<E, P>>);

impl<E: Send, P: Send> Clone for BridgeEntryHandle<E, P> {
    fn clone(&self) -> Self {
        BridgeEntryHandle(self.0.clone())
    }
}

impl<E: Send, P: Send> std::ops::Deref for BridgeEntryHandle<E, P> {
    type Target = BridgeEntry<E, P>;

    fn deref(&self) -> &BridgeEntry<E, P> {
        &self.0
    }
}
