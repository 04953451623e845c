//! The agent wait loop and dataplane drain loop (spec.md §4.4): reference
//! consumer loops over a [`crate::registry::BridgeQueueRegistry`], specified
//! alongside the registry because they're the canonical way its snapshot
//! operations are meant to be driven.

use std::collections::VecDeque;
use std::time::Duration;

use log::{trace, warn};

use crate::error::Result;
use crate::qmux::QMux;
use crate::registry::{BridgeQueueRegistry, Role, Side};
use crate::timeout::Timeout;

/// The poll timeout the agent and dataplane loops use by default
/// (spec.md §4.4's `QMUX_TIMEOUT`). Callers are free to pass a different
/// [`Timeout`] to either iteration function.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(250);

/// One iteration of the agent's wait loop: snapshot every registered
/// bridge, reset and poll all three agent-side handles per bridge, then
/// drain whichever queues came back ready (up to each queue's configured
/// max-batch).
///
/// `on_event` is called once per non-empty drain of an `up_q`/`down_q`
/// (distinguished by [`Role`]); `on_packet` once per non-empty drain of a
/// `data_q`. Both callbacks receive the drained batch by reference: after
/// each one returns, every element in the batch is handed to its queue's
/// `dispose` (spec.md's post-consumption free-proc), so a callback that
/// needs to keep an element past its own return must clone it rather than
/// move it out. Returns the number of queues that had anything drained
/// from them this iteration.
pub fn agent_wait_iteration<E, P, FE, FP>(
    registry: &BridgeQueueRegistry<E, P>,
    qmux: &QMux,
    poll_timeout: Timeout,
    mut on_event: FE,
    mut on_packet: FP,
) -> Result<usize>
where
    E: Send,
    P: Send,
    FE: FnMut(u64, Role, &VecDeque<E>),
    FP: FnMut(u64, &VecDeque<P>),
{
    let entries = registry.snapshot_entries(usize::MAX);
    if entries.is_empty() {
        return Ok(0);
    }

    let polls = registry.snapshot_polls(&entries, Side::Agent);
    for p in &polls {
        // spec.md §4.4: "for each p in polls: reset(p)" before every poll.
        p.reset();
    }

    let ready = match qmux.poll(&polls, poll_timeout) {
        Ok(n) => n,
        Err(e) => {
            warn!("agent poll failed: {e}");
            return Err(e);
        }
    };
    if ready == 0 {
        return Ok(0);
    }

    let mut drained = 0;
    for entry in &entries {
        if entry.up_poll.is_readable() {
            let mut buf = VecDeque::new();
            let max = entry.max_batch(Role::Upstream);
            match entry.up_q.get_n(&mut buf, max, 1, Timeout::NonBlocking) {
                Ok(_) if !buf.is_empty() => {
                    drained += 1;
                    on_event(entry.dpid, Role::Upstream, &buf);
                    while let Some(elt) = buf.pop_front() {
                        entry.up_q.dispose(elt);
                    }
                }
                Ok(_) => {}
                Err(e) => warn!("bridge dpid={} up_q drain failed: {e}", entry.dpid),
            }
        }
        if entry.data_poll.is_readable() {
            let mut buf = VecDeque::new();
            let max = entry.max_batch(Role::Data);
            match entry.data_q.get_n(&mut buf, max, 1, Timeout::NonBlocking) {
                Ok(_) if !buf.is_empty() => {
                    drained += 1;
                    on_packet(entry.dpid, &buf);
                    while let Some(elt) = buf.pop_front() {
                        entry.data_q.dispose(elt);
                    }
                }
                Ok(_) => {}
                Err(e) => warn!("bridge dpid={} data_q drain failed: {e}", entry.dpid),
            }
        }
        if entry.down_poll.is_readable() {
            let mut buf = VecDeque::new();
            let max = entry.max_batch(Role::Downstream);
            match entry.down_q.get_n(&mut buf, max, 1, Timeout::NonBlocking) {
                Ok(_) if !buf.is_empty() => {
                    drained += 1;
                    on_event(entry.dpid, Role::Downstream, &buf);
                    while let Some(elt) = buf.pop_front() {
                        entry.down_q.dispose(elt);
                    }
                }
                Ok(_) => {}
                Err(e) => warn!("bridge dpid={} down_q drain failed: {e}", entry.dpid),
            }
        }
        trace!("bridge dpid={} agent drain pass complete", entry.dpid);
    }

    Ok(drained)
}

/// One iteration of the dataplane drain loop: poll only the
/// dataplane-side handle across every registered bridge, and for
/// whichever bridges are ready, drain `down_q` up to its configured
/// max-batch, invoking `dispatch` once per element and then handing that
/// element to `down_q`'s `dispose` (spec.md's post-consumption free-proc),
/// matching the dispatch-then-free order `event_dataq_dequeue` uses.
pub fn dataplane_drain_iteration<E, P, F>(
    registry: &BridgeQueueRegistry<E, P>,
    qmux: &QMux,
    poll_timeout: Timeout,
    mut dispatch: F,
) -> Result<usize>
where
    E: Send,
    P: Send,
    F: FnMut(u64, &E),
{
    let entries = registry.snapshot_entries(usize::MAX);
    if entries.is_empty() {
        return Ok(0);
    }

    let polls = registry.snapshot_polls(&entries, Side::Dataplane);
    let ready = qmux.poll(&polls, poll_timeout)?;
    if ready == 0 {
        return Ok(0);
    }

    let mut dispatched = 0;
    for entry in &entries {
        if !entry.down_poll_dp.is_readable() {
            continue;
        }
        let max = entry.max_batch(Role::Downstream);
        let mut buf = VecDeque::new();
        match entry.down_q.get_n(&mut buf, max, 1, Timeout::NonBlocking) {
            Ok(_) => {
                dispatched += buf.len();
                while let Some(elt) = buf.pop_front() {
                    dispatch(entry.dpid, &elt);
                    entry.down_q.dispose(elt);
                }
            }
            Err(e) => warn!("bridge dpid={} down_q drain failed: {e}", entry.dpid),
        }
    }

    Ok(dispatched)
}
