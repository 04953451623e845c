//! Bounded concurrent queues and a poll multiplexer for an OpenFlow
//! dataplane: a bounded multi-producer/multi-consumer circular buffer
//! ([`Cbq`]), a multiplexer that waits on many queues at once ([`QMux`]),
//! and a registry grouping three queues per virtual switch for an agent
//! and a dataplane consumer loop ([`BridgeQueueRegistry`]).
//!
//! # Example
//!
//! ```
//! use flow_queue::{Cbq, QueueConfig, Timeout};
//!
//! let q: Cbq<u32> = Cbq::new(QueueConfig::new(4)).unwrap();
//! q.put(1, Timeout::NonBlocking).unwrap();
//! assert_eq!(q.get(Timeout::NonBlocking).unwrap(), 1);
//! ```
//!
//! Everything here runs on plain OS threads synchronised with
//! `Mutex`/`Condvar` — there is no event loop or async runtime in this
//! crate. That's a deliberate fit to the wakeup-barrier contract
//! (external cancellation that waits for every sleeper to acknowledge
//! departure), which doesn't map cleanly onto a lock-free or
//! future-based design.

pub mod cbq;
pub mod config;
pub mod error;
pub mod interest;
pub mod loops;
pub mod poll_handle;
pub mod qmux;
pub mod registry;
pub mod timeout;

pub use cbq::Cbq;
pub use config::{BridgeQueueInfo, Disposer, QueueConfig, QueueLimits};
pub use error::{QueueError, Result};
pub use interest::Interest;
pub use poll_handle::PollHandle;
pub use qmux::{PollSource, QMux};
pub use registry::{BridgeEntry, BridgeEntryHandle, BridgeQueueRegistry, Role, Side};
#[cfg(feature = "stats")]
pub use registry::BridgeQueueStats;
pub use timeout::Timeout;
