use std::sync::Arc;

/// A caller-supplied function invoked on elements discarded by `shutdown`
/// or `clear`, or invoked by a consumer loop after it finishes with an
/// element that owns external resources (the "free-proc" of spec §6).
pub type Disposer<T> = Arc<dyn Fn(T) + Send + Sync>;

/// Construction parameters for a single [`crate::cbq::Cbq`].
///
/// There is no file-backed configuration layer here: the excluded
/// datastore component (spec.md §1/§6) owns persisted config, CLI flags,
/// and env vars. This crate's configuration surface is a plain builder,
/// matching how the teacher crate itself takes constructor arguments
/// directly (`BlockQueue::with_capacity`, `MessagesQueue::with_capacity`)
/// rather than reading a config file.
#[derive(Clone)]
pub struct QueueConfig<T> {
    pub capacity: usize,
    pub disposer: Option<Disposer<T>>,
}

impl<T> QueueConfig<T> {
    pub fn new(capacity: usize) -> QueueConfig<T> {
        QueueConfig {
            capacity,
            disposer: None,
        }
    }

    pub fn with_disposer(mut self, disposer: Disposer<T>) -> QueueConfig<T> {
        self.disposer = Some(disposer);
        self
    }
}

/// Per-role capacity and batching limit for one of a bridge's three queues.
#[derive(Debug, Clone, Copy)]
pub struct QueueLimits {
    pub capacity: usize,
    pub max_batch: usize,
}

impl QueueLimits {
    pub fn new(capacity: usize, max_batch: usize) -> QueueLimits {
        QueueLimits { capacity, max_batch }
    }
}

impl Default for QueueLimits {
    fn default() -> QueueLimits {
        QueueLimits {
            capacity: 256,
            max_batch: 64,
        }
    }
}

/// The three per-role limits a bridge-queue entry is registered with.
#[derive(Debug, Clone, Copy, Default)]
pub struct BridgeQueueInfo {
    pub up: QueueLimits,
    pub data: QueueLimits,
    pub down: QueueLimits,
}
