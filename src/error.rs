use std::fmt;

/// Error kinds returned by the queue substrate.
///
/// There is no "ok" variant here on purpose: success is the `Ok` side of
/// [`Result`]. Every failure mode a caller can observe — from a single
/// `put` up through a registry lookup — is one of these seven kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    /// The deadline elapsed before the operation's contract could be met.
    /// For batched operations, whatever was transferred before the
    /// deadline is still visible through the caller's buffer.
    TimedOut,
    /// The queue has been shut down, either before the call started or
    /// while the caller was waiting. Shutdown is terminal: the queue
    /// cannot be revived, only destroyed and recreated.
    NotOperational,
    /// The calling thread was released by an external wakeup barrier
    /// ([`crate::cbq::Cbq::wakeup`]) rather than by satisfying its
    /// contract. The caller decides whether to retry or exit.
    WakeupRequested,
    /// Registry registration clashed with an existing `dpid`.
    AlreadyExists,
    /// Registry lookup/unregister targeted an unknown `dpid`.
    NotFound,
    /// Null/unsized buffers, zero capacity, a poll set containing only
    /// null queues, or an otherwise malformed argument.
    InvalidArgs,
    /// Allocation failed at construction time.
    NoMemory,
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            QueueError::TimedOut => "timed out",
            QueueError::NotOperational => "queue is not operational",
            QueueError::WakeupRequested => "released by external wakeup",
            QueueError::AlreadyExists => "already exists",
            QueueError::NotFound => "not found",
            QueueError::InvalidArgs => "invalid arguments",
            QueueError::NoMemory => "allocation failed",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for QueueError {}

pub type Result<T> = std::result::Result<T, QueueError>;
