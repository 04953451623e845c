use std::time::{Duration, Instant};

/// The blocking-call deadline convention used throughout this crate.
///
/// This is the Rust-typed replacement for the signed-nanosecond convention
/// of the original contract (`0` = non-blocking, `< 0` = infinite,
/// `> 0` = bounded): `NonBlocking` maps to `0`, `Infinite` maps to `< 0`,
/// and `Bounded` maps to `> 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Try once, return immediately regardless of outcome.
    NonBlocking,
    /// Wait as long as it takes.
    Infinite,
    /// Wait up to the given duration.
    Bounded(Duration),
}

impl Timeout {
    /// Constructs a deadline clock for this timeout, anchored at `now`.
    pub(crate) fn deadline(self, now: Instant) -> Deadline {
        match self {
            Timeout::NonBlocking => Deadline::Elapsed,
            Timeout::Infinite => Deadline::Never,
            Timeout::Bounded(d) => Deadline::At(now + d),
        }
    }
}

/// An absolute point in time a blocking wait must not exceed, or a sentinel
/// for "never wait" / "wait forever".
#[derive(Debug, Clone, Copy)]
pub(crate) enum Deadline {
    /// Equivalent to a `NonBlocking` timeout: never actually wait.
    Elapsed,
    Never,
    At(Instant),
}

impl Deadline {
    /// Remaining time to wait.
    ///
    /// Returns `Ok(None)` for an infinite deadline (wait with no timeout),
    /// `Ok(Some(d))` for `d` remaining on a bounded deadline, and
    /// `Err(())` once the deadline has passed (including the `Elapsed`
    /// sentinel, which is always already past).
    pub(crate) fn remaining(self, now: Instant) -> Result<Option<Duration>, ()> {
        match self {
            Deadline::Elapsed => Err(()),
            Deadline::Never => Ok(None),
            Deadline::At(at) => match at.checked_duration_since(now) {
                Some(d) if !d.is_zero() => Ok(Some(d)),
                _ => Err(()),
            },
        }
    }
}
