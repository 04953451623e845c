use std::ops::BitOr;

const READABLE: u8 = 0b01;
const WRITABLE: u8 = 0b10;

/// A set of readiness interests: readable, writable, or both.
///
/// Mirrors the `Ready` bitset the teacher crate uses for its `Evented`
/// readiness, scoped down to the two operations a [`crate::cbq::Cbq`]
/// can ever be interested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interest(u8);

impl Interest {
    pub fn readable() -> Interest {
        Interest(READABLE)
    }

    pub fn writable() -> Interest {
        Interest(WRITABLE)
    }

    pub fn readable_writable() -> Interest {
        Interest(READABLE | WRITABLE)
    }

    pub fn none() -> Interest {
        Interest(0)
    }

    pub fn is_readable(self) -> bool {
        self.0 & READABLE != 0
    }

    pub fn is_writable(self) -> bool {
        self.0 & WRITABLE != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Intersection: the subset of `self` also present in `other`.
    pub fn intersect(self, other: Interest) -> Interest {
        Interest(self.0 & other.0)
    }
}

impl BitOr for Interest {
    type Output = Interest;

    fn bitor(self, rhs: Interest) -> Interest {
        Interest(self.0 | rhs.0)
    }
}

impl Default for Interest {
    fn default() -> Interest {
        Interest::none()
    }
}
