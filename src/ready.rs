use std::{fmt, ops};

/// A set of readiness interests.
///
/// `Ready` describes which operations a watch wants to be woken for. Only
/// readable and writable interest exist; error conditions are always watched
/// and reported through the watch's error callback.
///
/// `Ready` values can be combined with the bitwise operators.
///
/// # Examples
///
/// ```
/// use coop_io::Ready;
///
/// let ready = Ready::readable() | Ready::writable();
///
/// assert!(ready.is_readable());
/// assert!(ready.is_writable());
/// ```
#[derive(Copy, PartialEq, Eq, Clone, PartialOrd, Ord)]
pub struct Ready(usize);

const READABLE: usize = 0b01;
const WRITABLE: usize = 0b10;
const READY_ALL: usize = READABLE | WRITABLE;

impl Ready {
    /// Returns the empty `Ready` set.
    pub fn empty() -> Ready {
        Ready(0)
    }

    /// Returns a `Ready` representing readable interest.
    #[inline]
    pub fn readable() -> Ready {
        Ready(READABLE)
    }

    /// Returns a `Ready` representing writable interest.
    #[inline]
    pub fn writable() -> Ready {
        Ready(WRITABLE)
    }

    /// Returns true if `Ready` is the empty set.
    #[inline]
    pub fn is_empty(&self) -> bool {
        *self == Ready::empty()
    }

    /// Returns true if the value includes readable interest.
    #[inline]
    pub fn is_readable(&self) -> bool {
        self.contains(Ready::readable())
    }

    /// Returns true if the value includes writable interest.
    #[inline]
    pub fn is_writable(&self) -> bool {
        self.contains(Ready::writable())
    }

    /// Adds all interest represented by `other` into `self`.
    #[inline]
    pub fn insert(&mut self, other: Ready) {
        self.0 |= other.0;
    }

    /// Removes all interest represented by `other` from `self`.
    #[inline]
    pub fn remove(&mut self, other: Ready) {
        self.0 &= !other.0;
    }

    /// Returns true if `self` is a superset of `other`.
    ///
    /// # Examples
    ///
    /// ```
    /// use coop_io::Ready;
    ///
    /// let readiness = Ready::readable() | Ready::writable();
    ///
    /// assert!(readiness.contains(Ready::readable()));
    /// assert!(!Ready::readable().contains(readiness));
    /// ```
    #[inline]
    pub fn contains(&self, other: Ready) -> bool {
        (*self & other) == other
    }

    pub fn as_usize(&self) -> usize {
        self.0
    }
}

impl ops::BitOr for Ready {
    type Output = Ready;

    #[inline]
    fn bitor(self, other: Ready) -> Ready {
        Ready(self.0 | other.0)
    }
}

impl ops::BitXor for Ready {
    type Output = Ready;

    #[inline]
    fn bitxor(self, other: Ready) -> Ready {
        Ready(self.0 ^ other.0)
    }
}

impl ops::BitAnd for Ready {
    type Output = Ready;

    #[inline]
    fn bitand(self, other: Ready) -> Ready {
        Ready(self.0 & other.0)
    }
}

impl ops::Sub for Ready {
    type Output = Ready;

    #[inline]
    fn sub(self, other: Ready) -> Ready {
        Ready(self.0 & !other.0)
    }
}

impl ops::Not for Ready {
    type Output = Ready;

    #[inline]
    fn not(self) -> Ready {
        Ready(!self.0 & READY_ALL)
    }
}

impl From<usize> for Ready {
    fn from(mask: usize) -> Ready {
        Ready(mask & READY_ALL)
    }
}

impl fmt::Debug for Ready {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        let mut one = false;
        let flags = [
            (Ready::readable(), "Readable"),
            (Ready::writable(), "Writable"),
        ];

        write!(fmt, "Ready {{")?;

        for &(flag, msg) in &flags {
            if self.contains(flag) {
                if one {
                    write!(fmt, " | ")?
                }
                write!(fmt, "{}", msg)?;

                one = true
            }
        }

        write!(fmt, "}}")?;

        Ok(())
    }
}
