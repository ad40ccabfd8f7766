//! Timeouts for blocking calls

use core::fmt;

/// How long a blocking call may suspend the calling task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Block until the operation completes
    Forever,
    /// Block for at most this many milliseconds; zero polls without suspending
    Millis(u32),
}

impl Timeout {
    /// Poll without suspending
    pub const NO_WAIT: Self = Self::Millis(0);

    /// Create a timeout from milliseconds
    pub const fn from_millis(millis: u32) -> Self {
        Self::Millis(millis)
    }

    /// Create a timeout from seconds
    pub const fn from_secs(secs: u32) -> Self {
        Self::Millis(secs.saturating_mul(1000))
    }

    /// Check if this timeout never expires
    pub const fn is_forever(&self) -> bool {
        matches!(self, Self::Forever)
    }

    /// Check if this timeout polls without suspending
    pub const fn is_no_wait(&self) -> bool {
        matches!(self, Self::Millis(0))
    }

    /// Milliseconds to wait, or `None` for [`Timeout::Forever`]
    pub const fn as_millis(&self) -> Option<u32> {
        match self {
            Self::Forever => None,
            Self::Millis(ms) => Some(*ms),
        }
    }
}

impl Default for Timeout {
    fn default() -> Self {
        Self::Forever
    }
}

impl From<u32> for Timeout {
    fn from(millis: u32) -> Self {
        Self::Millis(millis)
    }
}

impl fmt::Display for Timeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Forever => write!(f, "forever"),
            Self::Millis(ms) => write!(f, "{}ms", ms),
        }
    }
}

/// A [`Timeout`] pinned to the moment it started.
///
/// Blocking calls that wait more than once (a retry after a spurious wake,
/// say) take their budget from [`Deadline::remaining`] so the total stays
/// within the caller's timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    start: u32,
    timeout: Timeout,
}

impl Deadline {
    /// Start `timeout` at millisecond tick `now`
    pub const fn new(now: u32, timeout: Timeout) -> Self {
        Self {
            start: now,
            timeout,
        }
    }

    /// What is left of the budget at tick `now`
    pub const fn remaining(&self, now: u32) -> Timeout {
        match self.timeout {
            Timeout::Forever => Timeout::Forever,
            Timeout::Millis(ms) => {
                let elapsed = now.wrapping_sub(self.start);
                Timeout::Millis(ms.saturating_sub(elapsed))
            }
        }
    }

    pub const fn is_expired(&self, now: u32) -> bool {
        self.remaining(now).is_no_wait()
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Timeout {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Self::Forever => defmt::write!(fmt, "forever"),
            Self::Millis(ms) => defmt::write!(fmt, "{}ms", ms),
        }
    }
}
