//! Task identities handed out by the scheduler port

use core::fmt;
use core::num::NonZeroU32;

/// Opaque identity of a schedulable task.
///
/// Handles are never zero, which lets a waiter slot encode "no task" as `0`
/// and exchange the whole slot with a single atomic operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskHandle(NonZeroU32);

impl TaskHandle {
    /// Create a handle from a raw identifier. Returns `None` for zero.
    pub const fn new(raw: u32) -> Option<Self> {
        match NonZeroU32::new(raw) {
            Some(id) => Some(Self(id)),
            None => None,
        }
    }

    /// Get the raw identifier
    pub const fn raw(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for TaskHandle {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "task#{}", self.0.get());
    }
}
