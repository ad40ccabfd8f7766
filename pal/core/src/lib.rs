#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]

//! # PAL Core
//!
//! Core types shared by every layer of the peripheral access core: the error
//! taxonomy, timeouts, task identities and the [`Kernel`] trait through which
//! the synchronization primitives talk to the underlying RTOS scheduler.
//!
//! Interrupt handlers and tasks share the same [`PalResult`] type, so nothing
//! on the interrupt path ever needs to unwind.

use core::fmt;

pub mod kernel;
pub mod task;
pub mod time;

pub use kernel::*;
pub use task::*;
pub use time::*;

/// PAL core version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Result type used throughout the PAL crates
pub type PalResult<T> = Result<T, PalError>;

/// Error types for PAL operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PalError {
    /// A conflicting operation is already in flight
    Busy,
    /// Buffer or waiter capacity exceeded
    Full,
    /// A blocking call exceeded its budget
    TimedOut,
    /// The receiver was stopped while a wait was pending
    Stopped,
    /// The hardware collaborator reported a failure
    HardwareFailure,
    /// Another task is already waiting on this receiver
    AlreadyWaiting,
    /// Unlock attempted by a task that does not own the mutex
    NotOwner,
    /// Argument out of range
    InvalidParameter,
}

impl PalError {
    /// Whether the caller can retry or back off and try again.
    ///
    /// Only hardware failures are left for the caller to escalate.
    pub const fn is_recoverable(self) -> bool {
        !matches!(self, PalError::HardwareFailure)
    }
}

impl fmt::Display for PalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PalError::Busy => write!(f, "Operation already in flight"),
            PalError::Full => write!(f, "Capacity exceeded"),
            PalError::TimedOut => write!(f, "Operation timed out"),
            PalError::Stopped => write!(f, "Receiver stopped"),
            PalError::HardwareFailure => write!(f, "Hardware failure"),
            PalError::AlreadyWaiting => write!(f, "Another task is already waiting"),
            PalError::NotOwner => write!(f, "Mutex not owned by caller"),
            PalError::InvalidParameter => write!(f, "Invalid parameter"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for PalError {}

#[cfg(feature = "defmt")]
impl defmt::Format for PalError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            PalError::Busy => defmt::write!(fmt, "Busy"),
            PalError::Full => defmt::write!(fmt, "Full"),
            PalError::TimedOut => defmt::write!(fmt, "TimedOut"),
            PalError::Stopped => defmt::write!(fmt, "Stopped"),
            PalError::HardwareFailure => defmt::write!(fmt, "HardwareFailure"),
            PalError::AlreadyWaiting => defmt::write!(fmt, "AlreadyWaiting"),
            PalError::NotOwner => defmt::write!(fmt, "NotOwner"),
            PalError::InvalidParameter => defmt::write!(fmt, "InvalidParameter"),
        }
    }
}

impl embedded_hal::i2c::Error for PalError {
    fn kind(&self) -> embedded_hal::i2c::ErrorKind {
        use embedded_hal::i2c::ErrorKind;
        match self {
            PalError::HardwareFailure => ErrorKind::Bus,
            PalError::Full => ErrorKind::Overrun,
            _ => ErrorKind::Other,
        }
    }
}

impl embedded_hal::spi::Error for PalError {
    fn kind(&self) -> embedded_hal::spi::ErrorKind {
        match self {
            PalError::Full => embedded_hal::spi::ErrorKind::Overrun,
            _ => embedded_hal::spi::ErrorKind::Other,
        }
    }
}
