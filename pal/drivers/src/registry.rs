//! Peripheral registry for interrupt dispatch
//!
//! Interrupt vectors only know their line number. Drivers register their
//! instance against that line at initialization and the handler looks it
//! up here to reach the right receiver or bus.

use core::cell::RefCell;

use critical_section::Mutex;
use log::{debug, warn};
use pal_core::{PalError, PalResult};

/// Fixed table of driver instances indexed by interrupt line.
pub struct PeripheralRegistry<T: ?Sized + Sync + 'static, const N: usize> {
    lines: Mutex<RefCell<[Option<&'static T>; N]>>,
}

impl<T: ?Sized + Sync + 'static, const N: usize> PeripheralRegistry<T, N> {
    /// Create an empty registry
    pub const fn new() -> Self {
        Self {
            lines: Mutex::new(RefCell::new([None; N])),
        }
    }

    /// Number of interrupt lines the registry covers
    pub const fn lines(&self) -> usize {
        N
    }

    /// Register `instance` on `line`.
    ///
    /// Returns an error if the line is out of range or already taken.
    pub fn register(&self, line: usize, instance: &'static T) -> PalResult<()> {
        critical_section::with(|cs| {
            let mut lines = self.lines.borrow_ref_mut(cs);
            let slot = lines.get_mut(line).ok_or(PalError::InvalidParameter)?;
            if slot.is_some() {
                return Err(PalError::Busy);
            }
            *slot = Some(instance);
            Ok(())
        })?;
        debug!("peripheral registered on line {}", line);
        Ok(())
    }

    /// Remove whatever is registered on `line`.
    pub fn unregister(&self, line: usize) -> PalResult<()> {
        critical_section::with(|cs| {
            let mut lines = self.lines.borrow_ref_mut(cs);
            let slot = lines.get_mut(line).ok_or(PalError::InvalidParameter)?;
            *slot = None;
            Ok(())
        })
    }

    /// Get the instance on `line`
    pub fn get(&self, line: usize) -> Option<&'static T> {
        critical_section::with(|cs| self.lines.borrow_ref(cs).get(line).copied().flatten())
    }

    /// Number of occupied lines
    pub fn registered(&self) -> usize {
        critical_section::with(|cs| self.lines.borrow_ref(cs).iter().flatten().count())
    }

    /// Run `f` on the instance registered on `line`.
    ///
    /// Called from the interrupt handler. The lookup is the only part done
    /// inside the critical section. Returns `None` for an empty line.
    pub fn dispatch<R>(&self, line: usize, f: impl FnOnce(&'static T) -> R) -> Option<R> {
        match self.get(line) {
            Some(instance) => Some(f(instance)),
            None => {
                warn!("interrupt on line {} with no peripheral registered", line);
                None
            }
        }
    }
}

impl<T: ?Sized + Sync + 'static, const N: usize> Default for PeripheralRegistry<T, N> {
    fn default() -> Self {
        Self::new()
    }
}
