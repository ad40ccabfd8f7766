//! Scoped acquisition of a [`Mutex`].
//!
//! The guard is the only way driver code touches a mutex: it is released on
//! every exit path, including `?` early returns and unwinding.

use core::marker::PhantomData;

use log::error;
use pal_core::{Kernel, PalResult, Timeout};

use crate::mutex::{Mutex, MAX_WAITERS};

/// Holds a [`Mutex`] for the lifetime of the guard.
///
/// Not `Send`: ownership is tracked per task, so the guard must be dropped by
/// the task that created it.
#[must_use = "the mutex is released as soon as the guard is dropped"]
pub struct ScopedLock<'a, K: Kernel, const W: usize = MAX_WAITERS> {
    mutex: &'a Mutex<K, W>,
    _not_send: PhantomData<*const ()>,
}

impl<'a, K: Kernel, const W: usize> ScopedLock<'a, K, W> {
    /// Block until `mutex` is acquired.
    pub fn new(mutex: &'a Mutex<K, W>) -> PalResult<Self> {
        mutex.lock()?;
        Ok(Self::acquired(mutex))
    }

    /// Block for up to `timeout` until `mutex` is acquired.
    pub fn try_new(mutex: &'a Mutex<K, W>, timeout: Timeout) -> PalResult<Self> {
        mutex.try_lock(timeout)?;
        Ok(Self::acquired(mutex))
    }

    fn acquired(mutex: &'a Mutex<K, W>) -> Self {
        Self {
            mutex,
            _not_send: PhantomData,
        }
    }
}

impl<K: Kernel, const W: usize> Drop for ScopedLock<'_, K, W> {
    fn drop(&mut self) {
        if let Err(e) = self.mutex.unlock() {
            error!("scoped unlock failed: {}", e);
        }
    }
}

impl<K: Kernel, const W: usize> Mutex<K, W> {
    /// Acquire the mutex for the lifetime of the returned guard.
    pub fn lock_scoped(&self) -> PalResult<ScopedLock<'_, K, W>> {
        ScopedLock::new(self)
    }
}
