//! One-in-flight asynchronous transfers over a shared bus peripheral.
//!
//! [`ExclusiveTransfer`] is the common shape behind the I2C and SPI drivers:
//! a task takes the bus lock, starts a non-blocking hardware request and
//! sleeps on a [`Signal`] until the transfer interrupt reports completion.

use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};

use log::{debug, error, trace, warn};
use pal_core::{Kernel, PalError, PalResult, Timeout};
use pal_sync::{Mutex, ScopedLock, Signal};

/// Interrupt-driven bus hardware, as seen by an [`ExclusiveTransfer`].
///
/// Requests return immediately; completion is reported from the bus
/// interrupt through [`ExclusiveTransfer::on_transfer_complete`] or
/// [`ExclusiveTransfer::on_transfer_error`]. An `Err` means the request was
/// not started and no completion will follow.
pub trait TransferPort {
    /// Addressing carried with every request
    type Target: Copy + fmt::Debug;
    /// Bus settings
    type Config;

    fn configure(&self, config: &Self::Config) -> PalResult<()>;

    /// Start reading `len` bytes from `target`.
    fn request_read(&self, target: Self::Target, len: usize) -> PalResult<()>;

    /// Copy the bytes of the completed read into `dest`.
    fn finish_read(&self, dest: &mut [u8]) -> PalResult<()>;

    /// Start writing `data` to `target`.
    ///
    /// The caller stays blocked until completion, so `data` remains valid
    /// for the whole transfer.
    fn request_write(&self, target: Self::Target, data: &[u8]) -> PalResult<()>;
}

/// Transfer settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferConfig {
    /// How long a caller waits for the completion interrupt
    pub timeout: Timeout,
}

impl TransferConfig {
    pub const fn new() -> Self {
        Self {
            timeout: Timeout::Forever,
        }
    }

    pub const fn with_timeout(mut self, timeout: Timeout) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializes asynchronous transfers on one peripheral.
///
/// At most one request is ever outstanding. A caller arriving while a
/// transfer is in flight is rejected with [`PalError::Busy`] instead of
/// queueing behind it.
pub struct ExclusiveTransfer<K: Kernel, P: TransferPort> {
    port: P,
    config: TransferConfig,
    lock: Mutex<K>,
    signal: Signal<K>,
    fault: AtomicBool,
}

impl<K: Kernel, P: TransferPort> ExclusiveTransfer<K, P> {
    pub const fn new(port: P) -> Self {
        Self::with_config(port, TransferConfig::new())
    }

    pub const fn with_config(port: P, config: TransferConfig) -> Self {
        Self {
            port,
            config,
            lock: Mutex::new(),
            signal: Signal::new(),
            fault: AtomicBool::new(false),
        }
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn config(&self) -> TransferConfig {
        self.config
    }

    /// Returns true while a transfer is waiting for its completion.
    pub fn is_busy(&self) -> bool {
        self.signal.is_full()
    }

    /// Read `dest.len()` bytes from `target`, blocking until complete.
    pub fn read(&self, target: P::Target, dest: &mut [u8]) -> PalResult<()> {
        self.reject_if_busy()?;
        let _lock = self.lock.lock_scoped()?;
        self.exchange(|port| port.request_read(target, dest.len()))?;
        self.port.finish_read(dest)?;
        trace!("read {} bytes from {:?}", dest.len(), target);
        Ok(())
    }

    /// Write `data` to `target`, blocking until complete.
    pub fn write(&self, target: P::Target, data: &[u8]) -> PalResult<()> {
        self.reject_if_busy()?;
        let _lock = self.lock.lock_scoped()?;
        self.exchange(|port| port.request_write(target, data))?;
        trace!("wrote {} bytes to {:?}", data.len(), target);
        Ok(())
    }

    /// Apply new bus settings. Rejected with [`PalError::Busy`] while a
    /// transfer is in flight.
    pub fn configure(&self, config: &P::Config) -> PalResult<()> {
        self.reject_if_busy()?;
        let _lock =
            ScopedLock::try_new(&self.lock, Timeout::NO_WAIT).map_err(|_| PalError::Busy)?;
        self.port.configure(config).map_err(|err| {
            error!("bus configure failed: {}", err);
            PalError::HardwareFailure
        })?;
        debug!("bus configured");
        Ok(())
    }

    /// Transfer-complete interrupt entry point.
    pub fn on_transfer_complete(&self) {
        if !self.signal.unblock_from_isr() {
            warn!("transfer completion with no caller waiting");
        }
    }

    /// Transfer error interrupt entry point. The waiting caller gets
    /// [`PalError::HardwareFailure`].
    pub fn on_transfer_error(&self) {
        error!("transfer error reported by hardware");
        self.fault.store(true, Ordering::Release);
        self.signal.unblock_from_isr();
    }

    fn reject_if_busy(&self) -> PalResult<()> {
        if self.signal.is_full() {
            debug!("transfer rejected, bus busy");
            return Err(PalError::Busy);
        }
        Ok(())
    }

    /// Issue one request and wait for its completion. Caller holds the lock.
    fn exchange<F>(&self, request: F) -> PalResult<()>
    where
        F: FnOnce(&P) -> PalResult<()>,
    {
        // Armed before the request so an early completion cannot be lost.
        let armed = self.signal.arm().map_err(|_| PalError::Busy)?;
        self.fault.store(false, Ordering::Release);

        if let Err(err) = request(&self.port) {
            error!("transfer request failed: {}", err);
            armed.cancel();
            return Err(PalError::HardwareFailure);
        }

        if let Err(err) = armed.wait(self.config.timeout) {
            warn!("transfer gave up waiting: {}", err);
            return Err(err);
        }
        if self.fault.swap(false, Ordering::AcqRel) {
            return Err(PalError::HardwareFailure);
        }
        Ok(())
    }
}

impl<K: Kernel, P: TransferPort> fmt::Debug for ExclusiveTransfer<K, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExclusiveTransfer")
            .field("config", &self.config)
            .field("busy", &self.is_busy())
            .finish()
    }
}
