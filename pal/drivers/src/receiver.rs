//! Interrupt-fed UART receiver with delimiter framing.
//!
//! The UART interrupt pushes bytes one at a time into a
//! [`FramedByteBuffer`]; tasks pull complete frames out with
//! [`BufferedReceiver::await_delimiter`] and [`BufferedReceiver::drain`].
//!
//! ```text
//!          start_receiving            buffer filled
//!   Idle ------------------> Receiving ------------> Full
//!    ^                        |   ^                   |
//!    |  byte or on_stopped    |   |      drain        |
//!    +------- Stopping <------+   +-------------------+
//!                       stop
//! ```
//!
//! Interrupt-side entry points never take a lock: they bump buffer indices,
//! compare-and-swap the state, and release at most one waiter.

use core::fmt;
use core::sync::atomic::{fence, AtomicBool, AtomicU16, AtomicU32, AtomicU8, Ordering};

use log::{debug, error, trace, warn};
use pal_core::{Deadline, Kernel, PalError, PalResult, Timeout};
use pal_sync::{Mutex, ScopedLock, Signal};

use crate::buffer::FramedByteBuffer;
use crate::uart::{SerialPort, UartConfig};
use crate::DEFAULT_BUFFER_SIZE;

/// No delimiter wait pending
const NO_TARGET: u16 = u16::MAX;

/// Receiver state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReceiverState {
    /// No receive armed
    Idle = 0,
    /// One single-byte receive is always armed
    Receiving = 1,
    /// Buffer is full; nothing armed until drained
    Full = 2,
    /// Stop requested; waiting for the interrupt layer to observe it
    Stopping = 3,
}

impl ReceiverState {
    const fn from_raw(raw: u8) -> Self {
        match raw {
            1 => ReceiverState::Receiving,
            2 => ReceiverState::Full,
            3 => ReceiverState::Stopping,
            _ => ReceiverState::Idle,
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ReceiverState {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            ReceiverState::Idle => defmt::write!(fmt, "Idle"),
            ReceiverState::Receiving => defmt::write!(fmt, "Receiving"),
            ReceiverState::Full => defmt::write!(fmt, "Full"),
            ReceiverState::Stopping => defmt::write!(fmt, "Stopping"),
        }
    }
}

/// Buffered, delimiter-framed UART receiver and serialized transmitter.
pub struct BufferedReceiver<K: Kernel, P: SerialPort, const N: usize = DEFAULT_BUFFER_SIZE> {
    port: P,
    buffer: FramedByteBuffer<N>,
    state: AtomicU8,
    target: AtomicU16,
    rx_lock: Mutex<K>,
    rx_signal: Signal<K>,
    rx_fault: AtomicBool,
    tx_lock: Mutex<K>,
    tx_signal: Signal<K>,
    tx_fault: AtomicBool,
    overruns: AtomicU32,
}

impl<K: Kernel, P: SerialPort, const N: usize> BufferedReceiver<K, P, N> {
    /// Create an idle receiver around `port`
    pub const fn new(port: P) -> Self {
        Self {
            port,
            buffer: FramedByteBuffer::new(),
            state: AtomicU8::new(ReceiverState::Idle as u8),
            target: AtomicU16::new(NO_TARGET),
            rx_lock: Mutex::new(),
            rx_signal: Signal::new(),
            rx_fault: AtomicBool::new(false),
            tx_lock: Mutex::new(),
            tx_signal: Signal::new(),
            tx_fault: AtomicBool::new(false),
            overruns: AtomicU32::new(0),
        }
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn state(&self) -> ReceiverState {
        ReceiverState::from_raw(self.state.load(Ordering::Acquire))
    }

    /// Bytes buffered and not yet drained
    pub fn available(&self) -> usize {
        self.buffer.len()
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Returns true while a task is blocked in [`await_delimiter`](Self::await_delimiter).
    pub fn is_waiting(&self) -> bool {
        self.rx_signal.is_full()
    }

    /// Bytes the interrupt layer delivered with nowhere to put them
    pub fn overruns(&self) -> u32 {
        self.overruns.load(Ordering::Relaxed)
    }

    /// Apply new line settings.
    ///
    /// Only allowed while idle with no transmit in flight; fails with
    /// [`PalError::Busy`] otherwise.
    pub fn configure(&self, config: &UartConfig) -> PalResult<()> {
        let _rx = self.rx_lock.lock_scoped()?;
        let _tx = ScopedLock::try_new(&self.tx_lock, Timeout::NO_WAIT)
            .map_err(|_| PalError::Busy)?;
        if self.state() != ReceiverState::Idle {
            return Err(PalError::Busy);
        }

        self.port.configure(config).map_err(|err| {
            error!("uart configure failed: {}", err);
            PalError::HardwareFailure
        })?;
        debug!("uart configured for {} baud", config.baud_rate);
        Ok(())
    }

    /// Arm interrupt-driven reception.
    ///
    /// Fails with [`PalError::Full`] if the buffer has no free space,
    /// [`PalError::Busy`] unless idle, and [`PalError::HardwareFailure`] if
    /// the port refuses the request.
    pub fn start_receiving(&self) -> PalResult<()> {
        let _lock = self.rx_lock.lock_scoped()?;
        if self.buffer.is_full() {
            return Err(PalError::Full);
        }
        self.transition(ReceiverState::Idle, ReceiverState::Receiving)
            .map_err(|_| PalError::Busy)?;
        self.rx_fault.store(false, Ordering::Release);

        if let Err(err) = self.port.request_receive() {
            error!("uart receive request failed: {}", err);
            self.state.store(ReceiverState::Idle as u8, Ordering::Release);
            return Err(PalError::HardwareFailure);
        }
        debug!("uart receiving");
        Ok(())
    }

    /// Request that reception stop.
    ///
    /// A receive already armed cannot be cancelled, so the receiver moves to
    /// `Stopping` and becomes `Idle` when the interrupt layer next reports a
    /// byte or calls [`on_stopped`](Self::on_stopped). A full receiver has
    /// nothing armed and stops at once. Either way, a task blocked in
    /// [`await_delimiter`](Self::await_delimiter) is released with
    /// [`PalError::Stopped`].
    pub fn stop(&self) {
        if self
            .transition(ReceiverState::Receiving, ReceiverState::Stopping)
            .is_ok()
        {
            debug!("uart stop requested");
        } else if self
            .transition(ReceiverState::Full, ReceiverState::Idle)
            .is_ok()
        {
            debug!("uart stopped while full");
            self.rx_signal.unblock();
        }
    }

    /// Block until a frame ending in `delimiter` is buffered.
    ///
    /// Returns the frame length, delimiter included. Returns at once when
    /// such a frame is already buffered. Only one task may wait at a time;
    /// a second caller gets [`PalError::AlreadyWaiting`]. A wait that can no
    /// longer be satisfied ends with [`PalError::Stopped`] (receiver
    /// stopped), [`PalError::Full`] (buffer filled without a delimiter) or
    /// [`PalError::HardwareFailure`].
    pub fn await_delimiter(&self, delimiter: u8, timeout: Timeout) -> PalResult<usize> {
        if self.rx_signal.is_full() {
            return Err(PalError::AlreadyWaiting);
        }

        let deadline = Deadline::new(K::now_ms(), timeout);
        loop {
            {
                let _lock = self.rx_lock.lock_scoped()?;
                if let Some(outcome) = self.settle(delimiter) {
                    return outcome;
                }
            }

            let armed = self
                .rx_signal
                .arm()
                .map_err(|_| PalError::AlreadyWaiting)?;
            self.target.store(u16::from(delimiter), Ordering::Relaxed);
            // Pairs with the fence in `store_byte`: either the interrupt sees
            // the target or the rescan below sees its byte.
            fence(Ordering::SeqCst);

            // An armed task must not queue on `rx_lock`; rescan without it.
            if let Some(outcome) = self.settle(delimiter) {
                self.clear_target();
                armed.cancel();
                return outcome;
            }

            let woken = armed.wait(deadline.remaining(K::now_ms()));
            self.clear_target();
            woken?;
            trace!("delimiter waiter woken");
        }
    }

    /// Move up to `dst.len()` buffered bytes into `dst`.
    ///
    /// Draining a full receiver frees space and re-arms reception.
    pub fn drain(&self, dst: &mut [u8]) -> PalResult<usize> {
        let _lock = self.rx_lock.lock_scoped()?;
        let count = self.buffer.drain(dst);

        if count > 0
            && self
                .transition(ReceiverState::Full, ReceiverState::Receiving)
                .is_ok()
        {
            match self.port.request_receive() {
                Ok(()) => debug!("uart receive re-armed after drain"),
                // The drained bytes are already in `dst`; report the fault
                // through the next wait instead. Nobody waits while full.
                Err(err) => self.record_receive_fault(err),
            }
        }
        Ok(count)
    }

    /// Send `data`, blocking until the hardware reports completion.
    ///
    /// Transmits never interleave; concurrent callers queue on the transmit
    /// lock. Reception is unaffected.
    pub fn transmit(&self, data: &[u8]) -> PalResult<()> {
        if data.is_empty() {
            return Ok(());
        }

        let _lock = self.tx_lock.lock_scoped()?;
        let armed = self.tx_signal.arm().map_err(|_| PalError::Busy)?;
        self.tx_fault.store(false, Ordering::Release);

        if let Err(err) = self.port.request_transmit(data) {
            error!("uart transmit request failed: {}", err);
            armed.cancel();
            return Err(PalError::HardwareFailure);
        }
        armed.wait(Timeout::Forever)?;

        if self.tx_fault.swap(false, Ordering::AcqRel) {
            return Err(PalError::HardwareFailure);
        }
        trace!("uart transmitted {} bytes", data.len());
        Ok(())
    }

    /// Receive-complete interrupt entry point.
    pub fn on_byte_received(&self, byte: u8) {
        match self.state() {
            ReceiverState::Receiving | ReceiverState::Stopping => self.store_byte(byte),
            state => {
                self.overruns.fetch_add(1, Ordering::Relaxed);
                warn!("uart byte {:#04x} dropped while {:?}", byte, state);
            }
        }
    }

    /// Timer-tick entry point completing a pending [`stop`](Self::stop)
    /// when no further byte arrives.
    pub fn on_stopped(&self) {
        self.finish_stop();
    }

    /// Transmit-complete interrupt entry point.
    pub fn on_transmit_complete(&self) {
        if !self.tx_signal.unblock_from_isr() {
            warn!("uart transmit completion with no transmitter");
        }
    }

    /// Transmit error interrupt entry point.
    pub fn on_transmit_error(&self) {
        error!("uart transmit error");
        self.tx_fault.store(true, Ordering::Release);
        self.tx_signal.unblock_from_isr();
    }

    /// Receive error interrupt entry point. Reception stops; a pending wait
    /// ends with [`PalError::HardwareFailure`].
    pub fn on_receive_error(&self) {
        error!("uart receive error");
        self.rx_fault.store(true, Ordering::Release);
        self.state.store(ReceiverState::Idle as u8, Ordering::Release);
        self.rx_signal.unblock_from_isr();
    }

    fn store_byte(&self, byte: u8) {
        let stored = self.buffer.push_byte(byte);
        if !stored {
            self.overruns.fetch_add(1, Ordering::Relaxed);
            warn!("uart byte {:#04x} dropped, buffer full", byte);
        }

        fence(Ordering::SeqCst);
        let mut wake = stored && self.target.load(Ordering::Relaxed) == u16::from(byte);

        // Never arm a receive with nowhere to put the byte.
        let next = if self.buffer.is_full() {
            ReceiverState::Full
        } else {
            ReceiverState::Receiving
        };
        if self.transition(ReceiverState::Receiving, next).is_err() {
            // A stop was requested while this byte was in flight.
            self.finish_stop();
            return;
        }

        if next == ReceiverState::Full {
            debug!("uart buffer full, reception paused");
            // A waiter without its delimiter can no longer be satisfied.
            wake = true;
        } else if let Err(err) = self.port.request_receive() {
            self.record_receive_fault(err);
            wake = true;
        }

        if wake {
            self.rx_signal.unblock_from_isr();
        }
    }

    fn finish_stop(&self) {
        if self
            .transition(ReceiverState::Stopping, ReceiverState::Idle)
            .is_ok()
        {
            debug!("uart stopped");
            self.rx_signal.unblock_from_isr();
        }
    }

    fn record_receive_fault(&self, err: PalError) {
        error!("uart receive re-arm failed: {}", err);
        self.rx_fault.store(true, Ordering::Release);
        self.state.store(ReceiverState::Idle as u8, Ordering::Release);
    }

    /// Decide a delimiter wait without blocking; `None` means keep waiting.
    fn settle(&self, delimiter: u8) -> Option<PalResult<usize>> {
        if let Some(len) = self.buffer.find_delimiter(delimiter) {
            return Some(Ok(len));
        }
        if self.rx_fault.load(Ordering::Acquire) {
            return Some(Err(PalError::HardwareFailure));
        }
        match self.state() {
            ReceiverState::Receiving => None,
            ReceiverState::Full => Some(Err(PalError::Full)),
            ReceiverState::Idle | ReceiverState::Stopping => Some(Err(PalError::Stopped)),
        }
    }

    fn clear_target(&self) {
        self.target.store(NO_TARGET, Ordering::Relaxed);
    }

    fn transition(&self, from: ReceiverState, to: ReceiverState) -> Result<(), ReceiverState> {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(ReceiverState::from_raw)
    }
}

impl<K: Kernel, P: SerialPort, const N: usize> fmt::Debug for BufferedReceiver<K, P, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferedReceiver")
            .field("state", &self.state())
            .field("buffer", &self.buffer)
            .field("waiting", &self.is_waiting())
            .field("overruns", &self.overruns())
            .finish()
    }
}
