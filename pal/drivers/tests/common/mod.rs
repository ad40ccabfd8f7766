//! Mock hardware shared by the driver integration tests

#![allow(dead_code)]

use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use pal_core::{PalError, PalResult};
use pal_drivers::{SerialPort, TransferPort, UartConfig};
use parking_lot::Mutex;

/// Poll `condition` until it holds, panicking after two seconds.
pub fn wait_for(what: &str, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        thread::sleep(Duration::from_millis(1));
    }
}

/// UART that records requests; the test thread plays its interrupt.
#[derive(Default)]
pub struct MockSerial {
    pub receives: AtomicUsize,
    pub transmits: AtomicUsize,
    pub refuse_receive: AtomicBool,
    pub refuse_transmit: AtomicBool,
    pub sent: Mutex<Vec<u8>>,
    pub config: Mutex<Option<UartConfig>>,
}

impl MockSerial {
    pub fn receives(&self) -> usize {
        self.receives.load(Ordering::SeqCst)
    }

    pub fn transmits(&self) -> usize {
        self.transmits.load(Ordering::SeqCst)
    }
}

impl SerialPort for MockSerial {
    fn configure(&self, config: &UartConfig) -> PalResult<()> {
        *self.config.lock() = Some(config.clone());
        Ok(())
    }

    fn request_receive(&self) -> PalResult<()> {
        if self.refuse_receive.load(Ordering::SeqCst) {
            return Err(PalError::HardwareFailure);
        }
        self.receives.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn request_transmit(&self, data: &[u8]) -> PalResult<()> {
        if self.refuse_transmit.load(Ordering::SeqCst) {
            return Err(PalError::HardwareFailure);
        }
        self.sent.lock().extend_from_slice(data);
        self.transmits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Bus that records requests and serves a canned read response.
pub struct MockBus<T, C> {
    pub requests: AtomicUsize,
    pub refuse: AtomicBool,
    pub response: Mutex<Vec<u8>>,
    pub reads: Mutex<Vec<(T, usize)>>,
    pub writes: Mutex<Vec<(T, Vec<u8>)>>,
    pub config: Mutex<Option<C>>,
}

impl<T, C> Default for MockBus<T, C> {
    fn default() -> Self {
        Self {
            requests: AtomicUsize::new(0),
            refuse: AtomicBool::new(false),
            response: Mutex::new(Vec::new()),
            reads: Mutex::new(Vec::new()),
            writes: Mutex::new(Vec::new()),
            config: Mutex::new(None),
        }
    }
}

impl<T, C> MockBus<T, C> {
    pub fn with_response(response: &[u8]) -> Self {
        let bus = Self::default();
        *bus.response.lock() = response.to_vec();
        bus
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl<T: Copy + Debug, C: Clone> TransferPort for MockBus<T, C> {
    type Target = T;
    type Config = C;

    fn configure(&self, config: &C) -> PalResult<()> {
        *self.config.lock() = Some(config.clone());
        Ok(())
    }

    fn request_read(&self, target: T, len: usize) -> PalResult<()> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(PalError::HardwareFailure);
        }
        self.reads.lock().push((target, len));
        self.requests.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn finish_read(&self, dest: &mut [u8]) -> PalResult<()> {
        let response = self.response.lock();
        let count = dest.len().min(response.len());
        dest[..count].copy_from_slice(&response[..count]);
        Ok(())
    }

    fn request_write(&self, target: T, data: &[u8]) -> PalResult<()> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(PalError::HardwareFailure);
        }
        self.writes.lock().push((target, data.to_vec()));
        self.requests.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
