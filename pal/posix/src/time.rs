//! Periodic tick service
//!
//! Models a hardware timer interrupt on the host: a dedicated thread invokes
//! a callback at a fixed rate, sleeping until absolute deadlines so the rate
//! does not drift. Drivers use the tick to finish work that may only
//! complete from interrupt context, such as a deferred receiver stop.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use pal_core::{PalError, PalResult};

/// Default tick rate in Hz
pub const DEFAULT_TICKS_PER_SEC: u32 = 100;

/// Highest supported tick rate in Hz
pub const MAX_TICKS_PER_SEC: u32 = 10_000;

const NSEC_PER_SEC: u64 = 1_000_000_000;

/// A running periodic tick. Stops when dropped.
pub struct Ticker {
    period: Duration,
    running: Arc<AtomicBool>,
    ticks: Arc<AtomicU64>,
    thread: Option<JoinHandle<()>>,
}

impl Ticker {
    /// Start invoking `on_tick` `rate_hz` times per second.
    ///
    /// Returns [`PalError::InvalidParameter`] for a zero rate or one above
    /// [`MAX_TICKS_PER_SEC`].
    pub fn start<F>(rate_hz: u32, on_tick: F) -> PalResult<Self>
    where
        F: FnMut() + Send + 'static,
    {
        if rate_hz == 0 || rate_hz > MAX_TICKS_PER_SEC {
            return Err(PalError::InvalidParameter);
        }

        let period = Duration::from_nanos(NSEC_PER_SEC / u64::from(rate_hz));
        let running = Arc::new(AtomicBool::new(true));
        let ticks = Arc::new(AtomicU64::new(0));

        let thread = {
            let running = Arc::clone(&running);
            let ticks = Arc::clone(&ticks);
            thread::spawn(move || tick_loop(period, &running, &ticks, on_tick))
        };

        Ok(Self {
            period,
            running,
            ticks,
            thread: Some(thread),
        })
    }

    /// Time between two ticks
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Ticks delivered so far
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    /// Stop the tick thread and wait for it to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn tick_loop<F: FnMut()>(
    period: Duration,
    running: &AtomicBool,
    ticks: &AtomicU64,
    mut on_tick: F,
) {
    let mut next_tick = Instant::now();

    while running.load(Ordering::Acquire) {
        // Advance to the next absolute deadline.
        next_tick += period;

        let now = Instant::now();
        if next_tick > now {
            thread::sleep(next_tick - now);
        }

        if !running.load(Ordering::Acquire) {
            break;
        }
        on_tick();
        ticks.fetch_add(1, Ordering::Release);
    }
}
