//! Single-waiter blocking handoff from interrupt context to a task.
//!
//! A [`Signal`] holds at most one waiting task. The waiter slot is a single
//! `AtomicU32` (`0` = empty, otherwise the raw [`TaskHandle`]), so every
//! transition is one atomic operation:
//!
//! - occupy: `compare_exchange(EMPTY -> task)` in [`Signal::arm`]
//! - wake: `swap(EMPTY)` in [`Signal::unblock_from_isr`]
//! - withdraw on timeout or cancel: `compare_exchange(task -> EMPTY)`
//!
//! When a timeout races a wake, exactly one of the two exchanges succeeds. If
//! the wake wins, its notification is already on its way and the waiter
//! consumes it before returning, so nothing stale is left for the task's next
//! wait and the completion is reported rather than dropped.

use core::fmt;
use core::marker::PhantomData;
use core::sync::atomic::{AtomicU32, Ordering};

use log::trace;
use pal_core::{Deadline, Kernel, PalError, PalResult, TaskHandle, Timeout};

const EMPTY: u32 = 0;

/// Blocks one task until an interrupt handler releases it.
pub struct Signal<K: Kernel> {
    waiter: AtomicU32,
    _kernel: PhantomData<fn() -> K>,
}

impl<K: Kernel> Signal<K> {
    /// Create an empty signal
    pub const fn new() -> Self {
        Self {
            waiter: AtomicU32::new(EMPTY),
            _kernel: PhantomData,
        }
    }

    /// Returns true if a task is currently registered as the waiter.
    pub fn is_full(&self) -> bool {
        self.waiter.load(Ordering::Acquire) != EMPTY
    }

    /// The registered waiter, if any
    pub fn waiter(&self) -> Option<TaskHandle> {
        TaskHandle::new(self.waiter.load(Ordering::Acquire))
    }

    /// Register the calling task as the waiter without suspending it yet.
    ///
    /// Fails with [`PalError::Full`] if another task is registered; the
    /// existing waiter is left untouched. Arm before issuing the hardware
    /// request whose completion will release the signal, then call
    /// [`ArmedSignal::wait`].
    pub fn arm(&self) -> PalResult<ArmedSignal<'_, K>> {
        let task = K::current_task();
        self.waiter
            .compare_exchange(EMPTY, task.raw(), Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| PalError::Full)?;
        trace!("signal armed by {}", task);
        Ok(ArmedSignal {
            signal: self,
            task,
            active: true,
        })
    }

    /// Block the calling task until released or `timeout` elapses.
    pub fn block(&self, timeout: Timeout) -> PalResult<()> {
        self.arm()?.wait(timeout)
    }

    /// Release the waiter from interrupt context.
    ///
    /// A no-op when nobody is waiting, since interrupts can race a timeout.
    /// Returns true if a task was released.
    pub fn unblock_from_isr(&self) -> bool {
        match TaskHandle::new(self.waiter.swap(EMPTY, Ordering::AcqRel)) {
            Some(task) => {
                let higher_priority_woken = K::notify_from_isr(task);
                K::yield_from_isr(higher_priority_woken);
                true
            }
            None => false,
        }
    }

    /// Release the waiter from task context.
    pub fn unblock(&self) -> bool {
        match TaskHandle::new(self.waiter.swap(EMPTY, Ordering::AcqRel)) {
            Some(task) => {
                K::notify(task);
                true
            }
            None => false,
        }
    }

    fn withdraw(&self, task: TaskHandle) -> bool {
        self.waiter
            .compare_exchange(task.raw(), EMPTY, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl<K: Kernel> Default for Signal<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Kernel> fmt::Debug for Signal<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("waiter", &self.waiter())
            .finish()
    }
}

/// A registered, not yet suspended waiter.
///
/// Dropping the token without calling [`wait`](Self::wait) cancels it.
#[must_use = "an armed signal is cancelled when dropped"]
pub struct ArmedSignal<'a, K: Kernel> {
    signal: &'a Signal<K>,
    task: TaskHandle,
    active: bool,
}

impl<K: Kernel> ArmedSignal<'_, K> {
    /// The task registered in the slot
    pub fn task(&self) -> TaskHandle {
        self.task
    }

    /// Suspend until released or `timeout` elapses.
    ///
    /// Returns [`PalError::TimedOut`] only if the timeout withdrew the waiter
    /// before any wake; a wake that won the race is reported as success. A
    /// notification that arrives while this task still occupies the slot did
    /// not come from the signal and is discarded.
    pub fn wait(mut self, timeout: Timeout) -> PalResult<()> {
        self.active = false;
        let deadline = Deadline::new(K::now_ms(), timeout);
        loop {
            if K::wait_notification(deadline.remaining(K::now_ms())) {
                if !self.is_registered() {
                    return Ok(());
                }
                trace!("signal waiter {} ignored a stray notification", self.task);
                continue;
            }
            if self.signal.withdraw(self.task) {
                trace!("signal wait by {} timed out", self.task);
                return Err(PalError::TimedOut);
            }
            // The waker emptied the slot first; its notification is in flight.
            K::wait_notification(Timeout::Forever);
            return Ok(());
        }
    }

    fn is_registered(&self) -> bool {
        self.signal.waiter.load(Ordering::Acquire) == self.task.raw()
    }

    /// Withdraw without suspending.
    ///
    /// Returns true if a wake had already been delivered (and was consumed).
    pub fn cancel(mut self) -> bool {
        self.active = false;
        self.disarm()
    }

    fn disarm(&self) -> bool {
        if self.signal.withdraw(self.task) {
            false
        } else {
            K::wait_notification(Timeout::Forever);
            true
        }
    }
}

impl<K: Kernel> Drop for ArmedSignal<'_, K> {
    fn drop(&mut self) {
        if self.active {
            self.disarm();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pal_posix::PosixKernel;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    type TestSignal = Signal<PosixKernel>;

    fn wait_until_full(signal: &TestSignal) {
        for _ in 0..2000 {
            if signal.is_full() {
                return;
            }
            thread::sleep(Duration::from_millis(1));
        }
        panic!("no waiter registered");
    }

    #[test]
    fn unblock_without_waiter_is_noop() {
        let signal = TestSignal::new();
        assert!(!signal.unblock_from_isr());
        assert!(!signal.unblock());
        assert!(!signal.is_full());
    }

    #[test]
    fn arm_occupies_slot_and_cancel_clears_it() {
        let signal = TestSignal::new();
        let armed = signal.arm().unwrap();
        assert!(signal.is_full());
        assert_eq!(signal.waiter(), Some(armed.task()));
        assert!(!armed.cancel());
        assert!(!signal.is_full());
    }

    #[test]
    fn dropping_armed_token_cancels() {
        let signal = TestSignal::new();
        {
            let _armed = signal.arm().unwrap();
            assert!(signal.is_full());
        }
        assert!(!signal.is_full());
    }

    #[test]
    fn cancel_after_wake_consumes_notification() {
        let signal = TestSignal::new();
        let armed = signal.arm().unwrap();
        assert!(signal.unblock_from_isr());
        assert!(armed.cancel());
        // Nothing stale left behind: the next wait times out.
        assert_eq!(signal.block(Timeout::Millis(20)), Err(PalError::TimedOut));
    }

    #[test]
    fn second_waiter_is_rejected_without_disturbing_first() {
        let signal = Arc::new(TestSignal::new());
        let waiter = {
            let signal = Arc::clone(&signal);
            thread::spawn(move || signal.block(Timeout::Forever))
        };
        wait_until_full(&signal);
        let first = signal.waiter();

        assert_eq!(signal.block(Timeout::Millis(10)), Err(PalError::Full));
        assert_eq!(signal.waiter(), first);

        assert!(signal.unblock_from_isr());
        assert_eq!(waiter.join().unwrap(), Ok(()));
        assert!(!signal.is_full());
    }

    #[test]
    fn timeout_clears_slot() {
        let signal = TestSignal::new();
        assert_eq!(signal.block(Timeout::Millis(15)), Err(PalError::TimedOut));
        assert!(!signal.is_full());
        assert!(!signal.unblock_from_isr());
    }

    #[test]
    fn wake_before_wait_is_not_lost() {
        let signal = TestSignal::new();
        let armed = signal.arm().unwrap();
        // Completion arrives between arming and suspending.
        assert!(signal.unblock_from_isr());
        assert_eq!(armed.wait(Timeout::Millis(10)), Ok(()));
    }

    #[test]
    fn stray_notification_does_not_release_waiter() {
        let signal = Arc::new(TestSignal::new());
        let waiter = {
            let signal = Arc::clone(&signal);
            thread::spawn(move || signal.block(Timeout::Forever))
        };
        wait_until_full(&signal);
        let task = signal.waiter().unwrap();

        PosixKernel::notify(task);
        thread::sleep(Duration::from_millis(20));
        assert!(!waiter.is_finished());
        assert_eq!(signal.waiter(), Some(task));

        assert!(signal.unblock_from_isr());
        assert_eq!(waiter.join().unwrap(), Ok(()));
    }

    #[test]
    fn repeated_stray_wakes_keep_the_timeout() {
        let signal = Arc::new(TestSignal::new());
        let waiter = {
            let signal = Arc::clone(&signal);
            thread::spawn(move || {
                let start = std::time::Instant::now();
                (signal.block(Timeout::Millis(60)), start.elapsed())
            })
        };
        wait_until_full(&signal);
        let task = signal.waiter().unwrap();
        // Keeps poking well past the 60 ms budget.
        for _ in 0..15 {
            PosixKernel::notify(task);
            thread::sleep(Duration::from_millis(10));
        }

        let (result, elapsed) = waiter.join().unwrap();
        assert_eq!(result, Err(PalError::TimedOut));
        assert!(elapsed < Duration::from_millis(130), "waited {:?}", elapsed);
    }
}
