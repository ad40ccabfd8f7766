//! Task-level mutual exclusion with owner tracking.
//!
//! The mutex owns no data; it only serializes access to a critical section
//! that spans blocking calls (a whole peripheral transaction, for example).
//! Bookkeeping lives behind a `critical_section::Mutex`, while waiting is done
//! through the [`Kernel`] notification primitive so contended callers are
//! suspended rather than spinning.
//!
//! Ownership is handed directly to the oldest waiter on unlock, which gives
//! FIFO order independent of the port's wake policy.

use core::cell::RefCell;
use core::fmt;
use core::marker::PhantomData;

use heapless::Deque;
use log::{trace, warn};
use pal_core::{Deadline, Kernel, PalError, PalResult, TaskHandle, Timeout};

/// Default number of tasks that may queue on one mutex
pub const MAX_WAITERS: usize = 8;

struct LockState<const W: usize> {
    owner: Option<TaskHandle>,
    waiters: Deque<TaskHandle, W>,
}

impl<const W: usize> LockState<W> {
    const fn new() -> Self {
        Self {
            owner: None,
            waiters: Deque::new(),
        }
    }

    fn remove_waiter(&mut self, task: TaskHandle) {
        for _ in 0..self.waiters.len() {
            if let Some(waiter) = self.waiters.pop_front() {
                if waiter != task {
                    // Cannot fail: one slot was just freed.
                    let _ = self.waiters.push_back(waiter);
                }
            }
        }
    }
}

/// Mutual exclusion over a critical section, owned by at most one task.
pub struct Mutex<K: Kernel, const W: usize = MAX_WAITERS> {
    state: critical_section::Mutex<RefCell<LockState<W>>>,
    _kernel: PhantomData<fn() -> K>,
}

impl<K: Kernel, const W: usize> Mutex<K, W> {
    /// Create an unlocked mutex
    pub const fn new() -> Self {
        Self {
            state: critical_section::Mutex::new(RefCell::new(LockState::new())),
            _kernel: PhantomData,
        }
    }

    /// Block until the calling task owns the mutex.
    ///
    /// Fails with [`PalError::Busy`] if the caller already owns it and with
    /// [`PalError::Full`] if the waiter queue is exhausted.
    pub fn lock(&self) -> PalResult<()> {
        self.try_lock(Timeout::Forever)
    }

    /// Block for up to `timeout` until the calling task owns the mutex.
    ///
    /// On [`PalError::TimedOut`] the mutex state is exactly as if the call had
    /// never queued.
    pub fn try_lock(&self, timeout: Timeout) -> PalResult<()> {
        let task = K::current_task();
        let queued = critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            match state.owner {
                None => {
                    state.owner = Some(task);
                    Ok(false)
                }
                Some(owner) if owner == task => Err(PalError::Busy),
                Some(_) if timeout.is_no_wait() => Err(PalError::TimedOut),
                Some(_) => state
                    .waiters
                    .push_back(task)
                    .map(|_| true)
                    .map_err(|_| PalError::Full),
            }
        })?;

        if !queued {
            return Ok(());
        }

        trace!("{} waiting for mutex", task);
        let deadline = Deadline::new(K::now_ms(), timeout);
        // Set when a notification meant for another wait of this task (a
        // signal armed before locking) arrives while queued here.
        let mut foreign = false;
        let result = loop {
            let notified = K::wait_notification(deadline.remaining(K::now_ms()));
            let outcome = critical_section::with(|cs| {
                let mut state = self.state.borrow_ref_mut(cs);
                if state.owner == Some(task) {
                    Some(Ok(()))
                } else if notified {
                    None
                } else {
                    state.remove_waiter(task);
                    Some(Err(PalError::TimedOut))
                }
            });

            match outcome {
                Some(Ok(())) => {
                    if !notified {
                        // Unlock picked us just as the timeout fired; take
                        // its notification.
                        K::wait_notification(Timeout::Forever);
                    }
                    break Ok(());
                }
                Some(Err(err)) => break Err(err),
                None => {
                    trace!("{} woken while queued but not the owner", task);
                    foreign = true;
                }
            }
        };

        if foreign {
            // Hand the notification back to whoever waits next.
            K::notify(task);
        }
        result
    }

    /// Release the mutex and hand it to the oldest waiter.
    ///
    /// Returns [`PalError::NotOwner`] if the calling task does not own it.
    pub fn unlock(&self) -> PalResult<()> {
        let task = K::current_task();
        let next = critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            if state.owner != Some(task) {
                return Err(PalError::NotOwner);
            }
            state.owner = state.waiters.pop_front();
            Ok(state.owner)
        })?;

        if let Some(next) = next {
            trace!("mutex handed from {} to {}", task, next);
            K::notify(next);
        }
        Ok(())
    }

    /// Check if the mutex is currently held
    pub fn is_locked(&self) -> bool {
        self.owner().is_some()
    }

    /// The current owner, if any
    pub fn owner(&self) -> Option<TaskHandle> {
        critical_section::with(|cs| self.state.borrow_ref(cs).owner)
    }

    /// Number of tasks queued for ownership
    pub fn waiting(&self) -> usize {
        critical_section::with(|cs| self.state.borrow_ref(cs).waiters.len())
    }
}

impl<K: Kernel, const W: usize> Default for Mutex<K, W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Kernel, const W: usize> Drop for Mutex<K, W> {
    fn drop(&mut self) {
        if let Some(owner) = self.state.get_mut().get_mut().owner {
            warn!("mutex dropped while held by {}", owner);
        }
    }
}

impl<K: Kernel, const W: usize> fmt::Debug for Mutex<K, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mutex")
            .field("owner", &self.owner())
            .field("waiting", &self.waiting())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pal_posix::PosixKernel;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex as StdMutex};
    use std::thread;
    use std::time::Duration;

    type TestMutex = Mutex<PosixKernel>;

    fn wait_for_waiters<const W: usize>(mutex: &Mutex<PosixKernel, W>, count: usize) {
        for _ in 0..2000 {
            if mutex.waiting() == count {
                return;
            }
            thread::sleep(Duration::from_millis(1));
        }
        panic!("expected {} waiters", count);
    }

    #[test]
    fn lock_unlock_tracks_owner() {
        let mutex = TestMutex::new();
        assert!(!mutex.is_locked());

        mutex.lock().unwrap();
        assert_eq!(mutex.owner(), Some(PosixKernel::current_task()));

        mutex.unlock().unwrap();
        assert!(!mutex.is_locked());
    }

    #[test]
    fn relock_by_owner_is_busy() {
        let mutex = TestMutex::new();
        mutex.lock().unwrap();
        assert_eq!(mutex.lock(), Err(PalError::Busy));
        mutex.unlock().unwrap();
    }

    #[test]
    fn unlock_by_non_owner_fails() {
        let mutex = Arc::new(TestMutex::new());
        mutex.lock().unwrap();

        let other = Arc::clone(&mutex);
        let result = thread::spawn(move || other.unlock()).join().unwrap();
        assert_eq!(result, Err(PalError::NotOwner));
        assert!(mutex.is_locked());

        mutex.unlock().unwrap();
    }

    #[test]
    fn unlock_when_free_fails() {
        let mutex = TestMutex::new();
        assert_eq!(mutex.unlock(), Err(PalError::NotOwner));
    }

    #[test]
    fn foreign_notification_does_not_grant_ownership() {
        let mutex = Arc::new(TestMutex::new());
        mutex.lock().unwrap();

        let (task_tx, task_rx) = std::sync::mpsc::channel();
        let contender = {
            let mutex = Arc::clone(&mutex);
            thread::spawn(move || {
                let me = PosixKernel::current_task();
                task_tx.send(me).unwrap();
                mutex.lock().unwrap();
                let owned = mutex.owner() == Some(me);
                mutex.unlock().unwrap();
                (owned, PosixKernel::wait_notification(Timeout::NO_WAIT))
            })
        };
        let task = task_rx.recv().unwrap();
        wait_for_waiters(&mutex, 1);

        // Not a hand-off: the contender must stay queued.
        PosixKernel::notify(task);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(mutex.owner(), Some(PosixKernel::current_task()));
        assert_eq!(mutex.waiting(), 1);

        mutex.unlock().unwrap();
        // Owned after the real hand-off, with the other notification kept.
        assert_eq!(contender.join().unwrap(), (true, true));
        assert!(!mutex.is_locked());
    }

    #[test]
    fn try_lock_times_out_without_leaving_a_waiter() {
        let mutex = Arc::new(TestMutex::new());
        mutex.lock().unwrap();

        let other = Arc::clone(&mutex);
        let result = thread::spawn(move || other.try_lock(Timeout::Millis(20)))
            .join()
            .unwrap();
        assert_eq!(result, Err(PalError::TimedOut));
        assert_eq!(mutex.waiting(), 0);

        mutex.unlock().unwrap();
        assert!(!mutex.is_locked());
    }

    #[test]
    fn no_wait_poll_fails_fast() {
        let mutex = Arc::new(TestMutex::new());
        mutex.lock().unwrap();

        let other = Arc::clone(&mutex);
        let result = thread::spawn(move || other.try_lock(Timeout::NO_WAIT))
            .join()
            .unwrap();
        assert_eq!(result, Err(PalError::TimedOut));
        mutex.unlock().unwrap();
    }

    #[test]
    fn ownership_is_handed_over_in_fifo_order() {
        let mutex = Arc::new(TestMutex::new());
        let order = Arc::new(StdMutex::new(Vec::new()));
        mutex.lock().unwrap();

        let mut handles = Vec::new();
        for id in 0..3 {
            let worker = Arc::clone(&mutex);
            let order = Arc::clone(&order);
            handles.push(thread::spawn(move || {
                worker.lock().unwrap();
                order.lock().unwrap().push(id);
                worker.unlock().unwrap();
            }));
            wait_for_waiters(&mutex, id + 1);
        }

        mutex.unlock().unwrap();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn full_waiter_queue_is_rejected() {
        let mutex: Arc<Mutex<PosixKernel, 1>> = Arc::new(Mutex::new());
        mutex.lock().unwrap();

        let queued = {
            let mutex = Arc::clone(&mutex);
            thread::spawn(move || {
                mutex.lock().unwrap();
                mutex.unlock().unwrap();
            })
        };
        wait_for_waiters(&mutex, 1);

        let rejected = {
            let mutex = Arc::clone(&mutex);
            thread::spawn(move || mutex.try_lock(Timeout::Millis(10)))
        };
        assert_eq!(rejected.join().unwrap(), Err(PalError::Full));

        mutex.unlock().unwrap();
        queued.join().unwrap();
    }

    #[test]
    fn mutual_exclusion_under_contention() {
        let mutex = Arc::new(TestMutex::new());
        let counter = Arc::new(AtomicUsize::new(0));
        let mut handles = vec![];

        for _ in 0..4 {
            let mutex = Arc::clone(&mutex);
            let counter = Arc::clone(&counter);
            handles.push(thread::spawn(move || {
                for _ in 0..50 {
                    mutex.lock().unwrap();
                    let current = counter.load(Ordering::Relaxed);
                    thread::sleep(Duration::from_micros(1));
                    counter.store(current + 1, Ordering::Relaxed);
                    mutex.unlock().unwrap();
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(counter.load(Ordering::Relaxed), 200);
    }
}
