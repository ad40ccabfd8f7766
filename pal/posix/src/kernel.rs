//! Thread-backed scheduler port
//!
//! Each thread lazily registers a notifier (a flag plus condition variable)
//! on first use and is assigned a fresh [`TaskHandle`]. The registration is
//! removed when the thread exits, so late notifications aimed at a finished
//! task are dropped with a warning instead of waking a stranger.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use log::warn;
use pal_core::{Kernel, TaskHandle, Timeout};
use parking_lot::{Condvar, Mutex};

static NEXT_TASK_ID: AtomicU32 = AtomicU32::new(1);

static TASKS: Mutex<BTreeMap<TaskHandle, Arc<Notifier>>> =
    parking_lot::const_mutex(BTreeMap::new());

static EPOCH: OnceLock<Instant> = OnceLock::new();

thread_local! {
    static CURRENT: TaskSlot = TaskSlot::register();
}

/// Binary notification owned by one task
#[derive(Default)]
struct Notifier {
    pending: Mutex<bool>,
    ready: Condvar,
}

impl Notifier {
    fn give(&self) {
        *self.pending.lock() = true;
        self.ready.notify_one();
    }

    fn take(&self, timeout: Timeout) -> bool {
        let mut pending = self.pending.lock();
        match timeout.as_millis() {
            None => {
                while !*pending {
                    self.ready.wait(&mut pending);
                }
            }
            Some(ms) => {
                let deadline = Instant::now() + Duration::from_millis(u64::from(ms));
                while !*pending {
                    if self.ready.wait_until(&mut pending, deadline).timed_out() {
                        break;
                    }
                }
            }
        }
        std::mem::replace(&mut *pending, false)
    }
}

/// Per-thread registration, released when the thread exits
struct TaskSlot {
    handle: TaskHandle,
    notifier: Arc<Notifier>,
}

impl TaskSlot {
    fn register() -> Self {
        // Zero is reserved for "no task"; skip it if the counter wraps.
        let handle = loop {
            if let Some(handle) = TaskHandle::new(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed)) {
                break handle;
            }
        };
        let notifier = Arc::new(Notifier::default());
        TASKS.lock().insert(handle, Arc::clone(&notifier));
        Self { handle, notifier }
    }
}

impl Drop for TaskSlot {
    fn drop(&mut self) {
        TASKS.lock().remove(&self.handle);
    }
}

fn lookup(task: TaskHandle) -> Option<Arc<Notifier>> {
    TASKS.lock().get(&task).cloned()
}

/// Scheduler port backed by OS threads.
#[derive(Debug, Clone, Copy, Default)]
pub struct PosixKernel;

impl PosixKernel {
    /// Number of threads currently registered as tasks
    pub fn task_count() -> usize {
        TASKS.lock().len()
    }
}

impl Kernel for PosixKernel {
    fn current_task() -> TaskHandle {
        CURRENT.with(|slot| slot.handle)
    }

    fn now_ms() -> u32 {
        let elapsed = EPOCH.get_or_init(Instant::now).elapsed();
        // Truncation gives the wrapping tick the trait asks for.
        elapsed.as_millis() as u32
    }

    fn wait_notification(timeout: Timeout) -> bool {
        let notifier = CURRENT.with(|slot| Arc::clone(&slot.notifier));
        notifier.take(timeout)
    }

    fn notify(task: TaskHandle) {
        match lookup(task) {
            Some(notifier) => notifier.give(),
            None => warn!("notification for unknown {}", task),
        }
    }

    fn notify_from_isr(task: TaskHandle) -> bool {
        Self::notify(task);
        // Threads have no priorities here; always let the woken task run.
        true
    }

    fn yield_from_isr(higher_priority_woken: bool) {
        if higher_priority_woken {
            std::thread::yield_now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_handles_are_unique_per_thread() {
        let here = PosixKernel::current_task();
        assert_eq!(here, PosixKernel::current_task());

        let there = thread::spawn(PosixKernel::current_task).join().unwrap();
        assert_ne!(here, there);
    }

    #[test]
    fn test_notification_before_wait_is_kept() {
        let me = PosixKernel::current_task();
        PosixKernel::notify(me);
        PosixKernel::notify(me);
        assert!(PosixKernel::wait_notification(Timeout::NO_WAIT));
        // Binary: the second delivery collapsed into the first.
        assert!(!PosixKernel::wait_notification(Timeout::NO_WAIT));
    }

    #[test]
    fn test_wait_times_out() {
        let start = Instant::now();
        assert!(!PosixKernel::wait_notification(Timeout::Millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_clock_advances() {
        let before = PosixKernel::now_ms();
        thread::sleep(Duration::from_millis(15));
        assert!(PosixKernel::now_ms().wrapping_sub(before) >= 15);
    }

    #[test]
    fn test_notify_from_another_thread() {
        let me = PosixKernel::current_task();
        let waker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            let woken = PosixKernel::notify_from_isr(me);
            PosixKernel::yield_from_isr(woken);
        });
        assert!(PosixKernel::wait_notification(Timeout::Forever));
        waker.join().unwrap();
    }

    #[test]
    fn test_task_released_on_thread_exit() {
        let (task, ready) = std::sync::mpsc::channel();
        let (done, finish) = std::sync::mpsc::channel::<()>();
        let worker = thread::spawn(move || {
            task.send(PosixKernel::current_task()).unwrap();
            finish.recv().unwrap();
        });

        let handle = ready.recv().unwrap();
        assert!(lookup(handle).is_some());

        done.send(()).unwrap();
        worker.join().unwrap();
        assert!(lookup(handle).is_none());

        // Dropped quietly rather than waking someone else.
        PosixKernel::notify(handle);
    }
}
