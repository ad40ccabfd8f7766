//! Scheduler port
//!
//! The synchronization primitives never talk to an RTOS directly. A port
//! implements [`Kernel`] once per target (FreeRTOS direct-to-task
//! notifications, a hosted thread model, ...) and every primitive is generic
//! over it.

use crate::{TaskHandle, Timeout};

/// Task-scheduler primitives consumed by the synchronization core.
///
/// All functions are associated (no receiver) so that primitives can be
/// zero-sized over the port and built with `const fn` inside `static`s.
///
/// Notifications are binary: any number of deliveries before the task waits
/// collapse into a single pending notification, and a successful wait
/// consumes it.
pub trait Kernel: 'static {
    /// Handle of the task currently executing. Task context only.
    fn current_task() -> TaskHandle;

    /// Monotonic millisecond counter. Wraps; only differences are meaningful.
    fn now_ms() -> u32;

    /// Suspend the current task until a notification arrives or `timeout`
    /// elapses. Returns `true` if a notification was consumed.
    fn wait_notification(timeout: Timeout) -> bool;

    /// Deliver a notification from task context.
    fn notify(task: TaskHandle);

    /// Deliver a notification from interrupt context.
    ///
    /// Returns `true` if the woken task has a higher priority than the one the
    /// interrupt preempted.
    fn notify_from_isr(task: TaskHandle) -> bool;

    /// Request a context switch on interrupt exit when
    /// `higher_priority_woken` is set.
    fn yield_from_isr(higher_priority_woken: bool);
}
