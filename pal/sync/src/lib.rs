#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![forbid(unsafe_code)]

//! # PAL Sync
//!
//! Blocking synchronization primitives shared by every asynchronous
//! peripheral driver:
//!
//! - [`Mutex`] - task-level mutual exclusion with owner tracking
//! - [`ScopedLock`] - guard that releases a [`Mutex`] on every exit path
//! - [`Signal`] - single-waiter handoff from an interrupt handler to a task
//!
//! All primitives are generic over a [`pal_core::Kernel`] port and can be
//! placed in `static`s.

pub mod mutex;
pub mod scoped_lock;
pub mod signal;

pub use mutex::{Mutex, MAX_WAITERS};
pub use pal_core::*;
pub use scoped_lock::ScopedLock;
pub use signal::{ArmedSignal, Signal};
