//! # PAL POSIX Port
//!
//! Hosted implementation of the [`pal_core::Kernel`] scheduler port for
//! Linux/Unix systems. Every OS thread that touches a primitive becomes a
//! task; any thread may play the interrupt handler by calling the
//! `*_from_isr` entry points.
//!
//! Critical sections are provided by `critical-section`'s `std`
//! implementation, which this crate enables.

mod kernel;
mod time;

pub use kernel::PosixKernel;
pub use time::{Ticker, DEFAULT_TICKS_PER_SEC, MAX_TICKS_PER_SEC};
