#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![forbid(unsafe_code)]

//! # PAL Drivers
//!
//! Interrupt-driven peripheral drivers built on `pal-sync`:
//!
//! - [`FramedByteBuffer`] - lock-free byte ring with delimiter framing
//! - [`BufferedReceiver`] - UART receiver/transmitter with blocking frame reads
//! - [`ExclusiveTransfer`] - one-in-flight transfers, wrapped by
//!   [`I2cMaster`] and [`SpiBus`]
//! - [`PeripheralRegistry`] - interrupt line to driver instance table
//!
//! Hardware is reached through the [`SerialPort`] and [`TransferPort`]
//! traits; each port's interrupt handler calls back into the driver's
//! `on_*` entry points.

pub mod buffer;
pub mod i2c;
pub mod receiver;
pub mod registry;
pub mod spi;
pub mod transfer;
pub mod uart;

pub use buffer::FramedByteBuffer;
pub use i2c::{I2cAddress, I2cConfig, I2cMaster, I2cSpeed, I2cTarget, RegisterAddress};
pub use receiver::{BufferedReceiver, ReceiverState};
pub use registry::PeripheralRegistry;
pub use spi::{BitOrder, SpiBus, SpiConfig, SpiMode};
pub use transfer::{ExclusiveTransfer, TransferConfig, TransferPort};
pub use uart::{DataBits, FlowControl, Parity, SerialPort, StopBits, UartConfig};

/// Receive buffer size used when none is given
pub const DEFAULT_BUFFER_SIZE: usize = 256;
