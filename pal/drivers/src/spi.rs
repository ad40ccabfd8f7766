//! SPI bus over an [`ExclusiveTransfer`]

use embedded_hal::spi::{Mode, Phase, Polarity};
use pal_core::{Kernel, PalError, PalResult};

use crate::transfer::{ExclusiveTransfer, TransferConfig, TransferPort};

/// SPI mode (clock polarity and phase)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpiMode {
    /// CPOL=0, CPHA=0
    Mode0,
    /// CPOL=0, CPHA=1
    Mode1,
    /// CPOL=1, CPHA=0
    Mode2,
    /// CPOL=1, CPHA=1
    Mode3,
}

impl From<SpiMode> for Mode {
    fn from(mode: SpiMode) -> Self {
        match mode {
            SpiMode::Mode0 => embedded_hal::spi::MODE_0,
            SpiMode::Mode1 => embedded_hal::spi::MODE_1,
            SpiMode::Mode2 => embedded_hal::spi::MODE_2,
            SpiMode::Mode3 => embedded_hal::spi::MODE_3,
        }
    }
}

impl From<Mode> for SpiMode {
    fn from(mode: Mode) -> Self {
        match (mode.polarity, mode.phase) {
            (Polarity::IdleLow, Phase::CaptureOnFirstTransition) => SpiMode::Mode0,
            (Polarity::IdleLow, Phase::CaptureOnSecondTransition) => SpiMode::Mode1,
            (Polarity::IdleHigh, Phase::CaptureOnFirstTransition) => SpiMode::Mode2,
            (Polarity::IdleHigh, Phase::CaptureOnSecondTransition) => SpiMode::Mode3,
        }
    }
}

/// SPI bit order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitOrder {
    MsbFirst,
    LsbFirst,
}

/// SPI configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpiConfig {
    pub frequency: u32,
    pub mode: SpiMode,
    pub bit_order: BitOrder,
}

impl Default for SpiConfig {
    fn default() -> Self {
        Self {
            frequency: 1_000_000, // 1 MHz
            mode: SpiMode::Mode0,
            bit_order: BitOrder::MsbFirst,
        }
    }
}

/// Half-duplex SPI bus with one transfer in flight.
pub struct SpiBus<K: Kernel, P>
where
    P: TransferPort<Target = (), Config = SpiConfig>,
{
    transfer: ExclusiveTransfer<K, P>,
}

impl<K: Kernel, P> SpiBus<K, P>
where
    P: TransferPort<Target = (), Config = SpiConfig>,
{
    pub const fn new(port: P) -> Self {
        Self {
            transfer: ExclusiveTransfer::new(port),
        }
    }

    pub const fn with_config(port: P, config: TransferConfig) -> Self {
        Self {
            transfer: ExclusiveTransfer::with_config(port, config),
        }
    }

    pub fn transfer(&self) -> &ExclusiveTransfer<K, P> {
        &self.transfer
    }

    /// Clock in `dest.len()` bytes.
    pub fn receive(&self, dest: &mut [u8]) -> PalResult<()> {
        self.transfer.read((), dest)
    }

    /// Clock out `data`.
    pub fn transmit(&self, data: &[u8]) -> PalResult<()> {
        self.transfer.write((), data)
    }

    /// Rejects a zero clock with [`PalError::InvalidParameter`].
    pub fn configure(&self, config: &SpiConfig) -> PalResult<()> {
        if config.frequency == 0 {
            return Err(PalError::InvalidParameter);
        }
        self.transfer.configure(config)
    }

    /// Transfer-complete interrupt entry point
    pub fn on_transfer_complete(&self) {
        self.transfer.on_transfer_complete();
    }

    /// Bus error interrupt entry point
    pub fn on_transfer_error(&self) {
        self.transfer.on_transfer_error();
    }
}

impl<K: Kernel, P> embedded_hal::spi::ErrorType for SpiBus<K, P>
where
    P: TransferPort<Target = (), Config = SpiConfig>,
{
    type Error = PalError;
}
