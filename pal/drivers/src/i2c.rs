//! I2C master over an [`ExclusiveTransfer`]

use core::fmt;

use pal_core::{Kernel, PalError, PalResult};

use crate::transfer::{ExclusiveTransfer, TransferConfig, TransferPort};

/// I2C address (7-bit or 10-bit)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum I2cAddress {
    SevenBit(u8),
    TenBit(u16),
}

impl I2cAddress {
    /// Raw address bits
    pub const fn raw(self) -> u16 {
        match self {
            I2cAddress::SevenBit(addr) => addr as u16,
            I2cAddress::TenBit(addr) => addr,
        }
    }

    /// Whether the address fits its addressing mode
    pub const fn is_valid(self) -> bool {
        match self {
            I2cAddress::SevenBit(addr) => addr <= 0x7F,
            I2cAddress::TenBit(addr) => addr <= 0x3FF,
        }
    }
}

impl fmt::Display for I2cAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            I2cAddress::SevenBit(addr) => write!(f, "{:#04x}", addr),
            I2cAddress::TenBit(addr) => write!(f, "{:#05x}", addr),
        }
    }
}

/// Device register address, sent ahead of the data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterAddress {
    /// 8-bit register map
    Byte(u8),
    /// 16-bit register map (EEPROMs, flash)
    Word(u16),
}

impl RegisterAddress {
    /// Build from a raw value; narrow maps keep only the low byte.
    pub const fn from_raw(raw: u16, wide: bool) -> Self {
        if wide {
            RegisterAddress::Word(raw)
        } else {
            RegisterAddress::Byte((raw & 0xFF) as u8)
        }
    }

    pub const fn raw(self) -> u16 {
        match self {
            RegisterAddress::Byte(reg) => reg as u16,
            RegisterAddress::Word(reg) => reg,
        }
    }

    /// Bytes the address occupies on the wire
    pub const fn width(self) -> usize {
        match self {
            RegisterAddress::Byte(_) => 1,
            RegisterAddress::Word(_) => 2,
        }
    }
}

/// Where an I2C register transfer goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct I2cTarget {
    pub device: I2cAddress,
    pub register: RegisterAddress,
}

/// I2C speed mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum I2cSpeed {
    /// Standard mode (100 kHz)
    Standard,
    /// Fast mode (400 kHz)
    Fast,
    /// Fast mode plus (1 MHz)
    FastPlus,
    /// High speed mode (3.4 MHz)
    HighSpeed,
}

impl I2cSpeed {
    pub const fn frequency_hz(self) -> u32 {
        match self {
            I2cSpeed::Standard => 100_000,
            I2cSpeed::Fast => 400_000,
            I2cSpeed::FastPlus => 1_000_000,
            I2cSpeed::HighSpeed => 3_400_000,
        }
    }
}

/// I2C configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct I2cConfig {
    pub speed: I2cSpeed,
}

impl Default for I2cConfig {
    fn default() -> Self {
        Self {
            speed: I2cSpeed::Standard,
        }
    }
}

/// Register-oriented I2C master.
pub struct I2cMaster<K: Kernel, P>
where
    P: TransferPort<Target = I2cTarget, Config = I2cConfig>,
{
    transfer: ExclusiveTransfer<K, P>,
}

impl<K: Kernel, P> I2cMaster<K, P>
where
    P: TransferPort<Target = I2cTarget, Config = I2cConfig>,
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

    /// Read `dest.len()` bytes starting at `register` of `device`.
    pub fn read_register(
        &self,
        device: I2cAddress,
        register: RegisterAddress,
        dest: &mut [u8],
    ) -> PalResult<()> {
        let target = Self::target(device, register)?;
        self.transfer.read(target, dest)
    }

    /// Write `data` starting at `register` of `device`.
    pub fn write_register(
        &self,
        device: I2cAddress,
        register: RegisterAddress,
        data: &[u8],
    ) -> PalResult<()> {
        let target = Self::target(device, register)?;
        self.transfer.write(target, data)
    }

    pub fn configure(&self, config: &I2cConfig) -> PalResult<()> {
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

    fn target(device: I2cAddress, register: RegisterAddress) -> PalResult<I2cTarget> {
        if !device.is_valid() {
            return Err(PalError::InvalidParameter);
        }
        Ok(I2cTarget { device, register })
    }
}

impl<K: Kernel, P> embedded_hal::i2c::ErrorType for I2cMaster<K, P>
where
    P: TransferPort<Target = I2cTarget, Config = I2cConfig>,
{
    type Error = PalError;
}
