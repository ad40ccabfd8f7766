//! UART collaborator and line settings

use pal_core::PalResult;

/// UART data bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
}

impl DataBits {
    /// Number of data bits per character
    pub const fn bits(self) -> u8 {
        match self {
            DataBits::Five => 5,
            DataBits::Six => 6,
            DataBits::Seven => 7,
            DataBits::Eight => 8,
        }
    }
}

/// UART stop bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopBits {
    One,
    Two,
}

/// UART parity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    None,
    Even,
    Odd,
}

/// UART flow control
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowControl {
    None,
    RtsCts,
}

/// UART configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UartConfig {
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub stop_bits: StopBits,
    pub parity: Parity,
    pub flow_control: FlowControl,
}

impl UartConfig {
    /// 8N1 without flow control at `baud_rate`
    pub const fn new(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            parity: Parity::None,
            flow_control: FlowControl::None,
        }
    }

    pub const fn with_parity(mut self, parity: Parity) -> Self {
        self.parity = parity;
        self
    }

    pub const fn with_stop_bits(mut self, stop_bits: StopBits) -> Self {
        self.stop_bits = stop_bits;
        self
    }

    pub const fn with_flow_control(mut self, flow_control: FlowControl) -> Self {
        self.flow_control = flow_control;
        self
    }

    /// Bits on the wire per character, start bit included
    pub const fn frame_bits(&self) -> u32 {
        let parity = match self.parity {
            Parity::None => 0,
            Parity::Even | Parity::Odd => 1,
        };
        let stop = match self.stop_bits {
            StopBits::One => 1,
            StopBits::Two => 2,
        };
        1 + self.data_bits.bits() as u32 + parity + stop
    }
}

impl Default for UartConfig {
    fn default() -> Self {
        Self::new(115_200)
    }
}

/// Interrupt-driven UART hardware, as seen by a
/// [`BufferedReceiver`](crate::BufferedReceiver).
///
/// Every request returns immediately. Completion is reported later from
/// the UART interrupt through the receiver's `on_*` entry points. An `Err`
/// means the request was not started and no completion will follow.
pub trait SerialPort {
    /// Apply line settings. Only called while nothing is in flight.
    fn configure(&self, config: &UartConfig) -> PalResult<()>;

    /// Arm reception of exactly one byte, delivered through
    /// `on_byte_received`.
    fn request_receive(&self) -> PalResult<()>;

    /// Start sending `data`, finished by `on_transmit_complete`.
    ///
    /// The caller stays blocked until the completion, so `data` remains
    /// valid for the whole transmission.
    fn request_transmit(&self, data: &[u8]) -> PalResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_115200_8n1() {
        let config = UartConfig::default();
        assert_eq!(config.baud_rate, 115_200);
        assert_eq!(config.data_bits, DataBits::Eight);
        assert_eq!(config.frame_bits(), 10);
    }

    #[test]
    fn frame_bits_counts_parity_and_stop() {
        let config = UartConfig::new(9600)
            .with_parity(Parity::Even)
            .with_stop_bits(StopBits::Two);
        assert_eq!(config.frame_bits(), 12);
    }
}
