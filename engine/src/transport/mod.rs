//! Byte-level access to the controller.
//!
//! The engine only needs to write a frame, read a fixed number of bytes and
//! learn whether the chip is ready. Bus timing, addressing and chip select
//! stay inside the implementations.

mod i2c;
mod spi;

use serde::{Deserialize, Serialize};

use crate::error::TransportError;

pub use i2c::{I2cTransport, DEFAULT_I2C_ADDRESS};
pub use spi::{SpiTransport, SPI_DATA_READ, SPI_DATA_WRITE, SPI_STATUS_READ};

/// Status byte value meaning a response (or ack) is waiting.
pub const STATUS_READY: u8 = 0x01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    I2c,
    Spi,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::I2c => f.write_str("i2c"),
            TransportKind::Spi => f.write_str("spi"),
        }
    }
}

pub trait Transport {
    fn kind(&self) -> TransportKind;

    /// Send one complete frame.
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Read `len` bytes. The first byte is the status slot that precedes
    /// frame data and is discarded by the caller.
    fn read(&mut self, len: usize) -> Result<Vec<u8>, TransportError>;

    /// Read the ready status byte (`STATUS_READY` when data is waiting).
    fn poll_status_byte(&mut self) -> Result<u8, TransportError>;

    /// Whether an interrupt line is wired.
    fn has_interrupt(&self) -> bool {
        false
    }

    /// `Some(true)` when the interrupt line signals ready, `None` without a line.
    fn interrupt_ready(&mut self) -> Result<Option<bool>, TransportError> {
        Ok(None)
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn kind(&self) -> TransportKind {
        (**self).kind()
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        (**self).write(bytes)
    }

    fn read(&mut self, len: usize) -> Result<Vec<u8>, TransportError> {
        (**self).read(len)
    }

    fn poll_status_byte(&mut self) -> Result<u8, TransportError> {
        (**self).poll_status_byte()
    }

    fn has_interrupt(&self) -> bool {
        (**self).has_interrupt()
    }

    fn interrupt_ready(&mut self) -> Result<Option<bool>, TransportError> {
        (**self).interrupt_ready()
    }
}

/// Placeholder interrupt pin for transports wired without one.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoIrq;

impl embedded_hal::digital::ErrorType for NoIrq {
    type Error = core::convert::Infallible;
}

impl embedded_hal::digital::InputPin for NoIrq {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(true)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(false)
    }
}

pub(crate) fn pin_error<E: embedded_hal::digital::Error>(err: E) -> TransportError {
    TransportError::Pin(err.kind())
}

/// Active-low interrupt: ready when the line reads low.
pub(crate) fn irq_ready<P: embedded_hal::digital::InputPin>(
    pin: &mut P,
) -> Result<bool, TransportError> {
    pin.is_low().map_err(pin_error)
}
