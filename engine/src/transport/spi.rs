use embedded_hal::digital::InputPin;
use embedded_hal::spi::{Operation, SpiDevice};

use super::{irq_ready, NoIrq, Transport, TransportKind};
use crate::error::TransportError;

/// Selector byte: read the status byte.
pub const SPI_STATUS_READ: u8 = 0x02;
/// Selector byte: the rest of the transaction is a frame for the chip.
pub const SPI_DATA_WRITE: u8 = 0x01;
/// Selector byte: clock out the pending frame.
pub const SPI_DATA_READ: u8 = 0x03;

/// PN532 on an SPI bus.
///
/// The chip expects LSB-first mode 0; configuring the bus that way is the
/// caller's job. Port 7 GPIOs share pins with the SPI lines and can't be
/// driven in this mode.
pub struct SpiTransport<S, P = NoIrq> {
    spi: S,
    irq: Option<P>,
}

impl<S: SpiDevice> SpiTransport<S, NoIrq> {
    pub fn new(spi: S) -> Self {
        Self { spi, irq: None }
    }
}

impl<S: SpiDevice, P: InputPin> SpiTransport<S, P> {
    pub fn with_irq(spi: S, irq: P) -> Self {
        Self { spi, irq: Some(irq) }
    }

    /// Select with `cmd`, then clock in `len` bytes in the same transaction.
    pub fn read_after_select(&mut self, cmd: u8, len: usize) -> Result<Vec<u8>, TransportError> {
        let mut buf = vec![0u8; len];
        self.spi
            .transaction(&mut [Operation::Write(&[cmd]), Operation::Read(&mut buf)])
            .map_err(bus_error)?;
        Ok(buf)
    }

    pub fn release(self) -> (S, Option<P>) {
        (self.spi, self.irq)
    }
}

fn bus_error<E: embedded_hal::spi::Error>(err: E) -> TransportError {
    TransportError::Spi(err.kind())
}

impl<S: SpiDevice, P: InputPin> Transport for SpiTransport<S, P> {
    fn kind(&self) -> TransportKind {
        TransportKind::Spi
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.spi
            .transaction(&mut [Operation::Write(&[SPI_DATA_WRITE]), Operation::Write(bytes)])
            .map_err(bus_error)
    }

    fn read(&mut self, len: usize) -> Result<Vec<u8>, TransportError> {
        if len == 0 {
            return Ok(Vec::new());
        }
        // The byte clocked in while the selector goes out takes the status slot.
        let mut buf = vec![0u8; len];
        buf[0] = SPI_DATA_READ;
        self.spi.transfer_in_place(&mut buf).map_err(bus_error)?;
        Ok(buf)
    }

    fn poll_status_byte(&mut self) -> Result<u8, TransportError> {
        let status = self.read_after_select(SPI_STATUS_READ, 1)?;
        Ok(status[0])
    }

    fn has_interrupt(&self) -> bool {
        self.irq.is_some()
    }

    fn interrupt_ready(&mut self) -> Result<Option<bool>, TransportError> {
        self.irq.as_mut().map(irq_ready).transpose()
    }
}
