use embedded_hal::digital::InputPin;
use embedded_hal::i2c::I2c;

use super::{irq_ready, NoIrq, Transport, TransportKind};
use crate::error::TransportError;

/// 7-bit address of the PN532 (0x48 / 0x49 as 8-bit write / read addresses).
pub const DEFAULT_I2C_ADDRESS: u8 = 0x24;

/// PN532 on an I2C bus.
///
/// Every read transaction starts with the ready byte, so `read(len)` maps
/// directly onto one bus read.
pub struct I2cTransport<I, P = NoIrq> {
    i2c: I,
    address: u8,
    irq: Option<P>,
}

impl<I: I2c> I2cTransport<I, NoIrq> {
    pub fn new(i2c: I, address: u8) -> Self {
        Self {
            i2c,
            address,
            irq: None,
        }
    }
}

impl<I: I2c, P: InputPin> I2cTransport<I, P> {
    pub fn with_irq(i2c: I, address: u8, irq: P) -> Self {
        Self {
            i2c,
            address,
            irq: Some(irq),
        }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// Give back the bus and the interrupt pin.
    pub fn release(self) -> (I, Option<P>) {
        (self.i2c, self.irq)
    }
}

fn bus_error<E: embedded_hal::i2c::Error>(err: E) -> TransportError {
    TransportError::I2c(err.kind())
}

impl<I: I2c, P: InputPin> Transport for I2cTransport<I, P> {
    fn kind(&self) -> TransportKind {
        TransportKind::I2c
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.i2c.write(self.address, bytes).map_err(bus_error)
    }

    fn read(&mut self, len: usize) -> Result<Vec<u8>, TransportError> {
        let mut buf = vec![0u8; len];
        self.i2c.read(self.address, &mut buf).map_err(bus_error)?;
        Ok(buf)
    }

    fn poll_status_byte(&mut self) -> Result<u8, TransportError> {
        let mut status = [0u8; 1];
        self.i2c.read(self.address, &mut status).map_err(bus_error)?;
        Ok(status[0])
    }

    fn has_interrupt(&self) -> bool {
        self.irq.is_some()
    }

    fn interrupt_ready(&mut self) -> Result<Option<bool>, TransportError> {
        self.irq.as_mut().map(irq_ready).transpose()
    }
}
