//! Frame protocol engine for PN532 NFC controllers.
//!
//! The engine builds checksummed command frames, waits for the chip to
//! become ready, checks the acknowledgement (resending on failure) and
//! decodes the fixed-layout responses into typed results. The bus itself is
//! supplied through `embedded-hal` I2C or SPI implementations.
//!
//! ```no_run
//! # fn demo<I: embedded_hal::i2c::I2c>(i2c: I) -> pn532_engine::Result<()> {
//! use pn532_engine::{Config, I2cTransport, Pn532};
//!
//! let config = Config::default();
//! let transport = I2cTransport::new(i2c, config.i2c_address);
//! let mut pn532 = Pn532::new(transport, &config)?;
//! pn532.init()?;
//! let firmware = pn532.firmware_version()?;
//! let uid = pn532.card_uid()?;
//! # let _ = (firmware, uid);
//! # Ok(())
//! # }
//! ```

pub mod ack;
pub mod commands;
pub mod config;
pub mod device;
pub mod error;
pub mod frame;
pub mod transport;
pub mod wait;

pub use ack::{AckProtocol, Delivery, ExchangeState, ReadySource, RetryBudget};
pub use commands::{
    BlockRead, CardCapacity, CardUid, Command, FirmwareVersion, GpioState, KeyType, Port3Pin,
    Port7Pin, Request, SupportedCards, Target,
};
pub use config::Config;
pub use device::Pn532;
pub use error::{DecodeError, Error, FrameError, Result, TransportError};
pub use frame::{decode, encode, Frame, Payload, Tfi};
pub use transport::{I2cTransport, NoIrq, SpiTransport, Transport, TransportKind};
pub use wait::{CancelToken, Wait};
