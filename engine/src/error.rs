use thiserror::Error;

/// Result type used throughout the engine.
pub type Result<T> = std::result::Result<T, Error>;

/// A received frame that failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("frame marker mismatch at offset {offset}: got 0x{found:02X}")]
    BadMarker { offset: usize, found: u8 },

    #[error("{field} checksum mismatch")]
    BadChecksum { field: ChecksumField },

    #[error("frame length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// The chip answered with its syntax-error frame.
    #[error("controller returned an error frame")]
    ErrorFrame,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumField {
    Length,
    Data,
}

impl std::fmt::Display for ChecksumField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChecksumField::Length => f.write_str("length"),
            ChecksumField::Data => f.write_str("data"),
        }
    }
}

/// A well-formed frame whose contents don't match what the command expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unsupported card UID length {0} (expected 4 or 7)")]
    UnsupportedCardUidLength(u8),

    #[error("response too short: need {expected} data bytes, got {actual}")]
    ResponseTooShort { expected: usize, actual: usize },

    #[error("unexpected response code 0x{actual:02X} (expected 0x{expected:02X})")]
    UnexpectedResponse { expected: u8, actual: u8 },

    #[error("no target in field")]
    NoTarget,
}

/// Failure reported by the underlying bus or pin.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("I2C bus error: {0:?}")]
    I2c(embedded_hal::i2c::ErrorKind),

    #[error("SPI bus error: {0:?}")]
    Spi(embedded_hal::spi::ErrorKind),

    #[error("interrupt pin error: {0:?}")]
    Pin(embedded_hal::digital::ErrorKind),

    #[error("transport I/O error: {0}")]
    Io(String),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("malformed response frame: {0}")]
    Frame(#[from] FrameError),

    #[error("cannot interpret response: {0}")]
    Decode(#[from] DecodeError),

    /// The chip never acknowledged the command; it must be treated as not delivered.
    #[error("no acknowledgement after {attempts} attempts")]
    AckExhausted { attempts: u32 },

    #[error("timed out waiting for the controller")]
    Timeout,

    #[error("wait cancelled")]
    Cancelled,

    /// Non-zero status byte from a card operation (InDataExchange).
    #[error("card operation failed with status 0x{0:02X}")]
    CardStatus(u8),

    #[error("configuration error: {0}")]
    Config(String),
}
