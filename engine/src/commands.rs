//! Command table, request builders and response parsers.
//!
//! Command codes come from the PN532 user manual (UM0701-02, chapter 7).
//! Every response carries the command code plus one.

use std::fmt;
use std::ops::RangeInclusive;

use serde::{Serialize, Serializer};
use tracing::warn;

use crate::error::DecodeError;
use crate::frame::{self, Frame, Payload, FRAME_OVERHEAD};
use crate::transport::TransportKind;

/// MIFARE sub-commands carried by InDataExchange.
pub mod mifare {
    pub const READ: u8 = 0x30;
    pub const WRITE: u8 = 0xA0;
    pub const AUTH_KEY_A: u8 = 0x60;
    pub const AUTH_KEY_B: u8 = 0x61;
}

/// Logical number of the single target we list.
pub const TARGET_NUMBER: u8 = 0x01;

pub const BLOCK_SIZE: usize = 16;

/// P32 and P34 are reserved and must never be driven low.
pub const P3_RESERVED_MASK: u8 = 0x14;

/// Bit 7 of a GPIO write byte makes the chip apply that port.
pub const GPIO_VALIDATE: u8 = 0x80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    GetFirmwareVersion,
    ReadGpio,
    WriteGpio,
    SamConfiguration,
    InDataExchange,
    InListPassiveTarget,
}

impl Command {
    pub const fn code(self) -> u8 {
        match self {
            Command::GetFirmwareVersion => 0x02,
            Command::ReadGpio => 0x0C,
            Command::WriteGpio => 0x0E,
            Command::SamConfiguration => 0x14,
            Command::InDataExchange => 0x40,
            Command::InListPassiveTarget => 0x4A,
        }
    }

    pub const fn response_code(self) -> u8 {
        self.code() + 1
    }

    /// Allowed number of parameter bytes after the code.
    pub const fn params_len(self) -> RangeInclusive<usize> {
        match self {
            Command::GetFirmwareVersion | Command::ReadGpio => 0..=0,
            Command::WriteGpio => 2..=2,
            Command::SamConfiguration => 3..=3,
            // target, sub-command, block, then up to 16 bytes of data
            Command::InDataExchange => 3..=3 + BLOCK_SIZE,
            Command::InListPassiveTarget => 2..=2,
        }
    }

    /// Data bytes every valid response carries after the response code.
    pub const fn response_data_len(self) -> usize {
        match self {
            Command::GetFirmwareVersion => 4,
            Command::ReadGpio => 3,
            Command::WriteGpio | Command::SamConfiguration => 0,
            Command::InDataExchange | Command::InListPassiveTarget => 1,
        }
    }

    /// Upper bound on response data, used to size the transport read.
    pub const fn response_capacity(self) -> usize {
        match self {
            Command::InDataExchange => 1 + BLOCK_SIZE,
            // NbTg, Tg, SENS_RES, SEL_RES, UID length, UID, then room for an ATS
            Command::InListPassiveTarget => 6 + 7 + 32,
            other => other.response_data_len(),
        }
    }

    /// Bytes to read for the response: status slot, frame overhead, TFI and code.
    pub const fn read_len(self) -> usize {
        1 + FRAME_OVERHEAD + 2 + self.response_capacity()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Command::GetFirmwareVersion => "GetFirmwareVersion",
            Command::ReadGpio => "ReadGPIO",
            Command::WriteGpio => "WriteGPIO",
            Command::SamConfiguration => "SAMConfiguration",
            Command::InDataExchange => "InDataExchange",
            Command::InListPassiveTarget => "InListPassiveTarget",
        };
        write!(f, "{name} (0x{:02X})", self.code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    A,
    B,
}

/// A command with its parameters, checked against the command's contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    command: Command,
    params: Vec<u8>,
}

impl Request {
    /// Panics if `params` breaks the command's length contract.
    pub fn new(command: Command, params: Vec<u8>) -> Self {
        assert!(
            command.params_len().contains(&params.len()),
            "{command} takes {:?} parameter bytes, got {}",
            command.params_len(),
            params.len()
        );
        Self { command, params }
    }

    pub fn get_firmware_version() -> Self {
        Self::new(Command::GetFirmwareVersion, Vec::new())
    }

    /// Normal mode, no virtual-card timeout, IRQ pin driven when `use_irq`.
    pub fn sam_configuration(use_irq: bool) -> Self {
        Self::new(Command::SamConfiguration, vec![0x01, 0x00, u8::from(use_irq)])
    }

    pub fn read_gpio() -> Self {
        Self::new(Command::ReadGpio, Vec::new())
    }

    pub fn write_gpio(p3: u8, p7: u8, kind: TransportKind) -> Self {
        let (p3, p7) = gpio_write_bytes(p3, p7, kind);
        Self::new(Command::WriteGpio, vec![p3, p7])
    }

    /// List one ISO14443A target at 106 kbps.
    pub fn in_list_passive_target() -> Self {
        Self::new(Command::InListPassiveTarget, vec![0x01, 0x00])
    }

    pub fn read_block(block: u8) -> Self {
        Self::new(Command::InDataExchange, vec![TARGET_NUMBER, mifare::READ, block])
    }

    pub fn write_block(block: u8, data: &[u8; BLOCK_SIZE]) -> Self {
        let mut params = Vec::with_capacity(3 + BLOCK_SIZE);
        params.extend_from_slice(&[TARGET_NUMBER, mifare::WRITE, block]);
        params.extend_from_slice(data);
        Self::new(Command::InDataExchange, params)
    }

    pub fn authenticate_block(block: u8, key_type: KeyType, key: &[u8; 6], uid: &CardUid) -> Self {
        let sub_command = match key_type {
            KeyType::A => mifare::AUTH_KEY_A,
            KeyType::B => mifare::AUTH_KEY_B,
        };
        let mut params = vec![TARGET_NUMBER, sub_command, block];
        params.extend_from_slice(key);
        params.extend_from_slice(uid.auth_bytes());
        Self::new(Command::InDataExchange, params)
    }

    pub fn command(&self) -> Command {
        self.command
    }

    pub fn params(&self) -> &[u8] {
        &self.params
    }

    pub fn encode(&self) -> Frame {
        frame::encode(self.command.code(), &self.params)
    }
}

/// Apply the GPIO safety rules to the bytes about to be written.
pub fn gpio_write_bytes(p3: u8, p7: u8, kind: TransportKind) -> (u8, u8) {
    let p7 = match kind {
        TransportKind::I2c => p7,
        // P71/P72 double as SPI lines.
        TransportKind::Spi => 0x00,
    };
    (p3 | P3_RESERVED_MASK, p7)
}

/// Data region of `payload`, after checking it answers `command`.
pub fn response_data(payload: &Payload, command: Command) -> Result<&[u8], DecodeError> {
    if payload.code != command.response_code() {
        return Err(DecodeError::UnexpectedResponse {
            expected: command.response_code(),
            actual: payload.code,
        });
    }
    let expected = command.response_data_len();
    if payload.data.len() < expected {
        return Err(DecodeError::ResponseTooShort {
            expected,
            actual: payload.data.len(),
        });
    }
    Ok(&payload.data)
}

/// Card technologies the firmware supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SupportedCards(u8);

impl SupportedCards {
    pub const ISO14443_TYPE_A: Self = Self(0x01);
    pub const ISO14443_TYPE_B: Self = Self(0x02);
    pub const ISO18092: Self = Self(0x04);

    pub fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FirmwareVersion {
    pub ic: u8,
    pub version: u8,
    pub revision: u8,
    pub support: SupportedCards,
}

impl FirmwareVersion {
    pub fn parse(payload: &Payload) -> Result<Self, DecodeError> {
        let data = response_data(payload, Command::GetFirmwareVersion)?;
        Ok(Self {
            ic: data[0],
            version: data[1],
            revision: data[2],
            support: SupportedCards::from_bits(data[3]),
        })
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PN5{:02X} firmware {}.{}", self.ic, self.version, self.revision)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Port3Pin {
    P30 = 0,
    P31 = 1,
    P32 = 2,
    P33 = 3,
    P34 = 4,
    P35 = 5,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Port7Pin {
    P71 = 1,
    P72 = 2,
}

/// Snapshot of the GPIO ports.
///
/// `p3`: `0 0 P35 P34 P33 P32 P31 P30`, `p7`: `0 0 0 0 0 P72 P71 0`,
/// `interface`: `0 0 0 0 0 0 I1 I0` (interface select jumpers).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GpioState {
    pub p3: u8,
    pub p7: u8,
    pub interface: u8,
}

impl GpioState {
    /// Port 7 is meaningless over SPI and always reported as zero there.
    pub fn parse(payload: &Payload, kind: TransportKind) -> Result<Self, DecodeError> {
        let data = response_data(payload, Command::ReadGpio)?;
        let p7 = match kind {
            TransportKind::I2c => data[1],
            TransportKind::Spi => 0,
        };
        Ok(Self {
            p3: data[0],
            p7,
            interface: data[2],
        })
    }

    pub fn p3_is_high(&self, pin: Port3Pin) -> bool {
        self.p3 & (1 << pin as u8) != 0
    }

    pub fn p7_is_high(&self, pin: Port7Pin) -> bool {
        self.p7 & (1 << pin as u8) != 0
    }
}

/// Card UID of 4 or 7 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CardUid {
    bytes: [u8; 7],
    len: u8,
}

impl CardUid {
    pub fn new(uid: &[u8]) -> Result<Self, DecodeError> {
        match uid.len() {
            4 | 7 => {
                let mut bytes = [0u8; 7];
                bytes[..uid.len()].copy_from_slice(uid);
                Ok(Self {
                    bytes,
                    len: uid.len() as u8,
                })
            }
            n => Err(DecodeError::UnsupportedCardUidLength(n.min(u8::MAX as usize) as u8)),
        }
    }

    /// Seven bytes, 4-byte UIDs padded with zeros.
    pub fn canonical(&self) -> [u8; 7] {
        self.bytes
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..usize::from(self.len)]
    }

    pub fn len(&self) -> usize {
        usize::from(self.len)
    }

    /// The four bytes MIFARE Classic authentication keys on: the whole UID,
    /// or the last four bytes of a 7-byte UID.
    pub fn auth_bytes(&self) -> &[u8] {
        let uid = self.as_bytes();
        &uid[uid.len().saturating_sub(4)..]
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl fmt::Display for CardUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.as_bytes() {
            write!(f, "{b:02X}")?;
        }
        Ok(())
    }
}

impl Serialize for CardUid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CardCapacity {
    /// MIFARE Classic 1K, blocks 0..=63.
    Classic1K,
    /// MIFARE Classic 4K, blocks 0..=255.
    Classic4K,
}

impl CardCapacity {
    pub fn last_block(self) -> u8 {
        match self {
            CardCapacity::Classic1K => 63,
            CardCapacity::Classic4K => 255,
        }
    }

    pub fn blocks(self) -> RangeInclusive<u8> {
        0..=self.last_block()
    }

    pub fn contains(self, block: u8) -> bool {
        block <= self.last_block()
    }
}

/// A listed ISO14443A target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Target {
    pub number: u8,
    pub sens_res: [u8; 2],
    pub sel_res: u8,
    pub uid: CardUid,
}

impl Target {
    pub fn parse(payload: &Payload) -> Result<Self, DecodeError> {
        let data = response_data(payload, Command::InListPassiveTarget)?;
        if data[0] == 0 {
            return Err(DecodeError::NoTarget);
        }
        if data.len() < 6 {
            return Err(DecodeError::ResponseTooShort {
                expected: 6,
                actual: data.len(),
            });
        }

        let uid_len = data[5];
        if uid_len != 4 && uid_len != 7 {
            return Err(DecodeError::UnsupportedCardUidLength(uid_len));
        }
        let end = 6 + usize::from(uid_len);
        if data.len() < end {
            return Err(DecodeError::ResponseTooShort {
                expected: end,
                actual: data.len(),
            });
        }

        Ok(Self {
            number: data[1],
            sens_res: [data[2], data[3]],
            sel_res: data[4],
            uid: CardUid::new(&data[6..end])?,
        })
    }

    /// MIFARE Classic size, judged from SAK.
    pub fn capacity(&self) -> Option<CardCapacity> {
        match self.sel_res {
            0x08 => Some(CardCapacity::Classic1K),
            0x18 => Some(CardCapacity::Classic4K),
            _ => None,
        }
    }
}

/// One 16-byte block read from a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlockRead {
    pub block: u8,
    /// InDataExchange status; non-zero means `data` can't be trusted.
    pub status: u8,
    pub data: [u8; BLOCK_SIZE],
}

impl BlockRead {
    pub fn parse(payload: &Payload, block: u8) -> Result<Self, DecodeError> {
        let data = response_data(payload, Command::InDataExchange)?;
        let status = data[0];
        let body = &data[1..];

        if status == 0 && body.len() < BLOCK_SIZE {
            return Err(DecodeError::ResponseTooShort {
                expected: 1 + BLOCK_SIZE,
                actual: data.len(),
            });
        }

        let mut out = [0u8; BLOCK_SIZE];
        let n = body.len().min(BLOCK_SIZE);
        out[..n].copy_from_slice(&body[..n]);

        if status != 0 {
            warn!(block, status, "block read reported an error, data is unreliable");
        }

        Ok(Self {
            block,
            status,
            data: out,
        })
    }

    pub fn is_reliable(&self) -> bool {
        self.status == 0
    }
}

/// Status byte of an InDataExchange response.
pub fn data_exchange_status(payload: &Payload) -> Result<u8, DecodeError> {
    let data = response_data(payload, Command::InDataExchange)?;
    Ok(data[0])
}
