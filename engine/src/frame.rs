//! PN532 normal information frames.
//!
//! Layout:
//! `00 00 FF LEN LCS TFI CODE PARAMS... DCS 00`
//!
//! - `LEN` counts TFI, the command code and the parameters
//! - `LCS` makes `LEN + LCS == 0` (mod 256)
//! - `DCS` makes `TFI + CODE + sum(PARAMS) + DCS == 0` (mod 256)
//!
//! Frames are rejected on any mismatch, never repaired.

use crate::error::{ChecksumField, FrameError};

pub const PREAMBLE: u8 = 0x00;
pub const START_CODE_1: u8 = 0x00;
pub const START_CODE_2: u8 = 0xFF;
pub const POSTAMBLE: u8 = 0x00;

/// TFI of the chip's syntax-error frame.
pub const ERROR_FRAME_TFI: u8 = 0x7F;

/// Preamble, start codes, LEN, LCS, DCS and postamble.
pub const FRAME_OVERHEAD: usize = 7;

/// TFI and command code are both counted by LEN.
pub const MAX_PARAMS_LEN: usize = u8::MAX as usize - 2;

/// Frame identifier: direction of the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tfi {
    HostToPn532,
    Pn532ToHost,
}

impl Tfi {
    pub const fn byte(self) -> u8 {
        match self {
            Tfi::HostToPn532 => 0xD4,
            Tfi::Pn532ToHost => 0xD5,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0xD4 => Some(Tfi::HostToPn532),
            0xD5 => Some(Tfi::Pn532ToHost),
            _ => None,
        }
    }
}

/// Length checksum for `len`.
pub fn length_checksum(len: u8) -> u8 {
    (!len).wrapping_add(1)
}

/// Data checksum over TFI, code and params.
pub fn data_checksum(body: &[u8]) -> u8 {
    let sum = body.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    (!sum).wrapping_add(1)
}

/// An encoded frame, ready to go on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: Vec<u8>,
}

impl Frame {
    /// Build a frame with an explicit direction.
    ///
    /// Panics when `params` does not fit in a normal frame: command
    /// builders never produce such payloads.
    pub fn new(tfi: Tfi, code: u8, params: &[u8]) -> Self {
        assert!(
            params.len() <= MAX_PARAMS_LEN,
            "{} parameter bytes do not fit in a normal frame",
            params.len()
        );

        let len = (params.len() + 2) as u8;
        let mut bytes = Vec::with_capacity(params.len() + 2 + FRAME_OVERHEAD);
        bytes.extend_from_slice(&[PREAMBLE, START_CODE_1, START_CODE_2, len, length_checksum(len)]);
        bytes.push(tfi.byte());
        bytes.push(code);
        bytes.extend_from_slice(params);
        let dcs = data_checksum(&bytes[5..]);
        bytes.push(dcs);
        bytes.push(POSTAMBLE);

        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

/// Encode a host-to-PN532 command frame.
pub fn encode(code: u8, params: &[u8]) -> Frame {
    Frame::new(Tfi::HostToPn532, code, params)
}

/// Validated contents of a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub tfi: Tfi,
    pub code: u8,
    pub data: Vec<u8>,
}

/// Decode a frame starting at its preamble.
///
/// Bytes after the postamble are ignored, since transports read a fixed
/// upper bound. `expected_data_len` is the minimum number of bytes that must
/// follow the command code.
pub fn decode(raw: &[u8], expected_data_len: usize) -> Result<Payload, FrameError> {
    if raw.len() < 5 {
        return Err(FrameError::LengthMismatch {
            expected: FRAME_OVERHEAD + 2,
            actual: raw.len(),
        });
    }

    for (offset, marker) in [PREAMBLE, START_CODE_1, START_CODE_2].into_iter().enumerate() {
        if raw[offset] != marker {
            return Err(FrameError::BadMarker {
                offset,
                found: raw[offset],
            });
        }
    }

    let len = raw[3];
    if len.wrapping_add(raw[4]) != 0 {
        return Err(FrameError::BadChecksum {
            field: ChecksumField::Length,
        });
    }

    let len = usize::from(len);
    let total = FRAME_OVERHEAD + len;
    if raw.len() < total {
        return Err(FrameError::LengthMismatch {
            expected: total,
            actual: raw.len(),
        });
    }

    let body = &raw[5..5 + len];
    let dcs = raw[5 + len];

    if data_checksum(body) != dcs {
        return Err(FrameError::BadChecksum {
            field: ChecksumField::Data,
        });
    }

    if raw[6 + len] != POSTAMBLE {
        return Err(FrameError::BadMarker {
            offset: 6 + len,
            found: raw[6 + len],
        });
    }

    // Only a fully validated frame counts as the chip's error report.
    if len == 1 && body[0] == ERROR_FRAME_TFI {
        return Err(FrameError::ErrorFrame);
    }
    if len < 2 {
        return Err(FrameError::LengthMismatch {
            expected: FRAME_OVERHEAD + 2,
            actual: total,
        });
    }

    let tfi = Tfi::from_byte(body[0]).ok_or(FrameError::BadMarker {
        offset: 5,
        found: body[0],
    })?;

    let data = &body[2..];
    if data.len() < expected_data_len {
        return Err(FrameError::LengthMismatch {
            expected: FRAME_OVERHEAD + 2 + expected_data_len,
            actual: total,
        });
    }

    Ok(Payload {
        tfi,
        code: body[1],
        data: data.to_vec(),
    })
}
