//! Control-channel framing (base ↔ shears).
//!
//! # Wire format
//!
//! ```text
//! COMMAND (base → shears):
//!   [0x00]                              NOP
//!   [0x01][basename ASCII...][0x00]     START_TRANSFER
//!   [0x02]                              ABORT
//!
//! EVENT (shears → base):
//!   [0x80][status]                      STATUS
//!   [0x80][0x00][size:4 LE]             STATUS(ACCEPTED) carries file size
//! ```
//!
//! The basename travels null-terminated so it stays parseable from a raw
//! characteristic write; it must be 1..=48 bytes of ASCII.

use crate::ProtocolError;

/// Longest basename accepted in a `START_TRANSFER` request.
pub const MAX_BASENAME_LEN: usize = 48;

/// Command opcodes written by the base to the control characteristic.
pub mod opcode {
    pub const NOP: u8 = 0x00;
    pub const START_TRANSFER: u8 = 0x01;
    pub const ABORT: u8 = 0x02;
    /// Events from shears → base start at 0x80.
    pub const STATUS: u8 = 0x80;
}

/// Status codes notified by the shears on the control characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StatusCode {
    /// Transfer accepted; the wire event carries the file size.
    Accepted = 0x00,
    /// Requested basename not found on the shears filesystem.
    NoFile = 0x01,
    /// Filesystem error on the shears side.
    FsError = 0x02,
    /// A transfer is already in progress.
    Busy = 0x03,
    /// Shears finished sending the file.
    Done = 0x04,
    /// Transfer aborted on request.
    Aborted = 0x05,
}

impl StatusCode {
    pub fn from_u8(v: u8) -> Result<Self, ProtocolError> {
        match v {
            0x00 => Ok(Self::Accepted),
            0x01 => Ok(Self::NoFile),
            0x02 => Ok(Self::FsError),
            0x03 => Ok(Self::Busy),
            0x04 => Ok(Self::Done),
            0x05 => Ok(Self::Aborted),
            other => Err(ProtocolError::UnknownStatus(other)),
        }
    }

    /// Whether this status ends a session (everything except `Accepted`).
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Accepted)
    }
}

/// A command decoded from a control-characteristic write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    Nop,
    StartTransfer { basename: String },
    Abort,
}

impl ControlCommand {
    /// Encodes the command into control-characteristic bytes.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        match self {
            Self::Nop => Ok(vec![opcode::NOP]),
            Self::Abort => Ok(vec![opcode::ABORT]),
            Self::StartTransfer { basename } => {
                validate_basename(basename)?;
                let mut buf = Vec::with_capacity(2 + basename.len());
                buf.push(opcode::START_TRANSFER);
                buf.extend_from_slice(basename.as_bytes());
                buf.push(0);
                Ok(buf)
            }
        }
    }

    /// Decodes a control-characteristic write.
    ///
    /// The basename of a `START_TRANSFER` ends at the first null byte; a
    /// missing terminator means the name runs to the end of the write.
    /// The name is *not* validated here — the server owns that decision
    /// so it can answer a bad request with `FS_ERROR` on the wire.
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        let (&op, rest) = data
            .split_first()
            .ok_or(ProtocolError::Truncated { need: 1, have: 0 })?;
        match op {
            opcode::NOP => Ok(Self::Nop),
            opcode::ABORT => Ok(Self::Abort),
            opcode::START_TRANSFER => {
                let name_bytes = match rest.iter().position(|&b| b == 0) {
                    Some(n) => &rest[..n],
                    None => rest,
                };
                let basename = String::from_utf8_lossy(name_bytes).into_owned();
                Ok(Self::StartTransfer { basename })
            }
            other => Err(ProtocolError::UnknownOpcode(other)),
        }
    }
}

/// A status event decoded from a control-characteristic notification.
///
/// `file_size` is carried on the wire only for [`StatusCode::Accepted`];
/// for other codes it is `None` after decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusEvent {
    pub code: StatusCode,
    pub file_size: Option<u32>,
}

impl StatusEvent {
    pub fn accepted(file_size: u32) -> Self {
        Self {
            code: StatusCode::Accepted,
            file_size: Some(file_size),
        }
    }

    pub fn of(code: StatusCode) -> Self {
        Self {
            code,
            file_size: None,
        }
    }

    /// Encodes the event into control-characteristic bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![opcode::STATUS, self.code as u8];
        if self.code == StatusCode::Accepted {
            buf.extend_from_slice(&self.file_size.unwrap_or(0).to_le_bytes());
        }
        buf
    }

    /// Decodes a control-characteristic notification.
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < 2 {
            return Err(ProtocolError::Truncated {
                need: 2,
                have: data.len(),
            });
        }
        if data[0] != opcode::STATUS {
            return Err(ProtocolError::UnknownOpcode(data[0]));
        }
        let code = StatusCode::from_u8(data[1])?;
        let file_size = if code == StatusCode::Accepted {
            if data.len() < 6 {
                return Err(ProtocolError::Truncated {
                    need: 6,
                    have: data.len(),
                });
            }
            Some(u32::from_le_bytes([data[2], data[3], data[4], data[5]]))
        } else {
            None
        };
        Ok(Self { code, file_size })
    }
}

/// Checks a basename against the control-channel constraints.
pub fn validate_basename(name: &str) -> Result<(), ProtocolError> {
    validate_basename_bytes(name.as_bytes())
}

fn validate_basename_bytes(name: &[u8]) -> Result<(), ProtocolError> {
    if name.is_empty() {
        return Err(ProtocolError::InvalidBasename("empty"));
    }
    if name.len() > MAX_BASENAME_LEN {
        return Err(ProtocolError::InvalidBasename("longer than 48 bytes"));
    }
    if !name.iter().all(|&b| b.is_ascii() && b != 0 && b != b'/') {
        return Err(ProtocolError::InvalidBasename(
            "must be ASCII without separators",
        ));
    }
    Ok(())
}
