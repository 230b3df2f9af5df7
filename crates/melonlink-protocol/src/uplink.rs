//! Serial uplink framing (base → host).
//!
//! # Wire format
//!
//! ```text
//! [0xAA][msg_type:1][len:2 LE][payload:len][checksum:1]
//! ```
//!
//! The checksum is the XOR of every byte from `msg_type` through the last
//! payload byte; the 0xAA start byte is not included. The host receiver
//! resynchronizes on the start byte after any framing violation, so a
//! corrupted frame costs at most one frame of data.

use crate::ProtocolError;

/// Start-of-frame marker.
pub const FRAME_START: u8 = 0xAA;

/// Hard cap on payload bytes per frame.
pub const MAX_FRAME_PAYLOAD: usize = 200;

/// Fixed overhead around the payload: start, type, len, checksum.
pub const FRAME_OVERHEAD: usize = 5;

/// Message types carried on the uplink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MsgType {
    /// One packed [`CutRecord`] (21 bytes).
    CutRecord = 0x01,
    /// One [`HostStatus`] code byte.
    Status = 0x02,
    /// Raw log bytes forwarded from the shears CSV, no terminator.
    LogLine = 0x03,
}

impl MsgType {
    pub fn from_u8(v: u8) -> Result<Self, ProtocolError> {
        match v {
            0x01 => Ok(Self::CutRecord),
            0x02 => Ok(Self::Status),
            0x03 => Ok(Self::LogLine),
            other => Err(ProtocolError::UnknownMsgType(other)),
        }
    }
}

/// Status codes carried in a [`MsgType::Status`] frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HostStatus {
    LinkUp = 0x01,
    LinkDown = 0x02,
    TransferStart = 0x03,
    TransferDone = 0x04,
    TransferError = 0x05,
}

impl HostStatus {
    pub fn from_u8(v: u8) -> Result<Self, ProtocolError> {
        match v {
            0x01 => Ok(Self::LinkUp),
            0x02 => Ok(Self::LinkDown),
            0x03 => Ok(Self::TransferStart),
            0x04 => Ok(Self::TransferDone),
            0x05 => Ok(Self::TransferError),
            other => Err(ProtocolError::UnknownHostStatus(other)),
        }
    }
}

/// XOR of `msg_type`, both length bytes, and the payload.
fn checksum(msg_type: u8, len: u16, payload: &[u8]) -> u8 {
    let mut c = msg_type ^ (len & 0xFF) as u8 ^ (len >> 8) as u8;
    for &b in payload {
        c ^= b;
    }
    c
}

/// Builds a complete uplink frame.
pub fn encode_frame(msg_type: MsgType, payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    if payload.len() > MAX_FRAME_PAYLOAD {
        return Err(ProtocolError::PayloadTooLarge {
            len: payload.len(),
            max: MAX_FRAME_PAYLOAD,
        });
    }
    let len = payload.len() as u16;
    let mut frame = Vec::with_capacity(FRAME_OVERHEAD + payload.len());
    frame.push(FRAME_START);
    frame.push(msg_type as u8);
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(payload);
    frame.push(checksum(msg_type as u8, len, payload));
    Ok(frame)
}

/// One decoded uplink frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub msg_type: MsgType,
    pub payload: Vec<u8>,
}

/// Decodes exactly one frame from the start of `data`.
///
/// Returns the frame and the number of bytes it occupied. Unlike
/// [`FrameParser`] this is strict: the input must begin with the start
/// byte, and any length or checksum violation is a typed error rather
/// than a resync.
pub fn decode_frame(data: &[u8]) -> Result<(Frame, usize), ProtocolError> {
    if data.len() < FRAME_OVERHEAD {
        return Err(ProtocolError::Truncated {
            need: FRAME_OVERHEAD,
            have: data.len(),
        });
    }
    if data[0] != FRAME_START {
        return Err(ProtocolError::BadStartByte(data[0]));
    }
    let len = u16::from_le_bytes([data[2], data[3]]) as usize;
    if len > MAX_FRAME_PAYLOAD {
        return Err(ProtocolError::PayloadTooLarge {
            len,
            max: MAX_FRAME_PAYLOAD,
        });
    }
    let total = 4 + len + 1;
    if data.len() < total {
        return Err(ProtocolError::Truncated {
            need: total,
            have: data.len(),
        });
    }
    let payload = &data[4..4 + len];
    let got = data[total - 1];
    let expected = checksum(data[1], len as u16, payload);
    if got != expected {
        return Err(ProtocolError::ChecksumMismatch { got, expected });
    }
    let msg_type = MsgType::from_u8(data[1])?;
    Ok((
        Frame {
            msg_type,
            payload: payload.to_vec(),
        },
        total,
    ))
}

// ---------------------------------------------------------------------------
// Incremental host-side parser
// ---------------------------------------------------------------------------

/// Incremental frame parser with start-byte resynchronization.
///
/// Feed arbitrary byte slices with [`push`](Self::push); complete frames
/// come back in arrival order. Any framing violation (length over the
/// maximum, unknown type, bad checksum) discards the offending frame and
/// rescans from the next start byte, so the parser never gets stuck on
/// noise.
#[derive(Debug, Default)]
pub struct FrameParser {
    buf: Vec<u8>,
    /// Frames dropped to checksum/length/type violations since creation.
    rejected: u64,
}

impl FrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of frames discarded due to framing violations.
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Appends raw bytes and returns every frame completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Frame> {
        self.buf.extend_from_slice(bytes);
        let mut frames = Vec::new();

        loop {
            // Drop noise in front of the next start byte.
            match self.buf.iter().position(|&b| b == FRAME_START) {
                Some(0) => {}
                Some(n) => {
                    self.buf.drain(..n);
                }
                None => {
                    self.buf.clear();
                    break;
                }
            }

            if self.buf.len() < 4 {
                break; // header incomplete
            }
            let len = u16::from_le_bytes([self.buf[2], self.buf[3]]) as usize;
            if len > MAX_FRAME_PAYLOAD {
                self.rejected += 1;
                self.resync();
                continue;
            }
            let total = 4 + len + 1;
            if self.buf.len() < total {
                break; // payload incomplete
            }

            let msg_type_byte = self.buf[1];
            let payload = &self.buf[4..4 + len];
            let got = self.buf[total - 1];
            let expected = checksum(msg_type_byte, len as u16, payload);

            if got != expected {
                self.rejected += 1;
                self.resync();
                continue;
            }

            match MsgType::from_u8(msg_type_byte) {
                Ok(msg_type) => {
                    frames.push(Frame {
                        msg_type,
                        payload: payload.to_vec(),
                    });
                    self.buf.drain(..total);
                }
                Err(_) => {
                    self.rejected += 1;
                    self.resync();
                }
            }
        }

        frames
    }

    /// Skips the current start byte so the scan resumes at the next one.
    fn resync(&mut self) {
        self.buf.drain(..1);
    }
}

// ---------------------------------------------------------------------------
// Cut record
// ---------------------------------------------------------------------------

/// Packed length of a [`CutRecord`] on the wire.
pub const CUT_RECORD_LEN: usize = 21;

/// One cut event, packed little-endian into 21 bytes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CutRecord {
    pub sequence_id: u32,
    /// Unix epoch seconds.
    pub timestamp: u32,
    pub latitude: f32,
    pub longitude: f32,
    /// Cutting force in kg; the host converts to Newtons.
    pub force: f32,
    /// GPS fix quality.
    pub fix_type: u8,
}

impl CutRecord {
    pub fn encode(&self) -> [u8; CUT_RECORD_LEN] {
        let mut buf = [0u8; CUT_RECORD_LEN];
        buf[0..4].copy_from_slice(&self.sequence_id.to_le_bytes());
        buf[4..8].copy_from_slice(&self.timestamp.to_le_bytes());
        buf[8..12].copy_from_slice(&self.latitude.to_le_bytes());
        buf[12..16].copy_from_slice(&self.longitude.to_le_bytes());
        buf[16..20].copy_from_slice(&self.force.to_le_bytes());
        buf[20] = self.fix_type;
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < CUT_RECORD_LEN {
            return Err(ProtocolError::Truncated {
                need: CUT_RECORD_LEN,
                have: data.len(),
            });
        }
        Ok(Self {
            sequence_id: u32::from_le_bytes(data[0..4].try_into().unwrap()),
            timestamp: u32::from_le_bytes(data[4..8].try_into().unwrap()),
            latitude: f32::from_le_bytes(data[8..12].try_into().unwrap()),
            longitude: f32::from_le_bytes(data[12..16].try_into().unwrap()),
            force: f32::from_le_bytes(data[16..20].try_into().unwrap()),
            fix_type: data[20],
        })
    }
}
