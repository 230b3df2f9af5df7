//! Wire formats shared by the shears, the base, and the host.
//!
//! Three framings live here, used at different layers of the chain:
//!
//! - [`control`]: single-opcode command/status messages exchanged on the
//!   radio control channel (base ↔ shears).
//! - [`chunk`]: the 2-byte-indexed file chunk carried by radio data
//!   notifications (shears → base).
//! - [`uplink`]: the checksummed serial frame the base writes to the
//!   host (base → host), including the packed cut-record payload.
//!
//! Everything in this crate is a pure codec: no I/O, no state beyond the
//! incremental [`uplink::FrameParser`].

pub mod chunk;
pub mod control;
pub mod uplink;

/// Errors produced while encoding or decoding protocol frames.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("message truncated: need {need} bytes, have {have}")]
    Truncated { need: usize, have: usize },

    #[error("unknown opcode 0x{0:02X}")]
    UnknownOpcode(u8),

    #[error("unknown status code 0x{0:02X}")]
    UnknownStatus(u8),

    #[error("unknown message type 0x{0:02X}")]
    UnknownMsgType(u8),

    #[error("missing start byte: got 0x{0:02X}")]
    BadStartByte(u8),

    #[error("unknown host status code 0x{0:02X}")]
    UnknownHostStatus(u8),

    #[error("invalid basename: {0}")]
    InvalidBasename(&'static str),

    #[error("payload too large: {len} bytes (max {max})")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("checksum mismatch: got 0x{got:02X}, expected 0x{expected:02X}")]
    ChecksumMismatch { got: u8, expected: u8 },

    #[error("chunk index space exhausted")]
    ChunkIndexExhausted,
}
