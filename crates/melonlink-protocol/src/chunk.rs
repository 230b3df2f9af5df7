//! Data-channel chunk framing (shears → base).
//!
//! # Wire format
//!
//! ```text
//! [chunk_index:2 LE][payload...]
//! ```
//!
//! One chunk travels per notification. The payload length is the link's
//! maximum attribute size minus the 2-byte header, capped at
//! [`MAX_CHUNK_PAYLOAD`]. There is no CRC at this layer; the radio link
//! already checks integrity per packet.

use crate::ProtocolError;

/// Bytes of header in front of every chunk payload.
pub const CHUNK_HEADER_LEN: usize = 2;

/// Hard cap on payload bytes per chunk, regardless of the link MTU.
pub const MAX_CHUNK_PAYLOAD: usize = 160;

/// Number of distinct chunk indices the 16-bit counter can express.
pub const CHUNK_INDEX_SPACE: u64 = u16::MAX as u64 + 1;

/// Payload size usable on a link with the given maximum attribute size.
///
/// Returns `None` when the link cannot carry even one payload byte past
/// the header.
pub fn payload_size_for(max_attribute_size: usize) -> Option<usize> {
    let usable = max_attribute_size.checked_sub(CHUNK_HEADER_LEN)?;
    if usable == 0 {
        return None;
    }
    Some(usable.min(MAX_CHUNK_PAYLOAD))
}

/// Number of chunks a file of `file_size` bytes needs at `payload_size`
/// bytes per chunk, or an error if the 16-bit index space cannot cover it.
pub fn chunk_count(file_size: u64, payload_size: usize) -> Result<u64, ProtocolError> {
    let count = file_size.div_ceil(payload_size as u64);
    if count > CHUNK_INDEX_SPACE {
        return Err(ProtocolError::ChunkIndexExhausted);
    }
    Ok(count)
}

/// Builds one chunk notification: index header followed by the payload.
pub fn encode_chunk(index: u16, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(CHUNK_HEADER_LEN + payload.len());
    buf.extend_from_slice(&index.to_le_bytes());
    buf.extend_from_slice(payload);
    buf
}

/// Splits a data-channel notification into chunk index and payload.
///
/// A chunk must carry at least one payload byte; the server never emits
/// an empty chunk.
pub fn decode_chunk(data: &[u8]) -> Result<(u16, &[u8]), ProtocolError> {
    if data.len() < CHUNK_HEADER_LEN + 1 {
        return Err(ProtocolError::Truncated {
            need: CHUNK_HEADER_LEN + 1,
            have: data.len(),
        });
    }
    let index = u16::from_le_bytes([data[0], data[1]]);
    Ok((index, &data[CHUNK_HEADER_LEN..]))
}
