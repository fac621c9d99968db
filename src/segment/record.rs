//! Record frame format for the segment log.
//!
//! Each record consists of:
//! - Data length (4 bytes, little-endian): length of the value payload
//! - Metadata length (4 bytes, little-endian): length of the metadata payload
//! - Metadata (variable): serialized record metadata
//! - Data (variable): serialized value
//! - Trailer (2 bytes): fixed sentinel `[0xC0, 0x80]`
//!
//! The trailer sentinel lets a sequential scanner tell "end of file" (nothing
//! left to read at the header) apart from a truncated or corrupt record
//! (non-sentinel trailer) without a separate record-count or index file.

use crate::error::{Error, Result};
use bytes::{BufMut, Bytes, BytesMut};

/// Size of the record header (data length + metadata length).
pub const HEADER_SIZE: usize = 8;

/// Fixed two-byte sentinel terminating every record.
pub const TRAILER: [u8; 2] = [0xC0, 0x80];

/// Size of the trailer sentinel.
pub const TRAILER_SIZE: usize = 2;

/// A decoded record read back from the log.
#[derive(Debug, Clone)]
pub struct Segment {
    /// The value payload.
    pub data: Bytes,
    /// The metadata payload.
    pub metadata: Bytes,
    /// Total bytes the record occupies on disk, header and trailer included.
    ///
    /// Callers chaining sequential reads advance their cursor by this amount
    /// without re-parsing the header.
    pub bytes_read: u64,
}

/// Total on-disk size of a record with the given payload lengths.
pub fn frame_size(data_len: usize, metadata_len: usize) -> u64 {
    (HEADER_SIZE + metadata_len + data_len + TRAILER_SIZE) as u64
}

/// Encode a `(data, metadata)` pair into a record frame.
pub fn encode(data: &[u8], metadata: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(frame_size(data.len(), metadata.len()) as usize);

    buf.put_u32_le(data.len() as u32);
    buf.put_u32_le(metadata.len() as u32);
    buf.put_slice(metadata);
    buf.put_slice(data);
    buf.put_slice(&TRAILER);

    buf.to_vec()
}

/// Parse the payload lengths out of an 8-byte record header.
pub fn decode_header(header: &[u8; HEADER_SIZE]) -> (usize, usize) {
    let data_len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
    let metadata_len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;
    (data_len, metadata_len)
}

/// Decode the body region following a record header.
///
/// `body` must hold exactly `metadata_len + data_len + TRAILER_SIZE` bytes.
/// Fails with [`Error::Corruption`] if the trailing two bytes are not the
/// sentinel. `offset` is the record's starting position, used for diagnostics.
pub fn decode_body(
    body: Vec<u8>,
    data_len: usize,
    metadata_len: usize,
    offset: u64,
) -> Result<Segment> {
    let expected = metadata_len + data_len + TRAILER_SIZE;
    if body.len() != expected {
        return Err(Error::corruption(format!(
            "record body truncated at offset {}: expected {} bytes, got {}",
            offset,
            expected,
            body.len()
        )));
    }

    if body[expected - TRAILER_SIZE..] != TRAILER {
        return Err(Error::corruption(format!(
            "trailer sentinel missing in record at offset {}",
            offset
        )));
    }

    let mut body = Bytes::from(body);
    let metadata = body.split_to(metadata_len);
    let data = body.split_to(data_len);

    Ok(Segment {
        data,
        metadata,
        bytes_read: frame_size(data_len, metadata_len),
    })
}
