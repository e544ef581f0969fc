//! Fixed preamble shared by requests and responses.
//!
//! Every message starts with the same 15 bytes, all integers big-endian:
//!
//! ```text
//! [headerLen:4][bodyLen:4][requestId:4][version:1][compression:1][serializer:1]
//! ```
//!
//! `headerLen` counts the preamble plus the variable header that follows it,
//! `bodyLen` counts the payload after the header.

use super::error::{MinirpcError, Result};

/// Length of the fixed preamble in bytes.
pub const PREAMBLE_LEN: usize = 15;

/// Protocol version written by this implementation.
pub const PROTOCOL_VERSION: u8 = 1;

/// Compression byte value meaning "not compressed" (the only one in use).
pub const COMPRESSION_NONE: u8 = 0;

pub(crate) const FIELD_SEPARATOR: u8 = b'\n';
pub(crate) const PAIR_SEPARATOR: u8 = b'\r';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Preamble {
    pub header_len: u32,
    pub body_len: u32,
    pub request_id: u32,
    pub version: u8,
    pub compression: u8,
    pub serializer: u8,
}

impl Preamble {
    pub(crate) fn write(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.header_len.to_be_bytes());
        buf.extend_from_slice(&self.body_len.to_be_bytes());
        buf.extend_from_slice(&self.request_id.to_be_bytes());
        buf.push(self.version);
        buf.push(self.compression);
        buf.push(self.serializer);
    }

    fn read(data: &[u8]) -> Result<Self> {
        if data.len() < PREAMBLE_LEN {
            return Err(MinirpcError::MalformedMessage(format!(
                "message is {} bytes, shorter than the {}-byte preamble",
                data.len(),
                PREAMBLE_LEN
            )));
        }

        Ok(Self {
            header_len: read_u32(&data[0..4]),
            body_len: read_u32(&data[4..8]),
            request_id: read_u32(&data[8..12]),
            version: data[12],
            compression: data[13],
            serializer: data[14],
        })
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    u32::from_be_bytes(buf)
}

/// Splits an encoded message into its preamble, variable header and payload.
///
/// Every offset is checked against the input so truncated or inconsistent
/// messages fail with `MalformedMessage` instead of reading out of bounds.
pub(crate) fn split_message(data: &[u8], min_header_len: usize) -> Result<(Preamble, &[u8], &[u8])> {
    let preamble = Preamble::read(data)?;
    let header_len = preamble.header_len as usize;
    let body_len = preamble.body_len as usize;

    if header_len < min_header_len {
        return Err(MinirpcError::MalformedMessage(format!(
            "header length {} is below the minimum of {}",
            header_len, min_header_len
        )));
    }

    let total = header_len
        .checked_add(body_len)
        .ok_or_else(|| MinirpcError::MalformedMessage("message length overflows".to_string()))?;
    if total != data.len() {
        return Err(MinirpcError::MalformedMessage(format!(
            "header length {} + body length {} does not match message size {}",
            header_len,
            body_len,
            data.len()
        )));
    }

    Ok((preamble, &data[PREAMBLE_LEN..header_len], &data[header_len..]))
}

/// Takes bytes up to the next field separator, returning them and the rest
/// after the separator.
pub(crate) fn take_field<'a>(header: &'a [u8], what: &str) -> Result<(&'a [u8], &'a [u8])> {
    let index = header
        .iter()
        .position(|&b| b == FIELD_SEPARATOR)
        .ok_or_else(|| MinirpcError::MalformedMessage(format!("missing separator after {}", what)))?;
    Ok((&header[..index], &header[index + 1..]))
}

pub(crate) fn utf8_field(bytes: &[u8], what: &str) -> Result<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|_| MinirpcError::MalformedMessage(format!("{} is not valid UTF-8", what)))
}

/// Rejects messages that a peer's frame reader would refuse.
pub(crate) fn check_frame_size(header_len: usize, body_len: usize) -> Result<()> {
    let max = crate::transport::MAX_FRAME_SIZE;
    match header_len.checked_add(body_len) {
        Some(total) if total <= max => Ok(()),
        total => Err(MinirpcError::MalformedMessage(format!(
            "Frame too large: {} bytes (max {} bytes)",
            total.map_or_else(|| "more than usize::MAX".to_string(), |t| t.to_string()),
            max
        ))),
    }
}

pub(crate) fn to_wire_len(len: usize, what: &str) -> Result<u32> {
    u32::try_from(len)
        .map_err(|_| MinirpcError::MalformedMessage(format!("{} of {} bytes does not fit the length field", what, len)))
}
