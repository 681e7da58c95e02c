//! MQTT Packet Codec
//!
//! Layered encoding for MQTT v3.1.1 control packets: the fixed header with its
//! remaining-length varint, the per-type variable header, the payload, and the
//! [`Packet`] that composes them. Inbound byte streams are split into whole
//! frames by [`FrameBuffer`].

mod frame;
mod header;
mod packet;
mod payload;
mod variable_header;

#[cfg(test)]
mod tests;

pub use frame::{Frame, FrameBuffer, InboundPublish};
pub use header::FixedHeader;
pub use packet::Packet;
pub use payload::Payload;
pub use variable_header::VariableHeader;

use bytes::{BufMut, BytesMut};

use crate::protocol::{DecodeError, EncodeError};

/// Maximum remaining length (268,435,455 bytes = ~256 MB)
pub const MAX_REMAINING_LENGTH: usize = 268_435_455;

/// Write a Variable Byte Integer to buffer
/// Returns bytes written
#[inline]
pub fn write_variable_int(buf: &mut BytesMut, mut value: usize) -> Result<usize, EncodeError> {
    if value > MAX_REMAINING_LENGTH {
        return Err(EncodeError::PacketTooLarge);
    }

    let mut count = 0;
    loop {
        let mut byte = (value % 128) as u8;
        value /= 128;
        if value > 0 {
            byte |= 0x80;
        }
        buf.put_u8(byte);
        count += 1;
        if value == 0 {
            break;
        }
    }
    Ok(count)
}

/// Encode a remaining length into its 1-4 byte form
pub fn encode_variable_int(value: usize) -> Result<Vec<u8>, EncodeError> {
    let mut buf = BytesMut::with_capacity(4);
    write_variable_int(&mut buf, value)?;
    Ok(buf.to_vec())
}

/// Read a Variable Byte Integer from buffer
/// Returns (bytes_consumed, value) or error
#[inline]
pub fn read_variable_int(buf: &[u8]) -> Result<(usize, usize), DecodeError> {
    let mut multiplier: usize = 1;
    let mut value: usize = 0;
    let mut pos = 0;

    loop {
        if pos >= 4 {
            return Err(DecodeError::MalformedLength);
        }
        if pos >= buf.len() {
            return Err(DecodeError::InsufficientData);
        }

        let byte = buf[pos];
        value += ((byte & 0x7F) as usize) * multiplier;
        pos += 1;

        if (byte & 0x80) == 0 {
            break;
        }

        multiplier *= 128;
    }

    Ok((pos, value))
}

/// Calculate the number of bytes needed to encode a Variable Byte Integer
#[inline]
pub fn variable_int_len(value: usize) -> usize {
    if value < 128 {
        1
    } else if value < 16_384 {
        2
    } else if value < 2_097_152 {
        3
    } else {
        4
    }
}

/// Two Byte Integer, big-endian
#[inline]
pub fn u16_to_bytes(value: u16) -> [u8; 2] {
    value.to_be_bytes()
}

/// Read a Two Byte Integer (u16 big-endian)
#[inline]
pub fn read_u16(buf: &[u8]) -> Result<u16, DecodeError> {
    if buf.len() < 2 {
        return Err(DecodeError::InsufficientData);
    }
    Ok(u16::from_be_bytes([buf[0], buf[1]]))
}

/// Encoded size of a length-prefixed string
#[inline]
pub fn string_len(s: &str) -> usize {
    2 + s.len()
}

/// Write a UTF-8 encoded string
#[inline]
pub fn write_string(buf: &mut BytesMut, s: &str) -> Result<(), EncodeError> {
    let len = s.len();
    if len > 65535 {
        return Err(EncodeError::StringTooLong);
    }
    buf.put_u16(len as u16);
    buf.put_slice(s.as_bytes());
    Ok(())
}

/// Encode a string into its length-prefixed form
pub fn encode_string(s: &str) -> Result<Vec<u8>, EncodeError> {
    let mut buf = BytesMut::with_capacity(string_len(s));
    write_string(&mut buf, s)?;
    Ok(buf.to_vec())
}

/// Read a UTF-8 encoded string
/// Returns (bytes_consumed, string) or error
#[inline]
pub fn read_string(buf: &[u8]) -> Result<(usize, &str), DecodeError> {
    let len = read_u16(buf)? as usize;
    let total_len = 2 + len;

    if buf.len() < total_len {
        return Err(DecodeError::InsufficientData);
    }

    let s = std::str::from_utf8(&buf[2..total_len]).map_err(|_| DecodeError::InvalidUtf8)?;
    Ok((total_len, s))
}

/// Render bytes as space separated hex, used by packet dumps
pub(crate) fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
