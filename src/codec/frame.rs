//! Inbound framing
//!
//! Bytes read from the transport accumulate in a [`FrameBuffer`] until a whole
//! control packet (fixed header + remaining length) is available. Reads may
//! split a packet or carry several at once.

use bytes::{Buf, Bytes, BytesMut};

use super::{read_string, read_u16, FixedHeader, Packet};
use crate::protocol::{DecodeError, PacketType, QoS};

/// One complete control packet as raw bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    header: FixedHeader,
    header_len: usize,
    bytes: Bytes,
}

impl Frame {
    pub fn header(&self) -> &FixedHeader {
        &self.header
    }

    pub fn packet_type(&self) -> Option<PacketType> {
        self.header.packet_type()
    }

    pub fn as_bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Bytes after the fixed header
    pub fn body(&self) -> &[u8] {
        &self.bytes[self.header_len..]
    }

    /// Decode as a response packet
    pub fn decode(&self) -> Result<Packet, DecodeError> {
        Packet::decode(&self.bytes)
    }
}

/// Accumulates transport reads and yields whole frames
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: BytesMut,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(1024),
        }
    }

    /// Buffer that reads land in
    pub fn read_buf(&mut self) -> &mut BytesMut {
        &mut self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Take the next complete frame, or `None` if more bytes are needed
    pub fn next_frame(&mut self) -> Result<Option<Frame>, DecodeError> {
        let (header_len, header) = match FixedHeader::decode(&self.buf) {
            Ok(r) => r,
            Err(DecodeError::InsufficientData) => return Ok(None),
            Err(e) => return Err(e),
        };

        let total_len = header_len + header.remaining_length();
        if self.buf.len() < total_len {
            return Ok(None);
        }

        let bytes = self.buf.split_to(total_len).freeze();
        Ok(Some(Frame {
            header,
            header_len,
            bytes,
        }))
    }
}

/// Application message delivered by the server in a PUBLISH frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundPublish {
    pub topic: String,
    pub packet_id: Option<u16>,
    pub payload: Bytes,
    pub qos: QoS,
    pub dup: bool,
    pub retain: bool,
}

impl InboundPublish {
    /// Parse a PUBLISH frame: topic string, packet identifier when QoS > 0,
    /// and the rest of the frame as the message body.
    pub fn parse(frame: &Frame) -> Result<Self, DecodeError> {
        let header = frame.header();
        if header.packet_type() != Some(PacketType::Publish) {
            return Err(DecodeError::InvalidPacketType(header.control() >> 4));
        }
        let qos = header.qos().ok_or(DecodeError::InvalidFlags)?;

        let mut body = frame.as_bytes().slice(frame.header_len..);
        let (topic_len, topic) = read_string(&body)?;
        let topic = topic.to_string();
        body.advance(topic_len);

        let packet_id = if qos != QoS::AtMostOnce {
            let id = read_u16(&body)?;
            body.advance(2);
            Some(id)
        } else {
            None
        };

        Ok(Self {
            topic,
            packet_id,
            payload: body,
            qos,
            dup: header.dup(),
            retain: header.retain(),
        })
    }
}
