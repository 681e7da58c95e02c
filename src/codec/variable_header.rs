//! Variable header variants

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use super::{hex, string_len, write_string};
use crate::protocol::EncodeError;

/// Variable header of a control packet
///
/// `PacketId` serves SUBSCRIBE, UNSUBSCRIBE and every acknowledgement that only
/// carries an identifier. `Generic` keeps raw bytes, used for CONNACK's
/// session-present flag and return code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariableHeader {
    Connect {
        protocol_name: String,
        protocol_level: u8,
        connect_flags: u8,
        keep_alive: u16,
    },
    Publish {
        topic_name: String,
        /// Present only for QoS > 0
        packet_id: Option<u16>,
    },
    PacketId(u16),
    Generic(Bytes),
}

impl VariableHeader {
    pub fn connect(
        protocol_name: impl Into<String>,
        protocol_level: u8,
        connect_flags: u8,
        keep_alive: u16,
    ) -> Self {
        VariableHeader::Connect {
            protocol_name: protocol_name.into(),
            protocol_level,
            connect_flags,
            keep_alive,
        }
    }

    pub fn publish(topic_name: impl Into<String>, packet_id: Option<u16>) -> Self {
        VariableHeader::Publish {
            topic_name: topic_name.into(),
            packet_id,
        }
    }

    /// Packet identifier carried by this header, if any
    pub fn packet_id(&self) -> Option<u16> {
        match self {
            VariableHeader::PacketId(id) => Some(*id),
            VariableHeader::Publish { packet_id, .. } => *packet_id,
            _ => None,
        }
    }

    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), EncodeError> {
        match self {
            VariableHeader::Connect {
                protocol_name,
                protocol_level,
                connect_flags,
                keep_alive,
            } => {
                write_string(buf, protocol_name)?;
                buf.put_u8(*protocol_level);
                buf.put_u8(*connect_flags);
                buf.put_u16(*keep_alive);
            }
            VariableHeader::Publish {
                topic_name,
                packet_id,
            } => {
                write_string(buf, topic_name)?;
                if let Some(id) = packet_id {
                    buf.put_u16(*id);
                }
            }
            VariableHeader::PacketId(id) => buf.put_u16(*id),
            VariableHeader::Generic(raw) => buf.put_slice(raw),
        }
        Ok(())
    }

    /// Encoded size, derived from the current content
    pub fn len(&self) -> usize {
        match self {
            VariableHeader::Connect { protocol_name, .. } => string_len(protocol_name) + 4,
            VariableHeader::Publish {
                topic_name,
                packet_id,
            } => string_len(topic_name) + if packet_id.is_some() { 2 } else { 0 },
            VariableHeader::PacketId(_) => 2,
            VariableHeader::Generic(raw) => raw.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_bytes(&self) -> Result<Bytes, EncodeError> {
        let mut buf = BytesMut::with_capacity(self.len());
        self.encode(&mut buf)?;
        Ok(buf.freeze())
    }
}

impl fmt::Display for VariableHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariableHeader::Connect {
                protocol_name,
                protocol_level,
                connect_flags,
                keep_alive,
            } => write!(
                f,
                "protocol: {}\nlevel: {}\nflags: {:08b}\nkeep alive: {}",
                protocol_name, protocol_level, connect_flags, keep_alive
            ),
            VariableHeader::Publish {
                topic_name,
                packet_id: Some(id),
            } => write!(f, "topic: {}\npacket id: {}", topic_name, id),
            VariableHeader::Publish {
                topic_name,
                packet_id: None,
            } => write!(f, "topic: {}", topic_name),
            VariableHeader::PacketId(id) => write!(f, "packet id: {}", id),
            VariableHeader::Generic(raw) => write!(f, "raw: {}", hex(raw)),
        }
    }
}
