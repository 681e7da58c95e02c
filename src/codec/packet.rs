//! Control packet: fixed header + optional variable header + optional payload

use std::fmt;

use bytes::{Bytes, BytesMut};

use super::{hex, read_u16, FixedHeader, Payload, VariableHeader};
use crate::protocol::{DecodeError, EncodeError, PacketType, QoS};

/// MQTT control packet
///
/// Built right before it is encoded, or right after a frame is decoded; a
/// packet is never reused across exchanges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub header: FixedHeader,
    pub variable_header: Option<VariableHeader>,
    pub payload: Option<Payload>,
}

impl Packet {
    pub fn new(header: FixedHeader) -> Self {
        Self {
            header,
            variable_header: None,
            payload: None,
        }
    }

    pub fn with_variable_header(mut self, variable_header: VariableHeader) -> Self {
        self.variable_header = Some(variable_header);
        self
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = Some(payload);
        self
    }

    /// PUBLISH carrying `message` as raw bytes
    pub fn publish(
        topic: &str,
        packet_id: Option<u16>,
        message: impl Into<Bytes>,
        qos: QoS,
        dup: bool,
        retain: bool,
    ) -> Self {
        Packet::new(FixedHeader::publish(qos, dup, retain))
            .with_variable_header(VariableHeader::publish(topic, packet_id))
            .with_payload(Payload::message(message))
    }

    pub fn puback(packet_id: u16) -> Self {
        Packet::new(FixedHeader::puback()).with_variable_header(VariableHeader::PacketId(packet_id))
    }

    pub fn pubrec(packet_id: u16) -> Self {
        Packet::new(FixedHeader::pubrec()).with_variable_header(VariableHeader::PacketId(packet_id))
    }

    pub fn pubrel(packet_id: u16) -> Self {
        Packet::new(FixedHeader::pubrel()).with_variable_header(VariableHeader::PacketId(packet_id))
    }

    pub fn pubcomp(packet_id: u16) -> Self {
        Packet::new(FixedHeader::pubcomp())
            .with_variable_header(VariableHeader::PacketId(packet_id))
    }

    pub fn subscribe(packet_id: u16, topic: &str, qos: QoS) -> Self {
        Packet::new(FixedHeader::subscribe())
            .with_variable_header(VariableHeader::PacketId(packet_id))
            .with_payload(Payload::new().with_string(topic).with_qos(qos as u8))
    }

    pub fn suback(packet_id: u16, granted_qos: u8) -> Self {
        Packet::new(FixedHeader::suback())
            .with_variable_header(VariableHeader::PacketId(packet_id))
            .with_payload(Payload::qos_only(granted_qos))
    }

    pub fn unsubscribe(packet_id: u16, topic: &str) -> Self {
        Packet::new(FixedHeader::unsubscribe())
            .with_variable_header(VariableHeader::PacketId(packet_id))
            .with_payload(Payload::new().with_string(topic))
    }

    pub fn unsuback(packet_id: u16) -> Self {
        Packet::new(FixedHeader::unsuback())
            .with_variable_header(VariableHeader::PacketId(packet_id))
    }

    /// CONNACK with session-present flag and return code as a raw variable header
    pub fn connack(session_present: bool, return_code: u8) -> Self {
        Packet::new(FixedHeader::connack()).with_variable_header(VariableHeader::Generic(
            Bytes::copy_from_slice(&[session_present as u8, return_code]),
        ))
    }

    pub fn pingreq() -> Self {
        Packet::new(FixedHeader::pingreq())
    }

    pub fn pingresp() -> Self {
        Packet::new(FixedHeader::pingresp())
    }

    pub fn disconnect() -> Self {
        Packet::new(FixedHeader::disconnect())
    }

    pub fn packet_type(&self) -> Option<PacketType> {
        self.header.packet_type()
    }

    pub fn packet_id(&self) -> Option<u16> {
        self.variable_header.as_ref().and_then(|vh| vh.packet_id())
    }

    /// CONNACK session-present flag
    pub fn session_present(&self) -> Option<bool> {
        match self.variable_header {
            Some(VariableHeader::Generic(ref raw)) if raw.len() == 2 => Some(raw[0] & 0x01 != 0),
            _ => None,
        }
    }

    /// CONNACK return code byte
    pub fn return_code(&self) -> Option<u8> {
        match self.variable_header {
            Some(VariableHeader::Generic(ref raw)) if raw.len() == 2 => Some(raw[1]),
            _ => None,
        }
    }

    /// Granted QoS byte of a SUBACK
    pub fn granted_qos(&self) -> Option<u8> {
        self.payload.as_ref().and_then(|p| p.qos())
    }

    /// Encode the packet, recomputing the remaining length from the
    /// variable header and payload first.
    pub fn encode(&mut self, buf: &mut BytesMut) -> Result<(), EncodeError> {
        let vh_len = self.variable_header.as_ref().map_or(0, |vh| vh.len());
        let p_len = self.payload.as_ref().map_or(0, |p| p.len());
        self.header.set_remaining_length(vh_len + p_len);

        buf.reserve(self.header.encoded_len() + vh_len + p_len);
        self.header.encode(buf)?;
        if let Some(ref vh) = self.variable_header {
            vh.encode(buf)?;
        }
        if let Some(ref payload) = self.payload {
            payload.encode(buf)?;
        }
        Ok(())
    }

    pub fn to_bytes(&mut self) -> Result<Bytes, EncodeError> {
        let mut buf = BytesMut::new();
        self.encode(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Decode one complete packet from `buf`.
    ///
    /// Only the packets a client receives as responses are handled here:
    /// CONNACK, the four PUBLISH acknowledgements, SUBACK, UNSUBACK and
    /// PINGRESP (plus header-only PINGREQ and DISCONNECT). Inbound PUBLISH
    /// frames go through [`crate::codec::InboundPublish`].
    pub fn decode(buf: &[u8]) -> Result<Packet, DecodeError> {
        let (header_len, header) = FixedHeader::decode(buf)?;
        let end = header_len + header.remaining_length();
        if buf.len() < end {
            return Err(DecodeError::InsufficientData);
        }
        let body = &buf[header_len..end];

        let packet_type = header
            .packet_type()
            .ok_or(DecodeError::InvalidPacketType(header.control() >> 4))?;

        let expected_flags = packet_type.control_byte() & 0x0F;
        if packet_type != PacketType::Publish && header.flags() != expected_flags {
            return Err(DecodeError::InvalidFlags);
        }

        let packet = match packet_type {
            PacketType::ConnAck => {
                if body.len() < 2 {
                    return Err(DecodeError::InsufficientData);
                }
                Packet::new(header).with_variable_header(VariableHeader::Generic(
                    Bytes::copy_from_slice(&body[..2]),
                ))
            }
            PacketType::PubAck
            | PacketType::PubRec
            | PacketType::PubRel
            | PacketType::PubComp
            | PacketType::UnsubAck => {
                let id = read_u16(body)?;
                Packet::new(header).with_variable_header(VariableHeader::PacketId(id))
            }
            PacketType::SubAck => {
                let id = read_u16(body)?;
                let granted = *body.get(2).ok_or(DecodeError::InsufficientData)?;
                Packet::new(header)
                    .with_variable_header(VariableHeader::PacketId(id))
                    .with_payload(Payload::qos_only(granted))
            }
            PacketType::PingReq | PacketType::PingResp | PacketType::Disconnect => {
                Packet::new(header)
            }
            other => return Err(DecodeError::UnsupportedPacketType(other)),
        };

        Ok(packet)
    }

    /// Human-readable dump of every layer, for diagnostics only
    pub fn debug_render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self
            .packet_type()
            .map(|t| t.to_string())
            .unwrap_or_else(|| format!("0x{:02x}", self.header.control()));

        let mut header = BytesMut::new();
        let header_hex = match self.header.encode(&mut header) {
            Ok(()) => hex(&header),
            Err(e) => e.to_string(),
        };

        writeln!(f, "======== {} ========", name)?;
        writeln!(f, "-- header --")?;
        writeln!(f, "{}", self.header)?;
        writeln!(f, "len: {} bytes", self.header.encoded_len())?;
        writeln!(f, "hex: {}", header_hex)?;

        writeln!(f, "-- variable header --")?;
        match self.variable_header {
            Some(ref vh) => {
                writeln!(f, "{}", vh)?;
                writeln!(f, "len: {} bytes", vh.len())?;
                if let Ok(bytes) = vh.to_bytes() {
                    writeln!(f, "hex: {}", hex(&bytes))?;
                }
            }
            None => writeln!(f, "no variable header")?,
        }

        writeln!(f, "-- payload --")?;
        match self.payload {
            Some(ref payload) => {
                writeln!(f, "{}", payload)?;
                writeln!(f, "len: {} bytes", payload.len())?;
                if let Ok(bytes) = payload.to_bytes() {
                    write!(f, "hex: {}", hex(&bytes))?;
                }
            }
            None => write!(f, "no payload")?,
        }
        Ok(())
    }
}
