//! Fixed header: control byte plus the remaining-length varint

use std::fmt;

use bytes::{BufMut, BytesMut};

use super::{read_variable_int, variable_int_len, write_variable_int};
use crate::protocol::{publish_flags, DecodeError, EncodeError, PacketType, QoS};

/// MQTT fixed header
///
/// The remaining length is only meaningful once [`FixedHeader::set_remaining_length`]
/// has been called; [`crate::codec::Packet::encode`] does this from the encoded sizes
/// of the variable header and payload right before writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedHeader {
    control: u8,
    remaining_length: usize,
}

impl FixedHeader {
    /// Header with the given control byte and no remaining length yet
    pub fn new(control: u8) -> Self {
        Self {
            control,
            remaining_length: 0,
        }
    }

    pub fn for_type(packet_type: PacketType) -> Self {
        Self::new(packet_type.control_byte())
    }

    pub fn connect() -> Self {
        Self::for_type(PacketType::Connect)
    }

    pub fn connack() -> Self {
        Self::for_type(PacketType::ConnAck)
    }

    /// PUBLISH header with QoS, DUP and RETAIN bits
    pub fn publish(qos: QoS, dup: bool, retain: bool) -> Self {
        let mut control = PacketType::Publish.control_byte();
        match qos {
            QoS::AtMostOnce => {}
            QoS::AtLeastOnce => control |= publish_flags::QOS_1,
            QoS::ExactlyOnce => control |= publish_flags::QOS_2,
        }
        if dup {
            control |= publish_flags::DUP;
        }
        if retain {
            control |= publish_flags::RETAIN;
        }
        Self::new(control)
    }

    pub fn puback() -> Self {
        Self::for_type(PacketType::PubAck)
    }

    pub fn pubrec() -> Self {
        Self::for_type(PacketType::PubRec)
    }

    pub fn pubrel() -> Self {
        Self::for_type(PacketType::PubRel)
    }

    pub fn pubcomp() -> Self {
        Self::for_type(PacketType::PubComp)
    }

    pub fn subscribe() -> Self {
        Self::for_type(PacketType::Subscribe)
    }

    pub fn suback() -> Self {
        Self::for_type(PacketType::SubAck)
    }

    pub fn unsubscribe() -> Self {
        Self::for_type(PacketType::Unsubscribe)
    }

    pub fn unsuback() -> Self {
        Self::for_type(PacketType::UnsubAck)
    }

    pub fn pingreq() -> Self {
        Self::for_type(PacketType::PingReq)
    }

    pub fn pingresp() -> Self {
        Self::for_type(PacketType::PingResp)
    }

    pub fn disconnect() -> Self {
        Self::for_type(PacketType::Disconnect)
    }

    pub fn control(&self) -> u8 {
        self.control
    }

    pub fn flags(&self) -> u8 {
        self.control & 0x0F
    }

    pub fn packet_type(&self) -> Option<PacketType> {
        PacketType::from_control(self.control)
    }

    /// QoS bits of a PUBLISH header
    pub fn qos(&self) -> Option<QoS> {
        QoS::from_u8((self.control >> 1) & 0x03)
    }

    pub fn dup(&self) -> bool {
        self.control & publish_flags::DUP != 0
    }

    pub fn retain(&self) -> bool {
        self.control & publish_flags::RETAIN != 0
    }

    pub fn remaining_length(&self) -> usize {
        self.remaining_length
    }

    pub fn set_remaining_length(&mut self, len: usize) {
        self.remaining_length = len;
    }

    /// Encoded size: control byte plus the varint
    pub fn encoded_len(&self) -> usize {
        1 + variable_int_len(self.remaining_length)
    }

    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), EncodeError> {
        buf.put_u8(self.control);
        write_variable_int(buf, self.remaining_length)?;
        Ok(())
    }

    /// Decode a fixed header from the start of `buf`
    /// Returns (bytes_consumed, header)
    pub fn decode(buf: &[u8]) -> Result<(usize, Self), DecodeError> {
        let control = *buf.first().ok_or(DecodeError::InsufficientData)?;
        let (len_bytes, remaining_length) = read_variable_int(&buf[1..])?;
        Ok((
            1 + len_bytes,
            Self {
                control,
                remaining_length,
            },
        ))
    }
}

impl fmt::Display for FixedHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "control: {:08b}\nremaining length: {}",
            self.control, self.remaining_length
        )
    }
}
