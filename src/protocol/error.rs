//! Protocol error types

use std::fmt;

use super::PacketType;

/// Errors that can occur during packet decoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Not enough data in buffer
    InsufficientData,
    /// Remaining length runs past the four bytes MQTT allows
    MalformedLength,
    /// Invalid packet type nibble
    InvalidPacketType(u8),
    /// Invalid packet flags
    InvalidFlags,
    /// Invalid UTF-8 string
    InvalidUtf8,
    /// Packet type this decoder does not handle (routed to the inbound path instead)
    UnsupportedPacketType(PacketType),
    /// Malformed packet
    MalformedPacket(&'static str),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientData => write!(f, "insufficient data in buffer"),
            Self::MalformedLength => write!(f, "malformed remaining length"),
            Self::InvalidPacketType(t) => write!(f, "invalid packet type: {}", t),
            Self::InvalidFlags => write!(f, "invalid packet flags"),
            Self::InvalidUtf8 => write!(f, "invalid UTF-8 string"),
            Self::UnsupportedPacketType(t) => write!(f, "unsupported packet type: {}", t),
            Self::MalformedPacket(msg) => write!(f, "malformed packet: {}", msg),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Errors that can occur during packet encoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// String longer than the 2-byte length prefix can describe
    StringTooLong,
    /// Remaining length exceeds 268,435,455
    PacketTooLarge,
    /// QoS outside 0..=2
    InvalidQoS(u8),
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StringTooLong => write!(f, "string too long"),
            Self::PacketTooLarge => write!(f, "packet too large"),
            Self::InvalidQoS(q) => write!(f, "invalid QoS value: {}", q),
        }
    }
}

impl std::error::Error for EncodeError {}
