//! Packet payload: length-prefixed strings, an optional raw message and an
//! optional trailing QoS byte

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use super::{hex, string_len, write_string};
use crate::protocol::EncodeError;

/// MQTT payload
///
/// CONNECT uses the string entries (client id, then login and password).
/// SUBSCRIBE uses one topic filter string plus the requested QoS byte, SUBACK
/// the granted QoS byte alone. PUBLISH carries its application message as raw
/// bytes, which are written without a length prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Payload {
    strings: Vec<String>,
    message: Option<Bytes>,
    qos: Option<u8>,
}

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Payload holding only an application message
    pub fn message(message: impl Into<Bytes>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }

    /// Payload holding only a QoS byte
    pub fn qos_only(qos: u8) -> Self {
        Self {
            qos: Some(qos),
            ..Self::default()
        }
    }

    pub fn add_string(&mut self, s: impl Into<String>) {
        self.strings.push(s.into());
    }

    pub fn with_string(mut self, s: impl Into<String>) -> Self {
        self.add_string(s);
        self
    }

    /// Set the trailing QoS byte. A payload carries at most one.
    pub fn add_qos(&mut self, qos: u8) {
        self.qos = Some(qos);
    }

    pub fn with_qos(mut self, qos: u8) -> Self {
        self.add_qos(qos);
        self
    }

    pub fn strings(&self) -> &[String] {
        &self.strings
    }

    pub fn message_bytes(&self) -> Option<&Bytes> {
        self.message.as_ref()
    }

    pub fn qos(&self) -> Option<u8> {
        self.qos
    }

    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), EncodeError> {
        for s in &self.strings {
            write_string(buf, s)?;
        }
        if let Some(ref message) = self.message {
            buf.put_slice(message);
        }
        if let Some(qos) = self.qos {
            buf.put_u8(qos);
        }
        Ok(())
    }

    /// Sum of `2 + len` per string, the raw message length, plus one for the QoS byte
    pub fn len(&self) -> usize {
        self.strings.iter().map(|s| string_len(s)).sum::<usize>()
            + self.message.as_ref().map_or(0, |m| m.len())
            + usize::from(self.qos.is_some())
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

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for s in &self.strings {
            if !first {
                writeln!(f)?;
            }
            write!(f, "string: {}", s)?;
            first = false;
        }
        if let Some(ref message) = self.message {
            if !first {
                writeln!(f)?;
            }
            match std::str::from_utf8(message) {
                Ok(text) => write!(f, "message: {}", text)?,
                Err(_) => write!(f, "message: {}", hex(message))?,
            }
            first = false;
        }
        if let Some(qos) = self.qos {
            if !first {
                writeln!(f)?;
            }
            write!(f, "qos: 0x{:02x}", qos)?;
        }
        Ok(())
    }
}
