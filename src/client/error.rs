//! Client error types

use std::fmt;
use std::io;

use crate::protocol::{ConnectReturnCode, DecodeError, EncodeError, PacketType};

/// Errors returned by client operations
#[derive(Debug)]
pub enum ClientError {
    /// Dial, read or write failure, including end of stream
    Transport(io::Error),
    /// Server answered CONNECT with a non-zero return code
    Refused(ConnectReturnCode),
    /// A response arrived with a different packet type than the one awaited
    UnexpectedResponse { got: u8, expected: PacketType },
    /// Server rejected a subscription (SUBACK return code 0x80)
    SubscriptionRefused { topic: String },
    /// Inbound bytes could not be decoded
    Decode(DecodeError),
    /// Outbound packet could not be encoded
    Encode(EncodeError),
    /// Operation needs an open transport
    NotConnected,
    /// Connection closed while the operation was waiting for its response
    ConnectionLost,
}

impl ClientError {
    /// Whether the error came from the network rather than from the protocol
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ClientError::Transport(_) | ClientError::ConnectionLost | ClientError::NotConnected
        )
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Transport(e) => write!(f, "transport error: {}", e),
            ClientError::Refused(code) => write!(f, "{}", code),
            ClientError::UnexpectedResponse { got, expected } => {
                let got_name = PacketType::from_control(*got)
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                write!(
                    f,
                    "unexpected response: got {} (0x{:02x}), expected {}",
                    got_name, got, expected
                )
            }
            ClientError::SubscriptionRefused { topic } => {
                write!(f, "subscription to '{}' refused", topic)
            }
            ClientError::Decode(e) => write!(f, "decode error: {}", e),
            ClientError::Encode(e) => write!(f, "encode error: {}", e),
            ClientError::NotConnected => write!(f, "not connected"),
            ClientError::ConnectionLost => write!(f, "connection lost"),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ClientError::Transport(e) => Some(e),
            ClientError::Decode(e) => Some(e),
            ClientError::Encode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ClientError {
    fn from(e: io::Error) -> Self {
        ClientError::Transport(e)
    }
}

impl From<DecodeError> for ClientError {
    fn from(e: DecodeError) -> Self {
        ClientError::Decode(e)
    }
}

impl From<EncodeError> for ClientError {
    fn from(e: EncodeError) -> Self {
        ClientError::Encode(e)
    }
}
