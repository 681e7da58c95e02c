//! MQTT v3.1.1 CONNACK return codes (section 3.2.2.3)

use std::fmt;

/// CONNACK return code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConnectReturnCode {
    /// Connection accepted
    Accepted = 0x00,
    /// The server does not support the requested protocol level
    UnacceptableProtocolVersion = 0x01,
    /// The client identifier is correct UTF-8 but not allowed by the server
    IdentifierRejected = 0x02,
    /// The network connection is up but the MQTT service is unavailable
    ServerUnavailable = 0x03,
    /// The data in the user name or password is malformed
    BadUserNameOrPassword = 0x04,
    /// The client is not authorized to connect
    NotAuthorized = 0x05,
}

impl ConnectReturnCode {
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            0x00 => Some(ConnectReturnCode::Accepted),
            0x01 => Some(ConnectReturnCode::UnacceptableProtocolVersion),
            0x02 => Some(ConnectReturnCode::IdentifierRejected),
            0x03 => Some(ConnectReturnCode::ServerUnavailable),
            0x04 => Some(ConnectReturnCode::BadUserNameOrPassword),
            0x05 => Some(ConnectReturnCode::NotAuthorized),
            _ => None,
        }
    }

    pub fn is_accepted(self) -> bool {
        self == ConnectReturnCode::Accepted
    }
}

impl fmt::Display for ConnectReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectReturnCode::Accepted => write!(f, "connection accepted"),
            ConnectReturnCode::UnacceptableProtocolVersion => {
                write!(f, "connection refused, unacceptable protocol version")
            }
            ConnectReturnCode::IdentifierRejected => {
                write!(f, "connection refused, identifier rejected")
            }
            ConnectReturnCode::ServerUnavailable => {
                write!(f, "connection refused, server unavailable")
            }
            ConnectReturnCode::BadUserNameOrPassword => {
                write!(f, "connection refused, bad user name or password")
            }
            ConnectReturnCode::NotAuthorized => write!(f, "connection refused, not authorized"),
        }
    }
}
