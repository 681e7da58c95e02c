//! mqlink - MQTT v3.1.1 client
//!
//! A small asynchronous MQTT client: a layered packet codec, QoS 0/1/2
//! publish flows, subscriptions, a keep-alive loop and a reconnecting
//! read loop that hands inbound messages to user callbacks.

pub mod client;
pub mod codec;
pub mod config;
pub mod protocol;
pub mod transport;

pub use client::{
    Callbacks, Client, ClientBuilder, ClientError, ClientOptions, Credentials, Message, OnMessage,
    PublishOptions, Subscription,
};
pub use codec::{FixedHeader, Packet, Payload, VariableHeader};
pub use config::Config;
pub use protocol::{ConnectReturnCode, PacketType, QoS};
pub use transport::{ConnectionParams, Dialer, TcpDialer};
