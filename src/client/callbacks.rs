//! Client event callbacks
//!
//! Implement [`Callbacks`] to observe connection and delivery events. Every
//! method receives the [`Client`] that fired it; per-application state lives
//! in the implementing type or in [`Client::user_data`].
//!
//! Callbacks run on the connection task. They must not await client
//! operations directly; spawn a task for that instead.

use std::sync::Arc;

use super::{Client, Message};

/// Event callbacks. All methods default to no-ops.
pub trait Callbacks: Send + Sync {
    /// Transport opened to `peer`
    fn on_transport_connect(&self, _client: &Client, _peer: &str) {}

    /// Transport closed, either on request or because the connection dropped
    fn on_transport_disconnect(&self, _client: &Client) {}

    /// CONNACK accepted the session
    fn on_connect(&self, _client: &Client, _session_present: bool) {}

    /// DISCONNECT sent
    fn on_disconnect(&self, _client: &Client) {}

    /// Publish completed. `packet_id` is `None` for QoS 0.
    fn on_publish(&self, _client: &Client, _packet_id: Option<u16>) {}

    /// SUBACK received
    fn on_subscribe(&self, _client: &Client, _packet_id: u16, _granted_qos: u8) {}

    /// UNSUBACK received
    fn on_unsubscribe(&self, _client: &Client, _packet_id: u16) {}

    /// PINGRESP received
    fn on_ping(&self, _client: &Client) {}

    /// Application message delivered by the server
    fn on_message(&self, _client: &Client, _message: &Message) {}
}

/// Callbacks that ignore every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCallbacks;

impl Callbacks for NoopCallbacks {}

impl<T: Callbacks + ?Sized> Callbacks for Arc<T> {
    fn on_transport_connect(&self, client: &Client, peer: &str) {
        (**self).on_transport_connect(client, peer)
    }

    fn on_transport_disconnect(&self, client: &Client) {
        (**self).on_transport_disconnect(client)
    }

    fn on_connect(&self, client: &Client, session_present: bool) {
        (**self).on_connect(client, session_present)
    }

    fn on_disconnect(&self, client: &Client) {
        (**self).on_disconnect(client)
    }

    fn on_publish(&self, client: &Client, packet_id: Option<u16>) {
        (**self).on_publish(client, packet_id)
    }

    fn on_subscribe(&self, client: &Client, packet_id: u16, granted_qos: u8) {
        (**self).on_subscribe(client, packet_id, granted_qos)
    }

    fn on_unsubscribe(&self, client: &Client, packet_id: u16) {
        (**self).on_unsubscribe(client, packet_id)
    }

    fn on_ping(&self, client: &Client) {
        (**self).on_ping(client)
    }

    fn on_message(&self, client: &Client, message: &Message) {
        (**self).on_message(client, message)
    }
}

/// Message handler built from a closure, for callers that only care about
/// inbound messages
pub struct OnMessage<F>(pub F);

impl<F> Callbacks for OnMessage<F>
where
    F: Fn(&Client, &Message) + Send + Sync,
{
    fn on_message(&self, client: &Client, message: &Message) {
        (self.0)(client, message)
    }
}
