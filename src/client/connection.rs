//! Connection task
//!
//! Once the CONNECT/CONNACK handshake succeeds the byte channel moves into a
//! [`Connection`] running on its own task. It is the only writer on the
//! channel. Client operations send it [`Command`]s and wait on a oneshot reply;
//! inbound frames either complete a pending request or are handled as server
//! initiated traffic (PUBLISH, PUBREL).

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::Ordering;
use std::sync::Weak;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

use super::{Client, ClientError, Inner, Message};
use crate::codec::{Frame, FrameBuffer, InboundPublish, Packet};
use crate::protocol::{DecodeError, PacketType, QoS};
use crate::transport::ByteChannel;

pub(super) type Reply = oneshot::Sender<Result<Option<Packet>, ClientError>>;

/// Response an outbound packet waits for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct Expect {
    pub packet_type: PacketType,
    pub packet_id: Option<u16>,
}

impl Expect {
    pub fn new(packet_type: PacketType) -> Self {
        Self {
            packet_type,
            packet_id: None,
        }
    }

    pub fn with_id(packet_type: PacketType, packet_id: u16) -> Self {
        Self {
            packet_type,
            packet_id: Some(packet_id),
        }
    }
}

pub(super) enum Command {
    /// Write a packet. With `expect` set the reply is sent once the matching
    /// response arrives, otherwise as soon as the write completes.
    Send {
        packet: Packet,
        expect: Option<Expect>,
        reply: Reply,
    },
    /// Send DISCONNECT, close the channel and stop the task
    Disconnect {
        reply: oneshot::Sender<Result<(), ClientError>>,
    },
}

struct Pending {
    expect: Expect,
    reply: Reply,
}

/// Requests waiting for a response, oldest first
#[derive(Default)]
struct PendingRequests {
    queue: VecDeque<Pending>,
}

impl PendingRequests {
    fn push(&mut self, expect: Expect, reply: Reply) {
        self.queue.push_back(Pending { expect, reply });
    }

    fn len(&self) -> usize {
        self.queue.len()
    }

    fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Route a response to the request waiting for it.
    ///
    /// The oldest request awaiting this packet type wins, unless a younger one
    /// also carries the same packet identifier. A response nobody awaits fails
    /// a request of the same kind: an identified ack fails the request sharing
    /// its identifier, or else the oldest identified request; an ack without
    /// identifier fails the oldest request without one, or else the oldest
    /// request. Returns false when the response was not routed anywhere.
    fn complete(&mut self, packet: Packet) -> bool {
        let packet_type = packet.packet_type();
        let packet_id = packet.packet_id();

        let by_id = self.queue.iter().position(|p| {
            Some(p.expect.packet_type) == packet_type
                && p.expect.packet_id.is_some()
                && p.expect.packet_id == packet_id
        });
        let position = by_id.or_else(|| {
            self.queue
                .iter()
                .position(|p| Some(p.expect.packet_type) == packet_type)
        });

        if let Some(pending) = position.and_then(|pos| self.queue.remove(pos)) {
            let _ = pending.reply.send(Ok(Some(packet)));
            return true;
        }

        let identified = packet_type.map_or(false, PacketType::has_packet_id);
        let position = if identified {
            packet_id
                .and_then(|id| {
                    self.queue
                        .iter()
                        .position(|p| p.expect.packet_id == Some(id))
                })
                .or_else(|| self.queue.iter().position(|p| p.expect.packet_id.is_some()))
        } else {
            self.queue
                .iter()
                .position(|p| p.expect.packet_id.is_none())
                .or_else(|| (!self.queue.is_empty()).then_some(0))
        };
        match position.and_then(|pos| self.queue.remove(pos)) {
            Some(pending) => {
                let _ = pending.reply.send(Err(ClientError::UnexpectedResponse {
                    got: packet.header.control(),
                    expected: pending.expect.packet_type,
                }));
                true
            }
            None => false,
        }
    }

    fn fail_oldest(&mut self, error: ClientError) {
        if let Some(pending) = self.queue.pop_front() {
            let _ = pending.reply.send(Err(error));
        }
    }

    fn fail_all(&mut self) {
        for pending in self.queue.drain(..) {
            let _ = pending.reply.send(Err(ClientError::ConnectionLost));
        }
    }
}

enum Exit {
    /// Client asked for DISCONNECT
    Requested,
    /// Every client handle was dropped
    Dropped,
    /// Read or write failed, or the server closed the stream
    Lost(String),
}

pub(super) struct Connection {
    channel: Box<dyn ByteChannel>,
    frames: FrameBuffer,
    commands: mpsc::Receiver<Command>,
    pending: PendingRequests,
    /// Inbound QoS 2 packet ids answered with PUBREC, waiting for PUBREL
    awaiting_release: HashSet<u16>,
    client: Weak<Inner>,
}

impl Connection {
    pub(super) fn new(
        channel: Box<dyn ByteChannel>,
        frames: FrameBuffer,
        commands: mpsc::Receiver<Command>,
        client: Weak<Inner>,
    ) -> Self {
        Self {
            channel,
            frames,
            commands,
            pending: PendingRequests::default(),
            awaiting_release: HashSet::new(),
            client,
        }
    }

    pub(super) async fn run(mut self) {
        // Bytes that arrived together with CONNACK
        let exit = match self.drain_frames().await {
            Ok(()) => self.event_loop().await,
            Err(e) => Exit::Lost(e.to_string()),
        };

        if let Exit::Lost(ref reason) = exit {
            warn!("connection to {} lost: {}", self.channel.peer(), reason);
            if let Some(inner) = self.client.upgrade() {
                inner.resubscribe.store(true, Ordering::SeqCst);
                inner.set_connected(false);
            }
        }

        if !self.pending.is_empty() {
            debug!("failing {} pending requests", self.pending.len());
        }
        self.pending.fail_all();

        match exit {
            Exit::Requested => debug!("connection closed on request"),
            Exit::Dropped => {
                debug!("client dropped, closing connection");
                let _ = self.channel.close().await;
            }
            Exit::Lost(_) => {
                let _ = self.channel.close().await;
                if let Some(inner) = self.client.upgrade() {
                    let client = Client { inner };
                    client.inner.callbacks.on_transport_disconnect(&client);
                }
            }
        }
    }

    async fn event_loop(&mut self) -> Exit {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Send { mut packet, expect, reply }) => {
                        match self.write(&mut packet).await {
                            Ok(()) => match expect {
                                Some(expect) => self.pending.push(expect, reply),
                                None => {
                                    let _ = reply.send(Ok(None));
                                }
                            },
                            Err(e @ ClientError::Encode(_)) => {
                                let _ = reply.send(Err(e));
                            }
                            Err(e) => {
                                let reason = e.to_string();
                                let _ = reply.send(Err(e));
                                return Exit::Lost(reason);
                            }
                        }
                    }
                    Some(Command::Disconnect { reply }) => {
                        let result = self.write(&mut Packet::disconnect()).await;
                        let _ = self.channel.close().await;
                        let _ = reply.send(result);
                        return Exit::Requested;
                    }
                    None => return Exit::Dropped,
                },

                result = self.channel.read(self.frames.read_buf()) => match result {
                    Ok(0) => return Exit::Lost("connection closed by server".to_string()),
                    Ok(n) => {
                        trace!("read {} bytes", n);
                        if let Err(e) = self.drain_frames().await {
                            return Exit::Lost(e.to_string());
                        }
                    }
                    Err(e) => return Exit::Lost(e.to_string()),
                },
            }
        }
    }

    async fn write(&mut self, packet: &mut Packet) -> Result<(), ClientError> {
        let bytes = packet.to_bytes()?;
        trace!("sending\n{}", packet.debug_render());
        self.channel.write_all(&bytes).await?;
        Ok(())
    }

    /// Handle every complete frame in the buffer
    async fn drain_frames(&mut self) -> Result<(), ClientError> {
        while let Some(frame) = self.frames.next_frame()? {
            self.handle_frame(frame).await?;
        }
        Ok(())
    }

    async fn handle_frame(&mut self, frame: Frame) -> Result<(), ClientError> {
        match frame.packet_type() {
            Some(PacketType::Publish) => self.handle_publish(&frame).await,
            Some(PacketType::PubRel) => self.handle_release(&frame).await,
            _ => {
                self.handle_response(&frame);
                Ok(())
            }
        }
    }

    async fn handle_publish(&mut self, frame: &Frame) -> Result<(), ClientError> {
        let publish = match InboundPublish::parse(frame) {
            Ok(publish) => publish,
            Err(e) => {
                warn!("dropping malformed PUBLISH: {}", e);
                return Ok(());
            }
        };
        debug!(
            "PUBLISH received on '{}' (qos {}, {} bytes)",
            publish.topic,
            publish.qos,
            publish.payload.len()
        );

        match (publish.qos, publish.packet_id) {
            (QoS::AtMostOnce, _) => self.deliver(publish),
            (QoS::AtLeastOnce, Some(id)) => {
                self.deliver(publish);
                self.write(&mut Packet::puback(id)).await?;
            }
            (QoS::ExactlyOnce, Some(id)) => {
                if self.awaiting_release.insert(id) {
                    self.deliver(publish);
                } else {
                    debug!("duplicate QoS 2 PUBLISH {}, not delivered again", id);
                }
                self.write(&mut Packet::pubrec(id)).await?;
            }
            (_, None) => warn!("QoS {} PUBLISH without packet id", publish.qos),
        }
        Ok(())
    }

    async fn handle_release(&mut self, frame: &Frame) -> Result<(), ClientError> {
        let id = match frame.decode().map(|p| p.packet_id()) {
            Ok(Some(id)) => id,
            Ok(None) => return Ok(()),
            Err(e) => {
                warn!("dropping malformed PUBREL: {}", e);
                return Ok(());
            }
        };
        if !self.awaiting_release.remove(&id) {
            debug!("PUBREL {} for unknown packet id", id);
        }
        self.write(&mut Packet::pubcomp(id)).await
    }

    fn handle_response(&mut self, frame: &Frame) {
        let packet = match frame.decode() {
            Ok(packet) => packet,
            // Still a well-framed packet, just not one a client expects
            Err(DecodeError::UnsupportedPacketType(_)) => Packet::new(*frame.header()),
            Err(e) => {
                warn!("failed to decode response: {}", e);
                self.pending.fail_oldest(ClientError::Decode(e));
                return;
            }
        };
        trace!("received\n{}", packet.debug_render());

        let control = packet.header.control();
        if !self.pending.complete(packet) {
            warn!("unsolicited packet 0x{:02x} dropped", control);
        }
    }

    fn deliver(&self, publish: InboundPublish) {
        if let Some(inner) = self.client.upgrade() {
            let client = Client { inner };
            let message = Message::from(publish);
            client.inner.callbacks.on_message(&client, &message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::FixedHeader;
    use pretty_assertions::assert_eq;

    fn pending(expect: Expect) -> (Expect, Reply, oneshot::Receiver<Result<Option<Packet>, ClientError>>) {
        let (tx, rx) = oneshot::channel();
        (expect, tx, rx)
    }

    #[test]
    fn test_complete_matches_type_and_id() {
        let mut queue = PendingRequests::default();
        let (e1, r1, mut rx1) = pending(Expect::with_id(PacketType::PubAck, 7));
        let (e2, r2, mut rx2) = pending(Expect::with_id(PacketType::PubAck, 9));
        queue.push(e1, r1);
        queue.push(e2, r2);

        assert!(queue.complete(Packet::puback(9)));
        let packet = rx2.try_recv().unwrap().unwrap().unwrap();
        assert_eq!(packet.packet_id(), Some(9));
        assert!(rx1.try_recv().is_err());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_complete_falls_back_to_oldest_of_type() {
        let mut queue = PendingRequests::default();
        let (e, r, mut rx) = pending(Expect::with_id(PacketType::PubRec, 100));
        queue.push(e, r);

        assert!(queue.complete(Packet::pubrec(42)));
        let packet = rx.try_recv().unwrap().unwrap().unwrap();
        assert_eq!(packet.packet_id(), Some(42));
    }

    #[test]
    fn test_unexpected_ack_spares_ping() {
        let mut queue = PendingRequests::default();
        let (e1, r1, mut ping) = pending(Expect::new(PacketType::PingResp));
        let (e2, r2, mut publish) = pending(Expect::with_id(PacketType::PubAck, 7));
        queue.push(e1, r1);
        queue.push(e2, r2);

        assert!(queue.complete(Packet::pubrec(9)));
        match publish.try_recv().unwrap() {
            Err(ClientError::UnexpectedResponse { got, expected }) => {
                assert_eq!(got, 0x50);
                assert_eq!(expected, PacketType::PubAck);
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(ping.try_recv().is_err());
        assert_eq!(queue.len(), 1);

        assert!(queue.complete(Packet::pingresp()));
        let packet = ping.try_recv().unwrap().unwrap().unwrap();
        assert_eq!(packet.packet_type(), Some(PacketType::PingResp));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_unexpected_ack_with_only_ping_pending() {
        let mut queue = PendingRequests::default();
        let (e, r, mut ping) = pending(Expect::new(PacketType::PingResp));
        queue.push(e, r);

        assert!(!queue.complete(Packet::puback(3)));
        assert!(ping.try_recv().is_err());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_unexpected_identified_type_without_id() {
        let mut queue = PendingRequests::default();
        let (e1, r1, mut ping) = pending(Expect::new(PacketType::PingResp));
        let (e2, r2, mut unsubscribe) = pending(Expect::with_id(PacketType::UnsubAck, 4));
        queue.push(e1, r1);
        queue.push(e2, r2);

        // Server-bound SUBSCRIBE echoed back, decoded header only
        assert!(queue.complete(Packet::new(FixedHeader::subscribe())));
        assert!(matches!(
            unsubscribe.try_recv().unwrap(),
            Err(ClientError::UnexpectedResponse {
                got: 0x82,
                expected: PacketType::UnsubAck
            })
        ));
        assert!(ping.try_recv().is_err());
    }

    #[test]
    fn test_unexpected_packet_without_id_fails_oldest_without_id() {
        let mut queue = PendingRequests::default();
        let (e1, r1, mut subscribe) = pending(Expect::with_id(PacketType::SubAck, 5));
        let (e2, r2, mut ping) = pending(Expect::new(PacketType::PingResp));
        queue.push(e1, r1);
        queue.push(e2, r2);

        assert!(queue.complete(Packet::connack(false, 0)));
        assert!(matches!(
            ping.try_recv().unwrap(),
            Err(ClientError::UnexpectedResponse {
                got: 0x20,
                expected: PacketType::PingResp
            })
        ));
        assert!(subscribe.try_recv().is_err());
    }

    #[test]
    fn test_unexpected_type_prefers_same_id() {
        let mut queue = PendingRequests::default();
        let (e1, r1, mut rx1) = pending(Expect::new(PacketType::PingResp));
        let (e2, r2, mut rx2) = pending(Expect::with_id(PacketType::PubRec, 5));
        queue.push(e1, r1);
        queue.push(e2, r2);

        assert!(queue.complete(Packet::puback(5)));
        assert!(matches!(
            rx2.try_recv().unwrap(),
            Err(ClientError::UnexpectedResponse {
                expected: PacketType::PubRec,
                ..
            })
        ));
        assert!(rx1.try_recv().is_err());
    }

    #[test]
    fn test_complete_with_nothing_pending() {
        let mut queue = PendingRequests::default();
        assert!(!queue.complete(Packet::pingresp()));
    }

    #[test]
    fn test_fail_all() {
        let mut queue = PendingRequests::default();
        let (e, r, mut rx) = pending(Expect::new(PacketType::PingResp));
        queue.push(e, r);
        queue.fail_all();
        assert!(matches!(
            rx.try_recv().unwrap(),
            Err(ClientError::ConnectionLost)
        ));
        assert_eq!(queue.len(), 0);
    }
}
