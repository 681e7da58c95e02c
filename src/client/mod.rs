//! MQTT Client
//!
//! [`Client`] drives one MQTT 3.1.1 session over a [`ByteChannel`]:
//!
//! - `Idle` until [`Client::connect`] dials the transport,
//! - `Transport` while the channel is open but CONNECT has not been accepted,
//! - `Session` once CONNACK returns 0; the channel then belongs to the
//!   connection task (see [`connection`]) and every operation goes through it.
//!
//! Operations that need a session establish one first, so a fresh client can
//! call [`Client::publish`] directly. [`Client::loop_start`] sends PINGREQ every
//! third of the keep alive interval and [`Client::loop_forever`] keeps the
//! session up, reconnecting and resubscribing after the connection drops.

mod callbacks;
mod connection;
mod error;


pub use callbacks::{Callbacks, NoopCallbacks, OnMessage};
pub use error::ClientError;

use std::any::Any;
use std::borrow::Cow;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::RwLock;
use rand::Rng;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::codec::{FixedHeader, Frame, FrameBuffer, InboundPublish, Packet, Payload, VariableHeader};
use crate::protocol::{
    connect_flags, ConnectReturnCode, DecodeError, PacketType, QoS, PROTOCOL_LEVEL, PROTOCOL_NAME,
};
use crate::transport::{ByteChannel, ConnectionParams, Dialer, TcpDialer};

use connection::{Command, Connection, Expect};

/// Commands queued for the connection task before senders wait
const COMMAND_QUEUE_SIZE: usize = 64;

/// Length of generated client identifiers
const CLIENT_ID_LEN: usize = 10;

/// Generated packet identifiers fall in `1..PACKET_ID_LIMIT`
const PACKET_ID_LIMIT: u16 = 1 << 15;

/// SUBACK return code for a refused subscription
const SUBACK_FAILURE: u8 = 0x80;

/// Random identifier of ten ASCII letters
pub fn generate_client_id() -> String {
    const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
    let mut rng = rand::thread_rng();
    (0..CLIENT_ID_LEN)
        .map(|_| LETTERS[rng.gen_range(0..LETTERS.len())] as char)
        .collect()
}

fn next_packet_id() -> u16 {
    rand::thread_rng().gen_range(1..PACKET_ID_LIMIT)
}

/// Login sent in CONNECT
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub login: String,
    pub password: Option<String>,
}

impl Credentials {
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            password: Some(password.into()),
        }
    }

    pub fn login_only(login: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            password: None,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Topic and QoS of a subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub topic: String,
    pub qos: QoS,
}

impl Subscription {
    pub fn new(topic: impl Into<String>, qos: QoS) -> Self {
        Self {
            topic: topic.into(),
            qos,
        }
    }
}

/// Header flags for an outbound PUBLISH
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PublishOptions {
    pub qos: QoS,
    pub retain: bool,
    pub dup: bool,
}

impl PublishOptions {
    pub fn new(qos: QoS) -> Self {
        Self {
            qos,
            ..Default::default()
        }
    }

    pub fn with_retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }

    pub fn with_dup(mut self, dup: bool) -> Self {
        self.dup = dup;
        self
    }
}

/// Application message received from the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub payload: Bytes,
    pub qos: QoS,
    pub retain: bool,
    pub dup: bool,
}

impl Message {
    /// Payload as text, with invalid UTF-8 replaced
    pub fn payload_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

impl From<InboundPublish> for Message {
    fn from(publish: InboundPublish) -> Self {
        Self {
            topic: publish.topic,
            payload: publish.payload,
            qos: publish.qos,
            retain: publish.retain,
            dup: publish.dup,
        }
    }
}

/// Session parameters sent in CONNECT plus the reconnect policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    pub connection: ConnectionParams,
    pub client_id: String,
    pub clean_session: bool,
    pub protocol_name: String,
    pub protocol_level: u8,
    pub credentials: Option<Credentials>,
    /// Pause between reconnect attempts in [`Client::loop_forever`]
    pub reconnect_delay: Duration,
}

impl ClientOptions {
    pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);

    pub fn new(connection: ConnectionParams) -> Self {
        Self {
            connection,
            client_id: generate_client_id(),
            clean_session: true,
            protocol_name: PROTOCOL_NAME.to_string(),
            protocol_level: PROTOCOL_LEVEL,
            credentials: None,
            reconnect_delay: Self::DEFAULT_RECONNECT_DELAY,
        }
    }

    pub fn connect_flags(&self) -> u8 {
        let mut flags = 0;
        if self.clean_session {
            flags |= connect_flags::CLEAN_SESSION;
        }
        if let Some(ref credentials) = self.credentials {
            flags |= connect_flags::USERNAME;
            if credentials.password.is_some() {
                flags |= connect_flags::PASSWORD;
            }
        }
        flags
    }

    /// CONNECT packet for these options. The payload holds the client id,
    /// then login and password when present.
    pub fn connect_packet(&self) -> Packet {
        let mut payload = Payload::new().with_string(self.client_id.as_str());
        if let Some(ref credentials) = self.credentials {
            payload.add_string(credentials.login.as_str());
            if let Some(ref password) = credentials.password {
                payload.add_string(password.as_str());
            }
        }

        Packet::new(FixedHeader::connect())
            .with_variable_header(VariableHeader::connect(
                self.protocol_name.as_str(),
                self.protocol_level,
                self.connect_flags(),
                self.connection.keep_alive,
            ))
            .with_payload(payload)
    }
}

/// Builds a [`Client`]
pub struct ClientBuilder {
    options: ClientOptions,
    dialer: Arc<dyn Dialer>,
    callbacks: Arc<dyn Callbacks>,
    user_data: Option<Arc<dyn Any + Send + Sync>>,
}

impl ClientBuilder {
    pub fn new(connection: ConnectionParams) -> Self {
        Self::from_options(ClientOptions::new(connection))
    }

    pub fn from_options(options: ClientOptions) -> Self {
        Self {
            options,
            dialer: Arc::new(TcpDialer),
            callbacks: Arc::new(NoopCallbacks),
            user_data: None,
        }
    }

    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.options.client_id = client_id.into();
        self
    }

    pub fn clean_session(mut self, clean_session: bool) -> Self {
        self.options.clean_session = clean_session;
        self
    }

    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.options.credentials = Some(credentials);
        self
    }

    pub fn protocol(mut self, name: impl Into<String>, level: u8) -> Self {
        self.options.protocol_name = name.into();
        self.options.protocol_level = level;
        self
    }

    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.options.reconnect_delay = delay;
        self
    }

    pub fn dialer<D: Dialer + 'static>(mut self, dialer: D) -> Self {
        self.dialer = Arc::new(dialer);
        self
    }

    pub fn callbacks<C: Callbacks + 'static>(mut self, callbacks: C) -> Self {
        self.callbacks = Arc::new(callbacks);
        self
    }

    /// Value handed back by [`Client::user_data`]
    pub fn user_data<T: Any + Send + Sync>(mut self, data: T) -> Self {
        self.user_data = Some(Arc::new(data));
        self
    }

    pub fn build(self) -> Client {
        let (connected, _) = watch::channel(false);
        Client {
            inner: Arc::new(Inner {
                options: self.options,
                dialer: self.dialer,
                callbacks: self.callbacks,
                user_data: self.user_data,
                link: Mutex::new(Link::Idle),
                connected,
                stopped: AtomicBool::new(false),
                subscription: RwLock::new(None),
                resubscribe: AtomicBool::new(false),
            }),
        }
    }
}

/// Channel state
enum Link {
    Idle,
    Transport {
        channel: Box<dyn ByteChannel>,
        frames: FrameBuffer,
    },
    Session(Session),
}

/// Handle on a running connection task
struct Session {
    commands: mpsc::Sender<Command>,
    task: JoinHandle<()>,
}

struct Inner {
    options: ClientOptions,
    dialer: Arc<dyn Dialer>,
    callbacks: Arc<dyn Callbacks>,
    user_data: Option<Arc<dyn Any + Send + Sync>>,
    link: Mutex<Link>,
    /// True between an accepted CONNACK and disconnect or connection loss
    connected: watch::Sender<bool>,
    /// Set by an explicit disconnect; stops the background loops
    stopped: AtomicBool,
    /// Resubscribed after reconnect
    subscription: RwLock<Option<Subscription>>,
    /// Set when a session is lost; the next handshake restores `subscription`
    resubscribe: AtomicBool,
}

impl Inner {
    fn set_connected(&self, connected: bool) {
        self.connected.send_replace(connected);
    }
}

/// MQTT client handle. Clones share the same session.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("client_id", &self.inner.options.client_id)
            .field("address", &self.inner.options.connection.address())
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl Client {
    pub fn builder(connection: ConnectionParams) -> ClientBuilder {
        ClientBuilder::new(connection)
    }

    pub fn new(options: ClientOptions) -> Self {
        ClientBuilder::from_options(options).build()
    }

    pub fn options(&self) -> &ClientOptions {
        &self.inner.options
    }

    pub fn client_id(&self) -> &str {
        &self.inner.options.client_id
    }

    /// Whether an MQTT session is established
    pub fn is_connected(&self) -> bool {
        *self.inner.connected.borrow()
    }

    /// Most recent subscription, resubscribed after reconnect
    pub fn subscription(&self) -> Option<Subscription> {
        self.inner.subscription.read().clone()
    }

    /// User data set on the builder, if it has type `T`
    pub fn user_data<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.inner.user_data.as_deref()?.downcast_ref::<T>()
    }

    /// Open the transport without starting a session
    pub async fn connect(&self) -> Result<(), ClientError> {
        self.inner.stopped.store(false, Ordering::SeqCst);
        let mut link = self.inner.link.lock().await;
        self.open_transport(&mut link).await
    }

    /// Send CONNECT and wait for CONNACK, dialing first if needed.
    /// Does nothing when a session is already up.
    pub async fn mqtt_connect(&self) -> Result<(), ClientError> {
        self.inner.stopped.store(false, Ordering::SeqCst);
        self.session().await.map(|_| ())
    }

    /// Send DISCONNECT and close the transport. Background loops stop.
    pub async fn disconnect(&self) -> Result<(), ClientError> {
        self.inner.stopped.store(true, Ordering::SeqCst);
        let mut link = self.inner.link.lock().await;

        match std::mem::replace(&mut *link, Link::Idle) {
            Link::Session(session) if self.is_connected() => {
                let (reply, done) = oneshot::channel();
                let result = match session.commands.send(Command::Disconnect { reply }).await {
                    Ok(()) => done.await.unwrap_or(Ok(())),
                    Err(_) => Ok(()),
                };
                let _ = session.task.await;
                self.inner.set_connected(false);
                info!("disconnected from {}", self.inner.options.connection.address());
                self.inner.callbacks.on_disconnect(self);
                self.inner.callbacks.on_transport_disconnect(self);
                result
            }
            Link::Transport { mut channel, .. } => {
                if let Err(e) = channel.close().await {
                    debug!("error closing transport: {}", e);
                }
                self.inner.callbacks.on_transport_disconnect(self);
                Ok(())
            }
            Link::Session(_) | Link::Idle => Ok(()),
        }
    }

    /// Publish `message` to `topic`.
    ///
    /// Returns once the QoS flow completes: immediately after the write for
    /// QoS 0, on PUBACK for QoS 1, on PUBCOMP for QoS 2. The packet id from the
    /// final acknowledgement is returned for QoS > 0.
    pub async fn publish(
        &self,
        topic: &str,
        message: impl Into<Bytes>,
        qos: QoS,
    ) -> Result<Option<u16>, ClientError> {
        self.publish_with(topic, message, PublishOptions::new(qos))
            .await
    }

    pub async fn publish_with(
        &self,
        topic: &str,
        message: impl Into<Bytes>,
        options: PublishOptions,
    ) -> Result<Option<u16>, ClientError> {
        let packet_id = (options.qos != QoS::AtMostOnce).then(next_packet_id);
        let packet = Packet::publish(
            topic,
            packet_id,
            message,
            options.qos,
            options.dup,
            options.retain,
        );

        let acked = match (options.qos, packet_id) {
            (QoS::AtLeastOnce, Some(id)) => {
                let ack = self
                    .exchange(packet, Expect::with_id(PacketType::PubAck, id))
                    .await?;
                ack.packet_id()
            }
            (QoS::ExactlyOnce, Some(id)) => {
                let rec = self
                    .exchange(packet, Expect::with_id(PacketType::PubRec, id))
                    .await?;
                let rec_id = rec.packet_id().unwrap_or(id);
                debug!("PUBREC {} received, sending PUBREL", rec_id);
                let comp = self
                    .exchange(
                        Packet::pubrel(rec_id),
                        Expect::with_id(PacketType::PubComp, rec_id),
                    )
                    .await?;
                comp.packet_id()
            }
            _ => {
                self.request(packet, None).await?;
                None
            }
        };

        debug!("published to '{}' (qos {})", topic, options.qos);
        self.inner.callbacks.on_publish(self, acked);
        Ok(acked)
    }

    /// Subscribe to `topic` and return the granted QoS.
    ///
    /// The subscription is remembered before it is sent. The first session
    /// opened after the connection drops restores it, whether that is
    /// [`Client::loop_forever`] reconnecting or any other operation.
    pub async fn subscribe(&self, topic: &str, qos: QoS) -> Result<u8, ClientError> {
        let commands = self.session().await?;
        *self.inner.subscription.write() = Some(Subscription::new(topic, qos));
        self.send_subscribe(&commands, topic, qos).await
    }

    async fn send_subscribe(
        &self,
        commands: &mpsc::Sender<Command>,
        topic: &str,
        qos: QoS,
    ) -> Result<u8, ClientError> {
        let id = next_packet_id();
        let ack = send_command(
            commands,
            Packet::subscribe(id, topic, qos),
            Some(Expect::with_id(PacketType::SubAck, id)),
        )
        .await?
        .ok_or(ClientError::ConnectionLost)?;

        let granted = ack.granted_qos().unwrap_or(SUBACK_FAILURE);
        if granted == SUBACK_FAILURE {
            warn!("subscription to '{}' refused", topic);
            return Err(ClientError::SubscriptionRefused {
                topic: topic.to_string(),
            });
        }

        info!("subscribed to '{}' (granted qos {})", topic, granted);
        self.inner
            .callbacks
            .on_subscribe(self, ack.packet_id().unwrap_or(id), granted);
        Ok(granted)
    }

    pub async fn unsubscribe(&self, topic: &str) -> Result<(), ClientError> {
        let id = next_packet_id();
        let ack = self
            .exchange(
                Packet::unsubscribe(id, topic),
                Expect::with_id(PacketType::UnsubAck, id),
            )
            .await?;

        {
            let mut subscription = self.inner.subscription.write();
            if subscription.as_ref().map_or(false, |s| s.topic == topic) {
                *subscription = None;
            }
        }

        info!("unsubscribed from '{}'", topic);
        self.inner
            .callbacks
            .on_unsubscribe(self, ack.packet_id().unwrap_or(id));
        Ok(())
    }

    /// Send PINGREQ and wait for PINGRESP
    pub async fn ping(&self) -> Result<(), ClientError> {
        self.exchange(Packet::pingreq(), Expect::new(PacketType::PingResp))
            .await?;
        debug!("PINGRESP received");
        self.inner.callbacks.on_ping(self);
        Ok(())
    }

    /// Start the keep alive task: PINGREQ every `keep_alive / 3`, measured
    /// from the previous tick.
    ///
    /// Returns `None` when keep alive is disabled (0). The task ends after
    /// [`Client::disconnect`] or once every client handle is dropped.
    pub fn loop_start(&self) -> Option<JoinHandle<()>> {
        let keep_alive = self.inner.options.connection.keep_alive;
        if keep_alive == 0 {
            debug!("keep alive disabled");
            return None;
        }

        let period = Duration::from_secs(u64::from(keep_alive)) / 3;
        let inner = Arc::downgrade(&self.inner);
        debug!("keep alive every {:?}", period);

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let client = match inner.upgrade() {
                    Some(inner) => Client { inner },
                    None => break,
                };
                if client.inner.stopped.load(Ordering::SeqCst) {
                    debug!("keep alive stopped");
                    break;
                }
                if let Err(e) = client.ping().await {
                    warn!("keep alive ping failed: {}", e);
                }
            }
        }))
    }

    /// Keep the session up until [`Client::disconnect`] is called.
    ///
    /// Inbound messages are delivered to [`Callbacks::on_message`] by the
    /// connection task meanwhile. When the connection drops this waits
    /// `reconnect_delay`, connects again and restores the last subscription.
    /// Transport failures are retried; a refused CONNECT or subscription ends
    /// the loop with that error.
    pub async fn loop_forever(&self) -> Result<(), ClientError> {
        let mut connected = self.inner.connected.subscribe();
        let delay = self.inner.options.reconnect_delay;

        loop {
            if self.inner.stopped.load(Ordering::SeqCst) {
                return Ok(());
            }

            if !self.is_connected() {
                if let Err(e) = self.reconnect().await {
                    if !e.is_transport() {
                        return Err(e);
                    }
                    warn!("reconnect failed: {}, retrying in {:?}", e, delay);
                    tokio::time::sleep(delay).await;
                    continue;
                }
            }

            let closed = connected.wait_for(|up| !*up).await.map(|_| ());
            if closed.is_err() || self.inner.stopped.load(Ordering::SeqCst) {
                return Ok(());
            }

            info!("connection lost, reconnecting in {:?}", delay);
            tokio::time::sleep(delay).await;
        }
    }

    async fn reconnect(&self) -> Result<(), ClientError> {
        self.inner.resubscribe.store(true, Ordering::SeqCst);
        self.session().await.map(|_| ())
    }

    /// Re-send the recorded subscription on a fresh session
    async fn restore_subscription(
        &self,
        commands: &mpsc::Sender<Command>,
    ) -> Result<(), ClientError> {
        let subscription = self.inner.subscription.read().clone();
        if let Some(subscription) = subscription {
            debug!("restoring subscription to '{}'", subscription.topic);
            self.send_subscribe(commands, &subscription.topic, subscription.qos)
                .await?;
        }
        self.inner.resubscribe.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Send a packet through the connection task, establishing the session
    /// first if needed.
    async fn request(
        &self,
        packet: Packet,
        expect: Option<Expect>,
    ) -> Result<Option<Packet>, ClientError> {
        let commands = self.session().await?;
        send_command(&commands, packet, expect).await
    }

    /// Send a packet and wait for its response
    async fn exchange(&self, packet: Packet, expect: Expect) -> Result<Packet, ClientError> {
        self.request(packet, Some(expect))
            .await?
            .ok_or(ClientError::ConnectionLost)
    }

    /// Command queue of the running session, connecting first if needed
    async fn session(&self) -> Result<mpsc::Sender<Command>, ClientError> {
        let mut link = self.inner.link.lock().await;

        if let Link::Session(ref session) = *link {
            if self.is_connected() && !session.commands.is_closed() {
                return Ok(session.commands.clone());
            }
        }
        if !matches!(*link, Link::Transport { .. }) {
            self.open_transport(&mut link).await?;
        }

        let (mut channel, mut frames) = match std::mem::replace(&mut *link, Link::Idle) {
            Link::Transport { channel, frames } => (channel, frames),
            other => {
                *link = other;
                return Err(ClientError::NotConnected);
            }
        };

        let session_present = match self.handshake(channel.as_mut(), &mut frames).await {
            Ok(session_present) => session_present,
            Err(e) if e.is_transport() => {
                let _ = channel.close().await;
                self.inner.callbacks.on_transport_disconnect(self);
                return Err(e);
            }
            // CONNACK was consumed; the channel can carry another CONNECT
            Err(e @ ClientError::Refused(_)) => {
                *link = Link::Transport { channel, frames };
                return Err(e);
            }
            Err(e) => {
                warn!("closing transport after failed handshake: {}", e);
                let _ = channel.close().await;
                self.inner.callbacks.on_transport_disconnect(self);
                return Err(e);
            }
        };

        let (commands, receiver) = mpsc::channel(COMMAND_QUEUE_SIZE);
        let connection = Connection::new(channel, frames, receiver, Arc::downgrade(&self.inner));
        self.inner.set_connected(true);
        let task = tokio::spawn(connection.run());
        *link = Link::Session(Session {
            commands: commands.clone(),
            task,
        });

        info!(
            "connected to {} as '{}' (session present: {})",
            self.inner.options.connection.address(),
            self.inner.options.client_id,
            session_present
        );
        self.inner.callbacks.on_connect(self, session_present);

        if self.inner.resubscribe.load(Ordering::SeqCst) {
            self.restore_subscription(&commands).await?;
        }
        Ok(commands)
    }

    async fn open_transport(&self, link: &mut Link) -> Result<(), ClientError> {
        match *link {
            Link::Transport { .. } => return Ok(()),
            Link::Session(_) if self.is_connected() => return Ok(()),
            _ => {}
        }

        let params = &self.inner.options.connection;
        debug!("dialing {} over {}", params.address(), params.transport);
        let channel = self.inner.dialer.dial(params).await?;
        let peer = channel.peer();
        info!("transport connected to {}", peer);

        *link = Link::Transport {
            channel,
            frames: FrameBuffer::new(),
        };
        self.inner.callbacks.on_transport_connect(self, &peer);
        Ok(())
    }

    /// CONNECT / CONNACK exchange on the raw channel. Returns the
    /// session-present flag.
    async fn handshake(
        &self,
        channel: &mut dyn ByteChannel,
        frames: &mut FrameBuffer,
    ) -> Result<bool, ClientError> {
        let mut connect = self.inner.options.connect_packet();
        let bytes = connect.to_bytes()?;
        trace!("sending\n{}", connect.debug_render());
        channel.write_all(&bytes).await?;
        debug!("CONNECT sent (client id '{}')", self.inner.options.client_id);

        let frame = read_frame(channel, frames).await?;
        if frame.packet_type() != Some(PacketType::ConnAck) {
            return Err(ClientError::UnexpectedResponse {
                got: frame.header().control(),
                expected: PacketType::ConnAck,
            });
        }

        let connack = frame.decode()?;
        trace!("received\n{}", connack.debug_render());
        let code = connack
            .return_code()
            .ok_or(DecodeError::MalformedPacket("CONNACK without return code"))?;
        let code = ConnectReturnCode::from_u8(code)
            .ok_or(DecodeError::MalformedPacket("unknown CONNACK return code"))?;

        if !code.is_accepted() {
            warn!("CONNECT refused: {}", code);
            return Err(ClientError::Refused(code));
        }
        Ok(connack.session_present().unwrap_or(false))
    }
}

/// Queue `packet` on the connection task and wait for its reply
async fn send_command(
    commands: &mpsc::Sender<Command>,
    packet: Packet,
    expect: Option<Expect>,
) -> Result<Option<Packet>, ClientError> {
    let (reply, response) = oneshot::channel();
    commands
        .send(Command::Send {
            packet,
            expect,
            reply,
        })
        .await
        .map_err(|_| ClientError::ConnectionLost)?;
    response.await.map_err(|_| ClientError::ConnectionLost)?
}

/// Read until one whole frame is buffered
async fn read_frame(
    channel: &mut dyn ByteChannel,
    frames: &mut FrameBuffer,
) -> Result<Frame, ClientError> {
    loop {
        if let Some(frame) = frames.next_frame()? {
            return Ok(frame);
        }
        if channel.read(frames.read_buf()).await? == 0 {
            return Err(ClientError::Transport(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed during handshake",
            )));
        }
    }
}
