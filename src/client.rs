//! The connection engine.
//!
//! [`IrcClient`] owns one server session end to end: the registration
//! handshake, the reader and sender loops, the channel registry, the
//! handler list, and the outbound queue. The client is a cheap cloneable
//! handle; clones share all state, so it can be handed to handlers and
//! background tasks freely.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use bytes::BytesMut;
use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::codec::{Encoder, FramedRead};
use tracing::{debug, error, info, warn};

use crate::channels::{ChannelRegistry, ChannelUser};
use crate::ctcp::Ctcp;
use crate::dcc::{DccChatSession, DccFileTransfer, DccManager};
use crate::error::ClientError;
use crate::event::Event;
use crate::handler::{DefaultHandler, EventHandler};
use crate::line::{LineCodec, MAX_LINE_LENGTH};
use crate::queue::OutboundQueue;
use crate::source::Source;
use crate::tls::upgrade_to_tls;
use crate::util::ip_to_long;

/// Characters that mark a message target as a channel.
pub(crate) const CHANNEL_PREFIXES: &str = "#&+!";

/// How long the reader waits on a silent socket before probing the link
/// with a PING.
const READ_IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Everything needed to reach one IRC server.
///
/// Cloned on `connect`; later mutation of the original has no effect on a
/// live session.
#[derive(Clone, Debug)]
pub struct ConnectionSettings {
    /// Server hostname.
    pub server: String,
    /// Server port.
    pub port: u16,
    /// Connection password, sent as `PASS` when present and non-empty.
    pub password: Option<String>,
    /// Whether to wrap the connection in TLS.
    pub use_tls: bool,
    /// Whether to verify the server certificate when TLS is on.
    pub verify_tls: bool,
}

impl ConnectionSettings {
    /// Settings for a plaintext connection to the default port.
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            port: 6667,
            password: None,
            use_tls: false,
            verify_tls: true,
        }
    }
}

/// Who we claim to be. Mutable before connect; the current nick is
/// updated only from confirmed server events afterwards.
#[derive(Clone, Debug)]
pub(crate) struct Identity {
    pub(crate) name: String,
    pub(crate) nick: String,
    pub(crate) username: String,
    pub(crate) realname: String,
    pub(crate) version: String,
    pub(crate) finger: String,
    pub(crate) encoding: Option<String>,
}

impl Default for Identity {
    fn default() -> Self {
        Self {
            name: "slirc".into(),
            nick: "slirc".into(),
            username: "slirc".into(),
            realname: "slirc-client user".into(),
            version: concat!("slirc-client ", env!("CARGO_PKG_VERSION")).into(),
            finger: "nothing to see here".into(),
            encoding: None,
        }
    }
}

/// Any bidirectional byte stream a session can run over.
pub trait Connection: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Connection for T {}

type BoxedConnection = Box<dyn Connection>;
type Reader = FramedRead<ReadHalf<BoxedConnection>, LineCodec>;

/// The socket write half plus its encoder. One raw-line send holds the
/// async lock for its whole write+flush, making the line atomic with
/// respect to other writers.
pub(crate) struct RawWriter {
    io: WriteHalf<BoxedConnection>,
    codec: LineCodec,
}

impl RawWriter {
    async fn write_line(&mut self, line: &str) -> Result<(), ClientError> {
        let mut buf = BytesMut::new();
        self.codec.encode(line, &mut buf)?;
        self.io.write_all(&buf).await?;
        self.io.flush().await?;
        Ok(())
    }
}

pub(crate) struct Inner {
    pub(crate) identity: StdMutex<Identity>,
    pub(crate) settings: StdMutex<Option<ConnectionSettings>>,
    pub(crate) registry: ChannelRegistry,
    /// Pending topics keyed by channel, waiting for RPL_TOPICINFO.
    pub(crate) topics: StdMutex<HashMap<String, String>>,
    pub(crate) handlers: StdMutex<Vec<Arc<dyn EventHandler>>>,
    pub(crate) default_handler: StdMutex<Option<Arc<dyn EventHandler>>>,
    pub(crate) queue: OutboundQueue,
    pub(crate) writer: AsyncMutex<Option<RawWriter>>,
    pub(crate) dcc: DccManager,
    pub(crate) connected: AtomicBool,
    pub(crate) disposed: AtomicBool,
    sender_started: AtomicBool,
    verbose: AtomicBool,
    auto_nick_change: AtomicBool,
    message_delay_ms: AtomicU64,
    local_addr: StdMutex<Option<IpAddr>>,
    dcc_ports: StdMutex<Vec<u16>>,
    dcc_address: StdMutex<Option<IpAddr>>,
    reader_task: StdMutex<Option<JoinHandle<()>>>,
    compactor_task: StdMutex<Option<JoinHandle<()>>>,
}

/// An event-driven IRC client.
///
/// # Example
///
/// ```no_run
/// use slirc_client::{ConnectionSettings, IrcClient};
///
/// # async fn run() -> Result<(), slirc_client::ClientError> {
/// let client = IrcClient::new();
/// client.set_name("mybot");
/// client.connect(ConnectionSettings::new("irc.libera.chat")).await?;
/// client.join_channel("#rust").await;
/// client.send_message("#rust", "hello!");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct IrcClient {
    pub(crate) inner: Arc<Inner>,
}

impl Default for IrcClient {
    fn default() -> Self {
        Self::new()
    }
}

impl IrcClient {
    /// Create a client with the default protocol handler installed.
    pub fn new() -> Self {
        Self::with_default_handler(true)
    }

    /// Create a client, optionally without the default protocol handler.
    pub fn with_default_handler(use_default: bool) -> Self {
        let client = Self {
            inner: Arc::new(Inner {
                identity: StdMutex::new(Identity::default()),
                settings: StdMutex::new(None),
                registry: ChannelRegistry::new(),
                topics: StdMutex::new(HashMap::new()),
                handlers: StdMutex::new(Vec::new()),
                default_handler: StdMutex::new(None),
                queue: OutboundQueue::new(),
                writer: AsyncMutex::new(None),
                dcc: DccManager::default(),
                connected: AtomicBool::new(false),
                disposed: AtomicBool::new(false),
                sender_started: AtomicBool::new(false),
                verbose: AtomicBool::new(false),
                auto_nick_change: AtomicBool::new(false),
                message_delay_ms: AtomicU64::new(1000),
                local_addr: StdMutex::new(None),
                dcc_ports: StdMutex::new(Vec::new()),
                dcc_address: StdMutex::new(None),
                reader_task: StdMutex::new(None),
                compactor_task: StdMutex::new(None),
            }),
        };
        if use_default {
            let handler: Arc<dyn EventHandler> = Arc::new(DefaultHandler);
            *client.inner.default_handler.lock().unwrap() = Some(handler.clone());
            client.add_handler(handler);
        }
        client
    }

    // ------------------------------------------------------------------
    // Handler registry
    // ------------------------------------------------------------------

    /// Register an event handler. Delivery order follows registration
    /// order.
    pub fn add_handler(&self, handler: Arc<dyn EventHandler>) {
        self.inner.handlers.lock().unwrap().push(handler);
    }

    /// Remove a previously registered handler. Returns whether it was
    /// present.
    pub fn remove_handler(&self, handler: &Arc<dyn EventHandler>) -> bool {
        let mut handlers = self.inner.handlers.lock().unwrap();
        let before = handlers.len();
        handlers.retain(|h| !Arc::ptr_eq(h, handler));
        handlers.len() != before
    }

    /// Remove the stock protocol handler. Returns whether it was present.
    pub fn remove_default_handler(&self) -> bool {
        let default = self.inner.default_handler.lock().unwrap().take();
        match default {
            Some(handler) => self.remove_handler(&handler),
            None => false,
        }
    }

    /// Drop every handler, optionally reinstalling a fresh default.
    pub fn reset_handlers(&self, use_default: bool) {
        self.inner.handlers.lock().unwrap().clear();
        *self.inner.default_handler.lock().unwrap() = None;
        if use_default {
            let handler: Arc<dyn EventHandler> = Arc::new(DefaultHandler);
            *self.inner.default_handler.lock().unwrap() = Some(handler.clone());
            self.add_handler(handler);
        }
    }

    /// Deliver one event to every handler whose capability set covers it.
    /// Handler errors are logged and swallowed; a faulty handler never
    /// tears down the connection.
    pub(crate) async fn dispatch_event(&self, event: Event) {
        let handlers: Vec<Arc<dyn EventHandler>> = self.inner.handlers.lock().unwrap().clone();
        for handler in handlers {
            if event.matches(handler.capabilities()) {
                if let Err(err) = handler.handle_event(self, &event).await {
                    error!(%err, ?event, "event handler failed");
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Connection lifecycle
    // ------------------------------------------------------------------

    /// Connect and register with an IRC server.
    ///
    /// Blocks until registration completes (numeric 004) or fails, then
    /// starts the reader and sender loops and emits [`Event::Connect`].
    ///
    /// # Errors
    ///
    /// [`ClientError::AlreadyConnected`] if a session is live; I/O, TLS,
    /// and registration failures as described in [`ClientError`].
    pub async fn connect(&self, settings: ConnectionSettings) -> Result<(), ClientError> {
        if self.is_connected() {
            return Err(ClientError::AlreadyConnected);
        }
        *self.inner.settings.lock().unwrap() = Some(settings.clone());

        let stream = TcpStream::connect((settings.server.as_str(), settings.port)).await?;
        debug!(server = %settings.server, port = settings.port, "connected to server");
        if let Ok(addr) = stream.local_addr() {
            *self.inner.local_addr.lock().unwrap() = Some(addr.ip());
        }

        if settings.use_tls {
            let tls = upgrade_to_tls(stream, &settings.server, settings.verify_tls).await?;
            self.run_session(settings, Box::new(tls)).await
        } else {
            self.run_session(settings, Box::new(stream)).await
        }
    }

    /// Register over an already-established bidirectional stream. Useful
    /// for tunnels, proxies, and tests.
    pub async fn connect_over<S>(
        &self,
        settings: ConnectionSettings,
        stream: S,
    ) -> Result<(), ClientError>
    where
        S: Connection + 'static,
    {
        *self.inner.settings.lock().unwrap() = Some(settings.clone());
        self.run_session(settings, Box::new(stream)).await
    }

    /// Reconnect to the server last passed to [`IrcClient::connect`].
    ///
    /// # Errors
    ///
    /// [`ClientError::NotConnected`] if no connection was ever attempted.
    pub async fn reconnect(&self) -> Result<(), ClientError> {
        let settings = self
            .inner
            .settings
            .lock()
            .unwrap()
            .clone()
            .ok_or(ClientError::NotConnected)?;
        self.connect(settings).await
    }

    /// Disconnect cleanly by quitting; the server closes the socket and
    /// [`Event::Disconnect`] follows.
    pub async fn disconnect(&self) {
        self.quit_server().await;
    }

    /// Tear down both loops without emitting a disconnect event. The
    /// client should not be reused afterwards.
    pub async fn dispose(&self) {
        self.inner.disposed.store(true, Ordering::SeqCst);
        self.inner.queue.shutdown();
        if let Some(handle) = self.inner.reader_task.lock().unwrap().take() {
            handle.abort();
        }
        if let Some(handle) = self.inner.compactor_task.lock().unwrap().take() {
            handle.abort();
        }
        self.inner.connected.store(false, Ordering::SeqCst);
        *self.inner.writer.lock().await = None;
    }

    async fn run_session(
        &self,
        settings: ConnectionSettings,
        stream: BoxedConnection,
    ) -> Result<(), ClientError> {
        if self.inner.connected.swap(true, Ordering::SeqCst) {
            return Err(ClientError::AlreadyConnected);
        }

        match self.register(&settings, stream).await {
            Ok(framed) => {
                self.spawn_loops(framed);
                self.dispatch_event(Event::Connect).await;
                Ok(())
            }
            Err(err) => {
                self.inner.connected.store(false, Ordering::SeqCst);
                *self.inner.writer.lock().await = None;
                Err(err)
            }
        }
    }

    async fn register(
        &self,
        settings: &ConnectionSettings,
        stream: BoxedConnection,
    ) -> Result<Reader, ClientError> {
        self.inner.registry.clear();
        self.inner.disposed.store(false, Ordering::SeqCst);

        let label = self.encoding();
        let (read_half, write_half) = tokio::io::split(stream);
        let mut framed = FramedRead::new(read_half, LineCodec::new(label.as_deref())?);
        *self.inner.writer.lock().await = Some(RawWriter {
            io: write_half,
            codec: LineCodec::new(label.as_deref())?,
        });

        if let Some(password) = settings.password.as_deref().filter(|p| !p.is_empty()) {
            self.send_raw_line(&format!("PASS {}", password)).await;
        }
        let name = self.name();
        let mut nick = name.clone();
        self.send_raw_line(&format!("NICK {}", nick)).await;
        let (username, realname) = {
            let identity = self.inner.identity.lock().unwrap();
            (identity.username.clone(), identity.realname.clone())
        };
        self.send_raw_line(&format!("USER {} 8 * :{}", username, realname))
            .await;

        let mut tries = 1u32;
        loop {
            let line = match framed.next().await {
                Some(Ok(line)) => line,
                Some(Err(err)) => return Err(err),
                None => {
                    return Err(ClientError::Io(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "connection closed during registration",
                    )))
                }
            };

            self.trace_line("<<<", &line);
            self.handle_line(&line).await;

            let mut parts = line.split_whitespace();
            let code = match (parts.next(), parts.next(), parts.next()) {
                (Some(_), Some(code), Some(_)) => Some(code),
                _ => None,
            };
            if let Some(code) = code {
                if code == "004" {
                    self.set_nick(&nick);
                    break;
                } else if code == "433" {
                    if self.inner.auto_nick_change.load(Ordering::SeqCst) {
                        tries += 1;
                        nick = format!("{}{}", name, tries);
                        self.send_raw_line(&format!("NICK {}", nick)).await;
                    } else {
                        return Err(ClientError::NickAlreadyInUse(line));
                    }
                } else if code == "439" {
                    // No action required.
                } else if code.starts_with('5') || code.starts_with('4') {
                    return Err(ClientError::Irc(line));
                }
            }
            // The candidate is re-recorded on every iteration, not only
            // on confirmed changes.
            self.set_nick(&nick);
        }

        info!(server = %settings.server, nick = %self.nick(), "logged onto server");
        Ok(framed)
    }

    fn spawn_loops(&self, framed: Reader) {
        // One sender loop per client instance, surviving reconnects.
        if !self.inner.sender_started.swap(true, Ordering::SeqCst) {
            let client = self.clone();
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(Duration::from_millis(client.message_delay())).await;
                    match client.inner.queue.take().await {
                        Some(line) => client.send_raw_line(&line).await,
                        None => break,
                    }
                }
                debug!("sender loop finished");
            });
        }

        let client = self.clone();
        let handle = tokio::spawn(async move {
            client.reader_loop(framed).await;
        });
        *self.inner.reader_task.lock().unwrap() = Some(handle);
    }

    async fn reader_loop(&self, mut framed: Reader) {
        loop {
            match timeout(READ_IDLE_TIMEOUT, framed.next()).await {
                Err(_) => {
                    // Nothing from the server for a while; probe the link.
                    let now = chrono::Utc::now().timestamp();
                    self.send_raw_line(&format!("PING {}", now)).await;
                }
                Ok(None) => break,
                Ok(Some(Err(err))) => {
                    warn!(%err, "read failed; treating connection as closed");
                    break;
                }
                Ok(Some(Ok(line))) => {
                    self.trace_line("<<<", &line);
                    self.handle_line(&line).await;
                }
            }
        }

        drop(framed);
        self.inner.connected.store(false, Ordering::SeqCst);
        *self.inner.writer.lock().await = None;

        if !self.inner.disposed.load(Ordering::SeqCst) {
            info!("disconnected");
            self.dispatch_event(Event::Disconnect).await;
        }
    }

    // ------------------------------------------------------------------
    // Outbound
    // ------------------------------------------------------------------

    /// Send a raw line immediately, bypassing the outgoing queue.
    ///
    /// A write failure drops the line; if the socket is actually dead the
    /// reader notices EOF and tears the session down.
    pub async fn send_raw_line(&self, line: &str) {
        if !self.is_connected() {
            return;
        }
        let mut writer = self.inner.writer.lock().await;
        if let Some(writer) = writer.as_mut() {
            match writer.write_line(line).await {
                Ok(()) => self.trace_line(">>>", line),
                Err(err) => debug!(%err, "dropping outbound line"),
            }
        }
    }

    /// Send a raw line through the outgoing queue.
    ///
    /// # Errors
    ///
    /// [`ClientError::InvalidArgument`] for an empty line.
    pub fn send_raw_line_via_queue(&self, line: &str) -> Result<(), ClientError> {
        if line.is_empty() {
            return Err(ClientError::InvalidArgument(
                "cannot send an empty line to the server".into(),
            ));
        }
        if self.is_connected() {
            self.inner.queue.push(line.to_owned())?;
        }
        Ok(())
    }

    fn queue_line(&self, line: String) {
        if let Err(err) = self.inner.queue.push(line) {
            warn!(%err, "dropping outbound line");
        }
    }

    fn queue_line_front(&self, line: String) {
        if let Err(err) = self.inner.queue.push_front(line) {
            warn!(%err, "dropping outbound line");
        }
    }

    /// Send a message to a channel or a private message to a user, via
    /// the outgoing queue.
    pub fn send_message(&self, target: &str, message: &str) {
        self.queue_line(format!("PRIVMSG {} :{}", target, message));
    }

    /// Send a message addressed to a user inside a channel (`nick: text`),
    /// falling back to a private message when no channel is given.
    ///
    /// # Errors
    ///
    /// [`ClientError::InvalidArgument`] when neither user nor channel is
    /// set.
    pub fn send_channel_message(
        &self,
        user: Option<&str>,
        channel: Option<&str>,
        message: &str,
    ) -> Result<(), ClientError> {
        match (user, channel) {
            (None, None) => Err(ClientError::InvalidArgument(format!(
                "neither user nor channel set, can't send the message: {}",
                message
            ))),
            (Some(user), None) => {
                self.send_message(user, message);
                Ok(())
            }
            (user, Some(channel)) => {
                let who_for = user.map(|u| format!("{}: ", u)).unwrap_or_default();
                self.send_message(channel, &format!("{}{}", who_for, message));
                Ok(())
            }
        }
    }

    /// Send a message ahead of everything already queued.
    pub fn send_priority_message(&self, target: &str, message: &str) {
        self.queue_line_front(format!("PRIVMSG {} :{}", target, message));
    }

    /// Priority variant of [`IrcClient::send_channel_message`].
    ///
    /// # Errors
    ///
    /// [`ClientError::InvalidArgument`] when neither user nor channel is
    /// set.
    pub fn send_priority_channel_message(
        &self,
        user: Option<&str>,
        channel: Option<&str>,
        message: &str,
    ) -> Result<(), ClientError> {
        match (user, channel) {
            (None, None) => Err(ClientError::InvalidArgument(format!(
                "neither user nor channel set, can't send the message: {}",
                message
            ))),
            (Some(user), None) => {
                self.send_priority_message(user, message);
                Ok(())
            }
            (user, Some(channel)) => {
                let who_for = user.map(|u| format!("{}: ", u)).unwrap_or_default();
                self.send_priority_message(channel, &format!("{}{}", who_for, message));
                Ok(())
            }
        }
    }

    /// Send a CTCP ACTION (`/me`) to a channel or user.
    pub fn send_action(&self, target: &str, action: &str) {
        self.send_ctcp(target, &format!("ACTION {}", action));
    }

    /// Send a notice to a channel or user, via the outgoing queue.
    pub fn send_notice(&self, target: &str, notice: &str) {
        self.queue_line(format!("NOTICE {} :{}", target, notice));
    }

    /// Send a CTCP command (e.g. `"VERSION"`, `"PING 12345"`) to a
    /// channel or user.
    pub fn send_ctcp(&self, target: &str, command: &str) {
        self.queue_line(format!("PRIVMSG {} :{}", target, Ctcp::wrap(command)));
    }

    /// Join a channel.
    pub async fn join_channel(&self, channel: &str) {
        self.send_raw_line(&format!("JOIN {}", channel)).await;
    }

    /// Join a keyed channel.
    pub async fn join_channel_with_key(&self, channel: &str, key: &str) {
        self.join_channel(&format!("{} {}", channel, key)).await;
    }

    /// Part a channel.
    pub async fn part_channel(&self, channel: &str) {
        self.send_raw_line(&format!("PART {}", channel)).await;
    }

    /// Part a channel, giving a reason.
    pub async fn part_channel_with_reason(&self, channel: &str, reason: &str) {
        self.send_raw_line(&format!("PART {} :{}", channel, reason))
            .await;
    }

    /// Quit from the server.
    pub async fn quit_server(&self) {
        self.quit_server_with_reason("").await;
    }

    /// Quit from the server with a reason.
    pub async fn quit_server_with_reason(&self, reason: &str) {
        self.send_raw_line(&format!("QUIT :{}", reason)).await;
    }

    /// Request a nick change; [`IrcClient::nick`] reflects it only once
    /// the server confirms.
    pub async fn change_nick(&self, new_nick: &str) {
        self.send_raw_line(&format!("NICK {}", new_nick)).await;
    }

    /// Identify with NickServ via the safe server-side command.
    pub async fn identify(&self, password: &str) {
        self.send_raw_line(&format!("NICKSERV IDENTIFY {}", password))
            .await;
    }

    /// Set a channel or user mode.
    pub async fn set_mode(&self, target: &str, mode: &str) {
        self.send_raw_line(&format!("MODE {} {}", target, mode)).await;
    }

    /// Invite a user to a channel.
    pub async fn send_invite(&self, nick: &str, channel: &str) {
        self.send_raw_line(&format!("INVITE {} :{}", nick, channel))
            .await;
    }

    /// Ban a hostmask from a channel.
    pub async fn ban(&self, channel: &str, hostmask: &str) {
        self.set_mode(channel, &format!("+b {}", hostmask)).await;
    }

    /// Unban a hostmask from a channel.
    pub async fn unban(&self, channel: &str, hostmask: &str) {
        self.set_mode(channel, &format!("-b {}", hostmask)).await;
    }

    /// Grant operator status.
    pub async fn op(&self, channel: &str, nick: &str) {
        self.set_mode(channel, &format!("+o {}", nick)).await;
    }

    /// Remove operator status.
    pub async fn deop(&self, channel: &str, nick: &str) {
        self.set_mode(channel, &format!("-o {}", nick)).await;
    }

    /// Grant voice.
    pub async fn voice(&self, channel: &str, nick: &str) {
        self.set_mode(channel, &format!("+v {}", nick)).await;
    }

    /// Remove voice.
    pub async fn devoice(&self, channel: &str, nick: &str) {
        self.set_mode(channel, &format!("-v {}", nick)).await;
    }

    /// Set a channel topic.
    pub async fn set_topic(&self, channel: &str, topic: &str) {
        self.send_raw_line(&format!("TOPIC {} :{}", channel, topic))
            .await;
    }

    /// Kick a user from a channel.
    pub async fn kick(&self, channel: &str, nick: &str) {
        self.kick_with_reason(channel, nick, "").await;
    }

    /// Kick a user from a channel, giving a reason.
    pub async fn kick_with_reason(&self, channel: &str, nick: &str, reason: &str) {
        self.send_raw_line(&format!("KICK {} {} :{}", channel, nick, reason))
            .await;
    }

    /// Request the channel list; rows arrive as
    /// [`Event::ChannelInfo`].
    pub async fn list_channels(&self, parameters: Option<&str>) {
        match parameters {
            Some(parameters) => self.send_raw_line(&format!("LIST {}", parameters)).await,
            None => self.send_raw_line("LIST").await,
        }
    }

    // ------------------------------------------------------------------
    // Queue maintenance
    // ------------------------------------------------------------------

    /// Enable or disable the periodic outbound-queue compaction pass
    /// (once per second while enabled).
    pub fn compact_outgoing_queue(&self, enabled: bool) {
        let mut slot = self.inner.compactor_task.lock().unwrap();
        if enabled {
            if slot.is_none() {
                info!("starting outbound queue compaction");
                let client = self.clone();
                *slot = Some(tokio::spawn(async move {
                    let mut interval = tokio::time::interval(Duration::from_secs(1));
                    interval.tick().await;
                    loop {
                        interval.tick().await;
                        client.inner.queue.compact();
                    }
                }));
            }
        } else if let Some(handle) = slot.take() {
            info!("stopping outbound queue compaction");
            handle.abort();
        }
    }

    // ------------------------------------------------------------------
    // DCC
    // ------------------------------------------------------------------

    /// Offer a file to a peer over DCC.
    ///
    /// Sends the `DCC SEND` announcement and parks the returned envelope
    /// so a `RESUME` request from the peer is answered automatically. The
    /// caller listens on `port` and runs the byte transfer itself.
    ///
    /// Returns `None` when no usable IPv4 address is known.
    pub fn dcc_send_file(
        &self,
        filename: &str,
        nick: &str,
        port: u16,
        size: i64,
    ) -> Option<DccFileTransfer> {
        let ip = self.dcc_address().or_else(|| self.local_address())?;
        let IpAddr::V4(ipv4) = ip else {
            debug!("DCC requires an IPv4 address");
            return None;
        };
        let ip_num = ip_to_long(&ipv4.octets()).ok()?;

        let transfer = DccFileTransfer::outgoing(
            Source::new(nick, "", ""),
            filename,
            ip_num,
            port,
            size,
        );
        self.inner.dcc.park_awaiting_resume(transfer.clone());
        self.send_ctcp(
            nick,
            &format!("DCC SEND {} {} {} {}", filename, ip_num, port, size),
        );
        Some(transfer)
    }

    /// Ask a peer to join a DCC chat and wait for them to connect.
    ///
    /// Binds a listener (on a configured DCC port if any are set,
    /// otherwise any free port), announces it over CTCP, and waits up to
    /// `accept_timeout` for the peer. Returns `None` on any failure.
    pub async fn dcc_send_chat_request(
        &self,
        nick: &str,
        accept_timeout: Duration,
    ) -> Option<DccChatSession> {
        let listener = self.bind_dcc_listener().await?;
        let port = listener.local_addr().ok()?.port();

        let ip = self.dcc_address().or_else(|| self.local_address())?;
        let IpAddr::V4(ipv4) = ip else {
            debug!("DCC requires an IPv4 address");
            return None;
        };
        let ip_num = ip_to_long(&ipv4.octets()).ok()?;

        self.send_ctcp(nick, &format!("DCC CHAT chat {} {}", ip_num, port));

        match timeout(accept_timeout, listener.accept()).await {
            Ok(Ok((stream, _))) => Some(DccChatSession::new(nick.to_owned(), stream)),
            _ => {
                debug!(nick, "DCC CHAT was not accepted in time");
                None
            }
        }
    }

    async fn bind_dcc_listener(&self) -> Option<TcpListener> {
        let ports = self.dcc_ports();
        if ports.is_empty() {
            return TcpListener::bind(("0.0.0.0", 0)).await.ok();
        }
        for port in ports {
            if let Ok(listener) = TcpListener::bind(("0.0.0.0", port)).await {
                return Some(listener);
            }
        }
        debug!("all configured DCC ports are in use");
        None
    }

    /// Start a one-shot RFC 1413 ident responder answering with the
    /// current username.
    ///
    /// # Errors
    ///
    /// Propagates the bind failure when port 113 is unavailable; the main
    /// connection is unaffected either way.
    pub async fn start_ident_server(&self) -> Result<(), ClientError> {
        crate::ident::start(self.user_name()).await
    }

    // ------------------------------------------------------------------
    // Identity and configuration
    // ------------------------------------------------------------------

    /// The name used as our nick when connecting.
    pub fn name(&self) -> String {
        self.inner.identity.lock().unwrap().name.clone()
    }

    /// Set the name used as our nick on the next connect.
    pub fn set_name(&self, name: &str) {
        self.inner.identity.lock().unwrap().name = name.to_owned();
    }

    /// Our current nick as confirmed by the server.
    pub fn nick(&self) -> String {
        self.inner.identity.lock().unwrap().nick.clone()
    }

    pub(crate) fn set_nick(&self, nick: &str) {
        self.inner.identity.lock().unwrap().nick = nick.to_owned();
    }

    /// The username sent in `USER` and served by the ident responder.
    pub fn user_name(&self) -> String {
        self.inner.identity.lock().unwrap().username.clone()
    }

    /// Set the username. Takes effect on the next connect.
    pub fn set_user_name(&self, username: &str) {
        self.inner.identity.lock().unwrap().username = username.to_owned();
    }

    /// The real name sent in `USER`.
    pub fn real_name(&self) -> String {
        self.inner.identity.lock().unwrap().realname.clone()
    }

    /// Set the real name. Takes effect on the next connect.
    pub fn set_real_name(&self, realname: &str) {
        self.inner.identity.lock().unwrap().realname = realname.to_owned();
    }

    /// The string served to CTCP VERSION queries.
    pub fn version(&self) -> String {
        self.inner.identity.lock().unwrap().version.clone()
    }

    /// Set the CTCP VERSION reply.
    pub fn set_version(&self, version: &str) {
        self.inner.identity.lock().unwrap().version = version.to_owned();
    }

    /// The string served to CTCP FINGER queries.
    pub fn finger(&self) -> String {
        self.inner.identity.lock().unwrap().finger.clone()
    }

    /// Set the CTCP FINGER reply.
    pub fn set_finger(&self, finger: &str) {
        self.inner.identity.lock().unwrap().finger = finger.to_owned();
    }

    /// The configured wire encoding label, if any.
    pub fn encoding(&self) -> Option<String> {
        self.inner.identity.lock().unwrap().encoding.clone()
    }

    /// Set the wire encoding (e.g. `"iso-8859-1"`); `None` selects UTF-8.
    /// A live session must reconnect for this to take effect.
    ///
    /// # Errors
    ///
    /// [`ClientError::InvalidArgument`] for an unknown label.
    pub fn set_encoding(&self, label: Option<&str>) -> Result<(), ClientError> {
        // Validate the label up front so connect cannot fail later.
        LineCodec::new(label)?;
        self.inner.identity.lock().unwrap().encoding = label.map(str::to_owned);
        Ok(())
    }

    /// Enable automatic `nick2`, `nick3`, … retries when the server
    /// reports our nick in use during registration.
    pub fn set_auto_nick_change(&self, enabled: bool) {
        self.inner.auto_nick_change.store(enabled, Ordering::SeqCst);
    }

    /// Log raw line traffic at INFO instead of DEBUG.
    pub fn set_verbose(&self, verbose: bool) {
        self.inner.verbose.store(verbose, Ordering::Relaxed);
    }

    /// Whether verbose traffic logging is on.
    pub fn verbose(&self) -> bool {
        self.inner.verbose.load(Ordering::Relaxed)
    }

    /// Milliseconds between consecutive queued sends.
    pub fn message_delay(&self) -> u64 {
        self.inner.message_delay_ms.load(Ordering::Relaxed)
    }

    /// Set the inter-message delay for queued sends, in milliseconds.
    pub fn set_message_delay(&self, delay_ms: u64) {
        self.inner.message_delay_ms.store(delay_ms, Ordering::Relaxed);
    }

    /// Ports DCC listeners may bind; empty means any free port.
    pub fn dcc_ports(&self) -> Vec<u16> {
        self.inner.dcc_ports.lock().unwrap().clone()
    }

    /// Restrict DCC listeners to the given ports (useful behind port
    /// forwarding). Empty means any free port.
    pub fn set_dcc_ports(&self, ports: Vec<u16>) {
        *self.inner.dcc_ports.lock().unwrap() = ports;
    }

    /// The address advertised in outgoing DCC requests, if overridden.
    pub fn dcc_address(&self) -> Option<IpAddr> {
        *self.inner.dcc_address.lock().unwrap()
    }

    /// Override the address advertised in outgoing DCC requests (useful
    /// behind NAT). `None` falls back to the connection's local address.
    pub fn set_dcc_address(&self, address: Option<IpAddr>) {
        *self.inner.dcc_address.lock().unwrap() = address;
    }

    /// The local address of the server connection, once connected.
    pub fn local_address(&self) -> Option<IpAddr> {
        *self.inner.local_addr.lock().unwrap()
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// The server from the last connection attempt.
    pub fn server(&self) -> Option<String> {
        self.inner
            .settings
            .lock()
            .unwrap()
            .as_ref()
            .map(|s| s.server.clone())
    }

    /// The port from the last connection attempt.
    pub fn port(&self) -> Option<u16> {
        self.inner.settings.lock().unwrap().as_ref().map(|s| s.port)
    }

    /// The password from the last connection attempt.
    pub fn password(&self) -> Option<String> {
        self.inner
            .settings
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|s| s.password.clone())
    }

    /// Whether the last connection attempt used TLS.
    pub fn uses_tls(&self) -> bool {
        self.inner
            .settings
            .lock()
            .unwrap()
            .as_ref()
            .map(|s| s.use_tls)
            .unwrap_or(false)
    }

    /// Whether a session is live. A rough guide only; the state can
    /// change between the check and any action taken on it.
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// Number of lines waiting in the outgoing queue.
    pub fn outgoing_queue_len(&self) -> usize {
        self.inner.queue.len()
    }

    /// The hard cap on outbound line length, CRLF included.
    pub fn max_line_length(&self) -> usize {
        MAX_LINE_LENGTH
    }

    /// Channels we are currently in (case-folded names).
    pub fn channels(&self) -> Vec<String> {
        self.inner.registry.channels()
    }

    /// Snapshot of the users known in a channel; empty if we are not in
    /// it (or the names reply has not arrived yet).
    pub fn users(&self, channel: &str) -> Vec<ChannelUser> {
        self.inner.registry.users(channel)
    }

    /// Whether a nick is present in a channel; `None` if we are not in
    /// the channel ourselves.
    pub fn is_user_in_channel(&self, nick: &str, channel: &str) -> Option<bool> {
        self.inner.registry.is_user_in_channel(nick, channel)
    }

    pub(crate) fn trace_line(&self, direction: &str, line: &str) {
        if self.verbose() {
            info!("{} {}", direction, line);
        } else {
            debug!("{} {}", direction, line);
        }
    }
}

impl std::fmt::Debug for IrcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IrcClient")
            .field("connected", &self.is_connected())
            .field("server", &self.server())
            .field("nick", &self.nick())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let client = IrcClient::new();
        assert_eq!(client.name(), "slirc");
        assert_eq!(client.nick(), "slirc");
        assert_eq!(client.message_delay(), 1000);
        assert_eq!(client.max_line_length(), 512);
        assert!(!client.is_connected());
        assert!(client.server().is_none());
        assert!(client.port().is_none());
    }

    #[test]
    fn test_set_name_does_not_touch_confirmed_nick() {
        let client = IrcClient::new();
        client.set_name("other");
        assert_eq!(client.name(), "other");
        assert_eq!(client.nick(), "slirc");
    }

    #[test]
    fn test_set_encoding_validates_label() {
        let client = IrcClient::new();
        assert!(client.set_encoding(Some("iso-8859-1")).is_ok());
        assert_eq!(client.encoding().as_deref(), Some("iso-8859-1"));
        assert!(matches!(
            client.set_encoding(Some("bogus-charset")),
            Err(ClientError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_send_channel_message_requires_a_target() {
        let client = IrcClient::new();
        assert!(matches!(
            client.send_channel_message(None, None, "hi"),
            Err(ClientError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_reconnect_without_history_fails() {
        let client = IrcClient::new();
        assert!(matches!(
            client.reconnect().await,
            Err(ClientError::NotConnected)
        ));
    }

    #[test]
    fn test_remove_default_handler() {
        let client = IrcClient::new();
        assert!(client.remove_default_handler());
        assert!(!client.remove_default_handler());

        let bare = IrcClient::with_default_handler(false);
        assert!(!bare.remove_default_handler());
    }
}
