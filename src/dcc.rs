//! DCC (Direct Client-to-Client) negotiation.
//!
//! The manager interprets `DCC SEND`, `RESUME`, `ACCEPT`, and `CHAT`
//! requests arriving inside CTCP frames, tracks transfers parked for
//! resumption, and builds the session envelopes handed to event handlers.
//! The byte-level file transfer loop is the embedding application's
//! concern; only the negotiation and state envelope live here.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::debug;

use crate::casemap::irc_eq;
use crate::client::IrcClient;
use crate::event::Event;
use crate::source::Source;
use crate::util::long_to_ip;

/// Which side initiated a transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// The peer offered the file to us.
    Incoming,
    /// We offered the file to the peer.
    Outgoing,
}

/// Lifecycle of a transfer envelope. The byte loop itself is external;
/// these states only reflect the negotiation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferState {
    /// Announced but not yet started.
    Queued,
    /// A RESUME round-trip is in flight.
    Resuming,
    /// Negotiation finished; bytes may flow.
    Transferring,
    /// Finished or abandoned.
    Done,
}

#[derive(Debug)]
struct TransferInner {
    direction: Direction,
    source: Source,
    filename: String,
    address: u64,
    port: u16,
    size: i64,
    progress: Mutex<u64>,
    state: Mutex<TransferState>,
}

/// A file-transfer envelope negotiated over DCC.
///
/// Cloning yields another handle to the same transfer; progress and state
/// updates are visible through every handle.
#[derive(Clone, Debug)]
pub struct DccFileTransfer {
    inner: Arc<TransferInner>,
}

impl DccFileTransfer {
    fn new(
        direction: Direction,
        source: Source,
        filename: impl Into<String>,
        address: u64,
        port: u16,
        size: i64,
    ) -> Self {
        Self {
            inner: Arc::new(TransferInner {
                direction,
                source,
                filename: filename.into(),
                address,
                port,
                size,
                progress: Mutex::new(0),
                state: Mutex::new(TransferState::Queued),
            }),
        }
    }

    pub(crate) fn incoming(
        source: Source,
        filename: impl Into<String>,
        address: u64,
        port: u16,
        size: i64,
    ) -> Self {
        Self::new(Direction::Incoming, source, filename, address, port, size)
    }

    pub(crate) fn outgoing(
        source: Source,
        filename: impl Into<String>,
        address: u64,
        port: u16,
        size: i64,
    ) -> Self {
        Self::new(Direction::Outgoing, source, filename, address, port, size)
    }

    /// Which side initiated the transfer.
    pub fn direction(&self) -> Direction {
        self.inner.direction
    }

    /// Nick of the peer.
    pub fn nick(&self) -> &str {
        &self.inner.source.nick
    }

    /// Login of the peer.
    pub fn login(&self) -> &str {
        &self.inner.source.login
    }

    /// Hostname of the peer.
    pub fn host(&self) -> &str {
        &self.inner.source.host
    }

    /// File name as advertised in the request.
    pub fn filename(&self) -> &str {
        &self.inner.filename
    }

    /// Integer-encoded IPv4 address advertised by the peer.
    pub fn address(&self) -> u64 {
        self.inner.address
    }

    /// TCP port negotiated for the transfer.
    pub fn port(&self) -> u16 {
        self.inner.port
    }

    /// Advertised file size, or -1 when the peer did not supply one.
    pub fn size(&self) -> i64 {
        self.inner.size
    }

    /// Byte offset the transfer will continue from.
    pub fn progress(&self) -> u64 {
        *self.inner.progress.lock().unwrap()
    }

    /// Current negotiation state.
    pub fn state(&self) -> TransferState {
        *self.inner.state.lock().unwrap()
    }

    pub(crate) fn set_progress(&self, progress: u64) {
        *self.inner.progress.lock().unwrap() = progress;
    }

    pub(crate) fn set_state(&self, state: TransferState) {
        *self.inner.state.lock().unwrap() = state;
    }

    /// Mark the envelope finished. Called by the external transfer loop.
    pub fn mark_done(&self) {
        self.set_state(TransferState::Done);
    }
}

impl PartialEq for DccFileTransfer {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for DccFileTransfer {}

/// An incoming DCC CHAT invitation.
///
/// The peer is listening at the advertised address and port; call
/// [`DccChat::accept`] to connect out and obtain a line-oriented session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DccChat {
    source: Source,
    address: u64,
    port: u16,
}

impl DccChat {
    pub(crate) fn new(source: Source, address: u64, port: u16) -> Self {
        Self {
            source,
            address,
            port,
        }
    }

    /// Nick of the inviting peer.
    pub fn nick(&self) -> &str {
        &self.source.nick
    }

    /// Login of the inviting peer.
    pub fn login(&self) -> &str {
        &self.source.login
    }

    /// Hostname of the inviting peer.
    pub fn host(&self) -> &str {
        &self.source.host
    }

    /// Integer-encoded IPv4 address the peer is listening on.
    pub fn address(&self) -> u64 {
        self.address
    }

    /// Port the peer is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Connect to the peer and establish the chat side-channel.
    ///
    /// Returns `None` if the connection cannot be made.
    pub async fn accept(&self) -> Option<DccChatSession> {
        let ip = IpAddr::V4(Ipv4Addr::from(long_to_ip(self.address)));
        match TcpStream::connect((ip, self.port)).await {
            Ok(stream) => Some(DccChatSession::new(self.source.nick.clone(), stream)),
            Err(err) => {
                debug!(nick = %self.source.nick, %err, "DCC CHAT connect failed");
                None
            }
        }
    }
}

/// An established DCC chat side-channel.
pub struct DccChatSession {
    nick: String,
    reader: BufReader<OwnedReadHalf>,
    writer: BufWriter<OwnedWriteHalf>,
}

impl DccChatSession {
    pub(crate) fn new(nick: String, stream: TcpStream) -> Self {
        let (read_half, write_half) = stream.into_split();
        Self {
            nick,
            reader: BufReader::new(read_half),
            writer: BufWriter::new(write_half),
        }
    }

    /// Nick of the peer on the other end.
    pub fn nick(&self) -> &str {
        &self.nick
    }

    /// Read the next line from the chat, `None` at end of stream.
    pub async fn read_line(&mut self) -> std::io::Result<Option<String>> {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line).await?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_owned()))
    }

    /// Send one line to the peer.
    pub async fn send_line(&mut self, line: &str) -> std::io::Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\r\n").await?;
        self.writer.flush().await
    }
}

/// Interprets DCC requests and tracks transfers awaiting resumption.
#[derive(Debug, Default)]
pub(crate) struct DccManager {
    awaiting_resume: Mutex<Vec<DccFileTransfer>>,
}

impl DccManager {
    /// Process one `DCC <type> <args…>` request.
    ///
    /// Returns false when the request is not a verb this manager handles
    /// (or its arguments do not parse), in which case the dispatcher emits
    /// an unknown-line event instead.
    pub(crate) async fn process_request(
        &self,
        client: &IrcClient,
        source: &Source,
        request: &str,
    ) -> bool {
        let tokens: Vec<&str> = request.split_whitespace().collect();
        // The dispatcher only forwards requests with at least five tokens:
        // "DCC <type> <arg> <arg> <arg>".
        let (Some(&kind), Some(&filename)) = (tokens.get(1), tokens.get(2)) else {
            return false;
        };

        match kind {
            "SEND" => {
                let (Some(Ok(address)), Some(Ok(port))) = (
                    tokens.get(3).map(|t| t.parse::<u64>()),
                    tokens.get(4).map(|t| t.parse::<u16>()),
                ) else {
                    return false;
                };
                let size = tokens
                    .get(5)
                    .and_then(|t| t.parse::<i64>().ok())
                    .unwrap_or(-1);

                let transfer =
                    DccFileTransfer::incoming(source.clone(), filename, address, port, size);
                client
                    .dispatch_event(Event::IncomingFileTransfer { transfer })
                    .await;
            }
            "RESUME" => {
                let (Some(Ok(port)), Some(Ok(progress))) = (
                    tokens.get(3).map(|t| t.parse::<u16>()),
                    tokens.get(4).map(|t| t.parse::<u64>()),
                ) else {
                    return false;
                };

                if let Some(transfer) = self.take_awaiting_resume(&source.nick, port) {
                    transfer.set_progress(progress);
                    transfer.set_state(TransferState::Resuming);
                    // The filename in the ACCEPT reply is fixed; peers key
                    // the exchange on (nick, port) alone.
                    client.send_ctcp(
                        &source.nick,
                        &format!("DCC ACCEPT file.ext {} {}", port, progress),
                    );
                }
            }
            "ACCEPT" => {
                let (Some(Ok(port)), Some(Ok(progress))) = (
                    tokens.get(3).map(|t| t.parse::<u16>()),
                    tokens.get(4).map(|t| t.parse::<u64>()),
                ) else {
                    return false;
                };

                if let Some(transfer) = self.take_awaiting_resume(&source.nick, port) {
                    transfer.set_progress(progress);
                    transfer.set_state(TransferState::Transferring);
                }
            }
            "CHAT" => {
                let (Some(Ok(address)), Some(Ok(port))) = (
                    tokens.get(3).map(|t| t.parse::<u64>()),
                    tokens.get(4).map(|t| t.parse::<u16>()),
                ) else {
                    return false;
                };

                let chat = DccChat::new(source.clone(), address, port);
                // Handlers may block for a long time deciding whether to
                // accept, so the invitation is dispatched off the reader.
                let client = client.clone();
                tokio::spawn(async move {
                    client
                        .dispatch_event(Event::IncomingChatRequest { chat })
                        .await;
                });
            }
            _ => return false,
        }

        true
    }

    /// Park a transfer until the peer answers with RESUME or ACCEPT.
    pub(crate) fn park_awaiting_resume(&self, transfer: DccFileTransfer) {
        self.awaiting_resume.lock().unwrap().push(transfer);
    }

    /// Find and remove the parked transfer matching (nick, port).
    pub(crate) fn take_awaiting_resume(&self, nick: &str, port: u16) -> Option<DccFileTransfer> {
        let mut awaiting = self.awaiting_resume.lock().unwrap();
        let index = awaiting
            .iter()
            .position(|t| irc_eq(t.nick(), nick) && t.port() == port)?;
        Some(awaiting.remove(index))
    }
}
