//! Integration test common infrastructure.
//!
//! Provides a scripted in-memory server the client can register against,
//! plus a recording handler for asserting on dispatched events.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf};
use tokio::time::timeout;

use slirc_client::{
    Capability, ConnectionSettings, Event, EventHandler, HandlerResult, IrcClient,
};

/// Handler that records every event it receives.
pub struct RecordingHandler {
    capabilities: &'static [Capability],
    events: Mutex<Vec<Event>>,
}

impl RecordingHandler {
    pub fn new() -> Arc<Self> {
        Self::with_capabilities(&[Capability::Full])
    }

    pub fn with_capabilities(capabilities: &'static [Capability]) -> Arc<Self> {
        Arc::new(Self {
            capabilities,
            events: Mutex::new(Vec::new()),
        })
    }

    /// Snapshot of everything recorded so far.
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    /// Recorded events matching a predicate.
    pub fn filtered(&self, predicate: impl Fn(&Event) -> bool) -> Vec<Event> {
        self.events().into_iter().filter(|e| predicate(e)).collect()
    }
}

#[async_trait]
impl EventHandler for RecordingHandler {
    fn capabilities(&self) -> &'static [Capability] {
        self.capabilities
    }

    async fn handle_event(&self, _client: &IrcClient, event: &Event) -> HandlerResult {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// A scripted IRC server over an in-memory duplex stream.
pub struct TestServer {
    reader: BufReader<ReadHalf<DuplexStream>>,
    writer: WriteHalf<DuplexStream>,
}

impl TestServer {
    /// Create a server plus the client-side stream to hand to
    /// `connect_over`.
    pub fn pair() -> (Self, DuplexStream) {
        let (client_side, server_side) = tokio::io::duplex(8192);
        let (read_half, write_half) = tokio::io::split(server_side);
        (
            Self {
                reader: BufReader::new(read_half),
                writer: write_half,
            },
            client_side,
        )
    }

    /// Send one line to the client, CRLF appended.
    pub async fn send_line(&mut self, line: &str) {
        self.writer
            .write_all(format!("{}\r\n", line).as_bytes())
            .await
            .expect("server write failed");
        self.writer.flush().await.expect("server flush failed");
    }

    /// Receive one line from the client, line ending stripped.
    pub async fn recv_line(&mut self) -> String {
        let bytes = self.recv_line_bytes().await;
        String::from_utf8_lossy(&bytes)
            .trim_end_matches(['\r', '\n'])
            .to_string()
    }

    /// Receive one raw line from the client, line ending included.
    pub async fn recv_line_bytes(&mut self) -> Vec<u8> {
        let mut buf = Vec::new();
        timeout(Duration::from_secs(5), self.reader.read_until(b'\n', &mut buf))
            .await
            .expect("timed out waiting for client line")
            .expect("server read failed");
        assert!(!buf.is_empty(), "client closed the connection");
        buf
    }

    /// Consume the client's registration burst (`NICK`, `USER`) and
    /// answer with numeric 004.
    pub async fn accept_registration(&mut self) {
        let nick_line = self.recv_line().await;
        assert!(nick_line.starts_with("NICK "), "unexpected: {}", nick_line);
        let nick = nick_line[5..].to_string();
        let user_line = self.recv_line().await;
        assert!(user_line.starts_with("USER "), "unexpected: {}", user_line);
        self.send_line(&format!(":srv 004 {} srv test-1 iow ov", nick))
            .await;
    }

    /// Close the server side of the connection.
    pub fn close(self) {
        drop(self.reader);
        drop(self.writer);
    }
}

/// Register a fresh client against a scripted server and return both.
pub async fn connected_client() -> (IrcClient, TestServer) {
    let (mut server, stream) = TestServer::pair();
    let client = IrcClient::new();
    client.set_message_delay(0);

    let connect = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .connect_over(ConnectionSettings::new("test.example"), stream)
                .await
        })
    };
    server.accept_registration().await;
    connect
        .await
        .expect("connect task panicked")
        .expect("registration failed");
    (client, server)
}

/// Poll a predicate until it holds or two seconds pass.
pub async fn wait_until(predicate: impl Fn() -> bool) -> bool {
    for _ in 0..200 {
        if predicate() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
