//! Event handler trait and the default protocol handler.

use async_trait::async_trait;
use chrono::Local;

use crate::client::IrcClient;
use crate::ctcp::Ctcp;
use crate::error::HandlerResult;
use crate::event::{Capability, Event};

/// A recipient of dispatched events.
///
/// Handlers are registered on an [`IrcClient`] and receive every event
/// whose category their capability set covers, in registration order.
/// Returning an error never tears down the connection; the reader loop
/// logs it and moves on.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// The capability set this handler wants. Defaults to everything.
    fn capabilities(&self) -> &'static [Capability] {
        &[Capability::Full]
    }

    /// Called once per matching event.
    async fn handle_event(&self, client: &IrcClient, event: &Event) -> HandlerResult;
}

/// The stock handler answering RFC-mandated queries.
///
/// Installed by default on every client; remove it with
/// [`IrcClient::remove_default_handler`] if the application wants to
/// answer (or ignore) these queries itself.
///
/// Replies go through the raw write path rather than the outbound queue,
/// so server pings are never stuck behind queued chatter.
#[derive(Debug, Default)]
pub struct DefaultHandler;

#[async_trait]
impl EventHandler for DefaultHandler {
    fn capabilities(&self) -> &'static [Capability] {
        &[Capability::ServerComm]
    }

    async fn handle_event(&self, client: &IrcClient, event: &Event) -> HandlerResult {
        match event {
            Event::ServerPing { response } => {
                client.send_raw_line(&format!("PONG {}", response)).await;
            }
            Event::Version { source, .. } => {
                let reply = Ctcp::wrap(&format!("VERSION {}", client.version()));
                client
                    .send_raw_line(&format!("NOTICE {} :{}", source.nick, reply))
                    .await;
            }
            Event::Ping { source, value, .. } => {
                let reply = Ctcp::wrap(&format!("PING {}", value));
                client
                    .send_raw_line(&format!("NOTICE {} :{}", source.nick, reply))
                    .await;
            }
            Event::Time { source, .. } => {
                let now = Local::now().format("%a %b %e %H:%M:%S %Z %Y");
                let reply = Ctcp::wrap(&format!("TIME {}", now));
                client
                    .send_raw_line(&format!("NOTICE {} :{}", source.nick, reply))
                    .await;
            }
            Event::Finger { source, .. } => {
                let reply = Ctcp::wrap(&format!("FINGER {}", client.finger()));
                client
                    .send_raw_line(&format!("NOTICE {} :{}", source.nick, reply))
                    .await;
            }
            _ => {}
        }
        Ok(())
    }
}
