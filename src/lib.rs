//! # slirc-client
//!
//! An event-driven IRC client framework (RFC 1459/2812): a long-lived
//! connection engine with protocol framing and parsing, per-channel user
//! tracking across mode changes and nick movements, outbound flood
//! control, a typed event dispatch layer, and DCC chat/file negotiation.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use slirc_client::{
//!     ConnectionSettings, Event, EventHandler, HandlerResult, IrcClient,
//! };
//!
//! struct Greeter;
//!
//! #[async_trait]
//! impl EventHandler for Greeter {
//!     async fn handle_event(&self, client: &IrcClient, event: &Event) -> HandlerResult {
//!         if let Event::Message { channel, source, text } = event {
//!             if text == "!hello" {
//!                 client.send_message(channel, &format!("hello, {}!", source.nick));
//!             }
//!         }
//!         Ok(())
//!     }
//! }
//!
//! # async fn run() -> Result<(), slirc_client::ClientError> {
//! let client = IrcClient::new();
//! client.set_name("greeter");
//! client.add_handler(Arc::new(Greeter));
//! client.connect(ConnectionSettings::new("irc.libera.chat")).await?;
//! client.join_channel("#rust").await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! Two long-lived tasks run per connection: the reader (framed socket
//! reads, idle pings, disconnect detection) and the sender (paced
//! draining of the outbound queue). Decoded lines flow through the
//! dispatcher, which updates the channel registry and delivers tagged
//! [`Event`] values to every registered [`EventHandler`] whose capability
//! set covers them. DCC requests embedded in CTCP frames are negotiated
//! by an internal manager and surface as events carrying session
//! envelopes.

#![deny(clippy::all)]

pub mod casemap;
pub mod channels;
mod client;
pub mod config;
pub mod ctcp;
pub mod dcc;
mod dispatch;
pub mod error;
pub mod event;
pub mod handler;
mod ident;
pub mod line;
mod mode;
mod queue;
pub mod source;
mod tls;
pub mod util;

pub use self::channels::{ChannelRegistry, ChannelUser};
pub use self::client::{Connection, ConnectionSettings, IrcClient};
pub use self::config::{BotConfig, ConfigError};
pub use self::ctcp::{Ctcp, CtcpKind};
pub use self::dcc::{DccChat, DccChatSession, DccFileTransfer, Direction, TransferState};
pub use self::error::{ClientError, HandlerError, HandlerResult};
pub use self::event::{Capability, Category, Event};
pub use self::handler::{DefaultHandler, EventHandler};
pub use self::line::{LineCodec, MAX_LINE_LENGTH};
pub use self::source::Source;
pub use self::util::{ip_to_long, long_to_ip};
