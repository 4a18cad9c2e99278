//! Tagged event values delivered to handlers.
//!
//! Every decoded server line becomes one or more [`Event`] values. Each
//! event belongs to one or more [`Category`]s; handlers advertise the
//! capability set they want (see [`Capability`]) and the dispatcher
//! delivers each event to every handler whose set covers it, in
//! registration order.

use crate::channels::ChannelUser;
use crate::dcc::{DccChat, DccFileTransfer};
use crate::source::Source;

/// Broad event families used for capability matching.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Category {
    /// Protocol plumbing: server pings, numeric responses, CTCP queries.
    ServerComm,
    /// Conversation traffic: messages, notices, actions, DCC invitations.
    Chat,
    /// Channel and connection state: joins, parts, modes, topics.
    Administrative,
}

/// What a handler wants to receive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Capability {
    /// Events in [`Category::ServerComm`].
    ServerComm,
    /// Events in [`Category::Chat`].
    Chat,
    /// Events in [`Category::Administrative`].
    Administrative,
    /// Everything.
    Full,
}

/// An event produced by the dispatcher.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum Event {
    /// Registration with the server completed.
    Connect,
    /// The connection ended (not emitted after `dispose`).
    Disconnect,
    /// The server sent `PING`; carries everything after `PING `.
    ServerPing { response: String },
    /// A numeric reply; `response` is the raw remainder of the line.
    ServerResponse { code: u32, response: String },
    /// PRIVMSG to a channel.
    Message {
        channel: String,
        source: Source,
        text: String,
    },
    /// PRIVMSG addressed to us.
    PrivateMessage { source: Source, text: String },
    /// CTCP ACTION (`/me`).
    Action {
        source: Source,
        target: String,
        text: String,
    },
    /// NOTICE to a channel or to us.
    Notice {
        source: Source,
        target: String,
        text: String,
    },
    /// CTCP VERSION query.
    Version { source: Source, target: String },
    /// CTCP PING query; `value` is the peer's token to echo.
    Ping {
        source: Source,
        target: String,
        value: String,
    },
    /// CTCP TIME query.
    Time { source: Source, target: String },
    /// CTCP FINGER query.
    Finger { source: Source, target: String },
    /// A user (possibly us) joined a channel.
    Join { channel: String, source: Source },
    /// A user (possibly us) left a channel.
    Part { channel: String, source: Source },
    /// A user changed nick; registry and own-nick updates have already
    /// been applied when this is delivered.
    NickChange { source: Source, new_nick: String },
    /// A user quit the network.
    Quit { source: Source, reason: String },
    /// A user was kicked from a channel.
    Kick {
        channel: String,
        source: Source,
        recipient: String,
        reason: String,
    },
    /// Channel topic, either freshly changed (`changed == true`, `date` is
    /// now) or replayed on join (`changed == false`, `date` from the
    /// server, in epoch milliseconds).
    Topic {
        channel: String,
        topic: String,
        set_by: String,
        date: i64,
        changed: bool,
    },
    /// One row of a LIST reply.
    ChannelInfo {
        channel: String,
        user_count: u32,
        topic: String,
    },
    /// Complete user list for a channel (end of NAMES).
    UserList {
        channel: String,
        users: Vec<ChannelUser>,
    },
    /// We were invited to a channel.
    Invite {
        target: String,
        source: Source,
        channel: String,
    },
    /// Aggregate channel mode change, raw mode string included. The
    /// granular events below precede this one.
    Mode {
        channel: String,
        source: Source,
        mode: String,
    },
    /// Mode change targeting a user rather than a channel; not parsed
    /// further.
    UserMode {
        nick: String,
        source: Source,
        mode: String,
    },

    /// `+o` granted.
    Op {
        channel: String,
        source: Source,
        recipient: String,
    },
    /// `-o` applied.
    Deop {
        channel: String,
        source: Source,
        recipient: String,
    },
    /// `+v` granted.
    Voice {
        channel: String,
        source: Source,
        recipient: String,
    },
    /// `-v` applied.
    DeVoice {
        channel: String,
        source: Source,
        recipient: String,
    },
    /// `+k` set.
    SetChannelKey {
        channel: String,
        source: Source,
        key: String,
    },
    /// `-k` removed.
    RemoveChannelKey {
        channel: String,
        source: Source,
        key: String,
    },
    /// `+l` set.
    SetChannelLimit {
        channel: String,
        source: Source,
        limit: u32,
    },
    /// `-l` removed.
    RemoveChannelLimit { channel: String, source: Source },
    /// `+b` set.
    SetChannelBan {
        channel: String,
        source: Source,
        hostmask: String,
    },
    /// `-b` removed.
    RemoveChannelBan {
        channel: String,
        source: Source,
        hostmask: String,
    },
    /// `+t` set.
    SetTopicProtection { channel: String, source: Source },
    /// `-t` removed.
    RemoveTopicProtection { channel: String, source: Source },
    /// `+n` set.
    SetNoExternalMessages { channel: String, source: Source },
    /// `-n` removed.
    RemoveNoExternalMessages { channel: String, source: Source },
    /// `+i` set.
    SetInviteOnly { channel: String, source: Source },
    /// `-i` removed.
    RemoveInviteOnly { channel: String, source: Source },
    /// `+m` set.
    SetModerated { channel: String, source: Source },
    /// `-m` removed.
    RemoveModerated { channel: String, source: Source },
    /// `+p` set.
    SetPrivate { channel: String, source: Source },
    /// `-p` removed.
    RemovePrivate { channel: String, source: Source },
    /// `+s` set.
    SetSecret { channel: String, source: Source },
    /// `-s` removed.
    RemoveSecret { channel: String, source: Source },

    /// A peer offered us a file over DCC.
    IncomingFileTransfer { transfer: DccFileTransfer },
    /// A peer invited us to a DCC chat.
    IncomingChatRequest { chat: DccChat },
    /// A line no routing rule matched.
    Unknown { line: String },
}

impl Event {
    /// The categories this event belongs to.
    pub fn categories(&self) -> &'static [Category] {
        use Category::*;
        match self {
            Event::ServerPing { .. }
            | Event::ServerResponse { .. }
            | Event::Version { .. }
            | Event::Ping { .. }
            | Event::Time { .. }
            | Event::Finger { .. } => &[ServerComm],

            Event::Message { .. }
            | Event::PrivateMessage { .. }
            | Event::Action { .. }
            | Event::Notice { .. }
            | Event::IncomingFileTransfer { .. }
            | Event::IncomingChatRequest { .. } => &[Chat],

            Event::UserList { .. } => &[Chat, Administrative],

            Event::Unknown { .. } => &[ServerComm, Chat, Administrative],

            _ => &[Administrative],
        }
    }

    /// Whether a handler advertising `capabilities` should receive this
    /// event.
    pub fn matches(&self, capabilities: &[Capability]) -> bool {
        capabilities.iter().any(|cap| match cap {
            Capability::Full => true,
            Capability::ServerComm => self.categories().contains(&Category::ServerComm),
            Capability::Chat => self.categories().contains(&Category::Chat),
            Capability::Administrative => {
                self.categories().contains(&Category::Administrative)
            }
        })
    }
}
