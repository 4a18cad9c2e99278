//! Per-channel user membership tracking.
//!
//! The registry maps case-folded channel names to the set of users known
//! to be present, each carrying the status prefix most recently observed
//! for them. All mutation and enumeration happen under a single lock;
//! enumeration copies snapshots out before releasing it.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

use crate::casemap::{irc_eq, irc_to_lower};

/// A user present in a channel.
///
/// The prefix encodes channel status: `""` (none), `"+"` (voiced),
/// `"@"` (operator), or `"@+"` (both). Two users are equal iff their
/// nicks match case-insensitively; the prefix is metadata.
#[derive(Clone, Debug)]
pub struct ChannelUser {
    prefix: String,
    nick: String,
}

impl ChannelUser {
    /// Build a user record from a status prefix and a nick.
    pub fn new(prefix: impl Into<String>, nick: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            nick: nick.into(),
        }
    }

    /// The status prefix (`""`, `"+"`, `"@"`, `"@+"`, or a server-specific
    /// sigil from a names reply).
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The nick.
    pub fn nick(&self) -> &str {
        &self.nick
    }

    /// Whether the user holds operator status.
    pub fn is_op(&self) -> bool {
        self.prefix.contains('@')
    }

    /// Whether the user holds voice.
    pub fn has_voice(&self) -> bool {
        self.prefix.contains('+')
    }
}

impl PartialEq for ChannelUser {
    fn eq(&self, other: &Self) -> bool {
        irc_eq(&self.nick, &other.nick)
    }
}

impl Eq for ChannelUser {}

impl Hash for ChannelUser {
    fn hash<H: Hasher>(&self, state: &mut H) {
        irc_to_lower(&self.nick).hash(state);
    }
}

impl std::fmt::Display for ChannelUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.prefix, self.nick)
    }
}

/// Status updates applied to a user record by the mode processor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum StatusChange {
    GrantOp,
    RevokeOp,
    GrantVoice,
    RevokeVoice,
}

/// Channel membership tables for one connection.
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    channels: Mutex<HashMap<String, HashMap<String, ChannelUser>>>,
}

impl ChannelRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user to a channel, replacing any existing record for the nick.
    pub(crate) fn add_user(&self, channel: &str, user: ChannelUser) {
        let channel = irc_to_lower(channel);
        let key = irc_to_lower(user.nick());
        let mut channels = self.channels.lock().unwrap();
        channels.entry(channel).or_default().insert(key, user);
    }

    /// Remove a user from a channel, returning the removed record.
    pub(crate) fn remove_user(&self, channel: &str, nick: &str) -> Option<ChannelUser> {
        let channel = irc_to_lower(channel);
        let key = irc_to_lower(nick);
        let mut channels = self.channels.lock().unwrap();
        channels.get_mut(&channel).and_then(|users| users.remove(&key))
    }

    /// Remove a user from every channel.
    pub(crate) fn remove_user_everywhere(&self, nick: &str) {
        let key = irc_to_lower(nick);
        let mut channels = self.channels.lock().unwrap();
        for users in channels.values_mut() {
            users.remove(&key);
        }
    }

    /// Rename a user in every channel they appear in, keeping their prefix.
    pub(crate) fn rename_user(&self, old_nick: &str, new_nick: &str) {
        let old_key = irc_to_lower(old_nick);
        let new_key = irc_to_lower(new_nick);
        let mut channels = self.channels.lock().unwrap();
        for users in channels.values_mut() {
            if let Some(user) = users.remove(&old_key) {
                users.insert(
                    new_key.clone(),
                    ChannelUser::new(user.prefix().to_owned(), new_nick),
                );
            }
        }
    }

    /// Drop an entire channel.
    pub(crate) fn remove_channel(&self, channel: &str) {
        let channel = irc_to_lower(channel);
        self.channels.lock().unwrap().remove(&channel);
    }

    /// Drop every channel.
    pub(crate) fn clear(&self) {
        self.channels.lock().unwrap().clear();
    }

    /// Apply an op/voice status change to a user's record, creating the
    /// record if the user was unknown in the channel so the new status is
    /// not lost.
    pub(crate) fn update_user(&self, channel: &str, change: StatusChange, nick: &str) {
        let channel = irc_to_lower(channel);
        let key = irc_to_lower(nick);
        let mut channels = self.channels.lock().unwrap();
        let users = channels.entry(channel).or_default();
        let current = users
            .get(&key)
            .cloned()
            .unwrap_or_else(|| ChannelUser::new("", nick));

        let prefix = match change {
            StatusChange::GrantOp => {
                if current.has_voice() {
                    "@+"
                } else {
                    "@"
                }
            }
            StatusChange::RevokeOp => {
                if current.has_voice() {
                    "+"
                } else {
                    ""
                }
            }
            StatusChange::GrantVoice => {
                if current.is_op() {
                    "@+"
                } else {
                    "+"
                }
            }
            StatusChange::RevokeVoice => {
                if current.is_op() {
                    "@"
                } else {
                    ""
                }
            }
        };
        users.insert(key, ChannelUser::new(prefix, current.nick().to_owned()));
    }

    /// Snapshot of the users in a channel; empty if we are not in it.
    pub fn users(&self, channel: &str) -> Vec<ChannelUser> {
        let channel = irc_to_lower(channel);
        let channels = self.channels.lock().unwrap();
        channels
            .get(&channel)
            .map(|users| users.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether a nick is present in a channel. `None` if we are not in the
    /// channel ourselves.
    pub fn is_user_in_channel(&self, nick: &str, channel: &str) -> Option<bool> {
        let channel = irc_to_lower(channel);
        let key = irc_to_lower(nick);
        let channels = self.channels.lock().unwrap();
        channels.get(&channel).map(|users| users.contains_key(&key))
    }

    /// Snapshot of the channels we are currently in (case-folded names).
    pub fn channels(&self) -> Vec<String> {
        self.channels.lock().unwrap().keys().cloned().collect()
    }
}
