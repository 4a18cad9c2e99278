//! Line parsing and event routing.
//!
//! One decoded line comes in, registry updates are applied, and the
//! matching events go out to handlers. Tokenization is whitespace
//! splitting, with the trailing `:`-parameter recovered from the raw
//! line so embedded spaces survive.

use tracing::debug;

use crate::casemap::irc_eq;
use crate::channels::ChannelUser;
use crate::client::{IrcClient, CHANNEL_PREFIXES};
use crate::event::Event;
use crate::mode::process_channel_mode;
use crate::source::Source;

const RPL_LIST: u32 = 322;
const RPL_TOPIC: u32 = 332;
const RPL_TOPICINFO: u32 = 333;
const RPL_NAMREPLY: u32 = 353;
const RPL_ENDOFNAMES: u32 = 366;

/// The trailing `:`-parameter, i.e. everything after the first ` :`.
fn trailing(line: &str) -> &str {
    line.find(" :").map(|i| &line[i + 2..]).unwrap_or("")
}

fn is_channel(target: &str) -> bool {
    target
        .chars()
        .next()
        .map(|c| CHANNEL_PREFIXES.contains(c))
        .unwrap_or(false)
}

impl IrcClient {
    /// Decode one server line, update connection state, and dispatch the
    /// resulting events. Called by the reader loop for every line; public
    /// so embedders can replay captured traffic.
    pub async fn handle_line(&self, line: &str) {
        if let Some(response) = line.strip_prefix("PING ") {
            self.dispatch_event(Event::ServerPing {
                response: response.to_owned(),
            })
            .await;
            return;
        }

        let mut tokens = line.split_whitespace();
        let Some(sender_info) = tokens.next() else {
            return;
        };
        let Some(command_token) = tokens.next() else {
            self.dispatch_event(Event::Unknown {
                line: line.to_owned(),
            })
            .await;
            return;
        };

        let mut source = Source::default();
        if sender_info.starts_with(':') {
            let parsed = Source::parse(sender_info);
            if !parsed.is_server() {
                source = parsed;
            } else if tokens.clone().next().is_some() {
                if let Ok(code) = command_token.parse::<u32>() {
                    // Numeric response. The payload starts four bytes past
                    // the numeric token in the raw line: three digits and
                    // one space.
                    let response = line[sender_info.len()..]
                        .find(command_token)
                        .and_then(|i| line.get(sender_info.len() + i + 4..))
                        .unwrap_or("");
                    self.process_server_response(code, response).await;
                    return;
                }
                source = parsed;
            } else {
                self.dispatch_event(Event::Unknown {
                    line: line.to_owned(),
                })
                .await;
                return;
            }
        }

        let command = command_token.to_uppercase();
        let target = tokens.next().unwrap_or("");
        let target = target.strip_prefix(':').unwrap_or(target).to_owned();

        if command == "PRIVMSG" {
            if let Some(idx) = line.find(":\u{1}") {
                if idx > 0 && line.ends_with('\u{1}') {
                    let request = &line[idx + 2..line.len() - 1];
                    self.handle_ctcp(&source, &target, request, line).await;
                    return;
                }
            }
        }

        match command.as_str() {
            "PRIVMSG" if is_channel(&target) => {
                self.dispatch_event(Event::Message {
                    channel: target,
                    source,
                    text: trailing(line).to_owned(),
                })
                .await;
            }
            "PRIVMSG" => {
                self.dispatch_event(Event::PrivateMessage {
                    source,
                    text: trailing(line).to_owned(),
                })
                .await;
            }
            "JOIN" => {
                self.inner
                    .registry
                    .add_user(&target, ChannelUser::new("", source.nick.clone()));
                self.dispatch_event(Event::Join {
                    channel: target,
                    source,
                })
                .await;
            }
            "PART" => {
                self.inner.registry.remove_user(&target, &source.nick);
                if source.nick_is(&self.nick()) {
                    self.inner.registry.remove_channel(&target);
                }
                self.dispatch_event(Event::Part {
                    channel: target,
                    source,
                })
                .await;
            }
            "NICK" => {
                let new_nick = target;
                self.inner.registry.rename_user(&source.nick, &new_nick);
                if source.nick_is(&self.nick()) {
                    self.set_nick(&new_nick);
                }
                self.dispatch_event(Event::NickChange { source, new_nick }).await;
            }
            "NOTICE" => {
                self.dispatch_event(Event::Notice {
                    source,
                    target,
                    text: trailing(line).to_owned(),
                })
                .await;
            }
            "QUIT" => {
                if source.nick_is(&self.nick()) {
                    self.inner.registry.clear();
                } else {
                    self.inner.registry.remove_user_everywhere(&source.nick);
                }
                self.dispatch_event(Event::Quit {
                    source,
                    reason: trailing(line).to_owned(),
                })
                .await;
            }
            "KICK" => {
                let recipient = tokens.next().unwrap_or("").to_owned();
                if irc_eq(&recipient, &self.nick()) {
                    self.inner.registry.remove_channel(&target);
                }
                self.inner.registry.remove_user(&target, &recipient);
                self.dispatch_event(Event::Kick {
                    channel: target,
                    source,
                    recipient,
                    reason: trailing(line).to_owned(),
                })
                .await;
            }
            "MODE" => {
                // The mode text is everything after the target token in
                // the raw line.
                let mode = line
                    .get(2..)
                    .and_then(|rest| rest.find(target.as_str()).map(|i| 2 + i + target.len() + 1))
                    .and_then(|idx| line.get(idx..))
                    .unwrap_or("");
                let mode = mode.strip_prefix(':').unwrap_or(mode);
                self.process_mode(&target, &source, mode).await;
            }
            "TOPIC" => {
                self.dispatch_event(Event::Topic {
                    channel: target,
                    topic: trailing(line).to_owned(),
                    set_by: source.nick.clone(),
                    date: chrono::Utc::now().timestamp_millis(),
                    changed: true,
                })
                .await;
            }
            "INVITE" => {
                self.dispatch_event(Event::Invite {
                    target,
                    source,
                    channel: trailing(line).to_owned(),
                })
                .await;
            }
            _ => {
                self.dispatch_event(Event::Unknown {
                    line: line.to_owned(),
                })
                .await;
            }
        }
    }

    async fn handle_ctcp(&self, source: &Source, target: &str, request: &str, line: &str) {
        if request == "VERSION" {
            self.dispatch_event(Event::Version {
                source: source.clone(),
                target: target.to_owned(),
            })
            .await;
        } else if let Some(text) = request.strip_prefix("ACTION ") {
            self.dispatch_event(Event::Action {
                source: source.clone(),
                target: target.to_owned(),
                text: text.to_owned(),
            })
            .await;
        } else if let Some(value) = request.strip_prefix("PING ") {
            self.dispatch_event(Event::Ping {
                source: source.clone(),
                target: target.to_owned(),
                value: value.to_owned(),
            })
            .await;
        } else if request == "TIME" {
            self.dispatch_event(Event::Time {
                source: source.clone(),
                target: target.to_owned(),
            })
            .await;
        } else if request == "FINGER" {
            self.dispatch_event(Event::Finger {
                source: source.clone(),
                target: target.to_owned(),
            })
            .await;
        } else if request.split_whitespace().count() >= 5
            && request.split_whitespace().next() == Some("DCC")
        {
            if !self.inner.dcc.process_request(self, source, request).await {
                self.dispatch_event(Event::Unknown {
                    line: line.to_owned(),
                })
                .await;
            }
        } else {
            self.dispatch_event(Event::Unknown {
                line: line.to_owned(),
            })
            .await;
        }
    }

    async fn process_mode(&self, target: &str, source: &Source, mode: &str) {
        if is_channel(target) {
            let events = process_channel_mode(&self.inner.registry, target, source, mode);
            for event in events {
                self.dispatch_event(event).await;
            }
        } else {
            self.dispatch_event(Event::UserMode {
                nick: target.to_owned(),
                source: source.clone(),
                mode: mode.to_owned(),
            })
            .await;
        }
    }

    /// Handle a numeric server response: special-case the codes carrying
    /// channel state, then forward everything as a generic
    /// [`Event::ServerResponse`].
    pub(crate) async fn process_server_response(&self, code: u32, response: &str) {
        match code {
            RPL_LIST => {
                if let Some((channel, user_count, topic)) = parse_list_row(response) {
                    self.dispatch_event(Event::ChannelInfo {
                        channel,
                        user_count,
                        topic,
                    })
                    .await;
                } else {
                    debug!(response, "unparsable RPL_LIST row");
                }
            }
            RPL_TOPIC => {
                if let Some((channel, topic)) = parse_topic_row(response) {
                    self.inner.topics.lock().unwrap().insert(channel, topic);
                }
            }
            RPL_TOPICINFO => {
                let mut tokens = response.split_whitespace().skip(1);
                if let (Some(channel), Some(set_by)) = (tokens.next(), tokens.next()) {
                    let date = tokens
                        .next()
                        .and_then(|t| t.parse::<i64>().ok())
                        .map(|secs| secs * 1000)
                        .unwrap_or(0);
                    let topic = self
                        .inner
                        .topics
                        .lock()
                        .unwrap()
                        .remove(channel)
                        .unwrap_or_default();
                    self.dispatch_event(Event::Topic {
                        channel: channel.to_owned(),
                        topic,
                        set_by: set_by.to_owned(),
                        date,
                        changed: false,
                    })
                    .await;
                }
            }
            RPL_NAMREPLY => {
                if let Some(channel_end) = response.find(" :") {
                    let channel = response[..channel_end]
                        .rsplit(' ')
                        .next()
                        .unwrap_or("")
                        .to_owned();
                    for token in response[channel_end + 2..].split_whitespace() {
                        let (prefix, nick) = match token.chars().next() {
                            Some(c @ ('@' | '+' | '.')) => (c.to_string(), &token[1..]),
                            _ => (String::new(), token),
                        };
                        if !nick.is_empty() {
                            self.inner
                                .registry
                                .add_user(&channel, ChannelUser::new(prefix, nick));
                        }
                    }
                }
            }
            RPL_ENDOFNAMES => {
                if let (Some(first), Some(end)) = (response.find(' '), response.find(" :")) {
                    if end > first {
                        let channel = &response[first + 1..end];
                        let users = self.inner.registry.users(channel);
                        self.dispatch_event(Event::UserList {
                            channel: channel.to_owned(),
                            users,
                        })
                        .await;
                    }
                }
            }
            _ => {}
        }

        self.dispatch_event(Event::ServerResponse {
            code,
            response: response.to_owned(),
        })
        .await;
    }
}

/// Parse one RPL_LIST row: `me <channel> <userCount> :<topic>`.
fn parse_list_row(response: &str) -> Option<(String, u32, String)> {
    let first = response.find(' ')?;
    let second = response[first + 1..].find(' ').map(|i| first + 1 + i)?;
    let third = response[second + 1..].find(' ').map(|i| second + 1 + i)?;
    let colon = response.find(':')?;
    let channel = response.get(first + 1..second)?.to_owned();
    let user_count = response.get(second + 1..third)?.parse().unwrap_or(0);
    let topic = response.get(colon + 1..)?.to_owned();
    Some((channel, user_count, topic))
}

/// Parse one RPL_TOPIC row: `me <channel> :<topic>`.
fn parse_topic_row(response: &str) -> Option<(String, String)> {
    let first = response.find(' ')?;
    let second = response[first + 1..].find(' ').map(|i| first + 1 + i)?;
    let colon = response.find(':')?;
    let channel = response.get(first + 1..second)?.to_owned();
    let topic = response.get(colon + 1..)?.to_owned();
    Some((channel, topic))
}
