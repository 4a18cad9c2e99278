//! Message source extraction.
//!
//! Server-forwarded lines lead with `:nick!login@host`; lines originated by
//! the server itself lead with `:server.name`. [`Source`] carries the split
//! components, with empty login/host when the sender is not a user.

use crate::casemap::irc_eq;

/// The origin of a server-forwarded line.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Source {
    /// Nickname, or the raw sender token for non-user sources.
    pub nick: String,
    /// Login (ident), empty for non-user sources.
    pub login: String,
    /// Hostname, empty for non-user sources.
    pub host: String,
}

impl Source {
    /// Build a source from explicit components.
    pub fn new(
        nick: impl Into<String>,
        login: impl Into<String>,
        host: impl Into<String>,
    ) -> Self {
        Self {
            nick: nick.into(),
            login: login.into(),
            host: host.into(),
        }
    }

    /// Split a sender token (leading `:` already present or not) into
    /// nick, login, and host.
    ///
    /// The token is treated as a user mask only when it contains `!`
    /// followed by `@`; anything else is kept whole in `nick` with empty
    /// login and host.
    pub fn parse(sender_info: &str) -> Self {
        let raw = sender_info.strip_prefix(':').unwrap_or(sender_info);
        if let (Some(exclamation), Some(at)) = (raw.find('!'), raw.find('@')) {
            if exclamation > 0 && exclamation < at {
                return Self {
                    nick: raw[..exclamation].to_owned(),
                    login: raw[exclamation + 1..at].to_owned(),
                    host: raw[at + 1..].to_owned(),
                };
            }
        }
        Self {
            nick: raw.to_owned(),
            login: String::new(),
            host: String::new(),
        }
    }

    /// Whether the sender token lacked a user mask (no `!user@host`).
    pub fn is_server(&self) -> bool {
        self.login.is_empty() && self.host.is_empty()
    }

    /// Case-insensitive nick comparison using the RFC 1459 mapping.
    pub fn nick_is(&self, nick: &str) -> bool {
        irc_eq(&self.nick, nick)
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_server() {
            f.write_str(&self.nick)
        } else {
            write!(f, "{}!{}@{}", self.nick, self.login, self.host)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_mask() {
        let s = Source::parse(":alice!~a@host.example");
        assert_eq!(s.nick, "alice");
        assert_eq!(s.login, "~a");
        assert_eq!(s.host, "host.example");
        assert!(!s.is_server());
    }

    #[test]
    fn test_parse_server_name() {
        let s = Source::parse(":irc.example.com");
        assert_eq!(s.nick, "irc.example.com");
        assert!(s.is_server());
    }

    #[test]
    fn test_parse_bare_nick() {
        let s = Source::parse("bob");
        assert_eq!(s.nick, "bob");
        assert!(s.is_server());
    }

    #[test]
    fn test_at_before_exclamation_is_not_a_mask() {
        let s = Source::parse(":weird@thing!x");
        assert_eq!(s.nick, "weird@thing!x");
        assert!(s.is_server());
    }

    #[test]
    fn test_nick_is_case_insensitive() {
        let s = Source::parse(":Alice!a@h");
        assert!(s.nick_is("alice"));
        assert!(s.nick_is("ALICE"));
        assert!(!s.nick_is("bob"));
    }

    #[test]
    fn test_display() {
        assert_eq!(Source::parse(":a!b@c").to_string(), "a!b@c");
        assert_eq!(Source::parse(":irc.net").to_string(), "irc.net");
    }
}
