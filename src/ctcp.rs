//! CTCP (Client-to-Client Protocol) message handling.
//!
//! CTCP payloads ride inside PRIVMSG and NOTICE trailing parameters,
//! wrapped in the `\x01` delimiter character.
//!
//! # Reference
//! - CTCP specification: <https://modern.ircdocs.horse/ctcp.html>

use std::fmt;

/// The CTCP delimiter character (`\x01`).
pub const CTCP_DELIM: char = '\x01';

/// CTCP verbs the dispatcher recognizes.
///
/// Verb matching is exact (no case folding); an unconventionally cased
/// request falls through as [`CtcpKind::Unknown`] and surfaces as an
/// unknown-line event.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum CtcpKind {
    /// ACTION - describes an action performed by the user (`/me`).
    Action,
    /// VERSION - requests client version information.
    Version,
    /// PING - measures round-trip latency.
    Ping,
    /// TIME - requests local time from the client.
    Time,
    /// FINGER - requests user information (legacy).
    Finger,
    /// DCC - Direct Client-to-Client negotiation.
    Dcc,
    /// Unrecognized verb.
    Unknown(String),
}

impl CtcpKind {
    /// Classify a CTCP verb token.
    pub fn parse(name: &str) -> Self {
        match name {
            "ACTION" => Self::Action,
            "VERSION" => Self::Version,
            "PING" => Self::Ping,
            "TIME" => Self::Time,
            "FINGER" => Self::Finger,
            "DCC" => Self::Dcc,
            _ => Self::Unknown(name.to_owned()),
        }
    }

    /// The canonical name of this verb.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Action => "ACTION",
            Self::Version => "VERSION",
            Self::Ping => "PING",
            Self::Time => "TIME",
            Self::Finger => "FINGER",
            Self::Dcc => "DCC",
            Self::Unknown(s) => s,
        }
    }
}

impl fmt::Display for CtcpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed CTCP request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ctcp<'a> {
    /// The verb.
    pub kind: CtcpKind,
    /// Everything after the verb, if present.
    pub params: Option<&'a str>,
}

impl<'a> Ctcp<'a> {
    /// Parse a CTCP request from a PRIVMSG/NOTICE body.
    ///
    /// Returns `None` if the body is not delimiter-wrapped or is empty.
    pub fn parse(text: &'a str) -> Option<Self> {
        let text = text.strip_prefix(CTCP_DELIM)?;
        let text = text.strip_suffix(CTCP_DELIM).unwrap_or(text);

        if text.is_empty() {
            return None;
        }

        let (verb, params) = match text.find(' ') {
            Some(pos) => {
                let rest = &text[pos + 1..];
                (&text[..pos], if rest.is_empty() { None } else { Some(rest) })
            }
            None => (text, None),
        };

        Some(Self {
            kind: CtcpKind::parse(verb),
            params,
        })
    }

    /// Whether a message body is delimiter-wrapped.
    #[inline]
    pub fn is_ctcp(text: &str) -> bool {
        text.starts_with(CTCP_DELIM) && text.ends_with(CTCP_DELIM) && text.len() > 1
    }

    /// Format a raw CTCP command body, delimiter-wrapped, ready to embed
    /// in a PRIVMSG or NOTICE trailing parameter.
    pub fn wrap(command: &str) -> String {
        format!("{}{}{}", CTCP_DELIM, command, CTCP_DELIM)
    }
}

impl fmt::Display for Ctcp<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", CTCP_DELIM, self.kind)?;
        if let Some(params) = self.params {
            write!(f, " {}", params)?;
        }
        write!(f, "{}", CTCP_DELIM)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_action() {
        let ctcp = Ctcp::parse("\x01ACTION waves hello\x01").unwrap();
        assert_eq!(ctcp.kind, CtcpKind::Action);
        assert_eq!(ctcp.params, Some("waves hello"));
    }

    #[test]
    fn test_parse_version() {
        let ctcp = Ctcp::parse("\x01VERSION\x01").unwrap();
        assert_eq!(ctcp.kind, CtcpKind::Version);
        assert_eq!(ctcp.params, None);
    }

    #[test]
    fn test_parse_dcc() {
        let ctcp = Ctcp::parse("\x01DCC CHAT chat 2130706433 4000\x01").unwrap();
        assert_eq!(ctcp.kind, CtcpKind::Dcc);
        assert_eq!(ctcp.params, Some("CHAT chat 2130706433 4000"));
    }

    #[test]
    fn test_verb_matching_is_exact() {
        let ctcp = Ctcp::parse("\x01version\x01").unwrap();
        assert_eq!(ctcp.kind, CtcpKind::Unknown("version".to_owned()));
    }

    #[test]
    fn test_parse_missing_trailing_delim() {
        // Some clients omit the trailing delimiter
        let ctcp = Ctcp::parse("\x01ACTION waves").unwrap();
        assert_eq!(ctcp.kind, CtcpKind::Action);
        assert_eq!(ctcp.params, Some("waves"));
    }

    #[test]
    fn test_parse_not_ctcp() {
        assert!(Ctcp::parse("hello world").is_none());
        assert!(Ctcp::parse("").is_none());
        assert!(Ctcp::parse("\x01\x01").is_none());
    }

    #[test]
    fn test_wrap() {
        assert_eq!(Ctcp::wrap("VERSION Test-1"), "\x01VERSION Test-1\x01");
    }

    #[test]
    fn test_roundtrip() {
        let original = "\x01ACTION does something\x01";
        let parsed = Ctcp::parse(original).unwrap();
        assert_eq!(parsed.to_string(), original);
    }
}
