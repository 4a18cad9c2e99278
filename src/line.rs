//! Line-based codec for tokio.
//!
//! Frames the IRC byte stream into newline-terminated lines with a
//! configurable character encoding. Inbound lines are handed up with their
//! line ending stripped; outbound lines are hard-truncated so that the
//! total with the appended CRLF never exceeds 512 bytes.

use bytes::BytesMut;
use encoding_rs::Encoding;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ClientError;

/// The RFC 1459 maximum line length in bytes, including the trailing CRLF.
pub const MAX_LINE_LENGTH: usize = 512;

/// Line codec with a maximum length and a configurable encoding.
pub struct LineCodec {
    encoding: &'static Encoding,
    /// Index of next byte to check for newline.
    next_index: usize,
    /// Maximum line length, CRLF included.
    max_len: usize,
}

impl LineCodec {
    /// Create a new codec with the specified encoding label
    /// (e.g. `"utf-8"`, `"iso-8859-1"`). `None` selects UTF-8.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidArgument`] for an unknown label.
    pub fn new(label: Option<&str>) -> Result<Self, ClientError> {
        let encoding = match label {
            Some(label) => Encoding::for_label(label.as_bytes()).ok_or_else(|| {
                ClientError::InvalidArgument(format!("unknown encoding: {}", label))
            })?,
            None => encoding_rs::UTF_8,
        };
        Ok(Self {
            encoding,
            next_index: 0,
            max_len: MAX_LINE_LENGTH,
        })
    }

    /// The encoding this codec reads and writes.
    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = ClientError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, ClientError> {
        if let Some(offset) = src[self.next_index..].iter().position(|b| *b == b'\n') {
            let line = src.split_to(self.next_index + offset + 1);
            self.next_index = 0;

            let (cow, _, _) = self.encoding.decode(line.as_ref());
            let data = cow.trim_end_matches(['\r', '\n']).to_owned();
            Ok(Some(data))
        } else {
            // No complete line yet; remember where we stopped scanning. An
            // overlong partial is a protocol violation we surface upward.
            self.next_index = src.len();
            if src.len() > self.max_len {
                return Err(ClientError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("inbound line exceeds {} bytes", self.max_len),
                )));
            }
            Ok(None)
        }
    }
}

impl Encoder<&str> for LineCodec {
    type Error = ClientError;

    fn encode(&mut self, line: &str, dst: &mut BytesMut) -> Result<(), ClientError> {
        let (bytes, _, _) = self.encoding.encode(line);
        let mut bytes = bytes.into_owned();
        // Hard cap: the encoded line plus CRLF must fit in max_len bytes.
        if bytes.len() > self.max_len - 2 {
            bytes.truncate(self.max_len - 2);
        }
        dst.extend_from_slice(&bytes);
        dst.extend_from_slice(b"\r\n");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_complete_line() {
        let mut codec = LineCodec::new(None).unwrap();
        let mut buf = BytesMut::from("PING :test\r\n");

        let result = codec.decode(&mut buf).unwrap();
        assert_eq!(result, Some("PING :test".to_string()));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_partial_line() {
        let mut codec = LineCodec::new(None).unwrap();
        let mut buf = BytesMut::from("PING :");

        let result = codec.decode(&mut buf).unwrap();
        assert_eq!(result, None);
    }

    #[test]
    fn test_decode_two_lines() {
        let mut codec = LineCodec::new(None).unwrap();
        let mut buf = BytesMut::from("PING :a\r\nPING :b\r\n");

        assert_eq!(codec.decode(&mut buf).unwrap(), Some("PING :a".to_string()));
        assert_eq!(codec.decode(&mut buf).unwrap(), Some("PING :b".to_string()));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_encode_appends_crlf() {
        let mut codec = LineCodec::new(None).unwrap();
        let mut buf = BytesMut::new();

        codec.encode("PONG :test", &mut buf).unwrap();
        assert_eq!(&buf[..], b"PONG :test\r\n");
    }

    #[test]
    fn test_encode_truncates_to_512() {
        let mut codec = LineCodec::new(None).unwrap();
        let mut buf = BytesMut::new();

        let long = format!("PRIVMSG #c :{}", "x".repeat(600));
        codec.encode(&long, &mut buf).unwrap();
        assert_eq!(buf.len(), MAX_LINE_LENGTH);
        assert!(buf.ends_with(b"\r\n"));
    }

    #[test]
    fn test_unknown_encoding_rejected() {
        assert!(matches!(
            LineCodec::new(Some("no-such-charset")),
            Err(ClientError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_latin1_round_trip() {
        let mut codec = LineCodec::new(Some("iso-8859-1")).unwrap();
        let mut buf = BytesMut::new();
        codec.encode("PRIVMSG #c :café", &mut buf).unwrap();
        // é is a single byte in latin-1
        assert_eq!(buf.len(), "PRIVMSG #c :caf".len() + 1 + 2);

        let mut inbound = BytesMut::from(&buf[..]);
        let decoded = codec.decode(&mut inbound).unwrap().unwrap();
        assert_eq!(decoded, "PRIVMSG #c :café");
    }
}
