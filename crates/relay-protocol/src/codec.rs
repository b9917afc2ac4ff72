//! Tag splitting for relayed messages.
//!
//! Application payloads are opaque to the hub. By convention they start with
//! a tag followed by `||` (for example `chat||hello`); the tag is used for
//! analytics only and never validated.

use thiserror::Error;

/// Separator between a message's tag and the rest of the payload.
pub const TAG_DELIMITER: &str = "||";

const DELIMITER: &[u8] = TAG_DELIMITER.as_bytes();

/// Protocol errors that can occur while parsing control messages.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// No `||` delimiter in the message.
    #[error("Missing '{TAG_DELIMITER}' delimiter")]
    MissingDelimiter,

    /// Control kind is not one of `self`, `connect`, `disconnect`.
    #[error("Unknown control kind: {0}")]
    UnknownKind(String),

    /// Identity field is not a decimal integer.
    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),
}

/// Split a message into its tag and the remainder after the first delimiter.
///
/// A message without a delimiter is a single tag equal to the whole message.
#[must_use]
pub fn split_tag(data: &[u8]) -> (&[u8], Option<&[u8]>) {
    match find_delimiter(data) {
        Some(pos) => (&data[..pos], Some(&data[pos + DELIMITER.len()..])),
        None => (data, None),
    }
}

/// Get only the tag of a message.
#[must_use]
pub fn tag_of(data: &[u8]) -> &[u8] {
    split_tag(data).0
}

fn find_delimiter(data: &[u8]) -> Option<usize> {
    data.windows(DELIMITER.len()).position(|w| w == DELIMITER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_tag() {
        assert_eq!(split_tag(b"chat||hi"), (&b"chat"[..], Some(&b"hi"[..])));
        assert_eq!(split_tag(b"move||1||2"), (&b"move"[..], Some(&b"1||2"[..])));
    }

    #[test]
    fn test_split_tag_without_delimiter() {
        assert_eq!(split_tag(b"ping"), (&b"ping"[..], None));
        assert_eq!(split_tag(b"a|b"), (&b"a|b"[..], None));
        assert_eq!(split_tag(b""), (&b""[..], None));
    }

    #[test]
    fn test_split_tag_edges() {
        // Empty tag and empty remainder are both legal
        assert_eq!(split_tag(b"||x"), (&b""[..], Some(&b"x"[..])));
        assert_eq!(split_tag(b"x||"), (&b"x"[..], Some(&b""[..])));
        assert_eq!(tag_of(b"Chat||x"), b"Chat");
    }
}
