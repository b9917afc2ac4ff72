//! Control messages sent by the hub.
//!
//! The hub tells every client about identity changes using short text
//! messages of the form `<kind>||<identity>`:
//!
//! - `self||3` - sent once to a newly admitted client, carrying its own identity
//! - `connect||5` - a peer with identity 5 is connected
//! - `disconnect||5` - the peer with identity 5 has left

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::codec::{split_tag, ProtocolError, TAG_DELIMITER};

/// The small integer handle by which a connection is known to its peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(u32);

impl Identity {
    /// Create an identity from its numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Get the numeric value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for Identity {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl FromStr for Identity {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u32>()
            .map(Self)
            .map_err(|_| ProtocolError::InvalidIdentity(s.to_string()))
    }
}

/// Kind of a control message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlKind {
    /// The recipient's own identity.
    SelfId,
    /// A peer joined.
    Connect,
    /// A peer left.
    Disconnect,
}

impl ControlKind {
    /// Wire name of this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ControlKind::SelfId => "self",
            ControlKind::Connect => "connect",
            ControlKind::Disconnect => "disconnect",
        }
    }
}

impl fmt::Display for ControlKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ControlKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "self" => Ok(ControlKind::SelfId),
            "connect" => Ok(ControlKind::Connect),
            "disconnect" => Ok(ControlKind::Disconnect),
            other => Err(ProtocolError::UnknownKind(other.to_string())),
        }
    }
}

/// A hub-originated control message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ControlMessage {
    /// What happened.
    pub kind: ControlKind,
    /// Whom it happened to.
    pub identity: Identity,
}

impl ControlMessage {
    /// Create a `self` message.
    #[must_use]
    pub fn self_id(identity: Identity) -> Self {
        Self {
            kind: ControlKind::SelfId,
            identity,
        }
    }

    /// Create a `connect` message.
    #[must_use]
    pub fn connect(identity: Identity) -> Self {
        Self {
            kind: ControlKind::Connect,
            identity,
        }
    }

    /// Create a `disconnect` message.
    #[must_use]
    pub fn disconnect(identity: Identity) -> Self {
        Self {
            kind: ControlKind::Disconnect,
            identity,
        }
    }

    /// Encode to the `<kind>||<identity>` wire form.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        Bytes::from(self.to_string())
    }

    /// Parse a control message from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the delimiter is missing, the kind is unknown,
    /// or the identity is not a decimal integer.
    pub fn parse(data: &[u8]) -> Result<Self, ProtocolError> {
        let (kind, rest) = split_tag(data);
        let rest = rest.ok_or(ProtocolError::MissingDelimiter)?;

        let kind = std::str::from_utf8(kind)
            .map_err(|_| ProtocolError::UnknownKind(String::from_utf8_lossy(kind).into_owned()))?
            .parse::<ControlKind>()?;
        let identity = std::str::from_utf8(rest)
            .map_err(|_| ProtocolError::InvalidIdentity(String::from_utf8_lossy(rest).into_owned()))?
            .parse::<Identity>()?;

        Ok(Self { kind, identity })
    }
}

impl fmt::Display for ControlMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.kind, TAG_DELIMITER, self.identity)
    }
}
