//! # relay-protocol
//!
//! Wire format for the relay hub.
//!
//! The hub speaks a deliberately small text protocol on top of WebSocket
//! messages:
//!
//! - Control messages from the hub: `self||<id>`, `connect||<id>`, `disconnect||<id>`
//! - Application messages from clients: opaque bytes, conventionally `<tag>||<rest>`
//!
//! ## Example
//!
//! ```rust
//! use relay_protocol::{codec, ControlMessage, Identity};
//!
//! let msg = ControlMessage::connect(Identity::new(2));
//! assert_eq!(&msg.encode()[..], b"connect||2");
//!
//! assert_eq!(codec::tag_of(b"chat||hello"), b"chat");
//! ```

pub mod codec;
pub mod control;

pub use codec::{split_tag, tag_of, ProtocolError, TAG_DELIMITER};
pub use control::{ControlKind, ControlMessage, Identity};
