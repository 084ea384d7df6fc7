// SPDX-License-Identifier: MIT OR Apache-2.0

//! Contact (follow/block) message content.

use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::refs::FeedRef;

/// A decoded contact message: the author's published relation towards
/// `target`.
///
/// The authoritative state for an ordered pair of feeds is the *last*
/// contact message the author published naming the target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Contact {
    pub target: FeedRef,
    pub following: bool,
    pub blocking: bool,
}

#[derive(Deserialize)]
struct ContactWire {
    #[serde(rename = "type")]
    message_type: String,
    contact: FeedRef,
    #[serde(default)]
    following: bool,
    #[serde(default)]
    blocking: bool,
}

impl Contact {
    pub fn follow(target: FeedRef) -> Self {
        Self {
            target,
            following: true,
            blocking: false,
        }
    }

    pub fn unfollow(target: FeedRef) -> Self {
        Self {
            target,
            following: false,
            blocking: false,
        }
    }

    pub fn block(target: FeedRef) -> Self {
        Self {
            target,
            following: false,
            blocking: true,
        }
    }

    /// Decode contact content from raw bytes.
    ///
    /// Most messages are not contacts, so callers are expected to treat a
    /// decode failure as "skip", not as an error.
    pub fn from_content(bytes: &[u8]) -> Result<Self, ContactError> {
        let wire: ContactWire = serde_json::from_slice(bytes)?;
        Self::from_wire(wire)
    }

    /// Decode contact content from an already-parsed JSON value.
    pub fn from_value(value: &Value) -> Result<Self, ContactError> {
        let wire: ContactWire = serde_json::from_value(value.clone())?;
        Self::from_wire(wire)
    }

    fn from_wire(wire: ContactWire) -> Result<Self, ContactError> {
        if wire.message_type != "contact" {
            return Err(ContactError::WrongType(wire.message_type));
        }
        Ok(Self {
            target: wire.contact,
            following: wire.following,
            blocking: wire.blocking,
        })
    }

    /// The wire content object for publishing this contact.
    pub fn to_value(&self) -> Value {
        json!({
            "type": "contact",
            "contact": self.target.to_string(),
            "following": self.following,
            "blocking": self.blocking,
        })
    }
}

#[derive(Error, Debug)]
pub enum ContactError {
    #[error("content is not a contact object: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("content has type {0:?}, not \"contact\"")]
    WrongType(String),
}

#[cfg(test)]
mod tests {
    use crate::refs::{FeedAlgorithm, FeedRef};

    use super::Contact;

    fn feed(byte: u8) -> FeedRef {
        FeedRef::new(FeedAlgorithm::Classic, [byte; 32])
    }

    #[test]
    fn decode_follow() {
        let target = feed(3);
        let raw = format!(r#"{{"type":"contact","contact":"{target}","following":true}}"#);
        let contact = Contact::from_content(raw.as_bytes()).unwrap();
        assert_eq!(contact, Contact::follow(target));
    }

    #[test]
    fn decode_skips_non_contacts() {
        assert!(Contact::from_content(br#"{"type":"post","text":"hi"}"#).is_err());
        assert!(Contact::from_content(br#""private.box""#).is_err());
    }

    #[test]
    fn wire_round_trip() {
        let contact = Contact::block(feed(9));
        let decoded = Contact::from_value(&contact.to_value()).unwrap();
        assert_eq!(decoded, contact);
    }
}
