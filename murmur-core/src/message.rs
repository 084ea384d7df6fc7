// SPDX-License-Identifier: MIT OR Apache-2.0

//! Messages as they live in the local log.

use serde_json::Value;

use crate::refs::{FeedRef, MessageRef};

/// A message after ingest: verified, decoded and annotated with local
/// receive metadata.
///
/// Messages are immutable once appended. `raw` carries the byte-exact
/// transport encoding (canonical JSON for classic feeds, CBOR for binary
/// feeds); `value` is the canonical-value JSON form used for envelope
/// framing.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredMessage {
    key: MessageRef,
    author: FeedRef,
    sequence: u64,
    claimed_timestamp: f64,
    received: f64,
    content: Value,
    value: Value,
    raw: Vec<u8>,
}

impl StoredMessage {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        key: MessageRef,
        author: FeedRef,
        sequence: u64,
        claimed_timestamp: f64,
        received: f64,
        content: Value,
        value: Value,
        raw: Vec<u8>,
    ) -> Self {
        Self {
            key,
            author,
            sequence,
            claimed_timestamp,
            received,
            content,
            value,
            raw,
        }
    }

    pub fn key(&self) -> &MessageRef {
        &self.key
    }

    pub fn author(&self) -> &FeedRef {
        &self.author
    }

    /// 1-based position within the author's feed.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Timestamp claimed by the author, in milliseconds.
    pub fn claimed_timestamp(&self) -> f64 {
        self.claimed_timestamp
    }

    /// Local receive time in seconds since the Unix epoch.
    pub fn received(&self) -> f64 {
        self.received
    }

    pub fn content(&self) -> &Value {
        &self.content
    }

    pub fn content_bytes(&self) -> Vec<u8> {
        self.content.to_string().into_bytes()
    }

    /// The full message value object (canonical-value JSON encoding).
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Byte-exact transport encoding.
    pub fn transport_bytes(&self) -> &[u8] {
        &self.raw
    }
}

/// Runtime-typed values flowing through the main log.
///
/// Entries are decoded once at the ingest boundary so downstream consumers
/// (the contact index, the live tail) stay statically typed.
#[derive(Clone, Debug, PartialEq)]
pub enum LogEntry {
    Message(StoredMessage),
    /// Deletion marker left behind where a message was removed.
    Nulled,
}

impl LogEntry {
    pub fn as_message(&self) -> Option<&StoredMessage> {
        match self {
            LogEntry::Message(message) => Some(message),
            LogEntry::Nulled => None,
        }
    }

    pub fn is_nulled(&self) -> bool {
        matches!(self, LogEntry::Nulled)
    }
}
