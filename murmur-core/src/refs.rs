// SPDX-License-Identifier: MIT OR Apache-2.0

//! Stable identifiers for feeds and messages.
//!
//! ## Example
//!
//! ```
//! use murmur_core::{FeedAlgorithm, FeedRef};
//!
//! let feed = FeedRef::new(FeedAlgorithm::Classic, [7; 32]);
//! let stored = feed.stored();
//!
//! assert_eq!(stored.as_bytes().len(), 34);
//! assert_eq!(stored.feed().unwrap(), feed);
//! ```

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::error::ErrorKind;
use crate::identity::PublicKey;

/// Length in bytes of the key or hash carried by a reference.
pub const REF_KEY_LEN: usize = 32;

/// Length in bytes of the canonical stored (type-format-key) encoding.
pub const STORED_REF_LEN: usize = 34;

const TYPE_FEED: u8 = 0;

/// Feed formats recognized on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FeedAlgorithm {
    /// Legacy JSON feeds signed over the canonical pretty-printed form.
    Classic,
    /// Binary (CBOR-framed) feeds.
    Binary,
}

impl FeedAlgorithm {
    fn suffix(&self) -> &'static str {
        match self {
            FeedAlgorithm::Classic => ".ed25519",
            FeedAlgorithm::Binary => ".ggfeed-v1",
        }
    }

    fn format_byte(&self) -> u8 {
        match self {
            FeedAlgorithm::Classic => 0,
            FeedAlgorithm::Binary => 1,
        }
    }

    fn from_format_byte(byte: u8) -> Result<Self, RefError> {
        match byte {
            0 => Ok(FeedAlgorithm::Classic),
            1 => Ok(FeedAlgorithm::Binary),
            other => Err(RefError::UnknownAlgorithm(other.to_string())),
        }
    }
}

/// Hash algorithms identifying a single message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MessageAlgorithm {
    /// SHA-256 over the legacy internal string form.
    Sha256,
    /// Hash of the binary transport encoding.
    Binary,
}

impl MessageAlgorithm {
    fn suffix(&self) -> &'static str {
        match self {
            MessageAlgorithm::Sha256 => ".sha256",
            MessageAlgorithm::Binary => ".ggmsg-v1",
        }
    }
}

/// A stable identifier for an append-only feed: algorithm tag plus the
/// author's public key bytes.
///
/// Equality, hashing and ordering are defined over the full stored byte
/// encoding.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FeedRef {
    algorithm: FeedAlgorithm,
    key: [u8; REF_KEY_LEN],
}

impl FeedRef {
    pub fn new(algorithm: FeedAlgorithm, key: [u8; REF_KEY_LEN]) -> Self {
        Self { algorithm, key }
    }

    pub fn algorithm(&self) -> FeedAlgorithm {
        self.algorithm
    }

    pub fn key_bytes(&self) -> &[u8; REF_KEY_LEN] {
        &self.key
    }

    pub fn public_key(&self) -> Result<PublicKey, RefError> {
        PublicKey::from_bytes(&self.key).map_err(|_| RefError::InvalidKey)
    }

    /// The canonical 34-byte stored encoding used as key material in
    /// on-disk indexes.
    pub fn stored(&self) -> StoredRef {
        let mut bytes = [0u8; STORED_REF_LEN];
        bytes[0] = TYPE_FEED;
        bytes[1] = self.algorithm.format_byte();
        bytes[2..].copy_from_slice(&self.key);
        StoredRef(bytes)
    }

    /// Shortened representation for log output.
    pub fn short_ref(&self) -> String {
        let encoded = BASE64.encode(self.key);
        format!("@{}..", &encoded[..5])
    }
}

impl PartialOrd for FeedRef {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FeedRef {
    fn cmp(&self, other: &Self) -> Ordering {
        self.stored().0.cmp(&other.stored().0)
    }
}

impl fmt::Display for FeedRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}{}", BASE64.encode(self.key), self.algorithm.suffix())
    }
}

impl fmt::Debug for FeedRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FeedRef({self})")
    }
}

impl FromStr for FeedRef {
    type Err = RefError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let rest = value.strip_prefix('@').ok_or(RefError::InvalidSigil)?;
        let (encoded, algorithm) = if let Some(encoded) = rest.strip_suffix(".ed25519") {
            (encoded, FeedAlgorithm::Classic)
        } else if let Some(encoded) = rest.strip_suffix(".ggfeed-v1") {
            (encoded, FeedAlgorithm::Binary)
        } else {
            let algo = rest.rsplit('.').next().unwrap_or_default();
            return Err(RefError::UnknownAlgorithm(algo.to_string()));
        };

        let bytes = BASE64.decode(encoded)?;
        let key: [u8; REF_KEY_LEN] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| RefError::InvalidLength(bytes.len()))?;
        Ok(Self { algorithm, key })
    }
}

impl Serialize for FeedRef {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FeedRef {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value: String = Deserialize::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}

/// A stable identifier for a single message: algorithm tag plus content
/// hash bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageRef {
    algorithm: MessageAlgorithm,
    hash: [u8; REF_KEY_LEN],
}

impl MessageRef {
    pub fn new(algorithm: MessageAlgorithm, hash: [u8; REF_KEY_LEN]) -> Self {
        Self { algorithm, hash }
    }

    pub fn algorithm(&self) -> MessageAlgorithm {
        self.algorithm
    }

    pub fn hash_bytes(&self) -> &[u8; REF_KEY_LEN] {
        &self.hash
    }
}

impl PartialOrd for MessageRef {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MessageRef {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.algorithm, self.hash).cmp(&(other.algorithm, other.hash))
    }
}

impl fmt::Display for MessageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}{}", BASE64.encode(self.hash), self.algorithm.suffix())
    }
}

impl fmt::Debug for MessageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageRef({self})")
    }
}

impl FromStr for MessageRef {
    type Err = RefError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let rest = value.strip_prefix('%').ok_or(RefError::InvalidSigil)?;
        let (encoded, algorithm) = if let Some(encoded) = rest.strip_suffix(".sha256") {
            (encoded, MessageAlgorithm::Sha256)
        } else if let Some(encoded) = rest.strip_suffix(".ggmsg-v1") {
            (encoded, MessageAlgorithm::Binary)
        } else {
            let algo = rest.rsplit('.').next().unwrap_or_default();
            return Err(RefError::UnknownAlgorithm(algo.to_string()));
        };

        let bytes = BASE64.decode(encoded)?;
        let hash: [u8; REF_KEY_LEN] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| RefError::InvalidLength(bytes.len()))?;
        Ok(Self { algorithm, hash })
    }
}

impl Serialize for MessageRef {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MessageRef {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value: String = Deserialize::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}

/// The 34-byte type-format-key encoding of a feed reference.
///
/// Two of these concatenated form the 68-byte keys of the contact index.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StoredRef([u8; STORED_REF_LEN]);

impl StoredRef {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, RefError> {
        let bytes: [u8; STORED_REF_LEN] = bytes
            .try_into()
            .map_err(|_| RefError::InvalidLength(bytes.len()))?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; STORED_REF_LEN] {
        &self.0
    }

    /// Decode back into a feed reference.
    pub fn feed(&self) -> Result<FeedRef, RefError> {
        if self.0[0] != TYPE_FEED {
            return Err(RefError::WrongType(self.0[0]));
        }
        let algorithm = FeedAlgorithm::from_format_byte(self.0[1])?;
        let mut key = [0u8; REF_KEY_LEN];
        key.copy_from_slice(&self.0[2..]);
        Ok(FeedRef { algorithm, key })
    }
}

impl AsRef<[u8]> for StoredRef {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for StoredRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StoredRef({})", hex::encode(self.0))
    }
}

/// Error types for reference parsing and decoding.
#[derive(Error, Debug)]
pub enum RefError {
    #[error("reference does not start with a known sigil")]
    InvalidSigil,

    #[error("unknown reference algorithm {0:?}")]
    UnknownAlgorithm(String),

    #[error("invalid reference length {0} bytes")]
    InvalidLength(usize),

    #[error("invalid base64 in reference")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("key bytes are not a valid public key")]
    InvalidKey,

    #[error("stored reference has wrong type byte {0}")]
    WrongType(u8),
}

impl RefError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RefError::UnknownAlgorithm(_) => ErrorKind::Unsupported,
            _ => ErrorKind::BadInput,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{FeedAlgorithm, FeedRef, MessageAlgorithm, MessageRef, StoredRef};

    #[test]
    fn feed_sigil_round_trip() {
        let feed = FeedRef::new(FeedAlgorithm::Classic, [42; 32]);
        let sigil = feed.to_string();
        assert!(sigil.starts_with('@'));
        assert!(sigil.ends_with(".ed25519"));
        assert_eq!(sigil.parse::<FeedRef>().unwrap(), feed);

        let binary = FeedRef::new(FeedAlgorithm::Binary, [42; 32]);
        assert_ne!(binary, feed);
        assert_eq!(binary.to_string().parse::<FeedRef>().unwrap(), binary);
    }

    #[test]
    fn message_sigil_round_trip() {
        let msg = MessageRef::new(MessageAlgorithm::Sha256, [9; 32]);
        let sigil = msg.to_string();
        assert!(sigil.starts_with('%'));
        assert_eq!(sigil.parse::<MessageRef>().unwrap(), msg);
    }

    #[test]
    fn stored_ref_round_trip() {
        let feed = FeedRef::new(FeedAlgorithm::Binary, [1; 32]);
        let stored = feed.stored();
        assert_eq!(stored.as_bytes()[0], 0);
        assert_eq!(stored.as_bytes()[1], 1);
        assert_eq!(stored.feed().unwrap(), feed);

        let round = StoredRef::from_slice(stored.as_bytes()).unwrap();
        assert_eq!(round, stored);
    }

    #[test]
    fn rejects_malformed_sigils() {
        assert!("not-a-ref".parse::<FeedRef>().is_err());
        assert!("@short.ed25519".parse::<FeedRef>().is_err());
        assert!("@AAAA.unknown-algo".parse::<FeedRef>().is_err());
        assert!("@AAAA.ed25519".parse::<FeedRef>().is_err());
    }

    #[test]
    fn ordering_follows_stored_encoding() {
        let classic = FeedRef::new(FeedAlgorithm::Classic, [0xff; 32]);
        let binary = FeedRef::new(FeedAlgorithm::Binary, [0x00; 32]);
        // format byte dominates the key bytes
        assert!(classic < binary);
    }
}
