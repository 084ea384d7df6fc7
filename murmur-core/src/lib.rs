// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core data types for the murmur gossip stack.
//!
//! This crate defines the identifiers and codecs every other murmur crate
//! builds on: feed and message references with their canonical 34-byte
//! stored encoding, Ed25519 identities, the legacy-compatible canonical
//! JSON encoding, contact (follow/block) messages and cryptographic
//! message verification.

pub mod canonical;
pub mod contact;
pub mod error;
pub mod identity;
pub mod message;
pub mod refs;
pub mod verify;

pub use canonical::{encode_preserve_order, internal_v8_bytes, CanonicalError};
pub use contact::{Contact, ContactError};
pub use error::ErrorKind;
pub use identity::{IdentityError, PrivateKey, PublicKey, Signature};
pub use message::{LogEntry, StoredMessage};
pub use refs::{FeedAlgorithm, FeedRef, MessageAlgorithm, MessageRef, RefError, StoredRef};
pub use verify::{sign_message, verify, VerifiedMessage, VerifyError};
