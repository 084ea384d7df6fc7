// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared error taxonomy.
//!
//! Every public error enum in the murmur crates exposes a `kind` accessor
//! mapping it onto this small set, so callers at the RPC boundary can
//! decide on retries, clean closes and fatal conditions without matching
//! on crate-specific variants.

use std::fmt;

/// Broad classification of murmur errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing or malformed request fields. Returned directly to the caller.
    BadInput,
    /// Unknown feed algorithm or encoding.
    Unsupported,
    /// The requested entry is beyond what is stored locally.
    NotFound,
    /// A store contains impossible values (wrong key length, unknown
    /// relation byte).
    Corruption,
    /// Underlying store or transport failure. Callers decide whether to
    /// retry.
    Transient,
    /// Context cancellation or a remote that has gone away. Expected
    /// termination, not a failure.
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::BadInput => "bad input",
            ErrorKind::Unsupported => "unsupported",
            ErrorKind::NotFound => "not found",
            ErrorKind::Corruption => "corruption",
            ErrorKind::Transient => "transient",
            ErrorKind::Cancelled => "cancelled",
        };
        write!(f, "{name}")
    }
}
