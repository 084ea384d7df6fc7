// SPDX-License-Identifier: MIT OR Apache-2.0

//! The append-only log interface.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use murmur_core::ErrorKind;
use thiserror::Error;

use crate::query::Query;

/// 0-based offset of an entry within a log.
pub type Seq = u64;

/// A lazy cursor over log entries.
pub type LogStream<V> = BoxStream<'static, Result<(Seq, V), LogError>>;

/// An append-only indexed sequence of values.
///
/// Writes are totally ordered; sequence numbers are dense and monotonic,
/// so consumers may rely on `sequence == previous + 1` to detect gaps. A
/// reader with a live query observes every successfully appended entry in
/// append order exactly once.
#[async_trait]
pub trait EventLog<V>: Send + Sync {
    /// The current highest sequence, or `None` for an empty log.
    async fn latest(&self) -> Result<Option<Seq>, LogError>;

    /// Random access to a single entry.
    async fn get(&self, seq: Seq) -> Result<Option<V>, LogError>;

    /// Append a value and return its sequence.
    async fn append(&self, value: V) -> Result<Seq, LogError>;

    /// Open a lazy cursor; see [`Query`] for the range semantics.
    fn query(&self, query: Query) -> LogStream<V>;
}

#[derive(Error, Debug)]
pub enum LogError {
    /// A live tail fell behind the writer and the channel dropped entries.
    #[error("live tail lagged behind by {0} entries")]
    Lagged(u64),

    /// A sub-log offset pointed past the end of the main log.
    #[error("log offset {0} is out of bounds")]
    OutOfBounds(Seq),

    #[error("log store unavailable: {0}")]
    Store(String),
}

impl LogError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LogError::Lagged(_) | LogError::Store(_) => ErrorKind::Transient,
            LogError::OutOfBounds(_) => ErrorKind::Corruption,
        }
    }
}
