// SPDX-License-Identifier: MIT OR Apache-2.0

//! The contact index: folding main-log entries into relation state.

use std::sync::Arc;

use futures_util::StreamExt;
use murmur_core::{Contact, ErrorKind, LogEntry, StoredMessage};
use murmur_store::{EventLog, KvError, LogError, MemoryLog, OrderedStore, Query, Seq};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::builder::GraphBuilder;

/// Authoritative relation state for an ordered (author, target) pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Relation {
    None,
    Follow,
    Block,
}

impl Relation {
    pub fn from_contact(contact: &Contact) -> Self {
        if contact.following {
            Relation::Follow
        } else if contact.blocking {
            Relation::Block
        } else {
            Relation::None
        }
    }

    /// Single-byte value stored in the index.
    pub fn store_byte(&self) -> u8 {
        match self {
            Relation::None => b'0',
            Relation::Follow => b'1',
            Relation::Block => b'2',
        }
    }

    pub fn from_store_byte(byte: u8) -> Option<Self> {
        match byte {
            b'0' => Some(Relation::None),
            b'1' => Some(Relation::Follow),
            b'2' => Some(Relation::Block),
            _ => None,
        }
    }
}

/// Sink that consumes main-log entries in append order and writes contact
/// relation state through to the builder's store.
///
/// Keys are the 68-byte concatenation of the stored refs of author and
/// target; values a single relation byte. An explicit "none" keeps its
/// key with value `'0'` rather than deleting it, so rebuilds stay
/// deterministic. Every write invalidates the memoized graph, whether or
/// not the state changed.
#[derive(Clone)]
pub struct ContactIndex<S> {
    builder: Arc<GraphBuilder<S>>,
}

impl<S> ContactIndex<S>
where
    S: OrderedStore,
{
    pub fn new(builder: Arc<GraphBuilder<S>>) -> Self {
        Self { builder }
    }

    /// Apply one main-log entry.
    ///
    /// Deletion markers and non-contact messages are skipped silently;
    /// store errors propagate.
    pub async fn process(&self, seq: Seq, entry: &LogEntry) -> Result<(), IndexError> {
        let message = match entry {
            LogEntry::Nulled => return Ok(()),
            LogEntry::Message(message) => message,
        };

        let contact = match Contact::from_value(message.content()) {
            Ok(contact) => contact,
            // most messages are not contacts
            Err(_) => return Ok(()),
        };

        self.apply(seq, message, &contact).await
    }

    async fn apply(
        &self,
        seq: Seq,
        message: &StoredMessage,
        contact: &Contact,
    ) -> Result<(), IndexError> {
        let author = message.author();
        if *author == contact.target {
            debug!(author = %author.short_ref(), "ignoring self contact");
            return Ok(());
        }

        let mut key = Vec::with_capacity(68);
        key.extend_from_slice(author.stored().as_bytes());
        key.extend_from_slice(contact.target.stored().as_bytes());

        let relation = Relation::from_contact(contact);
        self.builder
            .store()
            .put(key, vec![relation.store_byte()])
            .await?;

        debug!(
            seq,
            author = %author.short_ref(),
            target = %contact.target.short_ref(),
            ?relation,
            "contact state updated"
        );

        self.builder.invalidate().await;
        Ok(())
    }

    /// Drive the index from a live cursor over the main log until the
    /// token is cancelled or the log shuts down.
    pub async fn run(
        &self,
        log: &MemoryLog<LogEntry>,
        cancel: CancellationToken,
    ) -> Result<(), IndexError> {
        let mut entries = log.query(Query::new().live(true));

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                entry = entries.next() => match entry {
                    Some(Ok((seq, value))) => self.process(seq, &value).await?,
                    Some(Err(err)) => {
                        warn!(%err, "contact index cursor failed");
                        return Err(IndexError::Log(err));
                    }
                    None => return Ok(()),
                },
            }
        }
    }
}

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("contact index write failed: {0}")]
    Store(#[from] KvError),

    #[error("contact index cursor failed: {0}")]
    Log(#[from] LogError),
}

impl IndexError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IndexError::Store(err) => err.kind(),
            IndexError::Log(err) => err.kind(),
        }
    }
}
