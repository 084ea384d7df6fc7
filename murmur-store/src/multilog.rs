// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-author sub-logs over the main log.
//!
//! The main log holds every message in arrival order. Each author
//! additionally gets a sub-log whose values are *offsets into the main
//! log*, so a range query over one feed is a query over its sub-log with
//! each offset resolved back through the main log.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_stream::try_stream;
use futures_util::StreamExt;
use murmur_core::FeedRef;

use crate::log::{EventLog, LogError, LogStream, Seq};
use crate::memory::MemoryLog;
use crate::query::Query;

/// Mapping from feed references to their sub-logs.
///
/// `get` is total: sub-logs materialize lazily on first observation, and
/// the latest sequence of an unknown author is simply `None`.
#[derive(Clone, Debug, Default)]
pub struct Multilog {
    feeds: Arc<RwLock<HashMap<FeedRef, MemoryLog<Seq>>>>,
}

impl Multilog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The sub-log for `feed`, created empty if never seen before.
    pub fn get(&self, feed: &FeedRef) -> MemoryLog<Seq> {
        let mut feeds = self
            .feeds
            .write()
            .expect("acquire exclusive write access on multilog");
        feeds.entry(*feed).or_default().clone()
    }

    /// Latest sub-log sequence without materializing unknown feeds.
    pub async fn latest(&self, feed: &FeedRef) -> Result<Option<Seq>, LogError> {
        let sublog = {
            let feeds = self
                .feeds
                .read()
                .expect("acquire shared read access on multilog");
            feeds.get(feed).cloned()
        };
        match sublog {
            Some(sublog) => sublog.latest().await,
            None => Ok(None),
        }
    }

    /// All feeds observed so far.
    pub fn known_feeds(&self) -> Vec<FeedRef> {
        let feeds = self
            .feeds
            .read()
            .expect("acquire shared read access on multilog");
        feeds.keys().copied().collect()
    }
}

/// Query `sub` and resolve each of its offset values through `main`.
///
/// Yielded sequence numbers are the *sub-log* sequences, so range specs
/// keep addressing positions within the feed.
pub fn indirect<V>(main: &MemoryLog<V>, sub: &MemoryLog<Seq>, query: Query) -> LogStream<V>
where
    V: Clone + Send + Sync + 'static,
{
    let main = main.clone();
    let mut offsets = sub.query(query);

    let stream = try_stream! {
        while let Some(entry) = offsets.next().await {
            let (seq, offset) = entry?;
            let value = main
                .get(offset)
                .await?
                .ok_or(LogError::OutOfBounds(offset))?;
            yield (seq, value);
        }
    };

    Box::pin(stream)
}
