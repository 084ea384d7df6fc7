// SPDX-License-Identifier: MIT OR Apache-2.0

//! Building and querying the trust graph.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use murmur_core::refs::STORED_REF_LEN;
use murmur_core::{ErrorKind, FeedRef, StoredRef};
use murmur_store::{KvError, OrderedStore};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::warn;

use crate::authorizer::Authorizer;
use crate::graph::{ContactEdge, Graph};
use crate::index::Relation;

const INDEX_KEY_LEN: usize = 2 * STORED_REF_LEN;

/// Builds the trust graph from the contact index and answers reachability
/// questions.
///
/// The built graph is memoized behind a single mutex. Any index update
/// replaces the cached value with `None`; the next `build` call rebuilds
/// while other builder operations queue on the lock.
pub struct GraphBuilder<S> {
    kv: S,
    cache: Mutex<Option<Arc<Graph>>>,
}

impl<S> GraphBuilder<S>
where
    S: OrderedStore,
{
    pub fn new(kv: S) -> Self {
        Self {
            kv,
            cache: Mutex::new(None),
        }
    }

    pub(crate) fn store(&self) -> &S {
        &self.kv
    }

    /// Drop the memoized graph.
    pub async fn invalidate(&self) {
        *self.cache.lock().await = None;
    }

    /// The complete graph of all follow/block relations.
    ///
    /// Returns the memoized value when present. A rebuild scans every
    /// 68-byte key in the store; keys of other lengths, self-edges and
    /// undecodable entries are logged and skipped so one bad row cannot
    /// take the graph down.
    pub async fn build(&self) -> Result<Arc<Graph>, GraphError> {
        let mut cache = self.cache.lock().await;
        if let Some(graph) = cache.as_ref() {
            return Ok(Arc::clone(graph));
        }

        let mut graph = Graph::new();
        for (key, value) in self.kv.scan_all().await? {
            if key.len() != INDEX_KEY_LEN {
                continue;
            }
            let (raw_from, raw_to) = key.split_at(STORED_REF_LEN);
            if raw_from == raw_to {
                continue;
            }

            let from = match decode_stored(raw_from) {
                Ok(feed) => feed,
                Err(err) => {
                    warn!(%err, "skipping undecodable contact key (from)");
                    continue;
                }
            };
            let to = match decode_stored(raw_to) {
                Ok(feed) => feed,
                Err(err) => {
                    warn!(%err, "skipping undecodable contact key (to)");
                    continue;
                }
            };

            let relation = value.first().copied().and_then(Relation::from_store_byte);
            let edge = match relation {
                Some(Relation::Follow) => ContactEdge::follow(),
                Some(Relation::Block) => ContactEdge::block(),
                Some(Relation::None) => continue,
                None => {
                    warn!(
                        from = %from.short_ref(),
                        to = %to.short_ref(),
                        "skipping unknown relation byte in contact index"
                    );
                    continue;
                }
            };
            graph.add_edge(from, to, edge);
        }

        let graph = Arc::new(graph);
        *cache = Some(Arc::clone(&graph));
        Ok(graph)
    }

    /// The set of feeds `from` currently follows.
    pub async fn follows(&self, from: &FeedRef) -> Result<HashSet<FeedRef>, GraphError> {
        let prefix = from.stored();
        let mut follows = HashSet::new();

        for (key, value) in self.kv.scan_prefix(prefix.as_bytes()).await? {
            if key.len() != INDEX_KEY_LEN {
                continue;
            }
            if value.first() != Some(&b'1') {
                continue;
            }
            let target = decode_stored(&key[STORED_REF_LEN..])?;
            follows.insert(target);
        }

        Ok(follows)
    }

    /// Feeds reachable from `from` within `max + 1` hops along
    /// mutual-follow links, excluding `from` itself.
    ///
    /// `max == 0` yields the direct friends of `from`: the feeds it
    /// follows that follow it back. One-way follows never extend
    /// reachability.
    pub async fn hops(&self, from: &FeedRef, max: u64) -> Result<HashSet<FeedRef>, GraphError> {
        let mut walked = HashSet::new();
        let mut visited = HashSet::from([*from]);
        let mut frontier = vec![*from];
        let mut memo: HashMap<FeedRef, HashSet<FeedRef>> = HashMap::new();

        for _ in 0..=max {
            if frontier.is_empty() {
                break;
            }
            let mut next = Vec::new();
            for node in frontier {
                let follows = self.follows_memo(&mut memo, &node).await?;
                for target in follows {
                    let target_follows = self.follows_memo(&mut memo, &target).await?;
                    if !target_follows.contains(&node) {
                        continue;
                    }
                    walked.insert(target);
                    if visited.insert(target) {
                        next.push(target);
                    }
                }
            }
            frontier = next;
        }

        walked.remove(from);
        Ok(walked)
    }

    async fn follows_memo(
        &self,
        memo: &mut HashMap<FeedRef, HashSet<FeedRef>>,
        feed: &FeedRef,
    ) -> Result<HashSet<FeedRef>, GraphError> {
        if let Some(follows) = memo.get(feed) {
            return Ok(follows.clone());
        }
        let follows = self.follows(feed).await?;
        memo.insert(*feed, follows.clone());
        Ok(follows)
    }

    /// A predicate admitting `from` itself and everything within
    /// `max_hops` of it.
    pub fn authorizer(self: &Arc<Self>, from: FeedRef, max_hops: u64) -> Authorizer<S> {
        Authorizer::new(Arc::clone(self), from, max_hops)
    }

    /// Atomically remove every relation authored by `who` and invalidate
    /// the cache.
    pub async fn delete_author(&self, who: &FeedRef) -> Result<(), GraphError> {
        let mut cache = self.cache.lock().await;
        *cache = None;
        self.kv.delete_prefix(who.stored().as_bytes()).await?;
        Ok(())
    }
}

fn decode_stored(raw: &[u8]) -> Result<FeedRef, GraphError> {
    StoredRef::from_slice(raw)
        .and_then(|stored| stored.feed())
        .map_err(|err| GraphError::Corruption(err.to_string()))
}

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("contact store failed: {0}")]
    Store(#[from] KvError),

    #[error("contact index contains impossible values: {0}")]
    Corruption(String),
}

impl GraphError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GraphError::Store(err) => err.kind(),
            GraphError::Corruption(_) => ErrorKind::Corruption,
        }
    }
}
