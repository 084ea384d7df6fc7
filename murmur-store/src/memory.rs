// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory append-only log with live tailing.

use std::sync::{Arc, RwLock};

use async_stream::try_stream;
use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::warn;

use crate::log::{EventLog, LogError, LogStream, Seq};
use crate::query::Query;

// Capacity of the live-tail channel. A reader that falls further behind
// than this observes `LogError::Lagged` instead of silently missing
// entries.
const LIVE_CHANNEL_CAPACITY: usize = 1024;

/// An in-memory [`EventLog`].
///
/// Cloning is cheap and clones share the same log. Live queries subscribe
/// to the tail channel *before* snapshotting the stored entries and drop
/// duplicates at the seam, so every append is observed exactly once.
#[derive(Clone, Debug)]
pub struct MemoryLog<V> {
    inner: Arc<RwLock<Vec<V>>>,
    live_tx: broadcast::Sender<(Seq, V)>,
}

impl<V> MemoryLog<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        let (live_tx, _) = broadcast::channel(LIVE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(RwLock::new(Vec::new())),
            live_tx,
        }
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.read_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_entries(&self) -> std::sync::RwLockReadGuard<'_, Vec<V>> {
        self.inner.read().expect("acquire shared read access on log")
    }
}

impl<V> Default for MemoryLog<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<V> EventLog<V> for MemoryLog<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn latest(&self) -> Result<Option<Seq>, LogError> {
        let entries = self.read_entries();
        Ok(entries.len().checked_sub(1).map(|seq| seq as Seq))
    }

    async fn get(&self, seq: Seq) -> Result<Option<V>, LogError> {
        let entries = self.read_entries();
        Ok(entries.get(seq as usize).cloned())
    }

    async fn append(&self, value: V) -> Result<Seq, LogError> {
        // the write lock is held across the broadcast so live delivery
        // order always matches append order
        let mut entries = self
            .inner
            .write()
            .expect("acquire exclusive write access on log");
        let seq = entries.len() as Seq;
        entries.push(value.clone());
        let _ = self.live_tx.send((seq, value));
        Ok(seq)
    }

    fn query(&self, query: Query) -> LogStream<V> {
        let inner = self.inner.clone();
        let live_tx = self.live_tx.clone();

        let stream = try_stream! {
            // live cursors run forward only; subscribe before snapshotting
            // so nothing is lost at the historical/live seam
            let mut live_rx =
                (query.is_live() && !query.is_reverse()).then(|| live_tx.subscribe());

            let (snapshot, watermark) = {
                let entries = inner.read().expect("acquire shared read access on log");
                let watermark = entries.len().checked_sub(1).map(|seq| seq as Seq);
                let snapshot: Vec<(Seq, V)> = entries
                    .iter()
                    .enumerate()
                    .map(|(seq, value)| (seq as Seq, value.clone()))
                    .filter(|(seq, _)| query.matches(*seq))
                    .collect();
                (snapshot, watermark)
            };

            let mut remaining = query.max_entries();
            let mut exhausted = matches!(remaining, Some(0));

            if !exhausted {
                let historical: Box<dyn Iterator<Item = (Seq, V)> + Send> =
                    if query.is_reverse() {
                        Box::new(snapshot.into_iter().rev())
                    } else {
                        Box::new(snapshot.into_iter())
                    };
                for (seq, value) in historical {
                    yield (seq, value);
                    if let Some(left) = remaining.as_mut() {
                        *left -= 1;
                        if *left == 0 {
                            exhausted = true;
                            break;
                        }
                    }
                }
            }

            if !exhausted {
                if let Some(rx) = live_rx.as_mut() {
                    loop {
                        match rx.recv().await {
                            Ok((seq, value)) => {
                                if watermark.is_some_and(|mark| seq <= mark) {
                                    // already covered by the snapshot
                                    continue;
                                }
                                if query.upper_bound().is_some_and(|lt| seq >= lt) {
                                    // appends only grow, nothing later matches
                                    break;
                                }
                                if !query.matches(seq) {
                                    continue;
                                }
                                yield (seq, value);
                                if let Some(left) = remaining.as_mut() {
                                    *left -= 1;
                                    if *left == 0 {
                                        break;
                                    }
                                }
                            }
                            Err(broadcast::error::RecvError::Lagged(count)) => {
                                warn!(count, "live log reader lagged behind the writer");
                                Err(LogError::Lagged(count))?;
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                }
            }
        };

        Box::pin(stream)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures_util::StreamExt;
    use tokio::time::timeout;

    use crate::log::{EventLog, Seq};
    use crate::query::Query;

    use super::MemoryLog;

    async fn collect(log: &MemoryLog<&'static str>, query: Query) -> Vec<(Seq, &'static str)> {
        log.query(query)
            .map(|entry| entry.unwrap())
            .collect::<Vec<_>>()
            .await
    }

    #[tokio::test]
    async fn append_and_latest() {
        let log = MemoryLog::new();
        assert_eq!(log.latest().await.unwrap(), None);

        assert_eq!(log.append("a").await.unwrap(), 0);
        assert_eq!(log.append("b").await.unwrap(), 1);
        assert_eq!(log.latest().await.unwrap(), Some(1));
        assert_eq!(log.get(1).await.unwrap(), Some("b"));
        assert_eq!(log.get(7).await.unwrap(), None);
    }

    #[tokio::test]
    async fn range_queries() {
        let log = MemoryLog::new();
        for value in ["a", "b", "c", "d", "e"] {
            log.append(value).await.unwrap();
        }

        assert_eq!(
            collect(&log, Query::new().gte(1).lt(4)).await,
            vec![(1, "b"), (2, "c"), (3, "d")]
        );
        assert_eq!(
            collect(&log, Query::new().gt(2)).await,
            vec![(3, "d"), (4, "e")]
        );
        assert_eq!(
            collect(&log, Query::new().limit(2)).await,
            vec![(0, "a"), (1, "b")]
        );
        assert_eq!(
            collect(&log, Query::new().reverse(true).limit(2)).await,
            vec![(4, "e"), (3, "d")]
        );
        assert_eq!(collect(&log, Query::new().limit(0)).await, vec![]);
    }

    #[tokio::test]
    async fn live_tail_observes_every_append_once() {
        let log = MemoryLog::new();
        log.append("a").await.unwrap();
        log.append("b").await.unwrap();

        let mut cursor = log.query(Query::new().live(true));
        let reader = tokio::spawn(async move {
            let mut seen = Vec::new();
            for _ in 0..4 {
                let (seq, value) = cursor.next().await.unwrap().unwrap();
                seen.push((seq, value));
            }
            seen
        });

        log.append("c").await.unwrap();
        log.append("d").await.unwrap();

        let seen = timeout(Duration::from_secs(1), reader)
            .await
            .expect("live cursor delivered all appends")
            .unwrap();
        assert_eq!(seen, vec![(0, "a"), (1, "b"), (2, "c"), (3, "d")]);
    }

    #[tokio::test]
    async fn live_tail_respects_limit_and_bounds() {
        let log = MemoryLog::new();
        log.append("a").await.unwrap();

        let mut cursor = log.query(Query::new().gt(0).live(true).limit(2));
        log.append("b").await.unwrap();
        log.append("c").await.unwrap();
        log.append("d").await.unwrap();

        let first = timeout(Duration::from_secs(1), cursor.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let second = timeout(Duration::from_secs(1), cursor.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!((first.0, second.0), (1, 2));

        // the limit is exhausted, the cursor terminates
        assert!(timeout(Duration::from_secs(1), cursor.next())
            .await
            .unwrap()
            .is_none());
    }
}
