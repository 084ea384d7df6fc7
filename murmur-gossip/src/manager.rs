// SPDX-License-Identifier: MIT OR Apache-2.0

//! Serving history-stream requests.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::StreamExt;
use metrics::{counter, gauge};
use murmur_core::{ErrorKind, FeedAlgorithm, FeedRef, LogEntry};
use murmur_store::{indirect, EventLog, LogError, MemoryLog, Multilog, Query, Seq};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::frame::{BinaryStreamSink, KeyValueSink, MessageSink};
use crate::multisink::MultiSink;
use crate::sink::{ByteSink, SinkError};

/// Argument tuple of a history-stream request as it arrives at the wire.
///
/// `seq` is 1-based; `limit == -1` means unbounded; `live` extends the
/// response beyond the currently-stored tail.
#[derive(Clone, Debug, Deserialize)]
pub struct HistoryStreamRequest {
    pub id: Option<FeedRef>,
    #[serde(default)]
    pub seq: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub live: bool,
    #[serde(default)]
    pub keys: bool,
    #[serde(default)]
    pub reverse: bool,
    #[serde(default, rename = "asJSON")]
    pub as_json: bool,
    #[serde(default)]
    pub gt: i64,
    #[serde(default)]
    pub lt: i64,
}

fn default_limit() -> i64 {
    -1
}

impl HistoryStreamRequest {
    pub fn new(id: FeedRef) -> Self {
        Self {
            id: Some(id),
            seq: 0,
            limit: default_limit(),
            live: false,
            keys: false,
            reverse: false,
            as_json: false,
            gt: 0,
            lt: 0,
        }
    }
}

/// Orchestrates gossip about user feeds.
///
/// One history-stream request drains a bounded historical range of an
/// author's feed into the encoded sink and optionally keeps the sink
/// registered for live delivery. A single long-running task tails the
/// main log and feeds every per-author [`MultiSink`]; it is tied to the
/// root cancellation token so shutdown closes all live subscriptions
/// deterministically.
pub struct FeedManager {
    receive_log: MemoryLog<LogEntry>,
    user_feeds: Multilog,
    live_feeds: Arc<Mutex<HashMap<FeedRef, Arc<MultiSink>>>>,
    shutdown: CancellationToken,
}

impl FeedManager {
    /// Spawns the live-tail task.
    ///
    /// Fails when the main log's current sequence cannot be read: without
    /// it there is no baseline for live tailing.
    pub async fn new(
        receive_log: MemoryLog<LogEntry>,
        user_feeds: Multilog,
        shutdown: CancellationToken,
    ) -> Result<Self, GossipError> {
        let baseline = receive_log
            .latest()
            .await
            .map_err(|err| GossipError::Fatal(format!("failed to get main log sequence: {err}")))?;

        let manager = Self {
            receive_log,
            user_feeds,
            live_feeds: Arc::new(Mutex::new(HashMap::new())),
            shutdown,
        };
        manager.spawn_live_tail(baseline);
        Ok(manager)
    }

    fn spawn_live_tail(&self, baseline: Option<Seq>) {
        let receive_log = self.receive_log.clone();
        let live_feeds = Arc::clone(&self.live_feeds);
        let cancel = self.shutdown.clone();

        tokio::spawn(async move {
            let query = match baseline {
                Some(seq) => Query::new().gt(seq).live(true),
                None => Query::new().live(true),
            };
            let mut entries = receive_log.query(query);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    entry = entries.next() => match entry {
                        Some(Ok((_, LogEntry::Message(message)))) => {
                            // the registry lock is only held across the map
                            // lookup, never across delivery
                            let multisink = {
                                let feeds = live_feeds.lock().await;
                                feeds.get(message.author()).cloned()
                            };
                            if let Some(multisink) = multisink {
                                multisink.send(&message).await;
                            }
                        }
                        Some(Ok((_, LogEntry::Nulled))) => {}
                        Some(Err(err)) => {
                            error!(%err, "live tail failed, closing live subscriptions");
                            close_live_feeds(&live_feeds).await;
                            return;
                        }
                        None => break,
                    },
                }
            }

            warn!("live tail on main log exited");
            close_live_feeds(&live_feeds).await;
        });
    }

    /// Serve one history-stream request into `sink`.
    ///
    /// Cancellation of `ctx` and a sink closed by the remote both
    /// terminate the stream as success. With `live` requested the sink's
    /// lifetime passes to the per-author [`MultiSink`]; otherwise it is
    /// closed once the historical range is drained.
    pub async fn create_history_stream(
        &self,
        ctx: CancellationToken,
        sink: Arc<dyn ByteSink>,
        arg: &HistoryStreamRequest,
    ) -> Result<(), GossipError> {
        let id = arg.id.ok_or(GossipError::MissingId)?;
        let mut arg = arg.clone();

        let wrapped: Arc<dyn MessageSink> = match id.algorithm() {
            FeedAlgorithm::Classic => Arc::new(KeyValueSink::new(sink, arg.keys)),
            FeedAlgorithm::Binary if arg.as_json => Arc::new(KeyValueSink::new(sink, arg.keys)),
            FeedAlgorithm::Binary => Arc::new(BinaryStreamSink::new(sink)),
        };

        let user_log = self.user_feeds.get(&id);

        // Register for live delivery before reading the feed's tail: a
        // message appended while the historical range drains is then
        // buffered by the fan-out instead of lost, and the open() below
        // discards whatever the drain already emitted.
        let registration = if arg.live {
            let multisink = self.live_feed_entry(&id, &user_log).await?;
            let consumer = multisink.register(Arc::clone(&wrapped)).await;
            Some((multisink, consumer))
        } else {
            None
        };

        let latest = user_log.latest().await.map_err(GossipError::Log)?;
        // feed sequences are dense from 1, so the count doubles as the
        // highest stored sequence
        let stored_count = latest.map(|seq| seq + 1).unwrap_or(0);
        let cur = latest.unwrap_or(0) as i64;

        if arg.seq != 0 {
            arg.seq -= 1;
            if arg.seq > cur {
                // past the stored tail
                if let Some((multisink, consumer)) = registration {
                    multisink
                        .open(consumer, stored_count, live_until(&arg, stored_count))
                        .await;
                    return Ok(());
                }
                wrapped.close().await.map_err(GossipError::Sink)?;
                return Ok(());
            }
        }
        if arg.live && arg.limit == 0 {
            arg.limit = -1;
        }

        let mut query = Query::new()
            .limit(nonlive_limit(&arg, cur))
            .reverse(arg.reverse);
        if arg.seq > 0 {
            query = query.gte(arg.seq as Seq);
        }
        if arg.lt > 0 {
            query = query.lt(arg.lt as Seq);
        }
        if arg.gt > 0 {
            query = query.gt(arg.gt as Seq);
        }

        let mut source = indirect(&self.receive_log, &user_log, query);

        let mut sent: u64 = 0;
        let outcome = loop {
            tokio::select! {
                _ = ctx.cancelled() => break DrainOutcome::Cancelled,
                entry = source.next() => match entry {
                    None => break DrainOutcome::Drained,
                    Some(Err(err)) => break DrainOutcome::Failed(GossipError::Log(err)),
                    Some(Ok((_, LogEntry::Nulled))) => continue,
                    Some(Ok((_, LogEntry::Message(message)))) => {
                        match wrapped.send(&message).await {
                            Ok(()) => sent += 1,
                            Err(SinkError::Closed) => break DrainOutcome::Cancelled,
                            Err(err) => break DrainOutcome::Failed(GossipError::Sink(err)),
                        }
                    }
                },
            }
        };

        counter!("gossip_tx", "event" => "gossiptx").increment(sent);
        debug!(sent, feed = %id.short_ref(), starting = arg.seq, "history stream drained");

        match outcome {
            DrainOutcome::Cancelled => {
                if let Some((multisink, consumer)) = registration {
                    multisink.remove(consumer).await;
                } else {
                    let _ = wrapped.close().await;
                }
                Ok(())
            }
            DrainOutcome::Failed(err) => {
                if let Some((multisink, consumer)) = registration {
                    multisink.remove(consumer).await;
                }
                Err(err)
            }
            DrainOutcome::Drained => {
                if let Some((multisink, consumer)) = registration {
                    // the sink now belongs to the fan-out
                    multisink
                        .open(consumer, stored_count, live_until(&arg, stored_count))
                        .await;
                } else {
                    wrapped.close().await.map_err(GossipError::Sink)?;
                }
                Ok(())
            }
        }
    }

    /// Number of feeds with a live fan-out.
    pub async fn live_feed_count(&self) -> usize {
        self.live_feeds.lock().await.len()
    }

    async fn live_feed_entry(
        &self,
        feed: &FeedRef,
        user_log: &MemoryLog<Seq>,
    ) -> Result<Arc<MultiSink>, GossipError> {
        let stored_count = user_log
            .latest()
            .await
            .map_err(GossipError::Log)?
            .map(|seq| seq + 1)
            .unwrap_or(0);

        let mut feeds = self.live_feeds.lock().await;
        let multisink = feeds
            .entry(*feed)
            .or_insert_with(|| Arc::new(MultiSink::new(stored_count)))
            .clone();
        gauge!("gossip_live_feeds", "part" => "gossip-livefeeds").set(feeds.len() as f64);
        Ok(multisink)
    }
}

enum DrainOutcome {
    Drained,
    Cancelled,
    Failed(GossipError),
}

async fn close_live_feeds(live_feeds: &Mutex<HashMap<FeedRef, Arc<MultiSink>>>) {
    let feeds: Vec<Arc<MultiSink>> = {
        let mut map = live_feeds.lock().await;
        map.drain().map(|(_, multisink)| multisink).collect()
    };
    for multisink in feeds {
        multisink.close_all().await;
    }
}

/// Upper limit of the historical phase: how many stored entries the
/// request may still consume, `-1` for unbounded.
fn nonlive_limit(arg: &HistoryStreamRequest, cur: i64) -> i64 {
    if arg.limit == -1 {
        return -1;
    }
    let mut last_seq = arg.seq + arg.limit - 1;
    if last_seq > cur {
        last_seq = cur;
    }
    last_seq - arg.seq + 1
}

/// Highest absolute feed sequence the live phase may deliver.
fn live_until(arg: &HistoryStreamRequest, stored_count: u64) -> u64 {
    if arg.limit == -1 {
        return u64::MAX;
    }
    let last = arg.seq + arg.limit;
    if last <= stored_count as i64 {
        return stored_count;
    }
    last as u64
}

#[derive(Error, Debug)]
pub enum GossipError {
    #[error("bad request: missing id argument")]
    MissingId,

    #[error("feed store failed: {0}")]
    Log(#[from] LogError),

    #[error("sink failed: {0}")]
    Sink(#[from] SinkError),

    #[error("fatal: {0}")]
    Fatal(String),
}

impl GossipError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GossipError::MissingId => ErrorKind::BadInput,
            GossipError::Log(err) => err.kind(),
            GossipError::Sink(err) => err.kind(),
            GossipError::Fatal(_) => ErrorKind::Transient,
        }
    }
}
