// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-feed fan-out to live subscribers.

use std::sync::Arc;

use murmur_core::StoredMessage;
use tokio::sync::Mutex;
use tracing::debug;

use crate::frame::MessageSink;

/// Identifies one registered consumer within a [`MultiSink`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConsumerId(u64);

enum ConsumerState {
    /// Registered but not yet opened: matching messages are queued until
    /// the historical drain completes.
    Buffering(Vec<StoredMessage>),
    Live,
}

struct Consumer {
    id: ConsumerId,
    sink: Arc<dyn MessageSink>,
    /// Highest feed sequence this consumer wants; deliveries stop (and the
    /// sink closes) once it is reached.
    until: u64,
    /// Highest feed sequence already delivered or covered by the
    /// historical drain.
    cursor: u64,
    state: ConsumerState,
}

struct Inner {
    /// Highest feed sequence observed by this fan-out.
    seq: u64,
    next_id: u64,
    consumers: Vec<Consumer>,
}

/// Fan-out of one feed's live messages to any number of registered sinks,
/// each with its own upper-sequence limit.
///
/// Consumers register *before* the historical portion of their request is
/// drained and start out buffering; opening them with the drained
/// watermark flushes the buffer minus everything the drain already
/// emitted. Delivery per consumer is in strictly increasing sequence
/// order, never at or below the watermark and never above `until`. A
/// consumer whose sink fails is closed and removed rather than holding up
/// the rest.
pub struct MultiSink {
    inner: Mutex<Inner>,
}

impl MultiSink {
    pub fn new(initial_seq: u64) -> Self {
        Self {
            inner: Mutex::new(Inner {
                seq: initial_seq,
                next_id: 1,
                consumers: Vec::new(),
            }),
        }
    }

    /// Current broadcast sequence.
    pub async fn broadcast_seq(&self) -> u64 {
        self.inner.lock().await.seq
    }

    pub async fn consumer_count(&self) -> usize {
        self.inner.lock().await.consumers.len()
    }

    /// Add a consumer in buffering state.
    pub async fn register(&self, sink: Arc<dyn MessageSink>) -> ConsumerId {
        let mut inner = self.inner.lock().await;
        let id = ConsumerId(inner.next_id);
        inner.next_id += 1;
        let cursor = inner.seq;
        inner.consumers.push(Consumer {
            id,
            sink,
            until: u64::MAX,
            cursor,
            state: ConsumerState::Buffering(Vec::new()),
        });
        id
    }

    /// Make a registered consumer live.
    ///
    /// `watermark` is the highest sequence the historical drain covered;
    /// buffered messages at or below it are dropped, the rest flush in
    /// order. A consumer whose `until` is already reached is closed
    /// immediately (the historical portion served the whole request).
    pub async fn open(&self, id: ConsumerId, watermark: u64, until: u64) {
        let mut inner = self.inner.lock().await;
        let Some(position) = inner.consumers.iter().position(|c| c.id == id) else {
            return;
        };

        let consumer = &mut inner.consumers[position];
        consumer.until = until;
        consumer.cursor = consumer.cursor.max(watermark);

        let buffered = match std::mem::replace(&mut consumer.state, ConsumerState::Live) {
            ConsumerState::Buffering(buffered) => buffered,
            ConsumerState::Live => Vec::new(),
        };

        let mut done = until <= consumer.cursor;
        if !done {
            for message in buffered {
                let seq = message.sequence();
                if seq <= consumer.cursor || seq > until {
                    continue;
                }
                if consumer.sink.send(&message).await.is_err() {
                    done = true;
                    break;
                }
                consumer.cursor = seq;
                if seq == until {
                    done = true;
                    break;
                }
            }
        }

        if done {
            let consumer = inner.consumers.remove(position);
            let _ = consumer.sink.close().await;
        }
    }

    /// Close and drop a consumer, e.g. when its request was cancelled
    /// mid-drain.
    pub async fn remove(&self, id: ConsumerId) {
        let mut inner = self.inner.lock().await;
        if let Some(position) = inner.consumers.iter().position(|c| c.id == id) {
            let consumer = inner.consumers.remove(position);
            let _ = consumer.sink.close().await;
        }
    }

    /// Broadcast one newly appended message.
    ///
    /// Updates the broadcast sequence, buffers for consumers still in
    /// their historical phase, delivers to live consumers within range and
    /// drops every consumer whose sink failed or whose limit is reached.
    pub async fn send(&self, message: &StoredMessage) {
        let mut inner = self.inner.lock().await;
        if message.sequence() > inner.seq {
            inner.seq = message.sequence();
        }

        let mut doomed = Vec::new();
        for consumer in inner.consumers.iter_mut() {
            match &mut consumer.state {
                ConsumerState::Buffering(buffered) => {
                    buffered.push(message.clone());
                }
                ConsumerState::Live => {
                    let seq = message.sequence();
                    if seq <= consumer.cursor || seq > consumer.until {
                        continue;
                    }
                    match consumer.sink.send(message).await {
                        Ok(()) => {
                            consumer.cursor = seq;
                            if seq == consumer.until {
                                doomed.push(consumer.id);
                            }
                        }
                        Err(err) => {
                            debug!(%err, "dropping live consumer");
                            doomed.push(consumer.id);
                        }
                    }
                }
            }
        }

        for id in doomed {
            if let Some(position) = inner.consumers.iter().position(|c| c.id == id) {
                let consumer = inner.consumers.remove(position);
                let _ = consumer.sink.close().await;
            }
        }
    }

    /// Close every consumer, e.g. on shutdown of the live tail.
    pub async fn close_all(&self) {
        let mut inner = self.inner.lock().await;
        for consumer in inner.consumers.drain(..) {
            let _ = consumer.sink.close().await;
        }
    }
}
