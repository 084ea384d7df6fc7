// SPDX-License-Identifier: MIT OR Apache-2.0

//! The feed-gossip engine.
//!
//! Serves historical and live append-only feeds to remote peers. A
//! history-stream request drains a bounded range of one author's feed into
//! an encoded byte sink and can extend into live delivery, where a
//! per-feed [`MultiSink`] fans newly appended messages out to every
//! registered subscriber.

pub mod frame;
pub mod manager;
pub mod multisink;
pub mod sink;

pub use frame::{BinaryStreamSink, KeyValueSink, MessageSink};
pub use manager::{FeedManager, GossipError, HistoryStreamRequest};
pub use multisink::MultiSink;
pub use sink::{ByteSink, ChannelSink, SinkError};
