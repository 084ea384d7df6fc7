// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage interfaces and in-memory implementations for the murmur gossip
//! stack.
//!
//! Three persistence concerns live here:
//!
//! - [`EventLog`]: an append-only, totally-ordered sequence of values with
//!   lazy range queries and live tailing. [`MemoryLog`] is the in-memory
//!   implementation used throughout the stack.
//! - [`Multilog`]: the partitioning of the main log into per-author
//!   sub-logs of main-log offsets, resolved back through
//!   [`indirect`](multilog::indirect).
//! - [`OrderedStore`]: an ordered key/value store with prefix scans and
//!   atomic prefix deletion, backing the contact index.
//!
//! None of the implementations validate feed integrity; ingest is expected
//! to have verified messages before they are appended.

pub mod kv;
pub mod log;
pub mod memory;
pub mod multilog;
pub mod query;

pub use kv::{KvError, MemoryStore, OrderedStore};
pub use log::{EventLog, LogError, LogStream, Seq};
pub use memory::MemoryLog;
pub use multilog::{indirect, Multilog};
pub use query::Query;
