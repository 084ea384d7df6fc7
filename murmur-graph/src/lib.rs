// SPDX-License-Identifier: MIT OR Apache-2.0

//! The trust-graph engine.
//!
//! Contact messages flowing through the main log are folded into a
//! key/value index of (author, target) relation states by the
//! [`ContactIndex`]. The [`GraphBuilder`] turns that index into a weighted
//! directed [`Graph`] on demand, memoizes it, and answers the questions
//! the rest of the stack asks about it: who follows whom, who is reachable
//! within a bounded number of friend hops, and whether a peer is
//! authorized to interact.

pub mod authorizer;
pub mod builder;
pub mod graph;
pub mod index;

pub use authorizer::Authorizer;
pub use builder::{GraphBuilder, GraphError};
pub use graph::{ContactEdge, Graph};
pub use index::{ContactIndex, IndexError, Relation};
