// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::Arc;

use murmur_core::FeedRef;
use murmur_store::OrderedStore;

use crate::builder::{GraphBuilder, GraphError};

/// A predicate over feed references derived from the trust graph.
///
/// Permits a peer iff it is within the configured hop range of `from`, or
/// is `from` itself.
pub struct Authorizer<S> {
    builder: Arc<GraphBuilder<S>>,
    from: FeedRef,
    max_hops: u64,
}

impl<S> Authorizer<S>
where
    S: OrderedStore,
{
    pub(crate) fn new(builder: Arc<GraphBuilder<S>>, from: FeedRef, max_hops: u64) -> Self {
        Self {
            builder,
            from,
            max_hops,
        }
    }

    pub async fn allows(&self, peer: &FeedRef) -> Result<bool, GraphError> {
        if *peer == self.from {
            return Ok(true);
        }
        let hops = self.builder.hops(&self.from, self.max_hops).await?;
        Ok(hops.contains(peer))
    }
}
