// SPDX-License-Identifier: MIT OR Apache-2.0

//! Composable query specs for log cursors.

use crate::log::Seq;

/// A range query over a log.
///
/// Specs compose by chaining; unset bounds leave that side open. A
/// negative `limit` means unbounded. `live` extends the cursor past the
/// stored tail: it then never terminates until cancelled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Query {
    gt: Option<Seq>,
    gte: Option<Seq>,
    lt: Option<Seq>,
    limit: Option<u64>,
    reverse: bool,
    live: bool,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gt(mut self, seq: Seq) -> Self {
        self.gt = Some(seq);
        self
    }

    pub fn gte(mut self, seq: Seq) -> Self {
        self.gte = Some(seq);
        self
    }

    pub fn lt(mut self, seq: Seq) -> Self {
        self.lt = Some(seq);
        self
    }

    /// Cap the number of yielded entries; a negative value removes the cap.
    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = if limit < 0 { None } else { Some(limit as u64) };
        self
    }

    pub fn reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    pub fn live(mut self, live: bool) -> Self {
        self.live = live;
        self
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    pub fn is_reverse(&self) -> bool {
        self.reverse
    }

    pub(crate) fn max_entries(&self) -> Option<u64> {
        self.limit
    }

    pub(crate) fn upper_bound(&self) -> Option<Seq> {
        self.lt
    }

    pub(crate) fn matches(&self, seq: Seq) -> bool {
        if let Some(gt) = self.gt {
            if seq <= gt {
                return false;
            }
        }
        if let Some(gte) = self.gte {
            if seq < gte {
                return false;
            }
        }
        if let Some(lt) = self.lt {
            if seq >= lt {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::Query;

    #[test]
    fn bounds_compose() {
        let query = Query::new().gt(2).lt(7);
        assert!(!query.matches(2));
        assert!(query.matches(3));
        assert!(query.matches(6));
        assert!(!query.matches(7));
    }

    #[test]
    fn negative_limit_is_unbounded() {
        assert_eq!(Query::new().limit(-1).max_entries(), None);
        assert_eq!(Query::new().limit(0).max_entries(), Some(0));
        assert_eq!(Query::new().limit(3).max_entries(), Some(3));
    }
}
