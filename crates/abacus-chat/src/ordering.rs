//! Commit ordering for asynchronous replies.
//!
//! Each reply request takes a sequence number when issued. Under
//! [`ReplyOrdering::Issuance`] a finished reply is held back until every
//! earlier request has been committed; under [`ReplyOrdering::Completion`]
//! it is released immediately.

use std::collections::BTreeMap;

use abacus_core::config::ReplyOrdering;

/// Sequencer that releases completed items in the configured order.
#[derive(Debug)]
pub struct ReplyQueue<T> {
    ordering: ReplyOrdering,
    next_issue: u64,
    next_commit: u64,
    ready: BTreeMap<u64, T>,
}

impl<T> ReplyQueue<T> {
    pub fn new(ordering: ReplyOrdering) -> Self {
        Self {
            ordering,
            next_issue: 0,
            next_commit: 0,
            ready: BTreeMap::new(),
        }
    }

    pub fn ordering(&self) -> ReplyOrdering {
        self.ordering
    }

    /// Reserve the sequence number for a new request.
    pub fn issue(&mut self) -> u64 {
        let seq = self.next_issue;
        self.next_issue += 1;
        seq
    }

    /// Record the completion of `seq` and return everything now committable,
    /// in commit order.
    pub fn complete(&mut self, seq: u64, item: T) -> Vec<T> {
        match self.ordering {
            ReplyOrdering::Completion => vec![item],
            ReplyOrdering::Issuance => {
                if seq < self.next_commit || self.ready.contains_key(&seq) {
                    tracing::warn!(seq, "Duplicate reply completion ignored");
                    return Vec::new();
                }
                self.ready.insert(seq, item);
                let mut released = Vec::new();
                while let Some(item) = self.ready.remove(&self.next_commit) {
                    released.push(item);
                    self.next_commit += 1;
                }
                if !self.ready.is_empty() {
                    tracing::debug!(
                        waiting_on = self.next_commit,
                        held = self.ready.len(),
                        "Holding replies for earlier requests"
                    );
                }
                released
            }
        }
    }

    /// Number of finished items held back behind an earlier request.
    pub fn held(&self) -> usize {
        self.ready.len()
    }

    /// Forget all issued and held items.
    pub fn reset(&mut self) {
        self.next_issue = 0;
        self.next_commit = 0;
        self.ready.clear();
    }
}
