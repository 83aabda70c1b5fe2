//! A bounded record of recently rejected placement requests.
//!
//! Holds the newest rejections, oldest first. Once the journal is full
//! each new record evicts the oldest.

use std::collections::VecDeque;

use combate_protocol::{MatchId, PlayerId};
use tokio::time::Instant;

/// How many rejections the journal keeps by default.
pub const DEFAULT_JOURNAL_CAPACITY: usize = 1000;

/// One rejected placement request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    /// Wire error code, e.g. `"P4006"`.
    pub code: &'static str,
    pub message: String,
    pub match_id: Option<MatchId>,
    pub player_id: PlayerId,
    /// `"place"`, `"move"`, `"remove"`, `"update"` or `"confirm"`.
    pub operation: String,
    /// The id sent back to the client in the error context.
    pub request_id: String,
    pub at: Instant,
}

/// Ring buffer of [`ErrorRecord`]s, oldest first.
#[derive(Debug)]
pub struct ErrorJournal {
    entries: VecDeque<ErrorRecord>,
    capacity: usize,
}

impl ErrorJournal {
    /// A journal holding at most `capacity` records (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(DEFAULT_JOURNAL_CAPACITY)),
            capacity,
        }
    }

    /// Appends a record, evicting the oldest when full.
    pub fn record(&mut self, record: ErrorRecord) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        tracing::trace!(
            code = record.code,
            request_id = %record.request_id,
            "placement error journaled"
        );
        self.entries.push_back(record);
    }

    /// The `count` most recent records, oldest first.
    pub fn recent(&self, count: usize) -> impl Iterator<Item = &ErrorRecord> {
        self.entries
            .iter()
            .skip(self.entries.len().saturating_sub(count))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for ErrorJournal {
    fn default() -> Self {
        Self::new(DEFAULT_JOURNAL_CAPACITY)
    }
}
