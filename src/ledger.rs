//! Run results
//!
//! The [`Ledger`] holds the one status each chat ends with, plus the chats
//! that were dropped without one. [`ErrorLog`] keeps the last few transport
//! failures for the dashboard.

use crate::status::{ChatId, Status};
use std::collections::{BTreeMap, HashMap, VecDeque};

/// Chat → status, write-once per chat
#[derive(Debug, Default)]
pub struct Ledger {
    statuses: HashMap<ChatId, Status>,
    counts: BTreeMap<Status, usize>,
    dropped: BTreeMap<ChatId, String>,
}

impl Ledger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a chat's status. Returns false if the chat already settled.
    pub fn record(&mut self, chat_id: ChatId, status: Status) -> bool {
        if self.is_settled(chat_id) {
            return false;
        }
        self.statuses.insert(chat_id, status);
        *self.counts.entry(status).or_insert(0) += 1;
        true
    }

    /// Record a chat that ended without a status. Returns false if it already settled.
    pub fn record_dropped(&mut self, chat_id: ChatId, reason: impl Into<String>) -> bool {
        if self.is_settled(chat_id) {
            return false;
        }
        self.dropped.insert(chat_id, reason.into());
        true
    }

    fn is_settled(&self, chat_id: ChatId) -> bool {
        self.statuses.contains_key(&chat_id) || self.dropped.contains_key(&chat_id)
    }

    /// Status recorded for a chat
    pub fn status(&self, chat_id: ChatId) -> Option<Status> {
        self.statuses.get(&chat_id).copied()
    }

    /// Number of chats with the given status
    pub fn count(&self, status: Status) -> usize {
        self.counts.get(&status).copied().unwrap_or(0)
    }

    /// Per-status counts; statuses never seen are absent
    pub fn counts(&self) -> &BTreeMap<Status, usize> {
        &self.counts
    }

    /// Chats with a status
    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }

    /// Dropped chats and why
    pub fn dropped(&self) -> &BTreeMap<ChatId, String> {
        &self.dropped
    }

    /// Chats that reached a verdict of either kind
    pub fn settled(&self) -> usize {
        self.statuses.len() + self.dropped.len()
    }
}

/// Bounded FIFO of recent transport errors
#[derive(Debug, Clone)]
pub struct ErrorLog {
    entries: VecDeque<String>,
    capacity: usize,
}

impl ErrorLog {
    pub fn new(capacity: usize) -> Self {
        ErrorLog {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an entry, evicting the oldest when full
    pub fn push(&mut self, entry: impl Into<String>) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry.into());
    }

    /// Entries, oldest first
    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_is_write_once() {
        let mut ledger = Ledger::new();

        assert!(ledger.record(1, Status::Ok));
        assert!(!ledger.record(1, Status::Blocked));

        assert_eq!(ledger.status(1), Some(Status::Ok));
        assert_eq!(ledger.count(Status::Ok), 1);
        assert_eq!(ledger.count(Status::Blocked), 0);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_counts_sum_to_len() {
        let mut ledger = Ledger::new();
        let statuses = [Status::Ok, Status::Blocked, Status::Ok, Status::Kicked, Status::Other];
        for (id, status) in statuses.iter().enumerate() {
            ledger.record(id as ChatId, *status);
        }
        ledger.record(0, Status::Other);

        assert_eq!(ledger.counts().values().sum::<usize>(), ledger.len());
        assert_eq!(ledger.count(Status::Ok), 2);
    }

    #[test]
    fn test_dropped_is_disjoint_from_statuses() {
        let mut ledger = Ledger::new();

        assert!(ledger.record_dropped(7, "timed out"));
        assert!(!ledger.record(7, Status::Ok));
        assert!(ledger.record(8, Status::Ok));
        assert!(!ledger.record_dropped(8, "late"));

        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.dropped().len(), 1);
        assert_eq!(ledger.settled(), 2);
        assert_eq!(ledger.status(7), None);
    }

    #[test]
    fn test_error_log_evicts_oldest() {
        let mut log = ErrorLog::new(10);
        for i in 0..15 {
            log.push(format!("{} connection reset", i));
        }

        assert_eq!(log.len(), 10);
        let entries: Vec<_> = log.entries().collect();
        assert_eq!(entries.first(), Some(&"5 connection reset"));
        assert_eq!(entries.last(), Some(&"14 connection reset"));
    }

    #[test]
    fn test_error_log_zero_capacity() {
        let mut log = ErrorLog::new(0);
        log.push("ignored");
        assert!(log.is_empty());
    }
}
