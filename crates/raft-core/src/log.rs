//! # log
//!
//! why: manage the append-only log of commands that raft replicates
//! relations: owned by node.rs, shipped inside message.rs AppendEntries
//! what: LogEntry struct, Log container, consistency and up-to-date checks

use serde::{Deserialize, Serialize};

/// A single entry in the replicated log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// The index of this entry in the log (1-indexed)
    pub index: u64,
    /// The term when this entry was created
    pub term: u64,
    /// The client command carried by this entry
    pub command: String,
}

impl LogEntry {
    /// Create a new log entry
    pub fn new(index: u64, term: u64, command: impl Into<String>) -> Self {
        Self {
            index,
            term,
            command: command.into(),
        }
    }
}

/// The ordered sequence of entries held by one node.
///
/// Indices are contiguous from 1 and terms never decrease along the log.
/// Both are asserted on every append, since breaking them means the
/// replication code is wrong.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    entries: Vec<LogEntry>,
}

impl Log {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Index of the last entry, 0 when empty
    pub fn last_index(&self) -> u64 {
        self.entries.last().map_or(0, |e| e.index)
    }

    /// Term of the last entry, 0 when empty
    pub fn last_term(&self) -> u64 {
        self.entries.last().map_or(0, |e| e.term)
    }

    /// Entry at a 1-based index
    pub fn get(&self, index: u64) -> Option<&LogEntry> {
        if index == 0 {
            return None;
        }
        self.entries.get(index as usize - 1)
    }

    /// Term at a 1-based index, 0 for index 0 or past the end
    pub fn term_at(&self, index: u64) -> u64 {
        self.get(index).map_or(0, |e| e.term)
    }

    /// All entries from `index` (inclusive) to the end
    pub fn entries_from(&self, index: u64) -> &[LogEntry] {
        let start = (index.max(1) as usize - 1).min(self.entries.len());
        &self.entries[start..]
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    /// Append an entry, which must directly follow the current last entry.
    pub fn append(&mut self, entry: LogEntry) {
        assert_eq!(
            entry.index,
            self.last_index() + 1,
            "log entries must be contiguous"
        );
        assert!(
            entry.term >= self.last_term(),
            "log terms must not decrease (last {}, new {})",
            self.last_term(),
            entry.term
        );
        self.entries.push(entry);
    }

    /// Remove every entry at or after `index`. Returns how many were removed.
    pub fn truncate_from(&mut self, index: u64) -> usize {
        let keep = (index.max(1) as usize - 1).min(self.entries.len());
        let removed = self.entries.len() - keep;
        self.entries.truncate(keep);
        removed
    }

    /// Whether the log holds an entry at `index` with `term`.
    /// Index 0 is the empty prefix and always matches.
    pub fn matches(&self, index: u64, term: u64) -> bool {
        index == 0 || self.get(index).is_some_and(|e| e.term == term)
    }

    /// Whether a log ending at `(last_index, last_term)` is at least as
    /// up to date as this one: a later last term wins, equal terms compare
    /// by length.
    pub fn is_up_to_date(&self, last_index: u64, last_term: u64) -> bool {
        last_term > self.last_term()
            || (last_term == self.last_term() && last_index >= self.last_index())
    }
}
