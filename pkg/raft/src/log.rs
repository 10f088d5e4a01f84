//! The replicated log.
//!
//! A `Log` is bounded on the left (entries before `base_index` have been
//! compacted away and are inaccessible) and unbounded on the right. It is
//! plain in-memory data: callback notification (`log_offer`/`log_pop`/
//! `log_poll`) is the `Server`'s responsibility, invoked around calls into
//! this type, so the log itself stays trivially unit-testable without a
//! host in the loop.

use crate::protos::{LogEntry, LogIndex, Term};

/// An ordered, gap-free sequence of log entries with a movable left edge.
#[derive(Debug, Default)]
pub struct Log {
	/// Index of the first retained entry. `1` until the first compaction.
	base_index: LogIndex,

	/// `entries[0]` holds the entry at `base_index`, when non-empty.
	entries: Vec<LogEntry>,
}

impl Log {
	pub fn new() -> Self {
		Log { base_index: 1, entries: Vec::new() }
	}

	/// First retained index, or `base_index` if the log is empty (there is
	/// no entry there yet, but it is where the next entry will land).
	pub fn base_index(&self) -> LogIndex {
		self.base_index
	}

	/// Index of the most recent entry, or `base_index - 1` if empty.
	pub fn last_index(&self) -> LogIndex {
		self.base_index + self.entries.len() as LogIndex - 1
	}

	/// Term at `index`, or `0` for index `0` (the conventional "before the
	/// log began" term). Returns `None` if `index` is out of range (either
	/// compacted away or beyond `last_index`).
	pub fn term(&self, index: LogIndex) -> Option<Term> {
		if index == 0 {
			return Some(0);
		}
		self.get(index).map(|e| e.term)
	}

	pub fn get(&self, index: LogIndex) -> Option<&LogEntry> {
		if index < self.base_index || index > self.last_index() {
			return None;
		}
		self.entries.get((index - self.base_index) as usize)
	}

	/// A contiguous run of up to `count` entries starting at `from`
	/// (inclusive). Stops early at `last_index`.
	pub fn slice(&self, from: LogIndex, count: usize) -> &[LogEntry] {
		if from < self.base_index || from > self.last_index() {
			return &[];
		}
		let start = (from - self.base_index) as usize;
		let end = std::cmp::min(start + count, self.entries.len());
		&self.entries[start..end]
	}

	/// Appends `entry` at `last_index() + 1`. Panics if `entry.index` does
	/// not immediately follow the current tail: the caller (`Server`) is
	/// responsible for stamping indices correctly before calling this.
	pub fn append(&mut self, entry: LogEntry) {
		assert_eq!(
			entry.index,
			self.last_index() + 1,
			"log entries must be appended gap-free"
		);
		self.entries.push(entry);
	}

	/// Drops every entry from `index` to the tail (inclusive), returning
	/// them in the order they should be reported to `log_pop`: tail first.
	pub fn truncate_from(&mut self, index: LogIndex) -> Vec<LogEntry> {
		if index > self.last_index() {
			return Vec::new();
		}
		let cut = (index.max(self.base_index) - self.base_index) as usize;
		let mut dropped: Vec<LogEntry> = self.entries.split_off(cut);
		dropped.reverse();
		dropped
	}

	/// Drops the oldest retained entry, for use by compaction. Returns it
	/// (to be reported to `log_poll`) along with its index.
	pub fn pop_front(&mut self) -> Option<(LogEntry, LogIndex)> {
		if self.entries.is_empty() {
			return None;
		}
		let index = self.base_index;
		let entry = self.entries.remove(0);
		self.base_index += 1;
		Some((entry, index))
	}

	/// Used only during startup replay: appends without the gap-free
	/// assertion failing to distinguish replay semantics from normal
	/// append (replay always presents a gap-free sequence by construction,
	/// but may start above index 1 if compaction already happened).
	pub fn replay_append(&mut self, entry: LogEntry) {
		if self.entries.is_empty() {
			self.base_index = entry.index;
		}
		self.append(entry);
	}

}
