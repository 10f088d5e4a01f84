//! Host-set configuration recognized at `Server` construction.

use crate::protos::ServerId;

/// Recognized options, all set once at creation time.
#[derive(Debug, Clone)]
pub struct RaftConfig {
	/// Base of the randomized election timeout range, in milliseconds.
	/// The effective per-election timeout is sampled from
	/// `[election_timeout_ms, 2 * election_timeout_ms)`.
	pub election_timeout_ms: u64,

	/// The leader's heartbeat interval, in milliseconds. Must be strictly
	/// less than `election_timeout_ms` (typical ratio 1:5 to 1:10).
	pub request_timeout_ms: u64,

	/// Maximum number of entries sent in a single `AppendEntries`.
	pub max_append_entries_batch: usize,

	/// This server's own id.
	pub self_id: ServerId,

	/// The bootstrap configuration: `(id, voting)` for every node known at
	/// startup, including `self_id`. Ignored on replay (the node table is
	/// rebuilt by replaying membership entries from the log instead).
	pub initial_nodes: Vec<(ServerId, bool)>,
}

impl Default for RaftConfig {
	fn default() -> Self {
		RaftConfig {
			election_timeout_ms: 1000,
			request_timeout_ms: 200,
			max_append_entries_batch: 8,
			self_id: 0,
			initial_nodes: Vec::new(),
		}
	}
}

impl RaftConfig {
	/// Builder-style constructor requiring the one mandatory field.
	pub fn new(self_id: ServerId) -> Self {
		RaftConfig { self_id, ..Default::default() }
	}

	pub fn with_initial_nodes(mut self, nodes: Vec<(ServerId, bool)>) -> Self {
		self.initial_nodes = nodes;
		self
	}

	pub fn with_election_timeout_ms(mut self, ms: u64) -> Self {
		self.election_timeout_ms = ms;
		self
	}

	pub fn with_request_timeout_ms(mut self, ms: u64) -> Self {
		self.request_timeout_ms = ms;
		self
	}
}
