//! Wire-format-agnostic message and log entry types.
//!
//! Everything here is plain data: no I/O, no behavior tied to a transport.
//! Entries keep a fixed `{type_tag, length, bytes}`-shaped payload (the
//! `payload: Vec<u8>` on `LogEntryData::Normal`) so hosts can lay them out
//! on the wire however they like; this crate never serializes them itself
//! beyond deriving `Serialize`/`Deserialize` for host convenience.

/// Uniquely identifies a server in the cluster. Assigned out of band by the
/// host (e.g. from static configuration or a discovery service).
pub type ServerId = u32;

/// A monotonically non-decreasing logical clock for leadership epochs.
pub type Term = u64;

/// A 1-based, gap-free position in the replicated log.
pub type LogIndex = u64;

/// An opaque tag chosen by the submitter of an entry, used for
/// client-side deduplication/matching. Has no consensus meaning.
pub type EntryId = u32;

/// The kind of effect a log entry has once applied, beyond the opaque user
/// command: `Normal` entries are meaningless to the consensus module itself
/// and are simply handed to `applylog`; the others drive the membership
/// protocol.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum LogEntryData {
	/// An application-defined command, opaque to the consensus core.
	Normal(Vec<u8>),

	/// Adds `node_id` to the node table as non-voting and active. Takes
	/// effect on `log_offer` (at every server, leader and followers alike)
	/// so that the leader can start replicating to it immediately.
	AddNonVotingNode { node_id: ServerId, udata: Vec<u8> },

	/// Promotes a previously non-voting node to full voting membership.
	/// Takes effect on application (commit), never on offer.
	AddNode { node_id: ServerId },

	/// Demotes a voting node back to non-voting. Takes effect on
	/// application.
	DemoteNode { node_id: ServerId },

	/// Removes a node from the table entirely. Takes effect on
	/// application, to avoid truncation-reversal of a destructive effect.
	RemoveNode { node_id: ServerId },
}

impl LogEntryData {
	/// Whether this entry mutates the voting configuration, and is
	/// therefore subject to the one-in-flight-change rule.
	pub fn is_voting_config_change(&self) -> bool {
		matches!(
			self,
			LogEntryData::AddNode { .. }
				| LogEntryData::DemoteNode { .. }
				| LogEntryData::RemoveNode { .. }
		)
	}
}

/// A single entry in the replicated log. Immutable once it occupies a given
/// `(index, term)` pair in the durable log of any server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogEntry {
	pub index: LogIndex,
	pub term: Term,
	pub id: EntryId,
	pub data: LogEntryData,
}

/// Persistent per-server metadata. `current_term` and `voted_for` must be
/// durable (via `persist_term`/`persist_vote`) before any message that
/// depends on them is sent or acknowledged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
	pub current_term: Term,
	pub voted_for: Option<ServerId>,
}

impl Default for Metadata {
	fn default() -> Self {
		Metadata { current_term: 0, voted_for: None }
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestVoteRequest {
	pub term: Term,
	pub candidate_id: ServerId,
	pub last_log_index: LogIndex,
	pub last_log_term: Term,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestVoteResponse {
	pub term: Term,
	pub vote_granted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendEntriesRequest {
	pub term: Term,
	pub leader_id: ServerId,
	pub prev_log_index: LogIndex,
	pub prev_log_term: Term,
	pub entries: Vec<LogEntry>,
	pub leader_commit: LogIndex,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendEntriesResponse {
	pub term: Term,
	pub success: bool,

	/// On success: `prev_log_index + entries.len()`, i.e. the index of the
	/// last entry now known to be present in the receiver's log. On
	/// failure: a fast-backup hint (receiver's `last_index`, or the first
	/// index of a conflicting term) so the leader can skip ahead instead
	/// of decrementing `next_index` one at a time.
	pub current_idx: LogIndex,

	/// Optional conflict-term hint; when present and `!success`, it names
	/// the first index of the conflicting term at `current_idx` so the
	/// leader can back up past an entire foreign term in one round trip.
	pub first_idx: Option<LogIndex>,
}

/// The response a client/proposer correlates against `msg_entry_response_committed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryResponse {
	pub term: Term,
	pub index: LogIndex,
	pub id: EntryId,
}
