//! The capability surface the host must provide.
//!
//! The C-style flat function-pointer table is modeled as a single trait:
//! mandatory operations have no default and must be implemented; optional
//! operations (`log_poll`, `node_has_sufficient_logs`, `log`,
//! `membership_event`) get no-op defaults. `C` is the host's opaque
//! user-data type, carried on `Node::udata`.
//!
//! Return convention: `Ok(())` on success, `Err(_)` surfaces as
//! [`ErrorKind::CallbackFailed`](crate::errors::ErrorKind::CallbackFailed)
//! from the enclosing public `Server` operation.

use crate::membership::MembershipEvent;
use crate::node::Node;
use crate::protos::{
	AppendEntriesRequest, AppendEntriesResponse, LogEntry, LogIndex, RequestVoteRequest,
	RequestVoteResponse, ServerId, Term,
};

/// Result type for callbacks: any `Err` is folded into `CallbackFailed` by
/// the caller, but callbacks are free to carry their own error detail for
/// host-side logging before that happens.
pub type CallbackResult = std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;

pub trait RaftCallbacks<C = ()> {
	// --- Mandatory: transport ---------------------------------------

	/// Send a `RequestVote` to `node`. Fire-and-forget from the engine's
	/// perspective; the response arrives later via `recv_requestvote_response`.
	fn send_requestvote(&mut self, node: &Node<C>, msg: RequestVoteRequest) -> CallbackResult;

	/// Send an `AppendEntries` to `node`.
	fn send_appendentries(&mut self, node: &Node<C>, msg: AppendEntriesRequest) -> CallbackResult;

	// --- Mandatory: application state machine -----------------------

	/// Deliver a committed entry to the host state machine, in strict
	/// index order, exactly once per server.
	fn applylog(&mut self, entry: &LogEntry, index: LogIndex) -> CallbackResult;

	// --- Mandatory: durable metadata ----------------------------------

	/// Persist `voted_for` (`None` clears it) before any vote grant tied
	/// to it is transmitted.
	fn persist_vote(&mut self, voted_for: Option<ServerId>) -> CallbackResult;

	/// Persist `current_term` before any message depending on it is sent.
	fn persist_term(&mut self, term: Term) -> CallbackResult;

	// --- Mandatory: durable log -----------------------------------------

	/// Persist `entry` at `index`. MUST fsync before returning success.
	fn log_offer(&mut self, entry: &LogEntry, index: LogIndex) -> CallbackResult;

	/// Persist the removal of the entry previously at `index` (it has been
	/// superseded by truncation). MUST be persisted before returning.
	fn log_pop(&mut self, entry: &LogEntry, index: LogIndex) -> CallbackResult;

	// --- Optional --------------------------------------------------------

	/// Called when the oldest entry is dropped for compaction. No-op by
	/// default: compaction is host-driven and not triggered internally by
	/// this crate.
	fn log_poll(&mut self, _entry: &LogEntry, _index: LogIndex) -> CallbackResult {
		Ok(())
	}

	/// Fired exactly once, when a non-voting node's `match_index` first
	/// reaches the leader's `last_index`. The host typically responds by
	/// proposing an `AddNode` entry for it.
	fn node_has_sufficient_logs(&mut self, _node: &Node<C>) -> CallbackResult {
		Ok(())
	}

	/// Diagnostic narration (state transitions, elections, etc). No-op by
	/// default; a host wanting visibility wires this to its own logging.
	fn log(&mut self, _message: &str) {}

	/// Fired when a membership-changing entry is applied.
	fn membership_event(&mut self, _node_id: ServerId, _event: MembershipEvent) {}
}
