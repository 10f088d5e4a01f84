//! Interprets configuration-change log entries and maintains the current
//! voting configuration.
//!
//! Design decision: voting-affecting effects (`AddNode`, `DemoteNode`,
//! `RemoveNode`) take effect only at *application* (commit) time, never at
//! offer time. This sidesteps the truncation-reversal complexity for the
//! destructive `RemoveNode` case and is applied uniformly to all three for
//! consistency. `AddNonVotingNode` is the one entry type that *does* take
//! effect at offer time (so the leader can start replicating to a learner
//! immediately); because it mutates the table at offer time, that mutation
//! is reversed on truncation.

use crate::errors::*;
use crate::node::{Node, NodeTable};
use crate::protos::{LogEntry, LogEntryData, ServerId};

/// What happened to the node table as a result of applying an entry.
/// Surfaced to the host via the optional `membership_event` callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipEvent {
	NonVotingNodeAdded(ServerId),
	NodePromoted(ServerId),
	NodeDemoted(ServerId),
	NodeRemoved(ServerId),
}

/// Tracks whether a voting-configuration-changing entry is currently
/// in flight.
#[derive(Debug, Default)]
pub struct Membership {
	in_flight: bool,
}

impl Membership {
	pub fn new() -> Self {
		Membership { in_flight: false }
	}

	pub fn voting_change_in_flight(&self) -> bool {
		self.in_flight
	}

	/// Called by the leader before proposing a new voting-config-changing
	/// entry; enforces the one-in-flight-at-a-time rule.
	pub fn check_can_propose(&self, data: &LogEntryData) -> Result<()> {
		if data.is_voting_config_change() && self.in_flight {
			return Err(ErrorKind::OneVotingChangeOnly.into());
		}
		Ok(())
	}

	/// Invoked when `entry` is offered into the log (appended, not yet
	/// committed), on every server. Mutates the node table only for
	/// `AddNonVotingNode`; records in-flight status for voting changes.
	pub fn on_offer<C: Default>(&mut self, entry: &LogEntry, nodes: &mut NodeTable<C>, next_index: crate::protos::LogIndex) {
		match &entry.data {
			LogEntryData::AddNonVotingNode { node_id, .. } => {
				if !nodes.contains(*node_id) {
					nodes.insert(Node::new(*node_id, false, next_index, C::default()));
				}
			}
			other if other.is_voting_config_change() => {
				self.in_flight = true;
			}
			_ => {}
		}
	}

	/// Invoked when `entry` is applied (its index has been committed and
	/// `last_applied_index` has reached it). Mutates the table for the
	/// voting-changing variants and clears the in-flight flag. Returns the
	/// event to forward to the host, and `true` if the removed node was
	/// `self_id` (the server must begin shutting down).
	pub fn on_apply<C>(
		&mut self,
		entry: &LogEntry,
		nodes: &mut NodeTable<C>,
		self_id: ServerId,
	) -> (Option<MembershipEvent>, bool) {
		match &entry.data {
			LogEntryData::AddNonVotingNode { node_id, .. } => {
				(Some(MembershipEvent::NonVotingNodeAdded(*node_id)), false)
			}
			LogEntryData::AddNode { node_id } => {
				if let Some(n) = nodes.get_mut(*node_id) {
					n.voting = true;
				}
				self.in_flight = false;
				(Some(MembershipEvent::NodePromoted(*node_id)), false)
			}
			LogEntryData::DemoteNode { node_id } => {
				if let Some(n) = nodes.get_mut(*node_id) {
					n.voting = false;
				}
				self.in_flight = false;
				(Some(MembershipEvent::NodeDemoted(*node_id)), false)
			}
			LogEntryData::RemoveNode { node_id } => {
				nodes.remove(*node_id);
				self.in_flight = false;
				let is_self = *node_id == self_id;
				(Some(MembershipEvent::NodeRemoved(*node_id)), is_self)
			}
			LogEntryData::Normal(_) => (None, false),
		}
	}

	/// Invoked for each entry dropped by `Log::truncate_from`, in the
	/// tail-first order `Log::truncate_from` returns them in. Reverses
	/// whatever `on_offer` did for that entry.
	pub fn on_truncate<C>(&mut self, dropped: &[LogEntry], nodes: &mut NodeTable<C>) {
		for entry in dropped {
			match &entry.data {
				LogEntryData::AddNonVotingNode { node_id, .. } => {
					nodes.remove(*node_id);
				}
				other if other.is_voting_config_change() => {
					// The one-in-flight rule plus the "never truncate a
					// committed index" rule together guarantee this entry
					// was never applied, so it is safe to unconditionally
					// clear the flag it set on offer.
					self.in_flight = false;
				}
				_ => {}
			}
		}
	}
}
