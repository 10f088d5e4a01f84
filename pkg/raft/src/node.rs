//! The node table: per-peer replication progress and membership state.

use std::collections::HashMap;

use crate::protos::{LogIndex, ServerId};

/// A single peer, or the self node (the row whose `id` equals the owning
/// `Server`'s id).
#[derive(Debug, Clone)]
pub struct Node<C = ()> {
	pub id: ServerId,

	/// Whether this node counts toward quorum.
	pub voting: bool,

	/// Whether this node is currently part of the cluster at all. Inactive
	/// nodes are skipped for both replication and majority math.
	pub active: bool,

	/// Index of the next log entry to send to this node. Initialized to
	/// `leader.last_index + 1` when the node is first tracked.
	pub next_index: LogIndex,

	/// Highest index known to be durably replicated on this node.
	pub match_index: LogIndex,

	/// Set once `match_index` first reaches the leader's `last_index`;
	/// used to fire `node_has_sufficient_logs` exactly once per catch-up.
	pub has_sufficient_logs: bool,

	/// Whether this node granted its vote to us in the current election.
	pub has_vote_for_me: bool,

	/// Opaque host user-data, carried verbatim from `ADD_NONVOTING_NODE`.
	pub udata: C,
}

impl<C> Node<C> {
	pub fn new(id: ServerId, voting: bool, next_index: LogIndex, udata: C) -> Self {
		Node {
			id,
			voting,
			active: true,
			next_index,
			match_index: 0,
			has_sufficient_logs: false,
			has_vote_for_me: false,
			udata,
		}
	}
}

/// The mapping from `ServerId` to `Node`, plus the majority computations
/// that only ever consider voting, active nodes.
#[derive(Debug, Default)]
pub struct NodeTable<C = ()> {
	nodes: HashMap<ServerId, Node<C>>,
}

impl<C> NodeTable<C> {
	pub fn new() -> Self {
		NodeTable { nodes: HashMap::new() }
	}

	pub fn insert(&mut self, node: Node<C>) {
		self.nodes.insert(node.id, node);
	}

	pub fn get(&self, id: ServerId) -> Option<&Node<C>> {
		self.nodes.get(&id)
	}

	pub fn get_mut(&mut self, id: ServerId) -> Option<&mut Node<C>> {
		self.nodes.get_mut(&id)
	}

	pub fn remove(&mut self, id: ServerId) -> Option<Node<C>> {
		self.nodes.remove(&id)
	}

	pub fn contains(&self, id: ServerId) -> bool {
		self.nodes.contains_key(&id)
	}

	pub fn iter(&self) -> impl Iterator<Item = &Node<C>> {
		self.nodes.values()
	}

	pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Node<C>> {
		self.nodes.values_mut()
	}

	/// All other (non-`exclude_id`) active, voting nodes: the peers an
	/// election or heartbeat broadcast fans out to.
	pub fn active_voting_peers(&self, exclude_id: ServerId) -> impl Iterator<Item = &Node<C>> {
		self.nodes
			.values()
			.filter(move |n| n.id != exclude_id && n.active && n.voting)
	}

	/// Count of active, voting members — the universe majority math is
	/// computed over. Always at least 1 (the self node is always present
	/// and, while a member, is both active and voting).
	pub fn voting_member_count(&self) -> usize {
		self.nodes.values().filter(|n| n.active && n.voting).count()
	}

	/// `⌈(V+1)/2⌉`: the number of votes/replicas needed among `V` voting
	/// members to constitute a strict majority.
	pub fn majority_size(&self) -> usize {
		let v = self.voting_member_count();
		(v / 2) + 1
	}

	/// Whether `count` constitutes a strict majority of voting members.
	pub fn is_majority(&self, count: usize) -> bool {
		count >= self.majority_size()
	}
}
