//! The per-server Raft state machine.
//!
//! `Server` is the single object a host embeds: it owns the log, the node
//! table and the membership protocol, and drives all role/term transitions
//! synchronously in response to `tick`/`recv_*` calls. No operation here
//! suspends and none may re-enter another public operation.

use std::time::Duration;

use rand::Rng;

use crate::callbacks::RaftCallbacks;
use crate::config::RaftConfig;
use crate::errors::*;
use crate::log::Log;
use crate::membership::Membership;
use crate::node::{Node, NodeTable};
use crate::protos::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
	Follower,
	Candidate,
	Leader,
}

/// Outcome of a proposal lookup against the committed log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitStatus {
	/// Not yet committed (and not (yet) known to be superseded).
	Pending,
	/// Safely committed.
	Committed,
	/// The slot at `index` now holds a different `(term, id)`: a later
	/// leader overwrote it. The caller must re-submit.
	Superseded,
}

pub struct Server<CB, C = ()>
where
	CB: RaftCallbacks<C>,
{
	id: ServerId,
	config: RaftConfig,

	role: Role,
	current_term: Term,
	voted_for: Option<ServerId>,
	leader: Option<ServerId>,

	commit_index: LogIndex,
	last_applied_index: LogIndex,

	/// Accumulated elapsed time since the last event that should reset the
	/// timer: an election start/heartbeat grant for followers/candidates,
	/// or the last heartbeat broadcast for leaders.
	time_since_last_event: Duration,
	/// This election's randomized timeout, resampled on every role change
	/// or timer reset.
	election_timeout_rand: Duration,

	nodes: NodeTable<C>,
	log: Log,
	membership: Membership,

	/// Set once a committed `RemoveNode` entry for `self.id` has been
	/// applied. The server stops starting/continuing elections but keeps
	/// answering `apply_all` until the state machine fully catches up.
	shutting_down: bool,

	callbacks: CB,
}

impl<CB, C> Server<CB, C>
where
	CB: RaftCallbacks<C>,
	C: Default + Clone,
{
	/// Creates a new server from the bootstrap configuration. For restart
	/// from durable state, use [`Server::new`] with an empty
	/// `initial_nodes` list and then call [`Server::replay_entry`] for
	/// every entry in the durable log (this also rebuilds the node table).
	pub fn new(config: RaftConfig, meta: Metadata, callbacks: CB) -> Self {
		let id = config.self_id;
		let mut nodes = NodeTable::new();
		for (node_id, voting) in &config.initial_nodes {
			nodes.insert(Node::new(*node_id, *voting, 1, C::default()));
		}
		if !nodes.contains(id) {
			nodes.insert(Node::new(id, true, 1, C::default()));
		}

		Server {
			id,
			election_timeout_rand: Self::sample_election_timeout(&config),
			config,
			role: Role::Follower,
			current_term: meta.current_term,
			voted_for: meta.voted_for,
			leader: None,
			commit_index: 0,
			last_applied_index: 0,
			time_since_last_event: Duration::from_millis(0),
			nodes,
			log: Log::new(),
			membership: Membership::new(),
			shutting_down: false,
			callbacks,
		}
	}

	/// Replays a single durable log entry during startup, bypassing
	/// `log_offer`. Must be called in index order starting from the log's
	/// `base_index`.
	pub fn replay_entry(&mut self, entry: LogEntry) {
		self.log.replay_append(entry.clone());
		let next_index = self.log.last_index() + 1;
		self.membership.on_offer(&entry, &mut self.nodes, next_index);
		self.commit_index = self.commit_index.max(self.log.base_index().saturating_sub(1));
	}

	/// Lets the host restore `last_applied_index` after replay when its
	/// state machine persists that separately: `applylog` is otherwise not
	/// idempotent-safe to repeat for entries already known to be applied
	/// before the restart.
	pub fn set_last_applied_index(&mut self, index: LogIndex) {
		self.last_applied_index = index;
	}

	pub fn id(&self) -> ServerId {
		self.id
	}

	pub fn current_term(&self) -> Term {
		self.current_term
	}

	pub fn is_leader(&self) -> bool {
		self.role == Role::Leader
	}

	pub fn leader_hint(&self) -> Option<ServerId> {
		self.leader
	}

	pub fn commit_index(&self) -> LogIndex {
		self.commit_index
	}

	pub fn last_applied_index(&self) -> LogIndex {
		self.last_applied_index
	}

	pub fn last_log_index(&self) -> LogIndex {
		self.log.last_index()
	}

	/// Read-only inspection of a single log slot, for host diagnostics and
	/// tests. Not used internally; all consensus logic goes through `log`
	/// directly.
	pub fn log_entry(&self, index: LogIndex) -> Option<&LogEntry> {
		self.log.get(index)
	}

	pub fn is_shutting_down(&self) -> bool {
		self.shutting_down
	}

	pub fn callbacks(&self) -> &CB {
		&self.callbacks
	}

	fn self_is_voting_member(&self) -> bool {
		self.nodes.get(self.id).map(|n| n.voting && n.active).unwrap_or(false)
	}

	fn sample_election_timeout(config: &RaftConfig) -> Duration {
		let base = config.election_timeout_ms;
		let extra = rand::thread_rng().gen_range(0..base.max(1));
		Duration::from_millis(base + extra)
	}

	fn reset_timer(&mut self) {
		self.time_since_last_event = Duration::from_millis(0);
		self.election_timeout_rand = Self::sample_election_timeout(&self.config);
	}

	// ------------------------------------------------------------------
	// Universal term rule
	// ------------------------------------------------------------------

	fn observe_term(&mut self, term: Term) -> Result<()> {
		if term > self.current_term {
			self.current_term = term;
			self.voted_for = None;
			self.callbacks.persist_term(term).map_err(|_| Error::from(ErrorKind::CallbackFailed))?;
			self.callbacks
				.persist_vote(None)
				.map_err(|_| Error::from(ErrorKind::CallbackFailed))?;
			self.leader = None;
			self.become_follower();
		}
		Ok(())
	}

	fn become_follower(&mut self) {
		self.role = Role::Follower;
		self.reset_timer();
	}

	// ------------------------------------------------------------------
	// tick
	// ------------------------------------------------------------------

	pub fn tick(&mut self, elapsed: Duration) -> Result<()> {
		self.time_since_last_event += elapsed;

		match self.role {
			Role::Follower | Role::Candidate => {
				if self.time_since_last_event >= self.election_timeout_rand
					&& self.self_is_voting_member()
					&& !self.shutting_down
				{
					self.start_election()?;
				}
			}
			Role::Leader => {
				let request_timeout = Duration::from_millis(self.config.request_timeout_ms);
				if self.time_since_last_event >= request_timeout {
					self.broadcast_append_entries()?;
					self.time_since_last_event = Duration::from_millis(0);
				}
			}
		}

		self.advance_commit_if_leader()?;
		self.apply_all()?;
		Ok(())
	}

	// ------------------------------------------------------------------
	// Election
	// ------------------------------------------------------------------

	fn start_election(&mut self) -> Result<()> {
		self.current_term += 1;
		self.callbacks
			.persist_term(self.current_term)
			.map_err(|_| Error::from(ErrorKind::CallbackFailed))?;

		self.voted_for = Some(self.id);
		self.callbacks
			.persist_vote(Some(self.id))
			.map_err(|_| Error::from(ErrorKind::CallbackFailed))?;

		self.role = Role::Candidate;
		self.reset_timer();

		for node in self.nodes.iter_mut() {
			node.has_vote_for_me = node.id == self.id;
		}

		self.callbacks.log(&format!(
			"server {} starting election for term {}",
			self.id, self.current_term
		));

		let last_log_index = self.log.last_index();
		let last_log_term = self.log.term(last_log_index).unwrap_or(0);
		let req = RequestVoteRequest {
			term: self.current_term,
			candidate_id: self.id,
			last_log_index,
			last_log_term,
		};

		let targets: Vec<ServerId> =
			self.nodes.active_voting_peers(self.id).map(|n| n.id).collect();
		for target in targets {
			let node = self.nodes.get(target).unwrap().clone();
			self.callbacks
				.send_requestvote(&node, req.clone())
				.map_err(|_| Error::from(ErrorKind::CallbackFailed))?;
		}

		self.maybe_become_leader()
	}

	fn maybe_become_leader(&mut self) -> Result<()> {
		if self.role != Role::Candidate {
			return Ok(());
		}

		let votes = self.nodes.iter().filter(|n| n.voting && n.active && n.has_vote_for_me).count();
		if !self.nodes.is_majority(votes) {
			return Ok(());
		}

		self.role = Role::Leader;
		self.leader = Some(self.id);
		self.reset_timer();

		let last_index = self.log.last_index();
		for node in self.nodes.iter_mut() {
			if node.id != self.id {
				node.next_index = last_index + 1;
				node.match_index = 0;
				node.has_sufficient_logs = false;
			}
		}

		self.callbacks
			.log(&format!("server {} is now leader for term {}", self.id, self.current_term));

		// Never commit an older-term entry by replica count alone. If our
		// log's tail predates this term, immediately broadcast so a
		// client/no-op entry of the current term can be committed and
		// carry the old tail transitively with it.
		self.broadcast_append_entries()
	}

	// ------------------------------------------------------------------
	// RequestVote
	// ------------------------------------------------------------------

	pub fn recv_requestvote(
		&mut self,
		_from: ServerId,
		msg: RequestVoteRequest,
	) -> Result<RequestVoteResponse> {
		self.observe_term(msg.term)?;

		if msg.term < self.current_term {
			return Ok(RequestVoteResponse { term: self.current_term, vote_granted: false });
		}

		let last_log_index = self.log.last_index();
		let last_log_term = self.log.term(last_log_index).unwrap_or(0);

		let up_to_date = msg.last_log_term > last_log_term
			|| (msg.last_log_term == last_log_term && msg.last_log_index >= last_log_index);

		let can_vote = match self.voted_for {
			None => true,
			Some(id) => id == msg.candidate_id,
		};

		let granted = up_to_date && can_vote;

		if granted {
			self.voted_for = Some(msg.candidate_id);
			self.callbacks
				.persist_vote(Some(msg.candidate_id))
				.map_err(|_| Error::from(ErrorKind::CallbackFailed))?;
			self.reset_timer();
		}

		Ok(RequestVoteResponse { term: self.current_term, vote_granted: granted })
	}

	pub fn recv_requestvote_response(
		&mut self,
		from: ServerId,
		msg: RequestVoteResponse,
	) -> Result<()> {
		self.observe_term(msg.term)?;

		if msg.term != self.current_term || self.role != Role::Candidate {
			return Ok(());
		}
		if from == self.id {
			return Ok(());
		}

		if msg.vote_granted {
			if let Some(node) = self.nodes.get_mut(from) {
				node.has_vote_for_me = true;
			}
		}

		self.maybe_become_leader()
	}

	// ------------------------------------------------------------------
	// AppendEntries receiver
	// ------------------------------------------------------------------

	pub fn recv_appendentries(
		&mut self,
		from: ServerId,
		msg: AppendEntriesRequest,
	) -> Result<AppendEntriesResponse> {
		self.observe_term(msg.term)?;

		if msg.term < self.current_term {
			return Ok(AppendEntriesResponse {
				term: self.current_term,
				success: false,
				current_idx: self.log.last_index(),
				first_idx: None,
			});
		}

		// A candidate observing a current-term leader steps down.
		if self.role == Role::Candidate {
			self.become_follower();
		}
		self.role = Role::Follower;
		self.leader = Some(from);
		self.reset_timer();

		// Reject: we don't have msg.prev_log_index at all, or it conflicts.
		match self.log.term(msg.prev_log_index) {
			None => {
				return Ok(AppendEntriesResponse {
					term: self.current_term,
					success: false,
					current_idx: self.log.last_index(),
					first_idx: None,
				});
			}
			Some(term) if msg.prev_log_index > 0 && term != msg.prev_log_term => {
				let conflict_term = term;
				let mut first = msg.prev_log_index;
				while first > self.log.base_index()
					&& self.log.term(first - 1) == Some(conflict_term)
				{
					first -= 1;
				}
				return Ok(AppendEntriesResponse {
					term: self.current_term,
					success: false,
					current_idx: first,
					first_idx: Some(first),
				});
			}
			_ => {}
		}

		let mut next_index = msg.prev_log_index + 1;
		for entry in msg.entries.into_iter() {
			match self.log.term(next_index) {
				Some(existing_term) if existing_term == entry.term => {
					// Already present; idempotent no-op.
				}
				Some(_existing_term) => {
					if next_index <= self.commit_index {
						return Err(ErrorKind::Corrupt(format!(
							"leader asked us to truncate committed index {}",
							next_index
						))
						.into());
					}
					let dropped = self.log.truncate_from(next_index);
					for dropped_entry in &dropped {
						self.callbacks
							.log_pop(dropped_entry, dropped_entry.index)
							.map_err(|_| Error::from(ErrorKind::CallbackFailed))?;
					}
					self.membership.on_truncate(&dropped, &mut self.nodes);

					self.append_entry_with_effects(entry)?;
				}
				None => {
					self.append_entry_with_effects(entry)?;
				}
			}
			next_index += 1;
		}

		let current_idx = next_index - 1;

		if msg.leader_commit > self.commit_index {
			self.commit_index = std::cmp::min(msg.leader_commit, self.log.last_index());
		}

		Ok(AppendEntriesResponse {
			term: self.current_term,
			success: true,
			current_idx,
			first_idx: None,
		})
	}

	/// Appends `entry` and applies its offer-time membership effect,
	/// invoking `log_offer` first so persistence always precedes the
	/// effect becoming live.
	fn append_entry_with_effects(&mut self, entry: LogEntry) -> Result<()> {
		self.callbacks
			.log_offer(&entry, entry.index)
			.map_err(|_| Error::from(ErrorKind::CallbackFailed))?;
		let next_index = entry.index + 1;
		self.log.append(entry.clone());
		self.membership.on_offer(&entry, &mut self.nodes, next_index);
		Ok(())
	}

	// ------------------------------------------------------------------
	// AppendEntries sender / response handler
	// ------------------------------------------------------------------

	fn broadcast_append_entries(&mut self) -> Result<()> {
		if self.role != Role::Leader {
			return Ok(());
		}

		let targets: Vec<ServerId> =
			self.nodes.iter().filter(|n| n.id != self.id && n.active).map(|n| n.id).collect();
		for target in targets {
			self.replicate_to(target)?;
		}
		Ok(())
	}

	fn replicate_to(&mut self, target: ServerId) -> Result<()> {
		let batch = self.config.max_append_entries_batch;
		let term = self.current_term;
		let leader_id = self.id;
		let leader_commit = self.commit_index;
		let last_log_index = self.log.last_index();

		let (node_snapshot, prev_log_index, entries) = {
			let node = match self.nodes.get_mut(target) {
				Some(n) => n,
				None => return Ok(()),
			};
			let prev_log_index = node.next_index.saturating_sub(1);
			let count =
				std::cmp::min(batch as LogIndex, last_log_index.saturating_sub(prev_log_index));
			let entries: Vec<LogEntry> =
				self.log.slice(prev_log_index + 1, count as usize).to_vec();
			(node.clone(), prev_log_index, entries)
		};

		let prev_log_term = self.log.term(prev_log_index).unwrap_or(0);
		let req = AppendEntriesRequest {
			term,
			leader_id,
			prev_log_index,
			prev_log_term,
			entries,
			leader_commit,
		};

		self.callbacks
			.send_appendentries(&node_snapshot, req)
			.map_err(|_| Error::from(ErrorKind::CallbackFailed))
	}

	pub fn recv_appendentries_response(
		&mut self,
		from: ServerId,
		msg: AppendEntriesResponse,
	) -> Result<()> {
		self.observe_term(msg.term)?;

		if self.role != Role::Leader {
			return Ok(());
		}

		let mut should_retry_lower = false;
		if let Some(node) = self.nodes.get_mut(from) {
			if msg.success {
				if msg.current_idx > node.match_index {
					node.match_index = msg.current_idx;
					node.next_index = msg.current_idx + 1;
				}
			} else if msg.term <= self.current_term {
				node.next_index = std::cmp::max(1, msg.current_idx);
				should_retry_lower = true;
			}
		}

		if let Some(node) = self.nodes.get_mut(from) {
			if node.match_index >= self.log.last_index() && !node.has_sufficient_logs {
				node.has_sufficient_logs = true;
				let snapshot = node.clone();
				self.callbacks
					.node_has_sufficient_logs(&snapshot)
					.map_err(|_| Error::from(ErrorKind::CallbackFailed))?;
			}
		}

		self.advance_commit_if_leader()?;
		self.apply_all()?;

		if should_retry_lower {
			self.replicate_to(from)?;
		}
		Ok(())
	}

	// ------------------------------------------------------------------
	// Commit advancement
	// ------------------------------------------------------------------

	fn advance_commit_if_leader(&mut self) -> Result<()> {
		if self.role != Role::Leader {
			return Ok(());
		}

		let majority = self.nodes.majority_size();
		let last_index = self.log.last_index();
		let mut n = last_index;

		while n > self.commit_index {
			let term_matches = self.log.term(n) == Some(self.current_term);
			if term_matches {
				let count = self
					.nodes
					.iter()
					.filter(|node| node.voting && node.active)
					.filter(|node| node.id == self.id || node.match_index >= n)
					.count();

				if count >= majority {
					self.commit_index = n;
					break;
				}
			}
			n -= 1;
		}

		Ok(())
	}

	// ------------------------------------------------------------------
	// Client entries
	// ------------------------------------------------------------------

	pub fn recv_entry(&mut self, id: EntryId, data: LogEntryData) -> Result<EntryResponse> {
		if self.shutting_down {
			return Err(ErrorKind::Shutdown.into());
		}
		if self.role != Role::Leader {
			return Err(ErrorKind::NotLeader(self.leader).into());
		}

		self.membership.check_can_propose(&data)?;

		let index = self.log.last_index() + 1;
		let term = self.current_term;
		let entry = LogEntry { index, term, id, data };

		self.append_entry_with_effects(entry)?;
		self.broadcast_append_entries()?;

		Ok(EntryResponse { term, index, id })
	}

	pub fn msg_entry_response_committed(&self, resp: EntryResponse) -> CommitStatus {
		match self.log.get(resp.index) {
			None => CommitStatus::Pending,
			Some(entry) => {
				if entry.term != resp.term || entry.id != resp.id {
					CommitStatus::Superseded
				} else if self.commit_index >= resp.index {
					CommitStatus::Committed
				} else {
					CommitStatus::Pending
				}
			}
		}
	}

	// ------------------------------------------------------------------
	// Apply
	// ------------------------------------------------------------------

	pub fn apply_all(&mut self) -> Result<()> {
		while self.last_applied_index < self.commit_index {
			let index = self.last_applied_index + 1;
			let entry = match self.log.get(index) {
				Some(e) => e.clone(),
				None => break,
			};

			self.callbacks
				.applylog(&entry, index)
				.map_err(|_| Error::from(ErrorKind::CallbackFailed))?;

			let (event, self_removed) = self.membership.on_apply(&entry, &mut self.nodes, self.id);
			if let Some(event) = event {
				let node_id = match &entry.data {
					LogEntryData::AddNonVotingNode { node_id, .. } => *node_id,
					LogEntryData::AddNode { node_id } => *node_id,
					LogEntryData::DemoteNode { node_id } => *node_id,
					LogEntryData::RemoveNode { node_id } => *node_id,
					LogEntryData::Normal(_) => 0,
				};
				self.callbacks.membership_event(node_id, event);
			}
			if self_removed {
				self.shutting_down = true;
			}

			self.last_applied_index = index;
		}
		Ok(())
	}
}
