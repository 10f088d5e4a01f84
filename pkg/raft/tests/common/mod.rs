//! A deterministic, in-process multi-server test harness.
//!
//! There is no real transport: `TestCallbacks::send_*` pushes the outbound
//! message into a shared queue, and `Cluster::drain` delivers it by calling
//! straight into the target `Server`, then immediately routes the
//! synchronous response back to the sender. This keeps the whole cluster
//! single-threaded and step-by-step reproducible.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;
use std::time::Duration;

use raft::callbacks::{CallbackResult, RaftCallbacks};
use raft::config::RaftConfig;
use raft::consensus::{CommitStatus, Server};
use raft::membership::MembershipEvent;
use raft::node::Node;
use raft::protos::*;

pub enum Outbound {
	RequestVote { from: ServerId, to: ServerId, msg: RequestVoteRequest },
	AppendEntries { from: ServerId, to: ServerId, msg: AppendEntriesRequest },
}

pub struct TestCallbacks {
	pub id: ServerId,
	outbox: Rc<RefCell<VecDeque<Outbound>>>,
	pub applied: Vec<(LogIndex, LogEntry)>,
	pub sufficient_logs_fired: Vec<ServerId>,
	pub membership_events: Vec<(ServerId, MembershipEvent)>,
	pub persisted_term: Option<Term>,
	pub persisted_vote: Option<Option<ServerId>>,
	pub log_offer_calls: usize,
	pub log_pop_calls: usize,
	last_persisted_term: Term,
	/// `(term, candidate)` for every vote this server has ever granted,
	/// in order. Used to check that a server never grants two different
	/// candidates a vote in the same term.
	pub vote_log: Vec<(Term, ServerId)>,
}

impl TestCallbacks {
	fn new(id: ServerId, outbox: Rc<RefCell<VecDeque<Outbound>>>) -> Self {
		TestCallbacks {
			id,
			outbox,
			applied: Vec::new(),
			sufficient_logs_fired: Vec::new(),
			membership_events: Vec::new(),
			persisted_term: None,
			persisted_vote: None,
			log_offer_calls: 0,
			log_pop_calls: 0,
			last_persisted_term: 0,
			vote_log: Vec::new(),
		}
	}
}

impl RaftCallbacks<()> for TestCallbacks {
	fn send_requestvote(&mut self, node: &Node<()>, msg: RequestVoteRequest) -> CallbackResult {
		self.outbox.borrow_mut().push_back(Outbound::RequestVote { from: self.id, to: node.id, msg });
		Ok(())
	}

	fn send_appendentries(&mut self, node: &Node<()>, msg: AppendEntriesRequest) -> CallbackResult {
		self.outbox.borrow_mut().push_back(Outbound::AppendEntries { from: self.id, to: node.id, msg });
		Ok(())
	}

	fn applylog(&mut self, entry: &LogEntry, index: LogIndex) -> CallbackResult {
		self.applied.push((index, entry.clone()));
		Ok(())
	}

	fn persist_vote(&mut self, voted_for: Option<ServerId>) -> CallbackResult {
		self.persisted_vote = Some(voted_for);
		if let Some(candidate) = voted_for {
			self.vote_log.push((self.last_persisted_term, candidate));
		}
		Ok(())
	}

	fn persist_term(&mut self, term: Term) -> CallbackResult {
		self.persisted_term = Some(term);
		self.last_persisted_term = term;
		Ok(())
	}

	fn log_offer(&mut self, _entry: &LogEntry, _index: LogIndex) -> CallbackResult {
		self.log_offer_calls += 1;
		Ok(())
	}

	fn log_pop(&mut self, _entry: &LogEntry, _index: LogIndex) -> CallbackResult {
		self.log_pop_calls += 1;
		Ok(())
	}

	fn node_has_sufficient_logs(&mut self, node: &Node<()>) -> CallbackResult {
		self.sufficient_logs_fired.push(node.id);
		Ok(())
	}

	fn membership_event(&mut self, node_id: ServerId, event: MembershipEvent) {
		self.membership_events.push((node_id, event));
	}
}

pub struct Cluster {
	servers: HashMap<ServerId, Server<TestCallbacks, ()>>,
	outbox: Rc<RefCell<VecDeque<Outbound>>>,
	isolated: HashSet<ServerId>,
}

impl Cluster {
	/// Builds a cluster of `ids.len()` voting members, all bootstrapped
	/// with the same initial configuration, all starting as followers at
	/// term 0.
	pub fn new(ids: &[ServerId]) -> Self {
		let outbox = Rc::new(RefCell::new(VecDeque::new()));
		let initial_nodes: Vec<(ServerId, bool)> = ids.iter().map(|&id| (id, true)).collect();

		let mut servers = HashMap::new();
		for &id in ids {
			let config = RaftConfig::new(id).with_initial_nodes(initial_nodes.clone());
			let callbacks = TestCallbacks::new(id, outbox.clone());
			servers.insert(id, Server::new(config, Metadata::default(), callbacks));
		}

		Cluster { servers, outbox, isolated: HashSet::new() }
	}

	pub fn server(&self, id: ServerId) -> &Server<TestCallbacks, ()> {
		self.servers.get(&id).unwrap()
	}

	pub fn server_mut(&mut self, id: ServerId) -> &mut Server<TestCallbacks, ()> {
		self.servers.get_mut(&id).unwrap()
	}

	pub fn isolate(&mut self, id: ServerId) {
		self.isolated.insert(id);
	}

	pub fn rejoin(&mut self, id: ServerId) {
		self.isolated.remove(&id);
	}

	/// Advances every server's clock by `elapsed` and fully drains the
	/// resulting message traffic before returning.
	pub fn tick_all(&mut self, elapsed: Duration) {
		let ids: Vec<ServerId> = self.servers.keys().cloned().collect();
		for id in ids {
			if !self.isolated.contains(&id) {
				self.servers.get_mut(&id).unwrap().tick(elapsed).unwrap();
			}
		}
		self.drain();
	}

	pub fn tick_one(&mut self, id: ServerId, elapsed: Duration) {
		self.servers.get_mut(&id).unwrap().tick(elapsed).unwrap();
		self.drain();
	}

	/// Proposes an entry on `leader_id` and drains traffic until it
	/// settles.
	pub fn propose(
		&mut self,
		leader_id: ServerId,
		entry_id: EntryId,
		data: LogEntryData,
	) -> raft::errors::Result<EntryResponse> {
		let resp = self.servers.get_mut(&leader_id).unwrap().recv_entry(entry_id, data)?;
		self.drain();
		Ok(resp)
	}

	pub fn leaders(&self) -> Vec<ServerId> {
		self.servers
			.values()
			.filter(|s| s.is_leader())
			.map(|s| s.id())
			.collect()
	}

	pub fn commit_status(&self, id: ServerId, resp: EntryResponse) -> CommitStatus {
		self.servers.get(&id).unwrap().msg_entry_response_committed(resp)
	}

	fn drain(&mut self) {
		loop {
			let next = self.outbox.borrow_mut().pop_front();
			let msg = match next {
				Some(m) => m,
				None => break,
			};

			match msg {
				Outbound::RequestVote { from, to, msg } => {
					if self.isolated.contains(&from) || self.isolated.contains(&to) {
						continue;
					}
					let response = match self.servers.get_mut(&to) {
						Some(s) => s.recv_requestvote(from, msg).unwrap(),
						None => continue,
					};
					if let Some(origin) = self.servers.get_mut(&from) {
						origin.recv_requestvote_response(to, response).unwrap();
					}
				}
				Outbound::AppendEntries { from, to, msg } => {
					if self.isolated.contains(&from) || self.isolated.contains(&to) {
						continue;
					}
					let response = match self.servers.get_mut(&to) {
						Some(s) => s.recv_appendentries(from, msg).unwrap(),
						None => continue,
					};
					if let Some(origin) = self.servers.get_mut(&from) {
						origin.recv_appendentries_response(to, response).unwrap();
					}
				}
			}
		}
	}
}
