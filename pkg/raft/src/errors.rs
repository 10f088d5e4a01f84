//! Error kinds surfaced from public `Server` operations.
//!
//! Safety-relevant rejections (stale term, log conflicts) are never folded
//! into this type: they are reported back to the sender as ordinary
//! response fields so it can self-correct. This type only covers failures
//! of the *local* operation itself.

use crate::protos::{ServerId, Term};

error_chain! {
	foreign_links {
		Io(::std::io::Error);
	}

	errors {
		/// `recv_entry` (or a membership-changing propose) was called on a
		/// server that is not currently the leader.
		NotLeader(leader_hint: Option<ServerId>) {
			description("not the current leader")
			display("not the current leader (hint: {:?})", leader_hint)
		}

		/// A voting-configuration-changing entry was proposed while a
		/// previous one is still uncommitted.
		OneVotingChangeOnly {
			description("a voting configuration change is already in flight")
		}

		/// The local server has been removed from the committed
		/// configuration and is winding down.
		Shutdown {
			description("server has been removed from the cluster and is shutting down")
		}

		/// An incoming message's term was lower than ours; the response
		/// already carries `current_term` for the sender to observe.
		StaleTerm(current_term: Term) {
			description("message term is stale")
			display("message term is stale (current term is {})", current_term)
		}

		/// A `log_offer` / `log_pop` / `persist_term` / `persist_vote` /
		/// send callback returned a failure. The operation that triggered
		/// it is incomplete; there is no transactional rollback, so the
		/// host must treat this as fatal or replay from durable state.
		CallbackFailed {
			description("a host callback reported failure")
		}

		/// Structural failure (e.g. log invariant violation detected at
		/// runtime); treated as fatal by the host.
		Corrupt(msg: String) {
			description("internal state is corrupt")
			display("internal state is corrupt: {}", msg)
		}
	}
}
