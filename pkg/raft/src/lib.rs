//! An embeddable Raft consensus core.
//!
//! This crate implements the in-memory consensus engine only: leader
//! election, log replication, commitment and stepwise membership changes.
//! It never opens a socket, never touches disk, never spawns a thread — all
//! of that is delegated to the host through [`callbacks::RaftCallbacks`].
//! The host drives the engine by calling [`consensus::Server::tick`] on a
//! periodic clock and forwarding inbound messages to the matching
//! `recv_*` method.

#[macro_use]
extern crate error_chain;
#[macro_use]
extern crate serde_derive;

pub mod errors;

pub mod callbacks;
pub mod config;
pub mod consensus;
pub mod log;
pub mod membership;
pub mod node;
pub mod protos;

pub use callbacks::RaftCallbacks;
pub use config::RaftConfig;
pub use consensus::{CommitStatus, Server};
pub use node::{Node, NodeTable};
