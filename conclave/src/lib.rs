//! Leader election and log catch-up for replicated-log clusters.
//!
//! A node in a fixed-membership cluster runs one [`Election`] at startup or
//! after losing its leader: the members canvass each other's log positions,
//! nominate, ballot, replay their local logs, optionally catch a lagging
//! follower up from the leader's archive, and finish with a single leader
//! whose log is at least as up-to-date as any quorum.
//!
//! The election is a strictly single-threaded cooperative state machine: the
//! host agent calls [`Election::do_work`] each duty cycle with a monotonic
//! nanosecond clock, inbound control messages are drained from a
//! [`ConsensusAdapter`] at the start of every tick, and all I/O is
//! non-blocking with try-send semantics. Host capabilities are injected
//! through the [`ConsensusAgent`] trait and bundled type implementations in
//! [`ElectionTypeConfig`].
//!
//! Progress is observable through an [`AtomicCounter`] that carries the
//! current [`ElectionState`] code; excessive time in `Canvass` signals a
//! failed election, a node stuck in `FollowerCatchup` a network or replay
//! fault.

#![deny(unused_qualifications)]
#![allow(clippy::uninlined_format_args)]

mod agent;
mod catchup;
mod channel;
mod config;
mod context;
mod counter;
mod election;
mod error;
mod log_id;
mod mark_file;
mod member;
mod message;
mod network;
mod quorum;
mod recording_log;
mod replay;
mod state;
mod type_config;

pub mod testing;

#[cfg(test)] mod catchup_test;
#[cfg(test)] mod election_test;
#[cfg(test)] mod state_test;

pub use anyerror;
pub use anyerror::AnyError;

pub use crate::agent::ConsensusAgent;
pub use crate::agent::Role;
pub use crate::catchup::LogSubscription;
pub use crate::catchup::follower_subscription_channel;
pub use crate::catchup::live_destination;
pub use crate::catchup::replay_destination;
pub use crate::channel::ChannelUri;
pub use crate::config::Config;
pub use crate::config::ConfigError;
pub use crate::config::FileSyncLevel;
pub use crate::context::ElectionContext;
pub use crate::counter::AtomicCounter;
pub use crate::counter::COMMIT_POSITION_TYPE_ID;
pub use crate::counter::ELECTION_STATE_TYPE_ID;
pub use crate::election::Election;
pub use crate::error::ElectionError;
pub use crate::log_id::LogId;
pub use crate::mark_file::ClusterMarkFile;
pub use crate::mark_file::FileMarkFile;
pub use crate::member::Ballot;
pub use crate::member::ClusterMember;
pub use crate::member::MemberId;
pub use crate::member::MemberTable;
pub use crate::message::AppendPosition;
pub use crate::message::CanvassPosition;
pub use crate::message::CatchupPosition;
pub use crate::message::CommitPosition;
pub use crate::message::ElectionMessage;
pub use crate::message::NULL_SESSION_ID;
pub use crate::message::NewLeadershipTerm;
pub use crate::message::RequestVote;
pub use crate::message::Vote;
pub use crate::network::ConsensusAdapter;
pub use crate::network::ConsensusPublisher;
pub use crate::recording_log::RecordingLog;
pub use crate::recording_log::TermEntry;
pub use crate::replay::LogReplay;
pub use crate::replay::ReplaySource;
pub use crate::state::ElectionState;
pub use crate::type_config::ElectionTypeConfig;
