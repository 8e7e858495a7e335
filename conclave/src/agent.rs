//! The capability surface the election needs from its host.

use crate::error::ElectionError;
use crate::member::MemberId;
use crate::replay::LogReplay;
use crate::type_config::ElectionTypeConfig;

/// The role a member plays in the cluster, derived from the election phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Role {
    Follower,
    Candidate,
    Leader,
}

/// Callbacks into the consensus agent that owns the global run loop.
///
/// The agent drives [`Election::do_work`](crate::Election::do_work) and is
/// handed back in as a non-owning `&mut` on every call, which keeps the
/// agent/election reference cycle out of the ownership graph.
///
/// All calls are made from the single host thread and must not block; an
/// error return restarts the election from `Init` unless it is a
/// [`Termination`](ElectionError::Termination).
pub trait ConsensusAgent<C: ElectionTypeConfig> {
    /// The election phase implies a role change.
    fn role(&mut self, role: Role);

    /// Stop appending under the old leadership and settle the local log,
    /// returning the new append position.
    fn prepare_for_new_leadership(&mut self, log_position: u64) -> Result<u64, ElectionError>;

    /// Truncate the local log back to `log_position` within
    /// `log_leadership_term_id`, discarding a divergent suffix.
    fn truncate_log_entry(&mut self, log_leadership_term_id: u64, log_position: u64) -> Result<(), ElectionError>;

    /// Allocate the log publication for a new leadership term, returning its
    /// session id.
    fn add_log_publication(&mut self) -> Result<i32, ElectionError>;

    /// Create a replay of the local log over `[start_position, stop_position)`,
    /// or `None` when there is nothing to replay.
    fn new_log_replay(
        &mut self,
        start_position: u64,
        stop_position: u64,
    ) -> Result<Option<LogReplay<C::ReplaySource>>, ElectionError>;

    /// The recording that backs the current log.
    fn log_recording_id(&self) -> u64;

    fn become_leader(
        &mut self,
        leadership_term_id: u64,
        log_position: u64,
        log_session_id: i32,
        is_startup: bool,
    ) -> Result<(), ElectionError>;

    /// Whether the agent has finished its side of the election and normal
    /// replication may resume.
    fn election_complete(&mut self) -> Result<bool, ElectionError>;

    /// Publish the elected membership to the cluster services.
    fn update_member_details(&mut self, leadership_term_id: u64, leader_id: MemberId) -> Result<(), ElectionError>;

    /// Tear down any catch-up sessions left over from a previous term.
    fn stop_all_catchups(&mut self);

    /// A follower reported its append position under the current term.
    fn track_catchup_completion(&mut self, follower_id: MemberId, leadership_term_id: u64);

    fn catchup_initiated(&mut self, now_ns: u64);

    /// Pump the catch-up stream toward `catchup_position`, returning the work
    /// done.
    fn catchup_poll(
        &mut self,
        subscription: &mut C::Subscription,
        log_session_id: i32,
        catchup_position: u64,
        now_ns: u64,
    ) -> Result<usize, ElectionError>;

    /// Whether the catch-up has drawn close enough to the live stream to
    /// attach the live destination.
    fn is_catchup_near_live_position(&self, catchup_position: u64) -> bool;

    /// Whether the replay destination is still attached.
    fn has_replay_destination(&self) -> bool;

    /// The replay destination changed; `None` means detached.
    fn replay_log_destination(&mut self, destination: Option<&str>);

    /// The live log destination changed; `None` means detached.
    fn live_log_destination(&mut self, destination: Option<&str>);

    /// Create and record the follower's log subscription.
    fn create_log_subscription(&mut self, channel: &str) -> Result<C::Subscription, ElectionError>;

    /// Block-free wait hook: called until the cluster services are ready on
    /// the follower's log channel.
    fn await_services_ready(
        &mut self,
        channel: &str,
        log_session_id: i32,
        log_position: u64,
        is_leader_startup: bool,
    ) -> Result<(), ElectionError>;

    /// Called until the follower's log image is available.
    fn await_follower_log_image(
        &mut self,
        subscription: &mut C::Subscription,
        log_session_id: i32,
    ) -> Result<(), ElectionError>;

    /// Subscription tags to stamp on the follower's log channel.
    fn log_subscription_tags(&self) -> String;

    /// Count and surface a recoverable election error.
    fn on_error(&mut self, error: &ElectionError);
}
