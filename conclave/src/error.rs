//! Error types exposed by this crate.

use anyerror::AnyError;

use crate::config::ConfigError;
use crate::member::MemberId;
use crate::state::ElectionState;

/// Errors raised while running an election.
///
/// A [`Termination`](ElectionError::Termination) propagates out of
/// [`do_work`](crate::Election::do_work) unchanged and tears the node down.
/// Every other variant is recoverable: `do_work` reports it to the agent's
/// error handler and restarts the election from `Init`.
#[derive(Debug, Clone, thiserror::Error)]
#[derive(PartialEq, Eq)]
pub enum ElectionError {
    /// The host requested tear-down of the cluster node.
    #[error("agent termination: {0}")]
    Termination(AnyError),

    /// A consensus agent callback failed.
    #[error("agent: {0}")]
    Agent(AnyError),

    /// A protocol invariant did not hold.
    #[error("cluster: {0}")]
    Cluster(AnyError),

    /// The mark file could not be written or forced.
    #[error("mark file: {0}")]
    MarkFile(AnyError),

    /// The recording log rejected an operation, e.g. a term entry was missing.
    #[error("recording log: {0}")]
    RecordingLog(AnyError),

    /// A state counter held a code outside the protocol range.
    #[error("invalid election state counter code: {code}")]
    InvalidStateCode { code: u64 },

    /// A channel URI could not be parsed.
    #[error("invalid channel uri {uri:?}: {reason}")]
    InvalidChannelUri { uri: String, reason: String },

    /// A state that requires a leader was reached without one.
    #[error("no leader member in state {state}")]
    NoLeader { state: ElectionState },

    /// A new-leadership-term announcement could not be followed because the
    /// local log diverges from the leader's and no catch-up applies.
    #[error(
        "cannot follow leader {leader_id} in term {leadership_term_id}: \
         local log (term {log_leadership_term_id}, position {append_position}) diverges"
    )]
    DivergentLog {
        leader_id: MemberId,
        leadership_term_id: u64,
        log_leadership_term_id: u64,
        append_position: u64,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ElectionError {
    /// `true` for the fatal signal that must propagate to the host loop.
    pub fn is_termination(&self) -> bool {
        matches!(self, ElectionError::Termination(_))
    }
}
