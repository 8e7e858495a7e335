use std::error::Error;

use validit::Validate;
use validit::less_equal;

use crate::member::MemberId;
use crate::state::ElectionState;
use crate::state::Phase;

/// The scalar state of one election, validated on access.
///
/// Positions and terms are plain `u64`; absences (`catchup_position`,
/// `log_session_id`, `leader_id`) are options rather than sentinels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElectionContext {
    pub(crate) member_id: MemberId,
    pub(crate) phase: Phase,

    /// The term this node currently believes is active.
    pub(crate) leadership_term_id: u64,

    /// The term of the last entry in the local log.
    pub(crate) log_leadership_term_id: u64,

    /// The term this node has voted in, for itself or another.
    pub(crate) candidate_term_id: u64,

    /// Committed prefix confirmed locally.
    pub(crate) log_position: u64,

    /// End of the local log, never behind `log_position`.
    pub(crate) append_position: u64,

    /// Position to reach before becoming a steady-state follower.
    pub(crate) catchup_position: Option<u64>,

    pub(crate) leader_id: Option<MemberId>,
    pub(crate) is_node_startup: bool,
    pub(crate) is_leader_startup: bool,
    pub(crate) is_extended_canvass: bool,
    pub(crate) log_session_id: Option<i32>,

    pub(crate) time_of_last_state_change_ns: u64,
    pub(crate) time_of_last_update_ns: u64,
}

impl ElectionContext {
    pub(crate) fn new(
        member_id: MemberId,
        is_node_startup: bool,
        leadership_term_id: u64,
        log_position: u64,
        append_position: u64,
    ) -> Self {
        Self {
            member_id,
            phase: Phase::Init,
            leadership_term_id,
            log_leadership_term_id: leadership_term_id,
            candidate_term_id: leadership_term_id,
            log_position,
            append_position,
            catchup_position: None,
            leader_id: None,
            is_node_startup,
            is_leader_startup: false,
            is_extended_canvass: is_node_startup,
            log_session_id: None,
            time_of_last_state_change_ns: 0,
            time_of_last_update_ns: 0,
        }
    }

    pub fn state(&self) -> ElectionState {
        self.phase.state()
    }

    /// When the election last changed state, on the host clock.
    pub fn time_of_last_state_change_ns(&self) -> u64 {
        self.time_of_last_state_change_ns
    }

    /// Role invariants that hold between ticks: a leader leads itself in the
    /// term it was elected in, a follower never follows itself. Checked at
    /// the end of each `do_work` tick; within a tick individual field
    /// updates may be mid-flight.
    pub(crate) fn assert_role_invariants(&self) {
        let state = self.state();

        if state.is_leader() {
            debug_assert_eq!(
                Some(self.member_id),
                self.leader_id,
                "leader state {} must lead itself",
                state
            );
            debug_assert_eq!(
                self.leadership_term_id, self.candidate_term_id,
                "leader state {} runs the term it was elected in",
                state
            );
        }

        if state.is_follower() {
            if let Some(leader_id) = self.leader_id {
                debug_assert_ne!(leader_id, self.member_id, "follower state {} cannot follow itself", state);
            }
        }
    }
}

impl Validate for ElectionContext {
    fn validate(&self) -> Result<(), Box<dyn Error>> {
        less_equal!(self.log_position, self.append_position);
        less_equal!(self.leadership_term_id, self.candidate_term_id);
        Ok(())
    }
}
