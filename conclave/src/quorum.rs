//! Quorum predicates over the member table.
//!
//! A quorum is a majority of the fixed voting set: `⌊N/2⌋ + 1`. All
//! predicates are pure reads; this member's own entry takes part through the
//! table like any peer's, seeded when canvass begins.

use crate::log_id::LogId;
use crate::member::ClusterMember;
use crate::member::MemberTable;

pub(crate) fn quorum_threshold(members: usize) -> usize {
    members / 2 + 1
}

fn canvassed_log_id(member: &ClusterMember) -> Option<LogId> {
    match (member.leadership_term_id, member.log_position) {
        (Some(term_id), Some(position)) => Some(LogId::new(term_id, position)),
        _ => None,
    }
}

impl MemberTable {
    /// Every other member has responded to canvass with a term no newer and a
    /// position no further than this member's.
    pub fn is_unanimous_candidate(&self) -> bool {
        let this = self.this_member();
        let (Some(self_term), Some(self_position)) = (this.leadership_term_id, this.log_position) else {
            return false;
        };

        self.others().all(|m| {
            m.leadership_term_id.is_some_and(|t| t <= self_term)
                && m.log_position.is_some_and(|p| p <= self_position)
        })
    }

    /// A majority of the voting set, this member included, has responded to
    /// canvass with a log no more up-to-date than this member's.
    pub fn is_quorum_candidate(&self) -> bool {
        let this = self.this_member();
        let Some(candidate) = canvassed_log_id(this) else {
            return false;
        };

        let responded = self
            .iter()
            .filter(|m| canvassed_log_id(m).is_some_and(|log_id| log_id <= candidate))
            .count();

        responded >= quorum_threshold(self.len())
    }

    /// A majority has granted a ballot in `candidate_term_id`. The candidate
    /// counts through its own table entry, which votes for itself.
    pub fn has_majority_vote(&self, candidate_term_id: u64) -> bool {
        let votes = self
            .iter()
            .filter(|m| m.candidate_term_id == Some(candidate_term_id) && m.vote.is_granted())
            .count();

        votes >= quorum_threshold(self.len())
    }

    /// Every member has answered the ballot in `candidate_term_id` and a
    /// majority granted it.
    pub fn has_won_vote_on_full_count(&self, candidate_term_id: u64) -> bool {
        let mut votes = 0;
        for m in self.iter() {
            if m.candidate_term_id != Some(candidate_term_id) || !m.vote.is_decided() {
                return false;
            }
            if m.vote.is_granted() {
                votes += 1;
            }
        }

        votes >= quorum_threshold(self.len())
    }

    /// A majority among the members that responded to canvass has granted a
    /// ballot in `candidate_term_id`.
    pub fn has_majority_vote_with_canvass_members(&self, candidate_term_id: u64) -> bool {
        let mut canvass_members = 0;
        let mut votes = 0;

        for m in self.iter() {
            if m.leadership_term_id.is_some() {
                canvass_members += 1;
                if m.candidate_term_id == Some(candidate_term_id) && m.vote.is_granted() {
                    votes += 1;
                }
            }
        }

        canvass_members > 0 && votes >= quorum_threshold(canvass_members)
    }

    /// Every voting member has confirmed `leadership_term_id` and reached
    /// `position`, so the leader can conclude the election.
    pub fn have_voters_reached_position(&self, position: u64, leadership_term_id: u64) -> bool {
        self.iter().all(|m| {
            m.leadership_term_id.is_some_and(|t| t >= leadership_term_id)
                && m.log_position.is_some_and(|p| p >= position)
        })
    }
}
