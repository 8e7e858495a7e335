//! Typed messages exchanged over the cluster control stream during an
//! election.
//!
//! Encoding and transport are out of scope: the host decodes its wire format
//! into [`ElectionMessage`] values and feeds them through a
//! [`ConsensusAdapter`](crate::network::ConsensusAdapter), and encodes
//! outbound values handed to a
//! [`ConsensusPublisher`](crate::network::ConsensusPublisher).

use std::fmt;

use crate::member::MemberId;

/// Session id carried on the wire while no log session is established.
pub const NULL_SESSION_ID: i32 = -1;

/// A member's canvass response: the term and append position of its log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct CanvassPosition {
    pub leadership_term_id: u64,
    pub log_position: u64,
    pub follower_id: MemberId,
}

/// A candidate's request for a ballot in `candidate_term_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct RequestVote {
    pub log_leadership_term_id: u64,
    pub log_position: u64,
    pub candidate_term_id: u64,
    pub candidate_id: MemberId,
}

/// A follower's response to a [`RequestVote`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Vote {
    pub candidate_term_id: u64,
    pub log_leadership_term_id: u64,
    pub log_position: u64,
    pub candidate_id: MemberId,
    pub follower_id: MemberId,
    pub granted: bool,
}

/// A leader's announcement of its leadership term, also used as the leader
/// heartbeat while the election completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct NewLeadershipTerm {
    pub log_leadership_term_id: u64,
    pub log_truncate_position: u64,
    pub leadership_term_id: u64,
    pub log_position: u64,
    pub timestamp: u64,
    pub leader_id: MemberId,
    pub log_session_id: i32,
    pub is_startup: bool,
}

/// A follower's report of the end of its local log to the leader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct AppendPosition {
    pub leadership_term_id: u64,
    pub log_position: u64,
    pub follower_id: MemberId,
}

/// A follower's request to be caught up from `log_position`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct CatchupPosition {
    pub leadership_term_id: u64,
    pub log_position: u64,
    pub follower_id: MemberId,
}

/// The leader's committed position, observed by followers catching up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct CommitPosition {
    pub leadership_term_id: u64,
    pub log_position: u64,
    pub leader_id: MemberId,
}

/// The closed set of election messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum ElectionMessage {
    CanvassPosition(CanvassPosition),
    RequestVote(RequestVote),
    Vote(Vote),
    NewLeadershipTerm(NewLeadershipTerm),
    AppendPosition(AppendPosition),
    CatchupPosition(CatchupPosition),
    CommitPosition(CommitPosition),
}

impl fmt::Display for ElectionMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CanvassPosition(m) => {
                write!(f, "CanvassPosition({}-{} from {})", m.leadership_term_id, m.log_position, m.follower_id)
            }
            Self::RequestVote(m) => {
                write!(
                    f,
                    "RequestVote(term {} by {}, log {}-{})",
                    m.candidate_term_id, m.candidate_id, m.log_leadership_term_id, m.log_position
                )
            }
            Self::Vote(m) => {
                write!(
                    f,
                    "Vote(term {}, {} -> {}, granted={})",
                    m.candidate_term_id, m.follower_id, m.candidate_id, m.granted
                )
            }
            Self::NewLeadershipTerm(m) => {
                write!(
                    f,
                    "NewLeadershipTerm(term {} by {}, log {}-{}, truncate {})",
                    m.leadership_term_id, m.leader_id, m.log_leadership_term_id, m.log_position, m.log_truncate_position
                )
            }
            Self::AppendPosition(m) => {
                write!(f, "AppendPosition({}-{} from {})", m.leadership_term_id, m.log_position, m.follower_id)
            }
            Self::CatchupPosition(m) => {
                write!(f, "CatchupPosition({}-{} from {})", m.leadership_term_id, m.log_position, m.follower_id)
            }
            Self::CommitPosition(m) => {
                write!(f, "CommitPosition({}-{} from {})", m.leadership_term_id, m.log_position, m.leader_id)
            }
        }
    }
}
