//! The election protocol states.
//!
//! [`ElectionState`] is the flat, code-numbered view published through the
//! election state counter. [`Phase`] is the internal tagged variant the state
//! machine dispatches on, carrying state-specific deadlines so that handler
//! dispatch is exhaustive by construction.

use std::fmt;

use crate::error::ElectionError;

/// The observable phase of an election, published as counter codes `0..=13`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum ElectionState {
    Init,
    Canvass,
    Nominate,
    CandidateBallot,
    FollowerBallot,
    LeaderReplay,
    LeaderTransition,
    LeaderReady,
    FollowerReplay,
    FollowerCatchupTransition,
    FollowerCatchup,
    FollowerTransition,
    FollowerReady,
    Closed,
}

impl ElectionState {
    /// The counter code of this state.
    pub const fn code(&self) -> u64 {
        match self {
            Self::Init => 0,
            Self::Canvass => 1,
            Self::Nominate => 2,
            Self::CandidateBallot => 3,
            Self::FollowerBallot => 4,
            Self::LeaderReplay => 5,
            Self::LeaderTransition => 6,
            Self::LeaderReady => 7,
            Self::FollowerReplay => 8,
            Self::FollowerCatchupTransition => 9,
            Self::FollowerCatchup => 10,
            Self::FollowerTransition => 11,
            Self::FollowerReady => 12,
            Self::Closed => 13,
        }
    }

    pub fn is_leader(&self) -> bool {
        matches!(self, Self::LeaderReplay | Self::LeaderTransition | Self::LeaderReady)
    }

    pub fn is_follower(&self) -> bool {
        matches!(
            self,
            Self::FollowerReplay
                | Self::FollowerCatchupTransition
                | Self::FollowerCatchup
                | Self::FollowerTransition
                | Self::FollowerReady
        )
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Whether `next` is a legal successor of this state.
    ///
    /// The edges cover both the per-state tick handlers and the
    /// message-driven reverts: any live state can fall back to `Canvass` or
    /// to `FollowerBallot` on a vote request, re-enter `Init` on an error or
    /// a newer committed term, and adopt a leader into `FollowerReplay`.
    /// An observer of the state counter can check a sampled transition with
    /// this predicate.
    pub fn can_transition_to(&self, next: ElectionState) -> bool {
        use ElectionState::*;

        if *self == next {
            return false;
        }

        // Message-driven edges shared by every live state: error or newer
        // committed term back to Init, canvass revert, a granted vote, or
        // adopting an announced leader.
        if matches!(next, Init | Canvass | FollowerBallot | FollowerReplay) {
            return !matches!(self, Closed);
        }

        match (self, next) {
            (Init, LeaderReplay) => true,
            (Canvass, Nominate) => true,
            (Nominate, CandidateBallot) => true,
            (CandidateBallot, LeaderReplay) => true,
            (LeaderReplay, LeaderTransition) => true,
            (LeaderTransition, LeaderReady) => true,
            (LeaderReady, Closed) => true,
            (FollowerReplay, FollowerCatchupTransition) => true,
            (FollowerReplay, FollowerTransition) => true,
            (FollowerCatchupTransition, FollowerCatchup) => true,
            (FollowerCatchup, FollowerTransition) => true,
            (FollowerTransition, FollowerReady) => true,
            (FollowerReady, Closed) => true,
            _ => false,
        }
    }
}

impl TryFrom<u64> for ElectionState {
    type Error = ElectionError;

    fn try_from(code: u64) -> Result<Self, Self::Error> {
        let state = match code {
            0 => Self::Init,
            1 => Self::Canvass,
            2 => Self::Nominate,
            3 => Self::CandidateBallot,
            4 => Self::FollowerBallot,
            5 => Self::LeaderReplay,
            6 => Self::LeaderTransition,
            7 => Self::LeaderReady,
            8 => Self::FollowerReplay,
            9 => Self::FollowerCatchupTransition,
            10 => Self::FollowerCatchup,
            11 => Self::FollowerTransition,
            12 => Self::FollowerReady,
            13 => Self::Closed,
            _ => return Err(ElectionError::InvalidStateCode { code }),
        };
        Ok(state)
    }
}

impl fmt::Display for ElectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// The internal driving phase: [`ElectionState`] plus state-specific data.
///
/// Deadlines are fixed when the phase is entered; shared resources that span
/// several phases (the replay task, the follower log subscription) live on
/// the election itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Init,
    Canvass { deadline_ns: u64 },
    Nominate { deadline_ns: u64 },
    CandidateBallot { deadline_ns: u64 },
    FollowerBallot { deadline_ns: u64 },
    LeaderReplay,
    LeaderTransition,
    LeaderReady,
    FollowerReplay,
    FollowerCatchupTransition,
    FollowerCatchup,
    FollowerTransition,
    FollowerReady { deadline_ns: u64 },
    Closed,
}

impl Phase {
    pub(crate) fn state(&self) -> ElectionState {
        match self {
            Phase::Init => ElectionState::Init,
            Phase::Canvass { .. } => ElectionState::Canvass,
            Phase::Nominate { .. } => ElectionState::Nominate,
            Phase::CandidateBallot { .. } => ElectionState::CandidateBallot,
            Phase::FollowerBallot { .. } => ElectionState::FollowerBallot,
            Phase::LeaderReplay => ElectionState::LeaderReplay,
            Phase::LeaderTransition => ElectionState::LeaderTransition,
            Phase::LeaderReady => ElectionState::LeaderReady,
            Phase::FollowerReplay => ElectionState::FollowerReplay,
            Phase::FollowerCatchupTransition => ElectionState::FollowerCatchupTransition,
            Phase::FollowerCatchup => ElectionState::FollowerCatchup,
            Phase::FollowerTransition => ElectionState::FollowerTransition,
            Phase::FollowerReady { .. } => ElectionState::FollowerReady,
            Phase::Closed => ElectionState::Closed,
        }
    }
}
