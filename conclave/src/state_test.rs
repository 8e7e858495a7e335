use pretty_assertions::assert_eq;

use crate::state::ElectionState;

#[test]
fn test_codes_round_trip() -> anyhow::Result<()> {
    for code in 0..=13u64 {
        let state = ElectionState::try_from(code)?;
        assert_eq!(code, state.code());
    }

    assert_eq!(0, ElectionState::Init.code());
    assert_eq!(7, ElectionState::LeaderReady.code());
    assert_eq!(13, ElectionState::Closed.code());
    assert!(ElectionState::try_from(14).is_err());
    Ok(())
}

#[test]
fn test_role_groups() {
    assert!(ElectionState::LeaderReplay.is_leader());
    assert!(!ElectionState::LeaderReplay.is_follower());
    assert!(ElectionState::FollowerCatchup.is_follower());
    assert!(!ElectionState::Canvass.is_leader());
    assert!(ElectionState::Closed.is_closed());
}

#[test]
fn test_transition_graph() {
    use ElectionState::*;

    // The happy paths.
    for pair in [
        (Init, Canvass),
        (Canvass, Nominate),
        (Nominate, CandidateBallot),
        (CandidateBallot, LeaderReplay),
        (LeaderReplay, LeaderTransition),
        (LeaderTransition, LeaderReady),
        (LeaderReady, Closed),
        (FollowerBallot, FollowerReplay),
        (FollowerReplay, FollowerCatchupTransition),
        (FollowerCatchupTransition, FollowerCatchup),
        (FollowerCatchup, FollowerTransition),
        (FollowerReplay, FollowerTransition),
        (FollowerTransition, FollowerReady),
        (FollowerReady, Closed),
    ] {
        assert!(pair.0.can_transition_to(pair.1), "{} -> {}", pair.0, pair.1);
    }

    // Message-driven reverts from live states.
    assert!(LeaderReady.can_transition_to(Canvass));
    assert!(FollowerCatchup.can_transition_to(Init));
    assert!(Canvass.can_transition_to(FollowerBallot));
    assert!(CandidateBallot.can_transition_to(FollowerReplay));

    // Illegal moves.
    assert!(!Closed.can_transition_to(Init));
    assert!(!Canvass.can_transition_to(Canvass));
    assert!(!Canvass.can_transition_to(LeaderReady));
    assert!(!Nominate.can_transition_to(LeaderReplay));
    assert!(!FollowerTransition.can_transition_to(Closed));
}
