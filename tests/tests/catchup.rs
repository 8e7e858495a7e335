//! A follower with a divergent log truncates, replays, and catches up to
//! the leader's position before joining the live log.

use conclave::ElectionMessage;
use conclave::ElectionState;
use conclave::NewLeadershipTerm;
use conclave::testing::ElectionFixture;
use conclave::testing::ms;
use conclave::testing::three_member_config;
use pretty_assertions::assert_eq;

fn t(millis: u64) -> u64 {
    ms(1_000 + millis)
}

#[test]
fn test_divergent_follower_truncation_end_to_end() -> anyhow::Result<()> {
    // Member 1 appended to 200 in term 2 but only 100 is committed; the new
    // term 3 leader truncates it to 150 and brings it to 300.
    let mut fixture = ElectionFixture::new(three_member_config(1), true, 2, 100, 200);

    fixture.tick(t(1))?;
    assert_eq!(ElectionState::Canvass, fixture.election.state());

    fixture.adapter.enqueue(ElectionMessage::NewLeadershipTerm(NewLeadershipTerm {
        log_leadership_term_id: 2,
        log_truncate_position: 150,
        leadership_term_id: 3,
        log_position: 300,
        timestamp: 42,
        leader_id: 0,
        log_session_id: 5,
        is_startup: false,
    }));
    fixture.tick(t(2))?;

    assert_eq!(ElectionState::FollowerReplay, fixture.election.state());
    assert_eq!(vec![(2, 150)], fixture.agent.truncate_calls);
    assert_eq!(150, fixture.election.append_position());
    assert_eq!(Some(300), fixture.election.catchup_position());

    // Replay the surviving local log, then attach to the leader's archive.
    let mut now = t(2);
    for _ in 0..10 {
        if fixture.election.state() != ElectionState::FollowerReplay {
            break;
        }
        now += ms(1);
        fixture.tick(now)?;
    }
    assert_eq!(ElectionState::FollowerCatchupTransition, fixture.election.state());

    now += ms(1);
    fixture.tick(now)?;
    assert_eq!(ElectionState::FollowerCatchup, fixture.election.state());
    assert_eq!(
        vec![Some("aeron:udp?endpoint=e1:9003".to_string())],
        fixture.agent.replay_destinations
    );

    // The replayed stream crosses the term boundary and then the commit
    // position reaches the catch-up target.
    fixture.election.on_replay_new_leadership_term(1, 3, 300, 42, 150)?;
    fixture.agent.near_live = true;
    fixture.commit_position.set_ordered(300);

    now += ms(1);
    fixture.tick(now)?;
    assert_eq!(ElectionState::FollowerTransition, fixture.election.state());

    now += ms(1);
    fixture.tick(now)?;
    assert_eq!(ElectionState::FollowerReady, fixture.election.state());

    now += ms(1);
    fixture.tick(now)?;
    assert_eq!(ElectionState::Closed, fixture.election.state());

    assert_eq!(300, fixture.election.log_position());
    assert_eq!(300, fixture.election.append_position());
    assert_eq!(3, fixture.election.leadership_term_id());
    assert_eq!(Some((3, 0)), fixture.agent.member_details);

    // The recording log covers terms 2 and 3 with term 2 committed at the
    // truncate position.
    let entries = fixture.recording_log.entries();
    assert_eq!(vec![2, 3], entries.iter().map(|e| e.term_id).collect::<Vec<_>>());
    assert_eq!(Some(150), entries[0].log_position);
    Ok(())
}
