use maplit::btreeset;
use pretty_assertions::assert_eq;

use crate::error::ElectionError;
use crate::member::Ballot;
use crate::message::AppendPosition;
use crate::message::CanvassPosition;
use crate::message::CommitPosition;
use crate::message::ElectionMessage;
use crate::message::NewLeadershipTerm;
use crate::message::RequestVote;
use crate::message::Vote;
use crate::state::ElectionState;
use crate::testing::ElectionFixture;
use crate::testing::TestMarkFile;
use crate::testing::ms;
use crate::testing::single_member_config;
use crate::testing::three_member_config;

/// Test clock: monotonic time does not start at zero.
fn t(millis: u64) -> u64 {
    ms(1_000 + millis)
}

/// `RUST_LOG=conclave=debug` surfaces the election trace of a failing test.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn canvass_msg(leadership_term_id: u64, log_position: u64, follower_id: u32) -> ElectionMessage {
    ElectionMessage::CanvassPosition(CanvassPosition {
        leadership_term_id,
        log_position,
        follower_id,
    })
}

fn request_vote_msg(
    log_leadership_term_id: u64,
    log_position: u64,
    candidate_term_id: u64,
    candidate_id: u32,
) -> ElectionMessage {
    ElectionMessage::RequestVote(RequestVote {
        log_leadership_term_id,
        log_position,
        candidate_term_id,
        candidate_id,
    })
}

fn vote_msg(candidate_term_id: u64, candidate_id: u32, follower_id: u32, granted: bool) -> ElectionMessage {
    ElectionMessage::Vote(Vote {
        candidate_term_id,
        log_leadership_term_id: 0,
        log_position: 0,
        candidate_id,
        follower_id,
        granted,
    })
}

fn new_leadership_term_msg(
    log_leadership_term_id: u64,
    log_truncate_position: u64,
    leadership_term_id: u64,
    log_position: u64,
    leader_id: u32,
    log_session_id: i32,
) -> ElectionMessage {
    ElectionMessage::NewLeadershipTerm(NewLeadershipTerm {
        log_leadership_term_id,
        log_truncate_position,
        leadership_term_id,
        log_position,
        timestamp: 1,
        leader_id,
        log_session_id,
        is_startup: false,
    })
}

fn append_position_msg(leadership_term_id: u64, log_position: u64, follower_id: u32) -> ElectionMessage {
    ElectionMessage::AppendPosition(AppendPosition {
        leadership_term_id,
        log_position,
        follower_id,
    })
}

fn assert_valid_transitions(fixture: &ElectionFixture) {
    for (from, to) in &fixture.election.state_changes {
        assert!(from.can_transition_to(*to), "illegal transition {} -> {}", from, to);
    }
}

fn sent_votes(fixture: &ElectionFixture) -> Vec<(u32, Vote)> {
    fixture
        .publisher
        .sent()
        .into_iter()
        .filter_map(|(to, msg)| match msg {
            ElectionMessage::Vote(v) => Some((to, v)),
            _ => None,
        })
        .collect()
}

/// Walk a three-member election from startup to `LeaderReady`, returning the
/// time reached.
fn drive_to_leader_ready(fixture: &mut ElectionFixture) -> u64 {
    fixture.tick(t(1)).unwrap();
    assert_eq!(ElectionState::Canvass, fixture.election.state());

    fixture.adapter.enqueue(canvass_msg(0, 0, 1));
    fixture.adapter.enqueue(canvass_msg(0, 0, 2));
    fixture.tick(t(2)).unwrap();
    assert_eq!(ElectionState::Nominate, fixture.election.state());

    // The nomination jitter is below half an election timeout.
    fixture.tick(t(503)).unwrap();
    assert_eq!(ElectionState::CandidateBallot, fixture.election.state());

    fixture.adapter.enqueue(vote_msg(1, 0, 1, true));
    fixture.adapter.enqueue(vote_msg(1, 0, 2, true));
    fixture.tick(t(504)).unwrap();
    assert_eq!(ElectionState::LeaderReplay, fixture.election.state());

    fixture.tick(t(505)).unwrap();
    assert_eq!(ElectionState::LeaderTransition, fixture.election.state());

    fixture.tick(t(506)).unwrap();
    assert_eq!(ElectionState::LeaderReady, fixture.election.state());

    t(506)
}

#[test]
fn test_singleton_cluster_bootstrap() -> anyhow::Result<()> {
    init_tracing();
    let mut fixture = ElectionFixture::new(single_member_config(), true, 0, 0, 0);

    fixture.tick(t(1))?;
    fixture.tick(t(2))?;
    fixture.tick(t(3))?;

    assert_eq!(ElectionState::Closed, fixture.election.state());
    assert_eq!(1, fixture.election.leadership_term_id());
    assert_eq!(Some(0), fixture.election.leader_id());
    assert!(fixture.election.is_leader_startup());

    assert_eq!(
        vec![
            (ElectionState::Init, ElectionState::LeaderReplay),
            (ElectionState::LeaderReplay, ElectionState::LeaderTransition),
            (ElectionState::LeaderTransition, ElectionState::LeaderReady),
            (ElectionState::LeaderReady, ElectionState::Closed),
        ],
        fixture.election.state_changes
    );

    assert_eq!(vec![(1, 0, 77, true)], fixture.agent.become_leader_calls);
    assert_eq!(Some((1, 0)), fixture.agent.member_details);

    let entries = fixture.recording_log.entries();
    assert_eq!(1, entries.len());
    assert_eq!(1, entries[0].term_id);
    assert_eq!(0, entries[0].term_base_log_position);

    assert_eq!(ElectionState::Closed.code(), fixture.state_counter.get());
    assert_valid_transitions(&fixture);
    Ok(())
}

#[test]
fn test_canvass_broadcasts_on_the_status_interval() -> anyhow::Result<()> {
    let mut fixture = ElectionFixture::new(three_member_config(0), true, 0, 0, 0);

    fixture.tick(t(1))?;
    let recipients: std::collections::BTreeSet<u32> = fixture
        .publisher
        .take_sent()
        .into_iter()
        .map(|(to, _)| to)
        .collect();
    assert_eq!(btreeset! {1, 2}, recipients);

    // Within the status interval nothing is resent.
    fixture.tick(t(10))?;
    assert_eq!(0, fixture.publisher.take_sent().len());

    fixture.tick(t(22))?;
    assert_eq!(2, fixture.publisher.take_sent().len());
    Ok(())
}

#[test]
fn test_candidate_loses_ballot_on_log_staleness() -> anyhow::Result<()> {
    // The candidate holds (term 4, position 100).
    let mut fixture = ElectionFixture::new(three_member_config(0), true, 4, 100, 100);

    fixture.tick(t(1))?;
    fixture.adapter.enqueue(canvass_msg(4, 100, 1));
    fixture.adapter.enqueue(canvass_msg(4, 100, 2));
    fixture.tick(t(2))?;
    assert_eq!(ElectionState::Nominate, fixture.election.state());

    fixture.tick(t(503))?;
    assert_eq!(ElectionState::CandidateBallot, fixture.election.state());
    assert_eq!(5, fixture.election.candidate_term_id());
    assert_eq!(vec![5], fixture.mark_file.updates());

    // Ballots go out on the next tick.
    fixture.publisher.take_sent();
    fixture.tick(t(504))?;
    let requests: Vec<(u32, RequestVote)> = fixture
        .publisher
        .take_sent()
        .into_iter()
        .filter_map(|(to, msg)| match msg {
            ElectionMessage::RequestVote(r) => Some((to, r)),
            _ => None,
        })
        .collect();
    assert_eq!(2, requests.len());
    assert_eq!(
        RequestVote {
            log_leadership_term_id: 4,
            log_position: 100,
            candidate_term_id: 5,
            candidate_id: 0,
        },
        requests[0].1
    );

    // Both voters hold more log and deny.
    fixture.adapter.enqueue(vote_msg(5, 0, 1, false));
    fixture.adapter.enqueue(vote_msg(5, 0, 2, false));
    fixture.tick(t(505))?;
    assert_eq!(ElectionState::CandidateBallot, fixture.election.state());
    assert_eq!(Ballot::Denied, fixture.election.member(1).unwrap().vote);

    // The ballot expires and the candidate returns to canvass.
    fixture.tick(t(1_504))?;
    assert_eq!(ElectionState::Canvass, fixture.election.state());
    assert_eq!(5, fixture.election.candidate_term_id());
    assert_valid_transitions(&fixture);
    Ok(())
}

#[test]
fn test_vote_denied_when_local_log_is_ahead() -> anyhow::Result<()> {
    // The voter holds (term 4, position 200); a candidate at position 100
    // requests a vote for term 5.
    let mut fixture = ElectionFixture::new(three_member_config(1), true, 4, 200, 200);

    fixture.tick(t(1))?;
    fixture.adapter.enqueue(request_vote_msg(4, 100, 5, 0));
    fixture.tick(t(2))?;

    // The newer candidate term is adopted and persisted, but the vote is
    // denied and the voter re-canvasses.
    assert_eq!(ElectionState::Canvass, fixture.election.state());
    assert_eq!(5, fixture.election.candidate_term_id());
    assert_eq!(vec![5], fixture.mark_file.updates());

    let votes = sent_votes(&fixture);
    assert_eq!(1, votes.len());
    assert_eq!(0, votes[0].0);
    assert!(!votes[0].1.granted);
    assert_eq!(4, votes[0].1.log_leadership_term_id);
    assert_eq!(200, votes[0].1.log_position);
    Ok(())
}

#[test]
fn test_stale_candidate_terms_are_denied_without_state_change() -> anyhow::Result<()> {
    let mut fixture = ElectionFixture::new(three_member_config(1), true, 4, 200, 200);

    fixture.tick(t(1))?;
    fixture.adapter.enqueue(request_vote_msg(4, 200, 4, 0));
    fixture.tick(t(2))?;

    assert_eq!(ElectionState::Canvass, fixture.election.state());
    assert_eq!(4, fixture.election.candidate_term_id());
    assert_eq!(0, fixture.mark_file.updates().len());

    let votes = sent_votes(&fixture);
    assert_eq!(1, votes.len());
    assert!(!votes[0].1.granted);
    Ok(())
}

#[test]
fn test_at_most_one_vote_per_candidate_term() -> anyhow::Result<()> {
    let mut fixture = ElectionFixture::new(three_member_config(2), true, 0, 0, 0);

    fixture.tick(t(1))?;
    fixture.adapter.enqueue(request_vote_msg(0, 0, 1, 0));
    fixture.adapter.enqueue(request_vote_msg(0, 0, 1, 1));
    fixture.tick(t(2))?;

    let votes = sent_votes(&fixture);
    assert_eq!(2, votes.len());
    assert!(votes[0].1.granted);
    assert_eq!(0, votes[0].0);
    assert!(!votes[1].1.granted);
    assert_eq!(1, votes[1].0);

    assert_eq!(ElectionState::FollowerBallot, fixture.election.state());
    assert_eq!(vec![1], fixture.mark_file.updates());
    Ok(())
}

#[test]
fn test_granted_vote_then_follow_announced_leader() -> anyhow::Result<()> {
    let mut fixture = ElectionFixture::new(three_member_config(1), true, 0, 0, 0);

    fixture.tick(t(1))?;
    fixture.adapter.enqueue(request_vote_msg(0, 0, 1, 0));
    fixture.tick(t(2))?;
    assert_eq!(ElectionState::FollowerBallot, fixture.election.state());

    let votes = sent_votes(&fixture);
    assert_eq!(1, votes.len());
    assert!(votes[0].1.granted);

    fixture.adapter.enqueue(new_leadership_term_msg(0, 0, 1, 0, 0, 99));
    fixture.tick(t(3))?;
    // No catch-up needed: straight through replay to transition.
    assert_eq!(ElectionState::FollowerTransition, fixture.election.state());
    assert_eq!(Some(99), fixture.election.log_session_id());
    assert_eq!(None, fixture.election.catchup_position());

    fixture.tick(t(4))?;
    assert_eq!(ElectionState::FollowerReady, fixture.election.state());

    assert_eq!(1, fixture.agent.created_subscriptions.len());
    assert_eq!(
        "aeron:udp?term-length=64k|control-mode=manual|group=true|session-id=99|tags=3,4|alias=log",
        fixture.agent.created_subscriptions[0]
    );
    assert_eq!(
        vec![Some("aeron:udp?term-length=64k|endpoint=e1:9002".to_string())],
        fixture.agent.live_destinations
    );
    assert_eq!(1, fixture.agent.await_image_calls);

    fixture.tick(t(5))?;
    assert_eq!(ElectionState::Closed, fixture.election.state());
    assert_eq!(Some((1, 0)), fixture.agent.member_details);

    let appends: Vec<(u32, AppendPosition)> = fixture
        .publisher
        .sent()
        .into_iter()
        .filter_map(|(to, msg)| match msg {
            ElectionMessage::AppendPosition(a) => Some((to, a)),
            _ => None,
        })
        .collect();
    assert_eq!(vec![(0, AppendPosition { leadership_term_id: 1, log_position: 0, follower_id: 1 })], appends);

    // The recording log learned the new term.
    let entries = fixture.recording_log.entries();
    assert_eq!(1, entries.len());
    assert_eq!(1, entries[0].term_id);
    assert_valid_transitions(&fixture);
    Ok(())
}

#[test]
fn test_divergent_follower_truncates_and_catches_up() -> anyhow::Result<()> {
    init_tracing();

    // The follower has appended to 200 in term 2, committed to 100. The new
    // leader announces term 3 with a truncate position of 150 and a log at
    // 300.
    let mut fixture = ElectionFixture::new(three_member_config(1), true, 2, 100, 200);

    fixture.tick(t(1))?;
    fixture.adapter.enqueue(new_leadership_term_msg(2, 150, 3, 300, 0, 99));
    fixture.tick(t(2))?;

    assert_eq!(ElectionState::FollowerReplay, fixture.election.state());
    assert_eq!(vec![(2, 150)], fixture.agent.truncate_calls);
    assert_eq!(vec![150], fixture.agent.prepared_positions);
    assert_eq!(150, fixture.election.append_position());
    assert_eq!(Some(300), fixture.election.catchup_position());
    assert_eq!(3, fixture.election.leadership_term_id());
    assert_eq!(3, fixture.election.candidate_term_id());

    // Replay of the local log from 100 to 150: start, then one poll.
    fixture.tick(t(3))?;
    assert_eq!(ElectionState::FollowerReplay, fixture.election.state());
    fixture.tick(t(4))?;
    assert_eq!(ElectionState::FollowerCatchupTransition, fixture.election.state());
    assert_eq!(150, fixture.election.log_position());

    fixture.tick(t(5))?;
    assert_eq!(ElectionState::FollowerCatchup, fixture.election.state());
    assert_eq!(Some(t(5)), fixture.agent.catchup_initiated_at);
    assert_eq!(
        vec![Some("aeron:udp?endpoint=e1:9003".to_string())],
        fixture.agent.replay_destinations
    );
    assert_eq!(vec!["aeron:udp?endpoint=e1:9003".to_string()], fixture.agent.subscription.added());

    // Catch-up polls run while the commit position lags.
    fixture.tick(t(6))?;
    assert_eq!(ElectionState::FollowerCatchup, fixture.election.state());
    assert!(fixture.agent.catchup_polls > 0);

    // A replayed term boundary fills the recording log.
    fixture.election.on_replay_new_leadership_term(1, 3, 300, 9, 150)?;
    let entries = fixture.recording_log.entries();
    assert_eq!(vec![2, 3], entries.iter().map(|e| e.term_id).collect::<Vec<_>>());
    assert_eq!(Some(150), entries[0].log_position);
    assert_eq!(150, entries[1].term_base_log_position);

    // The live stream comes near and the commit position reaches the target.
    fixture.agent.near_live = true;
    fixture.commit_position.set_ordered(300);
    fixture.tick(t(7))?;
    assert_eq!(ElectionState::FollowerTransition, fixture.election.state());
    assert_eq!(300, fixture.election.log_position());
    assert_eq!(300, fixture.election.append_position());
    assert_eq!(
        vec![Some("aeron:udp?term-length=64k|endpoint=e1:9002".to_string())],
        fixture.agent.live_destinations
    );

    fixture.tick(t(8))?;
    assert_eq!(ElectionState::FollowerReady, fixture.election.state());

    fixture.tick(t(9))?;
    assert_eq!(ElectionState::Closed, fixture.election.state());
    assert_eq!(300, fixture.election.log_position());
    assert_eq!(300, fixture.election.append_position());
    assert_valid_transitions(&fixture);
    Ok(())
}

#[test]
fn test_leader_completes_once_voters_reach_position() -> anyhow::Result<()> {
    let mut fixture = ElectionFixture::new(three_member_config(0), true, 0, 0, 0);
    let now = drive_to_leader_ready(&mut fixture);

    // Still waiting on followers: heartbeats go out instead.
    fixture.publisher.take_sent();
    fixture.tick(now + ms(1))?;
    assert_eq!(ElectionState::LeaderReady, fixture.election.state());
    let heartbeats = fixture
        .publisher
        .take_sent()
        .into_iter()
        .filter(|(_, msg)| matches!(msg, ElectionMessage::NewLeadershipTerm(_)))
        .count();
    assert_eq!(2, heartbeats);

    fixture.adapter.enqueue(append_position_msg(1, 0, 1));
    fixture.adapter.enqueue(append_position_msg(1, 0, 2));
    fixture.tick(now + ms(2))?;

    assert_eq!(ElectionState::Closed, fixture.election.state());
    assert_eq!(Some((1, 0)), fixture.agent.member_details);
    assert_eq!(vec![(1, 1), (2, 1)], fixture.agent.tracked_catchups);
    assert_valid_transitions(&fixture);
    Ok(())
}

#[test]
fn test_leader_reverts_to_canvass_on_newer_term() -> anyhow::Result<()> {
    let mut fixture = ElectionFixture::new(three_member_config(0), true, 0, 0, 0);
    let now = drive_to_leader_ready(&mut fixture);

    fixture.publisher.take_sent();
    fixture.adapter.enqueue(canvass_msg(5, 0, 1));
    fixture.tick(now + ms(1))?;

    assert_eq!(ElectionState::Canvass, fixture.election.state());
    let sent = fixture.publisher.take_sent();
    assert!(
        sent.iter().all(|(_, msg)| !matches!(msg, ElectionMessage::NewLeadershipTerm(_))),
        "no further heartbeats after stepping down: {:?}",
        sent
    );
    assert_valid_transitions(&fixture);
    Ok(())
}

#[test]
fn test_leader_ready_answers_lagging_canvass() -> anyhow::Result<()> {
    let mut fixture = ElectionFixture::new(three_member_config(0), true, 0, 0, 0);
    let now = drive_to_leader_ready(&mut fixture);

    fixture.publisher.take_sent();
    fixture.adapter.enqueue(canvass_msg(0, 0, 2));
    fixture.tick(now + ms(1))?;

    let replies: Vec<(u32, NewLeadershipTerm)> = fixture
        .publisher
        .sent()
        .into_iter()
        .filter_map(|(to, msg)| match msg {
            ElectionMessage::NewLeadershipTerm(m) => Some((to, m)),
            _ => None,
        })
        .collect();

    // The directed reply carries term 1 from the recording log entry at base
    // position 0.
    assert!(!replies.is_empty());
    let directed = replies.iter().find(|(to, _)| *to == 2).expect("a reply to member 2");
    assert_eq!(0, directed.1.log_leadership_term_id);
    assert_eq!(0, directed.1.log_truncate_position);
    assert_eq!(1, directed.1.leadership_term_id);
    Ok(())
}

#[test]
fn test_follower_ready_falls_back_to_canvass_on_heartbeat_loss() -> anyhow::Result<()> {
    let mut fixture = ElectionFixture::new(three_member_config(1), true, 0, 0, 0);
    fixture.agent.election_complete = false;

    fixture.tick(t(1))?;
    fixture.adapter.enqueue(request_vote_msg(0, 0, 1, 0));
    fixture.tick(t(2))?;
    fixture.adapter.enqueue(new_leadership_term_msg(0, 0, 1, 0, 0, 99));
    fixture.tick(t(3))?;
    fixture.tick(t(4))?;
    assert_eq!(ElectionState::FollowerReady, fixture.election.state());

    // While sends succeed the follower stays put.
    fixture.tick(t(5))?;
    assert_eq!(ElectionState::FollowerReady, fixture.election.state());

    // The leader becomes unreachable for a heartbeat timeout.
    fixture.publisher.reject_sends(true);
    fixture.tick(t(6))?;
    assert_eq!(ElectionState::FollowerReady, fixture.election.state());

    fixture.tick(t(10_004))?;
    assert_eq!(ElectionState::Canvass, fixture.election.state());

    // The live destination was detached on the way out.
    assert_eq!(
        vec!["aeron:udp?term-length=64k|endpoint=e1:9002".to_string()],
        fixture.agent.subscription.removed()
    );
    assert_eq!(Some(&None), fixture.agent.live_destinations.last());
    assert_valid_transitions(&fixture);
    Ok(())
}

#[test]
fn test_commit_position_with_newer_term_restarts_election() -> anyhow::Result<()> {
    let mut fixture = ElectionFixture::new(three_member_config(1), true, 0, 0, 0);

    fixture.tick(t(1))?;
    assert_eq!(ElectionState::Canvass, fixture.election.state());

    fixture.adapter.enqueue(ElectionMessage::CommitPosition(CommitPosition {
        leadership_term_id: 7,
        log_position: 0,
        leader_id: 0,
    }));
    fixture.tick(t(2))?;
    assert_eq!(ElectionState::Init, fixture.election.state());

    fixture.tick(t(3))?;
    assert_eq!(ElectionState::Canvass, fixture.election.state());
    assert_valid_transitions(&fixture);
    Ok(())
}

#[test]
fn test_divergent_announcement_is_surfaced_not_dropped() -> anyhow::Result<()> {
    // This follower's log is ahead of the announced leader's and its ballot
    // term is newer than the announcement: no case applies.
    let mut fixture = ElectionFixture::new(three_member_config(1), true, 4, 300, 300);

    fixture.tick(t(1))?;
    fixture.adapter.enqueue(new_leadership_term_msg(2, 100, 3, 100, 0, 99));
    fixture.tick(t(2))?;

    assert_eq!(ElectionState::Canvass, fixture.election.state());
    assert_eq!(1, fixture.agent.errors.len());
    assert!(matches!(fixture.agent.errors[0], ElectionError::DivergentLog { leader_id: 0, .. }));
    Ok(())
}

#[test]
fn test_mark_file_fault_between_write_and_force_leaks_no_vote() -> anyhow::Result<()> {
    let mark_file = TestMarkFile::default();
    let mut fixture =
        ElectionFixture::with_mark_file(three_member_config(1), true, 0, 0, 0, mark_file.clone());

    fixture.tick(t(1))?;

    mark_file.fail_next_force();
    fixture.adapter.enqueue(request_vote_msg(0, 0, 1, 0));
    let res = fixture.tick(t(2));

    assert!(matches!(res, Err(ElectionError::MarkFile(_))));

    // The term was written but never forced, and no ballot was answered.
    assert_eq!(vec![1], mark_file.updates());
    assert_eq!(0, mark_file.force_count());
    assert_eq!(0, sent_votes(&fixture).len());
    assert_eq!(ElectionState::Canvass, fixture.election.state());
    Ok(())
}

#[test]
fn test_recovered_candidate_term_is_loaded_from_mark_file() -> anyhow::Result<()> {
    let mark_file = TestMarkFile::with_candidate_term_id(9);
    let mut fixture = ElectionFixture::with_mark_file(three_member_config(1), true, 4, 0, 0, mark_file);

    fixture.tick(t(1))?;

    // A vote cast in term 9 before a crash stays honored: term 9 requests
    // are denied.
    assert_eq!(9, fixture.election.candidate_term_id());
    fixture.adapter.enqueue(request_vote_msg(4, 0, 9, 0));
    fixture.tick(t(2))?;

    let votes = sent_votes(&fixture);
    assert_eq!(1, votes.len());
    assert!(!votes[0].1.granted);
    Ok(())
}

#[test]
fn test_agent_failure_restarts_from_init_and_is_counted() -> anyhow::Result<()> {
    let mut fixture = ElectionFixture::new(three_member_config(0), true, 0, 0, 0);
    fixture.agent.fail_election_complete = true;

    let now = drive_to_leader_ready(&mut fixture);
    fixture.adapter.enqueue(append_position_msg(1, 0, 1));
    fixture.adapter.enqueue(append_position_msg(1, 0, 2));

    let res = fixture.tick(now + ms(1));

    assert!(res.is_ok());
    assert_eq!(1, fixture.agent.errors.len());
    assert!(matches!(fixture.agent.errors[0], ElectionError::Agent(_)));
    assert_eq!(ElectionState::Init, fixture.election.state());
    assert!(fixture
        .election
        .state_changes
        .contains(&(ElectionState::LeaderReady, ElectionState::Init)));
    assert_valid_transitions(&fixture);
    Ok(())
}

#[test]
fn test_termination_propagates_unchanged() -> anyhow::Result<()> {
    let mut fixture = ElectionFixture::new(three_member_config(0), true, 0, 0, 0);
    fixture.agent.terminate_on_election_complete = true;

    let now = drive_to_leader_ready(&mut fixture);
    fixture.adapter.enqueue(append_position_msg(1, 0, 1));
    fixture.adapter.enqueue(append_position_msg(1, 0, 2));

    let res = fixture.tick(now + ms(1));

    assert!(matches!(res, Err(ElectionError::Termination(_))));
    assert_eq!(0, fixture.agent.errors.len());
    assert_eq!(ElectionState::LeaderReady, fixture.election.state());
    Ok(())
}

#[test]
fn test_appointed_leader_elsewhere_holds_canvass() -> anyhow::Result<()> {
    let mut config = three_member_config(0);
    config.appointed_leader_id = Some(2);
    let mut fixture = ElectionFixture::new(config, true, 0, 0, 0);

    fixture.tick(t(1))?;
    fixture.adapter.enqueue(canvass_msg(0, 0, 1));
    fixture.adapter.enqueue(canvass_msg(0, 0, 2));

    // Unanimous support, yet no nomination while another member is
    // appointed.
    fixture.tick(t(2))?;
    fixture.tick(t(70_000))?;
    assert_eq!(ElectionState::Canvass, fixture.election.state());
    Ok(())
}

#[test]
fn test_passive_member_neither_nominates_nor_votes() -> anyhow::Result<()> {
    let mut config = three_member_config(9);
    config.member_endpoints = "p:9000,p:9001,p:9002,p:9003,p:8010".to_string();
    let mut fixture = ElectionFixture::new(config, true, 0, 0, 0);

    fixture.tick(t(1))?;
    fixture.adapter.enqueue(canvass_msg(0, 0, 1));
    fixture.adapter.enqueue(canvass_msg(0, 0, 2));
    fixture.tick(t(70_000))?;
    assert_eq!(ElectionState::Canvass, fixture.election.state());

    fixture.adapter.enqueue(request_vote_msg(0, 0, 1, 0));
    fixture.tick(t(70_001))?;
    assert_eq!(0, sent_votes(&fixture).len());
    assert_eq!(ElectionState::Canvass, fixture.election.state());
    Ok(())
}

#[test]
fn test_state_counter_tracks_every_phase() -> anyhow::Result<()> {
    let mut fixture = ElectionFixture::new(three_member_config(0), true, 0, 0, 0);

    assert_eq!(ElectionState::Init.code(), fixture.state_counter.get());

    drive_to_leader_ready(&mut fixture);
    assert_eq!(ElectionState::LeaderReady.code(), fixture.state_counter.get());
    assert_eq!(
        ElectionState::LeaderReady,
        ElectionState::try_from(fixture.state_counter.get())?
    );
    Ok(())
}
