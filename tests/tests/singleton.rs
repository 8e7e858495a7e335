//! A single-member cluster bootstraps itself as leader without ballots.

mod fixtures;

use conclave::ElectionState;
use fixtures::Cluster;
use pretty_assertions::assert_eq;

#[test]
fn test_singleton_cluster_bootstrap() -> anyhow::Result<()> {
    fixtures::init_tracing();
    let mut cluster = Cluster::new(1)?;

    let done = cluster.run_until(10, Cluster::all_closed)?;
    assert!(done, "singleton election did not close");

    let node = cluster.node(0);
    assert_eq!(1, node.election.leadership_term_id());
    assert_eq!(Some(0), node.election.leader_id());
    assert_eq!(0, node.election.log_position());
    assert_eq!(vec![0], cluster.elected_leaders());

    // The counter walked the leader path.
    assert_eq!(ElectionState::Closed.code(), node.state_counter.get());
    assert!(node.observed_states.contains(&ElectionState::LeaderTransition));
    assert!(!node.observed_states.contains(&ElectionState::FollowerReady));

    // One term entry at the base of the log.
    let entries = node.recording_log.entries();
    assert_eq!(1, entries.len());
    assert_eq!(1, entries[0].term_id);
    assert_eq!(0, entries[0].term_base_log_position);
    Ok(())
}
