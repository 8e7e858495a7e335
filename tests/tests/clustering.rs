//! Three members start up together and converge on a single leader.

mod fixtures;

use std::collections::BTreeSet;

use conclave::ElectionState;
use fixtures::Cluster;
use maplit::btreeset;
use pretty_assertions::assert_eq;

#[test]
fn test_three_node_clean_startup() -> anyhow::Result<()> {
    fixtures::init_tracing();
    let mut cluster = Cluster::new(3)?;

    let done = cluster.run_until(60_000, Cluster::all_closed)?;
    assert!(done, "cluster did not converge on a leader");

    // Exactly one member took leadership, in the first term.
    let leaders = cluster.elected_leaders();
    assert_eq!(1, leaders.len());
    let leader_id = leaders[0];

    for node in &cluster.nodes {
        assert_eq!(ElectionState::Closed, node.election.state());
        assert_eq!(1, node.election.leadership_term_id());
        assert_eq!(Some(leader_id), node.election.leader_id());
        assert_eq!(Some((1, leader_id)), node.agent.member_details);

        // Everyone joined the leader's log session.
        assert_eq!(Some(77), node.election.log_session_id());

        // Every term entry agrees across the cluster.
        let entries = node.recording_log.entries();
        assert_eq!(1, entries.len());
        assert_eq!(1, entries[0].term_id);
        assert_eq!(0, entries[0].term_base_log_position);
    }

    // The leader walked the leader path, the others the follower path.
    let leader = cluster.node(leader_id);
    assert!(leader.observed_states.contains(&ElectionState::LeaderReady));

    let follower_ids: BTreeSet<u32> = cluster
        .nodes
        .iter()
        .map(|n| n.id)
        .filter(|id| *id != leader_id)
        .collect();
    assert_eq!(2, follower_ids.len());
    assert_eq!(btreeset! {0, 1, 2}, {
        let mut all = follower_ids.clone();
        all.insert(leader_id);
        all
    });

    for id in follower_ids {
        let follower = cluster.node(id);
        assert!(follower.observed_states.contains(&ElectionState::FollowerReady));
        assert!(!follower.observed_states.contains(&ElectionState::LeaderReady));

        // No catch-up was needed from identical logs.
        assert!(!follower.observed_states.contains(&ElectionState::FollowerCatchup));
    }

    Ok(())
}
