//! A scripted cluster: one election per member, wired over an in-memory
//! control stream, driven tick by tick on a simulated clock.

#![allow(dead_code)]

use std::sync::Arc;

use conclave::AtomicCounter;
use conclave::COMMIT_POSITION_TYPE_ID;
use conclave::Config;
use conclave::ELECTION_STATE_TYPE_ID;
use conclave::Election;
use conclave::ElectionState;
use conclave::MemberId;
use conclave::MemberTable;
use conclave::testing::BusTypes;
use conclave::testing::MemoryRecordingLog;
use conclave::testing::MessageBus;
use conclave::testing::TestAgent;
use conclave::testing::TestMarkFile;
use conclave::testing::ms;

/// `RUST_LOG=conclave=debug` surfaces the election traces of a failing
/// scenario.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn members_string(members: u32) -> String {
    (0..members)
        .map(|id| format!("{0},n{0}:9000,n{0}:9001,n{0}:9002,n{0}:9003,n{0}:8010", id))
        .collect::<Vec<_>>()
        .join("|")
}

pub fn cluster_config(members: u32, self_id: MemberId) -> Config {
    Config {
        cluster_members: members_string(members),
        cluster_member_id: self_id,
        log_channel: "aeron:udp?term-length=64k|control=l:40000".to_string(),
        election_timeout: 5_000,
        leader_heartbeat_interval: 5,
        random_seed: Some(1_000 + self_id as u64),
        ..Default::default()
    }
}

pub struct Node {
    pub id: MemberId,
    pub election: Election<BusTypes>,
    pub agent: TestAgent,
    pub state_counter: AtomicCounter,
    pub commit_position: AtomicCounter,
    pub recording_log: MemoryRecordingLog,
    pub mark_file: TestMarkFile,

    /// Distinct counter codes observed after each tick.
    pub observed_states: Vec<ElectionState>,
}

impl Node {
    fn new(id: MemberId, members: u32, bus: &MessageBus) -> anyhow::Result<Self> {
        let config = Arc::new(cluster_config(members, id).validate()?);
        let table = MemberTable::from_config(&config)?;

        let state_counter = AtomicCounter::new(ELECTION_STATE_TYPE_ID);
        let commit_position = AtomicCounter::new(COMMIT_POSITION_TYPE_ID);
        let recording_log = MemoryRecordingLog::default();
        let mark_file = TestMarkFile::default();

        let election = Election::new(
            config,
            true,
            0,
            0,
            0,
            table,
            bus.publisher(),
            bus.adapter(id),
            recording_log.clone(),
            mark_file.clone(),
            state_counter.clone(),
            commit_position.clone(),
        );

        Ok(Self {
            id,
            election,
            agent: TestAgent::default(),
            state_counter,
            commit_position,
            recording_log,
            mark_file,
            observed_states: vec![ElectionState::Init],
        })
    }

    fn observe(&mut self) -> anyhow::Result<()> {
        let state = ElectionState::try_from(self.state_counter.get())?;
        if self.observed_states.last() != Some(&state) {
            self.observed_states.push(state);
        }
        Ok(())
    }
}

pub struct Cluster {
    pub bus: MessageBus,
    pub nodes: Vec<Node>,
    pub now_ns: u64,
}

impl Cluster {
    pub fn new(members: u32) -> anyhow::Result<Self> {
        let bus = MessageBus::default();
        let nodes = (0..members).map(|id| Node::new(id, members, &bus)).collect::<anyhow::Result<_>>()?;

        Ok(Self {
            bus,
            nodes,
            // Monotonic time does not start at zero.
            now_ns: ms(1_000),
        })
    }

    pub fn node(&self, id: MemberId) -> &Node {
        self.nodes.iter().find(|n| n.id == id).expect("known node")
    }

    /// Advance the simulated clock one millisecond and run every election.
    pub fn tick(&mut self) -> anyhow::Result<()> {
        self.now_ns += ms(1);
        for node in &mut self.nodes {
            node.election.do_work(self.now_ns, &mut node.agent)?;
            node.observe()?;
        }

        Ok(())
    }

    /// Tick until `done` holds, up to `max_ticks` milliseconds of simulated
    /// time.
    pub fn run_until(&mut self, max_ticks: usize, done: impl Fn(&Cluster) -> bool) -> anyhow::Result<bool> {
        for _ in 0..max_ticks {
            if done(self) {
                return Ok(true);
            }
            self.tick()?;
        }

        Ok(done(self))
    }

    pub fn all_closed(&self) -> bool {
        self.nodes.iter().all(|n| n.election.state() == ElectionState::Closed)
    }

    pub fn elected_leaders(&self) -> Vec<MemberId> {
        self.nodes
            .iter()
            .filter(|n| !n.agent.become_leader_calls.is_empty())
            .map(|n| n.id)
            .collect()
    }
}
