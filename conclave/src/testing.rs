//! Scripted test doubles for driving an [`Election`] without a cluster.
//!
//! All fixtures are single-threaded and share state through cheap clone
//! handles, so a test can keep a handle on what it moved into the election.

use std::cell::Cell;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Arc;

use anyerror::AnyError;

use crate::Election;
use crate::agent::ConsensusAgent;
use crate::agent::Role;
use crate::catchup::LogSubscription;
use crate::config::Config;
use crate::config::FileSyncLevel;
use crate::counter::AtomicCounter;
use crate::counter::COMMIT_POSITION_TYPE_ID;
use crate::counter::ELECTION_STATE_TYPE_ID;
use crate::error::ElectionError;
use crate::mark_file::ClusterMarkFile;
use crate::member::MemberId;
use crate::member::MemberTable;
use crate::message::ElectionMessage;
use crate::network::ConsensusAdapter;
use crate::network::ConsensusPublisher;
use crate::recording_log::RecordingLog;
use crate::recording_log::TermEntry;
use crate::replay::LogReplay;
use crate::replay::ReplaySource;
use crate::type_config::ElectionTypeConfig;

/// Milliseconds to nanoseconds, for readable test clocks.
pub fn ms(millis: u64) -> u64 {
    millis * 1_000_000
}

/// An adapter fed by the test.
#[derive(Debug, Clone, Default)]
pub struct ScriptedAdapter {
    queue: Rc<RefCell<VecDeque<ElectionMessage>>>,
}

impl ScriptedAdapter {
    pub fn enqueue(&self, msg: ElectionMessage) {
        self.queue.borrow_mut().push_back(msg);
    }
}

impl ConsensusAdapter for ScriptedAdapter {
    fn poll_next(&mut self) -> Option<ElectionMessage> {
        self.queue.borrow_mut().pop_front()
    }
}

/// A publisher that records every send and can be told to reject them.
#[derive(Debug, Clone, Default)]
pub struct RecordingPublisher {
    sent: Rc<RefCell<Vec<(MemberId, ElectionMessage)>>>,
    reject: Rc<Cell<bool>>,
}

impl RecordingPublisher {
    /// Make subsequent sends fail until switched back.
    pub fn reject_sends(&self, reject: bool) {
        self.reject.set(reject);
    }

    pub fn sent(&self) -> Vec<(MemberId, ElectionMessage)> {
        self.sent.borrow().clone()
    }

    pub fn take_sent(&self) -> Vec<(MemberId, ElectionMessage)> {
        self.sent.borrow_mut().drain(..).collect()
    }
}

impl ConsensusPublisher for RecordingPublisher {
    fn try_send(&mut self, to: MemberId, msg: ElectionMessage) -> bool {
        if self.reject.get() {
            return false;
        }

        self.sent.borrow_mut().push((to, msg));
        true
    }
}

/// A subscription that records destination changes.
#[derive(Debug, Clone, Default)]
pub struct TestSubscription {
    added: Rc<RefCell<Vec<String>>>,
    removed: Rc<RefCell<Vec<String>>>,
}

impl TestSubscription {
    pub fn added(&self) -> Vec<String> {
        self.added.borrow().clone()
    }

    pub fn removed(&self) -> Vec<String> {
        self.removed.borrow().clone()
    }
}

impl LogSubscription for TestSubscription {
    fn add_destination(&mut self, channel: &str) {
        self.added.borrow_mut().push(channel.to_string());
    }

    fn remove_destination(&mut self, channel: &str) {
        self.removed.borrow_mut().push(channel.to_string());
    }
}

/// A replay source that advances a fixed amount per poll.
#[derive(Debug)]
pub struct ScriptedReplaySource {
    step: u64,
    position: u64,
    stop_position: u64,
}

impl ScriptedReplaySource {
    pub fn new(step: u64) -> Self {
        Self {
            step,
            position: 0,
            stop_position: 0,
        }
    }
}

impl ReplaySource for ScriptedReplaySource {
    fn start(&mut self, start_position: u64, stop_position: u64) -> Result<(), ElectionError> {
        self.position = start_position;
        self.stop_position = stop_position;
        Ok(())
    }

    fn poll(&mut self, _limit: usize) -> Result<usize, ElectionError> {
        if self.position >= self.stop_position {
            return Ok(0);
        }

        self.position = self.stop_position.min(self.position.saturating_add(self.step));
        Ok(1)
    }

    fn position(&self) -> u64 {
        self.position
    }
}

/// An in-memory recording log.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecordingLog {
    entries: Rc<RefCell<Vec<TermEntry>>>,
    force_count: Rc<Cell<usize>>,
}

impl MemoryRecordingLog {
    pub fn entries(&self) -> Vec<TermEntry> {
        self.entries.borrow().clone()
    }

    pub fn force_count(&self) -> usize {
        self.force_count.get()
    }

    /// Seed an already committed term, as recovery would have left it.
    pub fn seed_term(&self, recording_id: u64, term_id: u64, term_base_log_position: u64, timestamp: u64) {
        self.entries.borrow_mut().push(TermEntry {
            recording_id,
            term_id,
            term_base_log_position,
            log_position: None,
            timestamp,
        });
    }
}

impl RecordingLog for MemoryRecordingLog {
    fn find_term_entry(&self, term_id: u64) -> Option<TermEntry> {
        self.entries.borrow().iter().find(|e| e.term_id == term_id).copied()
    }

    fn append_term(
        &mut self,
        recording_id: u64,
        term_id: u64,
        term_base_log_position: u64,
        timestamp: u64,
    ) -> Result<(), ElectionError> {
        if !self.is_unknown(term_id) {
            return Err(ElectionError::RecordingLog(AnyError::error(format!(
                "term already known: {}",
                term_id
            ))));
        }

        self.entries.borrow_mut().push(TermEntry {
            recording_id,
            term_id,
            term_base_log_position,
            log_position: None,
            timestamp,
        });
        Ok(())
    }

    fn commit_log_position(&mut self, term_id: u64, log_position: u64) -> Result<(), ElectionError> {
        let mut entries = self.entries.borrow_mut();
        let entry = entries.iter_mut().find(|e| e.term_id == term_id).ok_or_else(|| {
            ElectionError::RecordingLog(AnyError::error(format!("unknown term: {}", term_id)))
        })?;

        entry.log_position = Some(log_position);
        Ok(())
    }

    fn force(&mut self, _level: FileSyncLevel) -> Result<(), ElectionError> {
        self.force_count.set(self.force_count.get() + 1);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MarkFileInner {
    candidate_term_id: Option<u64>,
    updates: Vec<u64>,
    force_count: usize,
    fail_next_force: bool,
}

/// An in-memory mark file with a fault seam between write and force.
#[derive(Debug, Clone, Default)]
pub struct TestMarkFile {
    inner: Rc<RefCell<MarkFileInner>>,
}

impl TestMarkFile {
    pub fn with_candidate_term_id(candidate_term_id: u64) -> Self {
        let mark = Self::default();
        mark.inner.borrow_mut().candidate_term_id = Some(candidate_term_id);
        mark
    }

    /// Inject a crash between the candidate term write and its force.
    pub fn fail_next_force(&self) {
        self.inner.borrow_mut().fail_next_force = true;
    }

    pub fn updates(&self) -> Vec<u64> {
        self.inner.borrow().updates.clone()
    }

    pub fn force_count(&self) -> usize {
        self.inner.borrow().force_count
    }
}

impl ClusterMarkFile for TestMarkFile {
    fn candidate_term_id(&self) -> Option<u64> {
        self.inner.borrow().candidate_term_id
    }

    fn update_candidate_term_id(&mut self, candidate_term_id: u64) -> Result<(), ElectionError> {
        let mut inner = self.inner.borrow_mut();
        inner.candidate_term_id = Some(candidate_term_id);
        inner.updates.push(candidate_term_id);
        Ok(())
    }

    fn force(&mut self, _level: FileSyncLevel) -> Result<(), ElectionError> {
        let mut inner = self.inner.borrow_mut();
        if inner.fail_next_force {
            inner.fail_next_force = false;
            return Err(ElectionError::MarkFile(AnyError::error("injected force fault")));
        }

        inner.force_count += 1;
        Ok(())
    }
}

/// A scripted consensus agent recording every callback.
#[derive(Debug)]
pub struct TestAgent {
    pub roles: Vec<Role>,
    pub errors: Vec<ElectionError>,

    /// Value returned from `prepare_for_new_leadership`; `None` echoes the
    /// requested position back, which suits most scripts.
    pub prepare_append_position: Option<u64>,
    pub prepared_positions: Vec<u64>,

    pub log_session_id: i32,
    pub recording_id: u64,

    /// Positions replayed per poll by replays this agent hands out.
    pub replay_step: u64,

    pub become_leader_calls: Vec<(u64, u64, i32, bool)>,
    pub truncate_calls: Vec<(u64, u64)>,

    pub election_complete: bool,
    pub fail_election_complete: bool,
    pub terminate_on_election_complete: bool,
    pub election_complete_calls: usize,
    pub member_details: Option<(u64, MemberId)>,

    pub stop_all_catchups_calls: usize,
    pub tracked_catchups: Vec<(MemberId, u64)>,
    pub catchup_initiated_at: Option<u64>,
    pub catchup_polls: usize,
    pub near_live: bool,
    pub has_replay_destination: bool,
    pub replay_destinations: Vec<Option<String>>,
    pub live_destinations: Vec<Option<String>>,

    pub subscription: TestSubscription,
    pub created_subscriptions: Vec<String>,
    pub services_ready_calls: Vec<(String, i32, u64, bool)>,
    pub await_image_calls: usize,
    pub tags: String,
}

impl Default for TestAgent {
    fn default() -> Self {
        Self {
            roles: Vec::new(),
            errors: Vec::new(),
            prepare_append_position: None,
            prepared_positions: Vec::new(),
            log_session_id: 77,
            recording_id: 1,
            replay_step: u64::MAX,
            become_leader_calls: Vec::new(),
            truncate_calls: Vec::new(),
            election_complete: true,
            fail_election_complete: false,
            terminate_on_election_complete: false,
            election_complete_calls: 0,
            member_details: None,
            stop_all_catchups_calls: 0,
            tracked_catchups: Vec::new(),
            catchup_initiated_at: None,
            catchup_polls: 0,
            near_live: false,
            has_replay_destination: true,
            replay_destinations: Vec::new(),
            live_destinations: Vec::new(),
            subscription: TestSubscription::default(),
            created_subscriptions: Vec::new(),
            services_ready_calls: Vec::new(),
            await_image_calls: 0,
            tags: "3,4".to_string(),
        }
    }
}

impl<C> ConsensusAgent<C> for TestAgent
where C: ElectionTypeConfig<ReplaySource = ScriptedReplaySource, Subscription = TestSubscription>
{
    fn role(&mut self, role: Role) {
        self.roles.push(role);
    }

    fn prepare_for_new_leadership(&mut self, log_position: u64) -> Result<u64, ElectionError> {
        self.prepared_positions.push(log_position);
        Ok(self.prepare_append_position.unwrap_or(log_position))
    }

    fn truncate_log_entry(&mut self, log_leadership_term_id: u64, log_position: u64) -> Result<(), ElectionError> {
        self.truncate_calls.push((log_leadership_term_id, log_position));
        Ok(())
    }

    fn add_log_publication(&mut self) -> Result<i32, ElectionError> {
        Ok(self.log_session_id)
    }

    fn new_log_replay(
        &mut self,
        start_position: u64,
        stop_position: u64,
    ) -> Result<Option<LogReplay<ScriptedReplaySource>>, ElectionError> {
        if start_position == stop_position {
            return Ok(None);
        }

        let source = ScriptedReplaySource::new(self.replay_step);
        Ok(Some(LogReplay::new(source, start_position, stop_position)))
    }

    fn log_recording_id(&self) -> u64 {
        self.recording_id
    }

    fn become_leader(
        &mut self,
        leadership_term_id: u64,
        log_position: u64,
        log_session_id: i32,
        is_startup: bool,
    ) -> Result<(), ElectionError> {
        self.become_leader_calls.push((leadership_term_id, log_position, log_session_id, is_startup));
        Ok(())
    }

    fn election_complete(&mut self) -> Result<bool, ElectionError> {
        self.election_complete_calls += 1;

        if self.terminate_on_election_complete {
            return Err(ElectionError::Termination(AnyError::error("shutting down")));
        }
        if self.fail_election_complete {
            return Err(ElectionError::Agent(AnyError::error("injected agent fault")));
        }

        Ok(self.election_complete)
    }

    fn update_member_details(&mut self, leadership_term_id: u64, leader_id: MemberId) -> Result<(), ElectionError> {
        self.member_details = Some((leadership_term_id, leader_id));
        Ok(())
    }

    fn stop_all_catchups(&mut self) {
        self.stop_all_catchups_calls += 1;
    }

    fn track_catchup_completion(&mut self, follower_id: MemberId, leadership_term_id: u64) {
        self.tracked_catchups.push((follower_id, leadership_term_id));
    }

    fn catchup_initiated(&mut self, now_ns: u64) {
        self.catchup_initiated_at = Some(now_ns);
    }

    fn catchup_poll(
        &mut self,
        _subscription: &mut TestSubscription,
        _log_session_id: i32,
        _catchup_position: u64,
        _now_ns: u64,
    ) -> Result<usize, ElectionError> {
        self.catchup_polls += 1;
        Ok(1)
    }

    fn is_catchup_near_live_position(&self, _catchup_position: u64) -> bool {
        self.near_live
    }

    fn has_replay_destination(&self) -> bool {
        self.has_replay_destination
    }

    fn replay_log_destination(&mut self, destination: Option<&str>) {
        self.replay_destinations.push(destination.map(String::from));
    }

    fn live_log_destination(&mut self, destination: Option<&str>) {
        self.live_destinations.push(destination.map(String::from));
    }

    fn create_log_subscription(&mut self, channel: &str) -> Result<TestSubscription, ElectionError> {
        self.created_subscriptions.push(channel.to_string());
        Ok(self.subscription.clone())
    }

    fn await_services_ready(
        &mut self,
        channel: &str,
        log_session_id: i32,
        log_position: u64,
        is_leader_startup: bool,
    ) -> Result<(), ElectionError> {
        self.services_ready_calls.push((channel.to_string(), log_session_id, log_position, is_leader_startup));
        Ok(())
    }

    fn await_follower_log_image(
        &mut self,
        _subscription: &mut TestSubscription,
        _log_session_id: i32,
    ) -> Result<(), ElectionError> {
        self.await_image_calls += 1;
        Ok(())
    }

    fn log_subscription_tags(&self) -> String {
        self.tags.clone()
    }

    fn on_error(&mut self, error: &ElectionError) {
        self.errors.push(error.clone());
    }
}

/// An in-memory control stream connecting several elections.
#[derive(Debug, Clone, Default)]
pub struct MessageBus {
    queues: Rc<RefCell<BTreeMap<MemberId, VecDeque<ElectionMessage>>>>,
}

impl MessageBus {
    pub fn publisher(&self) -> BusPublisher {
        BusPublisher { bus: self.clone() }
    }

    pub fn adapter(&self, member_id: MemberId) -> BusAdapter {
        BusAdapter {
            member_id,
            bus: self.clone(),
        }
    }

    pub fn enqueue(&self, to: MemberId, msg: ElectionMessage) {
        self.queues.borrow_mut().entry(to).or_default().push_back(msg);
    }

    fn dequeue(&self, member_id: MemberId) -> Option<ElectionMessage> {
        self.queues.borrow_mut().get_mut(&member_id)?.pop_front()
    }
}

#[derive(Debug, Clone)]
pub struct BusPublisher {
    bus: MessageBus,
}

impl ConsensusPublisher for BusPublisher {
    fn try_send(&mut self, to: MemberId, msg: ElectionMessage) -> bool {
        self.bus.enqueue(to, msg);
        true
    }
}

#[derive(Debug, Clone)]
pub struct BusAdapter {
    member_id: MemberId,
    bus: MessageBus,
}

impl ConsensusAdapter for BusAdapter {
    fn poll_next(&mut self) -> Option<ElectionMessage> {
        self.bus.dequeue(self.member_id)
    }
}

/// Type bundle for scripted single-election tests.
pub struct TestTypes {}

impl ElectionTypeConfig for TestTypes {
    type Agent = TestAgent;
    type Publisher = RecordingPublisher;
    type Adapter = ScriptedAdapter;
    type MarkFile = TestMarkFile;
    type RecordingLog = MemoryRecordingLog;
    type Subscription = TestSubscription;
    type ReplaySource = ScriptedReplaySource;
}

/// Type bundle for multi-election tests wired over a [`MessageBus`].
pub struct BusTypes {}

impl ElectionTypeConfig for BusTypes {
    type Agent = TestAgent;
    type Publisher = BusPublisher;
    type Adapter = BusAdapter;
    type MarkFile = TestMarkFile;
    type RecordingLog = MemoryRecordingLog;
    type Subscription = TestSubscription;
    type ReplaySource = ScriptedReplaySource;
}

/// Three voting members on ids 0, 1 and 2.
pub fn three_member_config(self_id: MemberId) -> Config {
    Config {
        cluster_members: "0,e0:9000,e0:9001,e0:9002,e0:9003,e0:8010\
                          |1,e1:9000,e1:9001,e1:9002,e1:9003,e1:8010\
                          |2,e2:9000,e2:9001,e2:9002,e2:9003,e2:8010"
            .to_string(),
        cluster_member_id: self_id,
        log_channel: "aeron:udp?term-length=64k|control=l:40000".to_string(),
        random_seed: Some(17 + self_id as u64),
        ..Default::default()
    }
}

pub fn single_member_config() -> Config {
    Config {
        cluster_members: "0,e0:9000,e0:9001,e0:9002,e0:9003,e0:8010".to_string(),
        cluster_member_id: 0,
        random_seed: Some(17),
        ..Default::default()
    }
}

/// One election with scripted collaborators and handles on all of them.
pub struct ElectionFixture {
    pub config: Arc<Config>,
    pub publisher: RecordingPublisher,
    pub adapter: ScriptedAdapter,
    pub recording_log: MemoryRecordingLog,
    pub mark_file: TestMarkFile,
    pub state_counter: AtomicCounter,
    pub commit_position: AtomicCounter,
    pub agent: TestAgent,
    pub election: Election<TestTypes>,
}

impl ElectionFixture {
    pub fn new(config: Config, is_node_startup: bool, leadership_term_id: u64, log_position: u64, append_position: u64) -> Self {
        Self::with_mark_file(
            config,
            is_node_startup,
            leadership_term_id,
            log_position,
            append_position,
            TestMarkFile::default(),
        )
    }

    pub fn with_mark_file(
        config: Config,
        is_node_startup: bool,
        leadership_term_id: u64,
        log_position: u64,
        append_position: u64,
        mark_file: TestMarkFile,
    ) -> Self {
        let config = Arc::new(config.validate().expect("valid test config"));
        let members = MemberTable::from_config(&config).expect("valid test members");

        let publisher = RecordingPublisher::default();
        let adapter = ScriptedAdapter::default();
        let recording_log = MemoryRecordingLog::default();
        let state_counter = AtomicCounter::new(ELECTION_STATE_TYPE_ID);
        let commit_position = AtomicCounter::new(COMMIT_POSITION_TYPE_ID);

        let election = Election::new(
            config.clone(),
            is_node_startup,
            leadership_term_id,
            log_position,
            append_position,
            members,
            publisher.clone(),
            adapter.clone(),
            recording_log.clone(),
            mark_file.clone(),
            state_counter.clone(),
            commit_position.clone(),
        );

        Self {
            config,
            publisher,
            adapter,
            recording_log,
            mark_file,
            state_counter,
            commit_position,
            agent: TestAgent::default(),
            election,
        }
    }

    pub fn tick(&mut self, now_ns: u64) -> Result<usize, ElectionError> {
        self.election.do_work(now_ns, &mut self.agent)
    }
}
