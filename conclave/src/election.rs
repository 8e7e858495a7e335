//! Election process to determine a new cluster leader and catch up
//! followers.

use std::cmp::max;
use std::sync::Arc;

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use validit::Valid;

use crate::agent::ConsensusAgent;
use crate::agent::Role;
use crate::catchup::FollowerLog;
use crate::catchup::LogSubscription;
use crate::catchup::follower_subscription_channel;
use crate::catchup::live_destination;
use crate::catchup::replay_destination;
use crate::config::Config;
use crate::context::ElectionContext;
use crate::counter::AtomicCounter;
use crate::error::ElectionError;
use crate::log_id::LogId;
use crate::mark_file::ClusterMarkFile;
use crate::member::Ballot;
use crate::member::ClusterMember;
use crate::member::MemberId;
use crate::member::MemberTable;
use crate::message::AppendPosition;
use crate::message::CanvassPosition;
use crate::message::CatchupPosition;
use crate::message::CommitPosition;
use crate::message::ElectionMessage;
use crate::message::NULL_SESSION_ID;
use crate::message::NewLeadershipTerm;
use crate::message::RequestVote;
use crate::message::Vote;
use crate::network::ConsensusAdapter;
use crate::network::ConsensusPublisher;
use crate::recording_log::RecordingLog;
use crate::replay::LogReplay;
use crate::state::ElectionState;
use crate::state::Phase;
use crate::type_config::ElectionTypeConfig;

/// Inbound messages drained per tick.
const POLL_LIMIT: usize = 10;

const NANOS_PER_MILLI: u64 = 1_000_000;

/// The leader-election and catch-up state machine.
///
/// One election is created by the host when leadership is lost or at
/// startup, driven by a single thread calling [`do_work`](Election::do_work)
/// until it reaches `Closed`, then discarded. Inbound control messages are
/// drained from the adapter at the start of every tick; outbound sends are
/// non-blocking and retried by the owning state handler on later ticks.
pub struct Election<C: ElectionTypeConfig> {
    config: Arc<Config>,
    ctx: Valid<ElectionContext>,
    members: MemberTable,
    publisher: C::Publisher,
    adapter: C::Adapter,
    recording_log: C::RecordingLog,
    mark_file: C::MarkFile,
    state_counter: AtomicCounter,
    commit_position: AtomicCounter,
    log_replay: Option<LogReplay<C::ReplaySource>>,
    follower_log: FollowerLog<C::Subscription>,
    rng: StdRng,

    #[cfg(test)]
    pub(crate) state_changes: Vec<(ElectionState, ElectionState)>,
}

impl<C: ElectionTypeConfig> Election<C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<Config>,
        is_node_startup: bool,
        leadership_term_id: u64,
        log_position: u64,
        append_position: u64,
        members: MemberTable,
        publisher: C::Publisher,
        adapter: C::Adapter,
        recording_log: C::RecordingLog,
        mark_file: C::MarkFile,
        state_counter: AtomicCounter,
        commit_position: AtomicCounter,
    ) -> Self {
        let ctx = ElectionContext::new(
            members.self_id(),
            is_node_startup,
            leadership_term_id,
            log_position,
            append_position,
        );

        let rng = match config.random_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        state_counter.set_ordered(ElectionState::Init.code());

        Self {
            config,
            ctx: Valid::new(ctx),
            members,
            publisher,
            adapter,
            recording_log,
            mark_file,
            state_counter,
            commit_position,
            log_replay: None,
            follower_log: FollowerLog::new(),
            rng,
            #[cfg(test)]
            state_changes: Vec::new(),
        }
    }

    pub fn state(&self) -> ElectionState {
        self.ctx.state()
    }

    pub fn leadership_term_id(&self) -> u64 {
        self.ctx.leadership_term_id
    }

    pub fn candidate_term_id(&self) -> u64 {
        self.ctx.candidate_term_id
    }

    pub fn log_position(&self) -> u64 {
        self.ctx.log_position
    }

    pub fn append_position(&self) -> u64 {
        self.ctx.append_position
    }

    pub fn catchup_position(&self) -> Option<u64> {
        self.ctx.catchup_position
    }

    pub fn leader_id(&self) -> Option<MemberId> {
        self.ctx.leader_id
    }

    pub fn is_leader_startup(&self) -> bool {
        self.ctx.is_leader_startup
    }

    pub fn log_session_id(&self) -> Option<i32> {
        self.ctx.log_session_id
    }

    pub fn member(&self, id: MemberId) -> Option<&ClusterMember> {
        self.members.get(id)
    }

    /// Advance the election by one tick of the host duty cycle.
    ///
    /// Drains inbound messages first, then runs the handler of the current
    /// phase. A failing handler is counted through the agent's error handler
    /// and the election restarts from `Init` with `log_position` refreshed
    /// from the commit-position counter; a termination propagates unchanged.
    #[tracing::instrument(level = "debug", skip_all, fields(member_id = self.members.self_id()))]
    pub fn do_work(&mut self, now_ns: u64, agent: &mut C::Agent) -> Result<usize, ElectionError> {
        let mut work_count = 0;

        if let Phase::Init = self.ctx.phase {
            work_count += self.init(now_ns, agent)?;
        }

        work_count += self.poll_adapter(now_ns, agent)?;

        match self.phase_work(now_ns, agent) {
            Ok(n) => work_count += n,
            Err(e) if e.is_termination() => return Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "election work failed, restarting from Init");
                agent.on_error(&e);
                self.ctx.log_position = self.commit_position.get();
                self.transition(Phase::Init, now_ns, agent);
                work_count += 1;
            }
        }

        self.ctx.assert_role_invariants();

        Ok(work_count)
    }

    fn poll_adapter(&mut self, now_ns: u64, agent: &mut C::Agent) -> Result<usize, ElectionError> {
        let mut count = 0;
        while count < POLL_LIMIT {
            match self.adapter.poll_next() {
                Some(msg) => {
                    tracing::debug!(msg = %msg, "inbound");
                    self.dispatch(now_ns, msg, agent)?;
                    count += 1;
                }
                None => break,
            }
        }

        Ok(count)
    }

    fn dispatch(&mut self, now_ns: u64, msg: ElectionMessage, agent: &mut C::Agent) -> Result<(), ElectionError> {
        match msg {
            ElectionMessage::CanvassPosition(m) => self.on_canvass_position(now_ns, m, agent),
            ElectionMessage::RequestVote(m) => self.on_request_vote(now_ns, m, agent),
            ElectionMessage::Vote(m) => self.on_vote(now_ns, m, agent),
            ElectionMessage::NewLeadershipTerm(m) => self.on_new_leadership_term(now_ns, m, agent),
            ElectionMessage::AppendPosition(m) => self.on_append_position(now_ns, m, agent),
            // Catch-up requests are served by the consensus module's
            // replication machinery, not by the election.
            ElectionMessage::CatchupPosition(_) => Ok(()),
            ElectionMessage::CommitPosition(m) => self.on_commit_position(now_ns, m, agent),
        }
    }

    fn phase_work(&mut self, now_ns: u64, agent: &mut C::Agent) -> Result<usize, ElectionError> {
        match self.ctx.phase {
            Phase::Init | Phase::Closed => Ok(0),
            Phase::Canvass { deadline_ns } => self.canvass(now_ns, deadline_ns, agent),
            Phase::Nominate { deadline_ns } => self.nominate(now_ns, deadline_ns, agent),
            Phase::CandidateBallot { deadline_ns } => self.candidate_ballot(now_ns, deadline_ns, agent),
            Phase::FollowerBallot { deadline_ns } => self.follower_ballot(now_ns, deadline_ns, agent),
            Phase::LeaderReplay => self.leader_replay(now_ns, agent),
            Phase::LeaderTransition => self.leader_transition(now_ns, agent),
            Phase::LeaderReady => self.leader_ready(now_ns, agent),
            Phase::FollowerReplay => self.follower_replay(now_ns, agent),
            Phase::FollowerCatchupTransition => self.follower_catchup_transition(now_ns, agent),
            Phase::FollowerCatchup => self.follower_catchup(now_ns, agent),
            Phase::FollowerTransition => self.follower_transition(now_ns, agent),
            Phase::FollowerReady { deadline_ns } => self.follower_ready(now_ns, deadline_ns, agent),
        }
    }

    fn init(&mut self, now_ns: u64, agent: &mut C::Agent) -> Result<usize, ElectionError> {
        if !self.ctx.is_node_startup {
            agent.stop_all_catchups();
            self.ctx.catchup_position = None;
            self.log_replay = None;
            self.ctx.append_position = agent.prepare_for_new_leadership(self.ctx.log_position)?;
        }

        let persisted = self.mark_file.candidate_term_id().unwrap_or(0);
        self.ctx.candidate_term_id = max(persisted, self.ctx.leadership_term_id);

        if self.members.len() == 1 && !self.members.is_passive() {
            self.ctx.candidate_term_id = max(self.ctx.leadership_term_id + 1, self.ctx.candidate_term_id + 1);
            self.ctx.leadership_term_id = self.ctx.candidate_term_id;
            self.ctx.leader_id = Some(self.members.self_id());
            self.transition(Phase::LeaderReplay, now_ns, agent);
        } else {
            let next = self.canvass_phase(now_ns);
            self.transition(next, now_ns, agent);
        }

        Ok(1)
    }

    fn canvass(&mut self, now_ns: u64, deadline_ns: u64, agent: &mut C::Agent) -> Result<usize, ElectionError> {
        let mut work_count = 0;

        if now_ns >= self.ctx.time_of_last_update_ns + self.config.election_status_interval_ns() {
            self.ctx.time_of_last_update_ns = now_ns;

            let msg = ElectionMessage::CanvassPosition(CanvassPosition {
                leadership_term_id: self.ctx.leadership_term_id,
                log_position: self.ctx.append_position,
                follower_id: self.members.self_id(),
            });
            for member in self.members.others() {
                self.publisher.try_send(member.id, msg);
            }

            work_count += 1;
        }

        let appointed_elsewhere = self
            .config
            .appointed_leader_id
            .is_some_and(|id| id != self.members.self_id());
        if self.members.is_passive() || appointed_elsewhere {
            return Ok(work_count);
        }

        if self.members.is_unanimous_candidate()
            || (self.members.is_quorum_candidate() && now_ns >= deadline_ns)
        {
            let delay_ns = self.rng.gen_range(0..max(1, self.config.election_timeout_ns() / 2));
            self.transition(Phase::Nominate { deadline_ns: now_ns + delay_ns }, now_ns, agent);
            work_count += 1;
        }

        Ok(work_count)
    }

    fn nominate(&mut self, now_ns: u64, deadline_ns: u64, agent: &mut C::Agent) -> Result<usize, ElectionError> {
        if now_ns >= deadline_ns {
            self.ctx.candidate_term_id = max(self.ctx.leadership_term_id + 1, self.ctx.candidate_term_id + 1);
            let candidate_term_id = self.ctx.candidate_term_id;
            self.members.become_candidate(candidate_term_id, self.members.self_id());
            self.persist_candidate_term_id()?;

            let deadline_ns = now_ns + self.config.election_timeout_ns();
            self.transition(Phase::CandidateBallot { deadline_ns }, now_ns, agent);
            return Ok(1);
        }

        Ok(0)
    }

    fn candidate_ballot(&mut self, now_ns: u64, deadline_ns: u64, agent: &mut C::Agent) -> Result<usize, ElectionError> {
        let mut work_count = 0;
        let candidate_term_id = self.ctx.candidate_term_id;

        if self.members.has_won_vote_on_full_count(candidate_term_id)
            || self.members.has_majority_vote_with_canvass_members(candidate_term_id)
        {
            self.ctx.leader_id = Some(self.members.self_id());
            self.ctx.leadership_term_id = candidate_term_id;
            self.transition(Phase::LeaderReplay, now_ns, agent);
            work_count += 1;
        } else if now_ns >= deadline_ns {
            if self.members.has_majority_vote(candidate_term_id) {
                self.ctx.leader_id = Some(self.members.self_id());
                self.ctx.leadership_term_id = candidate_term_id;
                self.transition(Phase::LeaderReplay, now_ns, agent);
            } else {
                let next = self.canvass_phase(now_ns);
                self.transition(next, now_ns, agent);
            }

            work_count += 1;
        } else {
            let request = ElectionMessage::RequestVote(RequestVote {
                log_leadership_term_id: self.ctx.log_leadership_term_id,
                log_position: self.ctx.append_position,
                candidate_term_id,
                candidate_id: self.members.self_id(),
            });

            for slot in 0..self.members.len() {
                let member = &mut self.members.as_mut_slice()[slot];
                if !member.is_ballot_sent {
                    work_count += 1;
                    member.is_ballot_sent = self.publisher.try_send(member.id, request);
                }
            }
        }

        Ok(work_count)
    }

    fn follower_ballot(&mut self, now_ns: u64, deadline_ns: u64, agent: &mut C::Agent) -> Result<usize, ElectionError> {
        let mut work_count = 0;

        if now_ns >= deadline_ns {
            let next = self.canvass_phase(now_ns);
            self.transition(next, now_ns, agent);
            work_count += 1;
        }

        Ok(work_count)
    }

    fn leader_replay(&mut self, now_ns: u64, agent: &mut C::Agent) -> Result<usize, ElectionError> {
        let mut work_count = 0;

        if self.log_replay.is_none() {
            let log_session_id = agent.add_log_publication()?;
            self.ctx.log_session_id = Some(log_session_id);

            let leadership_term_id = self.ctx.leadership_term_id;
            let append_position = self.ctx.append_position;
            self.members.reset_log_positions(leadership_term_id, append_position);

            match agent.new_log_replay(self.ctx.log_position, self.ctx.append_position)? {
                Some(replay) => self.log_replay = Some(replay),
                None => {
                    self.transition(Phase::LeaderTransition, now_ns, agent);
                    work_count = 1;
                }
            }
        } else {
            let mut is_done = false;
            if let Some(replay) = self.log_replay.as_mut() {
                work_count += replay.do_work()?;
                is_done = replay.is_done();
            }

            if is_done {
                self.log_replay = None;
                self.ctx.log_position = self.ctx.append_position;
                self.transition(Phase::LeaderTransition, now_ns, agent);
            } else if now_ns > self.ctx.time_of_last_update_ns + self.config.leader_heartbeat_interval_ns() {
                self.ctx.time_of_last_update_ns = now_ns;
                let timestamp = now_ns / NANOS_PER_MILLI;

                let ids: Vec<MemberId> = self.members.others().map(|m| m.id).collect();
                for id in ids {
                    self.publish_new_leadership_term(id, timestamp);
                }

                work_count += 1;
            }
        }

        Ok(work_count)
    }

    fn leader_transition(&mut self, now_ns: u64, agent: &mut C::Agent) -> Result<usize, ElectionError> {
        self.ctx.is_leader_startup = self.ctx.is_node_startup;
        agent.become_leader(
            self.ctx.leadership_term_id,
            self.ctx.log_position,
            self.wire_log_session_id(),
            self.ctx.is_leader_startup,
        )?;

        let recording_id = agent.log_recording_id();
        let timestamp = now_ns / NANOS_PER_MILLI;
        let log_position = self.ctx.log_position;

        for term_id in self.ctx.log_leadership_term_id + 1..=self.ctx.leadership_term_id {
            if self.recording_log.is_unknown(term_id) {
                self.recording_log.append_term(recording_id, term_id, log_position, timestamp)?;
            }
        }

        self.recording_log.force(self.config.file_sync_level)?;
        self.transition(Phase::LeaderReady, now_ns, agent);

        Ok(1)
    }

    fn leader_ready(&mut self, now_ns: u64, agent: &mut C::Agent) -> Result<usize, ElectionError> {
        let mut work_count = 0;

        if self
            .members
            .have_voters_reached_position(self.ctx.log_position, self.ctx.leadership_term_id)
        {
            if agent.election_complete()? {
                agent.update_member_details(self.ctx.leadership_term_id, self.members.self_id())?;
                self.transition(Phase::Closed, now_ns, agent);
            }

            work_count += 1;
        } else if now_ns > self.ctx.time_of_last_update_ns + self.config.leader_heartbeat_interval_ns() {
            self.ctx.time_of_last_update_ns = now_ns;
            let timestamp = self.recording_log.get_term_timestamp(self.ctx.leadership_term_id)?;

            let ids: Vec<MemberId> = self.members.others().map(|m| m.id).collect();
            for id in ids {
                self.publish_new_leadership_term(id, timestamp);
            }

            work_count += 1;
        }

        Ok(work_count)
    }

    fn follower_replay(&mut self, now_ns: u64, agent: &mut C::Agent) -> Result<usize, ElectionError> {
        let mut work_count = 0;

        let next = if self.ctx.catchup_position.is_some() {
            Phase::FollowerCatchupTransition
        } else {
            Phase::FollowerTransition
        };

        if self.log_replay.is_none() {
            match agent.new_log_replay(self.ctx.log_position, self.ctx.append_position)? {
                Some(replay) => self.log_replay = Some(replay),
                None => {
                    self.transition(next, now_ns, agent);
                    work_count = 1;
                }
            }
        } else {
            let mut is_done = false;
            if let Some(replay) = self.log_replay.as_mut() {
                work_count += replay.do_work()?;
                is_done = replay.is_done();
            }

            if is_done {
                self.log_replay = None;
                self.ctx.log_position = self.ctx.append_position;
                self.transition(next, now_ns, agent);
            }
        }

        Ok(work_count)
    }

    fn follower_catchup_transition(&mut self, now_ns: u64, agent: &mut C::Agent) -> Result<usize, ElectionError> {
        if self.follower_log.subscription.is_none() {
            self.create_follower_subscription(agent)?;

            let destination = replay_destination(&self.members.this_member().transfer_endpoint);
            if let Some(subscription) = self.follower_log.subscription.as_mut() {
                subscription.add_destination(&destination);
            }
            agent.replay_log_destination(Some(&destination));
        }

        if self.send_catchup_position()? {
            self.ctx.time_of_last_update_ns = now_ns;
            agent.catchup_initiated(now_ns);
            self.transition(Phase::FollowerCatchup, now_ns, agent);
        }

        Ok(1)
    }

    fn follower_catchup(&mut self, now_ns: u64, agent: &mut C::Agent) -> Result<usize, ElectionError> {
        let catchup_position = self.ctx.catchup_position.ok_or_else(|| {
            ElectionError::Cluster(anyerror::AnyError::error("no catch-up position in FollowerCatchup"))
        })?;
        let log_session_id = self.wire_log_session_id();

        let mut work_count = 0;
        if let Some(subscription) = self.follower_log.subscription.as_mut() {
            work_count += agent.catchup_poll(subscription, log_session_id, catchup_position, now_ns)?;
        }

        if self.follower_log.live_destination.is_none() && agent.is_catchup_near_live_position(catchup_position) {
            self.add_live_log_destination(agent)?;
            work_count += 1;
        }

        if self.commit_position.get_weak() >= catchup_position {
            self.ctx.append_position = catchup_position;
            self.ctx.log_position = catchup_position;
            self.ctx.time_of_last_update_ns = 0;
            self.transition(Phase::FollowerTransition, now_ns, agent);
            work_count += 1;
        } else if now_ns > self.ctx.time_of_last_update_ns + self.config.leader_heartbeat_interval_ns() {
            if agent.has_replay_destination() && self.send_catchup_position()? {
                self.ctx.time_of_last_update_ns = now_ns;
                work_count += 1;
            }
        }

        Ok(work_count)
    }

    fn follower_transition(&mut self, now_ns: u64, agent: &mut C::Agent) -> Result<usize, ElectionError> {
        if self.follower_log.subscription.is_none() {
            self.create_follower_subscription(agent)?;
        }

        if self.follower_log.live_destination.is_none() {
            self.add_live_log_destination(agent)?;
        }

        let log_session_id = self.wire_log_session_id();
        if let Some(subscription) = self.follower_log.subscription.as_mut() {
            agent.await_follower_log_image(subscription, log_session_id)?;
        }

        let recording_id = agent.log_recording_id();
        let timestamp = now_ns / NANOS_PER_MILLI;
        let log_position = self.ctx.log_position;
        let mut has_updates = false;

        for term_id in self.ctx.log_leadership_term_id + 1..=self.ctx.leadership_term_id {
            if self.recording_log.is_unknown(term_id) {
                self.recording_log.append_term(recording_id, term_id, log_position, timestamp)?;
                has_updates = true;
            }
        }

        if has_updates {
            self.recording_log.force(self.config.file_sync_level)?;
        }

        let deadline_ns = now_ns + self.config.leader_heartbeat_timeout_ns();
        self.transition(Phase::FollowerReady { deadline_ns }, now_ns, agent);

        Ok(1)
    }

    fn follower_ready(&mut self, now_ns: u64, deadline_ns: u64, agent: &mut C::Agent) -> Result<usize, ElectionError> {
        let leader_id = self.leader_id_or_error()?;
        let msg = ElectionMessage::AppendPosition(AppendPosition {
            leadership_term_id: self.ctx.leadership_term_id,
            log_position: self.ctx.log_position,
            follower_id: self.members.self_id(),
        });

        if self.publisher.try_send(leader_id, msg) {
            if agent.election_complete()? {
                agent.update_member_details(self.ctx.leadership_term_id, leader_id)?;
                self.transition(Phase::Closed, now_ns, agent);
            }
        } else if now_ns >= deadline_ns {
            tracing::warn!(
                leader_id,
                leadership_term_id = self.ctx.leadership_term_id,
                "no heartbeat path to leader, reverting to canvass"
            );
            if self.follower_log.remove_live_destination() {
                agent.live_log_destination(None);
            }

            let next = self.canvass_phase(now_ns);
            self.transition(next, now_ns, agent);
        }

        Ok(1)
    }

    /// Record the canvass position of a peer and, as a settled leader, help a
    /// lagging one onto the current term.
    pub fn on_canvass_position(
        &mut self,
        now_ns: u64,
        msg: CanvassPosition,
        agent: &mut C::Agent,
    ) -> Result<(), ElectionError> {
        let state = self.ctx.state();

        match self.members.get_mut(msg.follower_id) {
            Some(follower) => {
                follower.leadership_term_id = Some(msg.leadership_term_id);
                follower.log_position = Some(msg.log_position);
            }
            None => return Ok(()),
        }

        if state == ElectionState::LeaderReady && msg.leadership_term_id < self.ctx.leadership_term_id {
            let entry = self.recording_log.get_term_entry(msg.leadership_term_id + 1)?;
            let reply = ElectionMessage::NewLeadershipTerm(NewLeadershipTerm {
                log_leadership_term_id: msg.leadership_term_id,
                log_truncate_position: entry.term_base_log_position,
                leadership_term_id: self.ctx.leadership_term_id,
                log_position: self.ctx.append_position,
                timestamp: entry.timestamp,
                leader_id: self.members.self_id(),
                log_session_id: self.wire_log_session_id(),
                is_startup: self.ctx.is_leader_startup,
            });
            self.publisher.try_send(msg.follower_id, reply);
        } else if (state == ElectionState::LeaderTransition || state == ElectionState::LeaderReplay)
            && msg.leadership_term_id < self.ctx.leadership_term_id
        {
            // Best effort: use the term entry when known, else current state.
            let reply = match self.recording_log.find_term_entry(msg.leadership_term_id + 1) {
                Some(entry) => ElectionMessage::NewLeadershipTerm(NewLeadershipTerm {
                    log_leadership_term_id: msg.leadership_term_id,
                    log_truncate_position: entry.term_base_log_position,
                    leadership_term_id: self.ctx.leadership_term_id,
                    log_position: self.ctx.append_position,
                    timestamp: entry.timestamp,
                    leader_id: self.members.self_id(),
                    log_session_id: self.wire_log_session_id(),
                    is_startup: self.ctx.is_leader_startup,
                }),
                None => ElectionMessage::NewLeadershipTerm(NewLeadershipTerm {
                    log_leadership_term_id: self.ctx.log_leadership_term_id,
                    log_truncate_position: self.ctx.append_position,
                    leadership_term_id: self.ctx.leadership_term_id,
                    log_position: self.ctx.append_position,
                    timestamp: now_ns / NANOS_PER_MILLI,
                    leader_id: self.members.self_id(),
                    log_session_id: self.wire_log_session_id(),
                    is_startup: self.ctx.is_leader_startup,
                }),
            };
            self.publisher.try_send(msg.follower_id, reply);
        } else if msg.leadership_term_id > self.ctx.leadership_term_id {
            let next = self.canvass_phase(now_ns);
            self.transition(next, now_ns, agent);
        }

        Ok(())
    }

    /// Decide a ballot: deny stale terms, deny candidates behind the local
    /// log, otherwise adopt the candidate term and grant.
    pub fn on_request_vote(
        &mut self,
        now_ns: u64,
        msg: RequestVote,
        agent: &mut C::Agent,
    ) -> Result<(), ElectionError> {
        if self.members.is_passive() || msg.candidate_id == self.members.self_id() {
            return Ok(());
        }

        if msg.candidate_term_id <= self.ctx.leadership_term_id
            || msg.candidate_term_id <= self.ctx.candidate_term_id
        {
            self.place_vote(msg.candidate_term_id, msg.candidate_id, false);
        } else if LogId::new(self.ctx.log_leadership_term_id, self.ctx.append_position)
            > LogId::new(msg.log_leadership_term_id, msg.log_position)
        {
            self.ctx.candidate_term_id = msg.candidate_term_id;
            self.persist_candidate_term_id()?;
            let next = self.canvass_phase(now_ns);
            self.transition(next, now_ns, agent);

            self.place_vote(msg.candidate_term_id, msg.candidate_id, false);
        } else {
            self.ctx.candidate_term_id = msg.candidate_term_id;
            self.persist_candidate_term_id()?;
            let deadline_ns = now_ns + self.config.election_timeout_ns();
            self.transition(Phase::FollowerBallot { deadline_ns }, now_ns, agent);

            self.place_vote(msg.candidate_term_id, msg.candidate_id, true);
        }

        Ok(())
    }

    /// Record a follower's ballot while campaigning in our own term.
    pub fn on_vote(&mut self, _now_ns: u64, msg: Vote, _agent: &mut C::Agent) -> Result<(), ElectionError> {
        if !matches!(self.ctx.phase, Phase::CandidateBallot { .. })
            || msg.candidate_term_id != self.ctx.candidate_term_id
            || msg.candidate_id != self.members.self_id()
        {
            return Ok(());
        }

        if let Some(follower) = self.members.get_mut(msg.follower_id) {
            follower.candidate_term_id = Some(msg.candidate_term_id);
            follower.leadership_term_id = Some(msg.log_leadership_term_id);
            follower.log_position = Some(msg.log_position);
            follower.vote = if msg.granted { Ballot::Granted } else { Ballot::Denied };
        }

        Ok(())
    }

    /// Adopt an announced leader, truncating or scheduling catch-up as the
    /// logs require.
    pub fn on_new_leadership_term(
        &mut self,
        now_ns: u64,
        msg: NewLeadershipTerm,
        agent: &mut C::Agent,
    ) -> Result<(), ElectionError> {
        if self.members.get(msg.leader_id).is_none() || msg.leader_id == self.members.self_id() {
            return Ok(());
        }

        if msg.leadership_term_id > self.ctx.leadership_term_id
            && msg.log_leadership_term_id == self.ctx.log_leadership_term_id
            && msg.log_truncate_position < self.ctx.append_position
        {
            agent.truncate_log_entry(msg.log_leadership_term_id, msg.log_truncate_position)?;
            self.ctx.append_position = agent.prepare_for_new_leadership(msg.log_truncate_position)?;
            self.follow_leader(now_ns, msg, Some(msg.log_position), agent);
        } else if msg.log_leadership_term_id == self.ctx.log_leadership_term_id
            && msg.leadership_term_id == self.ctx.candidate_term_id
            && matches!(
                self.ctx.state(),
                ElectionState::FollowerBallot | ElectionState::CandidateBallot | ElectionState::Canvass
            )
        {
            let catchup_position = (msg.log_position > self.ctx.append_position).then_some(msg.log_position);
            self.follow_leader(now_ns, msg, catchup_position, agent);
        } else if LogId::new(self.ctx.log_leadership_term_id, self.ctx.append_position)
            != LogId::new(msg.log_leadership_term_id, msg.log_position)
            && self.ctx.catchup_position.is_none()
        {
            if msg.log_position >= self.ctx.append_position && msg.leadership_term_id >= self.ctx.candidate_term_id {
                self.follow_leader(now_ns, msg, Some(msg.log_position), agent);
            } else {
                // A silently dropped announcement can starve this follower,
                // so surface it for observability.
                let error = ElectionError::DivergentLog {
                    leader_id: msg.leader_id,
                    leadership_term_id: msg.leadership_term_id,
                    log_leadership_term_id: self.ctx.log_leadership_term_id,
                    append_position: self.ctx.append_position,
                };
                tracing::warn!(error = %error, "dropping new leadership term");
                agent.on_error(&error);
            }
        }

        Ok(())
    }

    /// Leader bookkeeping of a follower's append position.
    pub fn on_append_position(
        &mut self,
        now_ns: u64,
        msg: AppendPosition,
        agent: &mut C::Agent,
    ) -> Result<(), ElectionError> {
        if msg.leadership_term_id != self.ctx.leadership_term_id {
            return Ok(());
        }

        if let Some(follower) = self.members.get_mut(msg.follower_id) {
            follower.leadership_term_id = Some(msg.leadership_term_id);
            follower.log_position = Some(msg.log_position);
            follower.time_of_last_append_position_ns = now_ns;

            agent.track_catchup_completion(msg.follower_id, msg.leadership_term_id);
        }

        Ok(())
    }

    /// Advance the catch-up target from the leader's committed position, or
    /// restart if the cluster has moved to a newer term.
    pub fn on_commit_position(
        &mut self,
        now_ns: u64,
        msg: CommitPosition,
        agent: &mut C::Agent,
    ) -> Result<(), ElectionError> {
        if matches!(self.ctx.phase, Phase::FollowerCatchup)
            && msg.leadership_term_id == self.ctx.leadership_term_id
            && self.ctx.leader_id == Some(msg.leader_id)
        {
            if let Some(catchup_position) = self.ctx.catchup_position {
                self.ctx.catchup_position = Some(max(catchup_position, msg.log_position));
            }
        } else if msg.leadership_term_id > self.ctx.leadership_term_id {
            self.transition(Phase::Init, now_ns, agent);
        }

        Ok(())
    }

    /// A leadership term boundary replayed from the leader's archive while
    /// catching up: make sure the recording log covers every term up to it.
    pub fn on_replay_new_leadership_term(
        &mut self,
        recording_id: u64,
        leadership_term_id: u64,
        log_position: u64,
        timestamp: u64,
        term_base_log_position: u64,
    ) -> Result<(), ElectionError> {
        if !matches!(self.ctx.phase, Phase::FollowerCatchup) {
            return Ok(());
        }

        let mut has_updates = false;
        for term_id in self.ctx.log_leadership_term_id..=leadership_term_id {
            if term_id > 0 && !self.recording_log.is_unknown(term_id - 1) {
                self.recording_log.commit_log_position(term_id - 1, term_base_log_position)?;
                has_updates = true;
            }

            if self.recording_log.is_unknown(term_id) {
                self.recording_log.append_term(recording_id, term_id, term_base_log_position, timestamp)?;
                has_updates = true;
            }
        }

        if has_updates {
            self.recording_log.force(self.config.file_sync_level)?;
        }

        self.ctx.log_leadership_term_id = leadership_term_id;
        self.ctx.append_position = max(self.ctx.append_position, log_position);
        self.ctx.log_position = log_position;

        Ok(())
    }

    fn follow_leader(
        &mut self,
        now_ns: u64,
        msg: NewLeadershipTerm,
        catchup_position: Option<u64>,
        agent: &mut C::Agent,
    ) {
        self.ctx.leader_id = Some(msg.leader_id);
        self.ctx.is_leader_startup = msg.is_startup;
        self.ctx.log_session_id = Some(msg.log_session_id);
        self.ctx.catchup_position = catchup_position;
        // The candidate term rises first so it never trails the adopted term.
        self.ctx.candidate_term_id = max(self.ctx.candidate_term_id, msg.leadership_term_id);
        self.ctx.leadership_term_id = msg.leadership_term_id;
        self.transition(Phase::FollowerReplay, now_ns, agent);
    }

    fn place_vote(&mut self, candidate_term_id: u64, candidate_id: MemberId, granted: bool) {
        if self.members.get(candidate_id).is_none() {
            return;
        }

        let msg = ElectionMessage::Vote(Vote {
            candidate_term_id,
            log_leadership_term_id: self.ctx.log_leadership_term_id,
            log_position: self.ctx.append_position,
            candidate_id,
            follower_id: self.members.self_id(),
            granted,
        });
        self.publisher.try_send(candidate_id, msg);
    }

    fn publish_new_leadership_term(&mut self, to: MemberId, timestamp: u64) -> bool {
        let msg = ElectionMessage::NewLeadershipTerm(NewLeadershipTerm {
            log_leadership_term_id: self.ctx.log_leadership_term_id,
            log_truncate_position: self.ctx.append_position,
            leadership_term_id: self.ctx.leadership_term_id,
            log_position: self.ctx.append_position,
            timestamp,
            leader_id: self.members.self_id(),
            log_session_id: self.wire_log_session_id(),
            is_startup: self.ctx.is_leader_startup,
        });

        self.publisher.try_send(to, msg)
    }

    fn send_catchup_position(&mut self) -> Result<bool, ElectionError> {
        let leader_id = self.leader_id_or_error()?;
        let msg = ElectionMessage::CatchupPosition(CatchupPosition {
            leadership_term_id: self.ctx.leadership_term_id,
            log_position: self.ctx.log_position,
            follower_id: self.members.self_id(),
        });

        Ok(self.publisher.try_send(leader_id, msg))
    }

    fn create_follower_subscription(&mut self, agent: &mut C::Agent) -> Result<(), ElectionError> {
        let log_session_id = self.wire_log_session_id();
        let channel = follower_subscription_channel(
            &self.config.log_channel,
            log_session_id,
            &agent.log_subscription_tags(),
        )?;

        let subscription = agent.create_log_subscription(&channel)?;
        self.follower_log.subscription = Some(subscription);
        agent.await_services_ready(&channel, log_session_id, self.ctx.log_position, self.ctx.is_leader_startup)?;

        Ok(())
    }

    fn add_live_log_destination(&mut self, agent: &mut C::Agent) -> Result<(), ElectionError> {
        let destination = live_destination(&self.config.log_channel, &self.members.this_member().log_endpoint)?;
        agent.live_log_destination(Some(&destination));
        self.follower_log.add_live_destination(destination);

        Ok(())
    }

    fn canvass_phase(&self, now_ns: u64) -> Phase {
        let timeout_ns = if self.ctx.is_extended_canvass {
            self.config.startup_canvass_timeout_ns()
        } else {
            self.config.election_timeout_ns()
        };

        Phase::Canvass { deadline_ns: now_ns + timeout_ns }
    }

    fn persist_candidate_term_id(&mut self) -> Result<(), ElectionError> {
        self.mark_file.update_candidate_term_id(self.ctx.candidate_term_id)?;
        self.mark_file.force(self.config.file_sync_level)
    }

    fn wire_log_session_id(&self) -> i32 {
        self.ctx.log_session_id.unwrap_or(NULL_SESSION_ID)
    }

    fn leader_id_or_error(&self) -> Result<MemberId, ElectionError> {
        self.ctx.leader_id.ok_or(ElectionError::NoLeader { state: self.ctx.state() })
    }

    fn transition(&mut self, next: Phase, now_ns: u64, agent: &mut C::Agent) {
        let old_state = self.ctx.state();
        let new_state = next.state();

        if old_state == new_state {
            return;
        }

        tracing::debug!(
            from = %old_state,
            to = %new_state,
            leadership_term_id = self.ctx.leadership_term_id,
            candidate_term_id = self.ctx.candidate_term_id,
            log_position = self.ctx.log_position,
            append_position = self.ctx.append_position,
            "election state change"
        );

        #[cfg(test)]
        self.state_changes.push((old_state, new_state));

        // Neither canvassing nor balloting knows a leader yet.
        if matches!(new_state, ElectionState::Canvass | ElectionState::FollowerBallot) {
            self.ctx.leader_id = None;
        }

        if new_state == ElectionState::Canvass {
            let leadership_term_id = self.ctx.leadership_term_id;
            let append_position = self.ctx.append_position;
            self.members.reset(leadership_term_id, append_position);
        }

        if old_state == ElectionState::Canvass {
            self.ctx.is_extended_canvass = false;
        }

        match new_state {
            ElectionState::Init
            | ElectionState::Canvass
            | ElectionState::Nominate
            | ElectionState::FollowerBallot
            | ElectionState::FollowerReplay
            | ElectionState::FollowerCatchupTransition
            | ElectionState::FollowerCatchup
            | ElectionState::FollowerTransition
            | ElectionState::FollowerReady => agent.role(Role::Follower),
            ElectionState::CandidateBallot => agent.role(Role::Candidate),
            ElectionState::LeaderTransition | ElectionState::LeaderReady => agent.role(Role::Leader),
            ElectionState::LeaderReplay | ElectionState::Closed => {}
        }

        if new_state == ElectionState::Closed {
            self.log_replay = None;
            self.follower_log.close();
        }

        self.ctx.phase = next;
        self.state_counter.set_ordered(new_state.code());
        self.ctx.time_of_last_state_change_ns = now_ns;
    }
}
