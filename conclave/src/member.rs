//! The per-member election state table.

use std::collections::BTreeMap;
use std::fmt;

use crate::config::Config;
use crate::config::ConfigError;

/// The stable id of a configured cluster member.
pub type MemberId = u32;

/// A ballot cast by a member for a candidate term.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Ballot {
    #[default]
    Unset,
    Granted,
    Denied,
}

impl Ballot {
    pub fn is_granted(&self) -> bool {
        matches!(self, Ballot::Granted)
    }

    /// `true` once the member has answered the ballot either way.
    pub fn is_decided(&self) -> bool {
        !matches!(self, Ballot::Unset)
    }
}

/// Mutable election state for one configured member.
///
/// `leadership_term_id` and `log_position` are `None` until the member has
/// responded to a canvass in the current round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterMember {
    pub id: MemberId,
    pub ingress_endpoint: String,
    pub consensus_endpoint: String,
    pub log_endpoint: String,
    pub transfer_endpoint: String,
    pub archive_endpoint: String,

    pub leadership_term_id: Option<u64>,
    pub log_position: Option<u64>,
    pub candidate_term_id: Option<u64>,
    pub vote: Ballot,
    pub is_ballot_sent: bool,
    pub time_of_last_append_position_ns: u64,
}

impl ClusterMember {
    pub fn new(
        id: MemberId,
        ingress_endpoint: &str,
        consensus_endpoint: &str,
        log_endpoint: &str,
        transfer_endpoint: &str,
        archive_endpoint: &str,
    ) -> Self {
        Self {
            id,
            ingress_endpoint: ingress_endpoint.to_string(),
            consensus_endpoint: consensus_endpoint.to_string(),
            log_endpoint: log_endpoint.to_string(),
            transfer_endpoint: transfer_endpoint.to_string(),
            archive_endpoint: archive_endpoint.to_string(),
            leadership_term_id: None,
            log_position: None,
            candidate_term_id: None,
            vote: Ballot::Unset,
            is_ballot_sent: false,
            time_of_last_append_position_ns: 0,
        }
    }

    /// Parse one member entry: `"<id>,<ingress>,<consensus>,<log>,<transfer>,<archive>"`.
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidMember {
            invalid: value.to_string(),
            reason: reason.to_string(),
        };

        let fields: Vec<&str> = value.split(',').collect();
        if fields.len() != 6 {
            return Err(invalid("expected 6 comma separated fields"));
        }

        let id: MemberId = fields[0].parse().map_err(|_| invalid("member id is not an unsigned integer"))?;

        if fields[1..].iter().any(|f| f.is_empty()) {
            return Err(invalid("empty endpoint"));
        }

        Ok(Self::new(id, fields[1], fields[2], fields[3], fields[4], fields[5]))
    }

    /// Parse a `|` separated list of member entries.
    pub fn parse_members(value: &str) -> Result<Vec<Self>, ConfigError> {
        if value.is_empty() {
            return Ok(Vec::new());
        }

        value.split('|').map(Self::parse).collect()
    }

    /// Parse the endpoints of a member whose id is known but which is absent
    /// from the voting member list: `"<ingress>,<consensus>,<log>,<transfer>,<archive>"`.
    pub fn parse_endpoints(id: MemberId, value: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidMember {
            invalid: value.to_string(),
            reason: reason.to_string(),
        };

        let fields: Vec<&str> = value.split(',').collect();
        if fields.len() != 5 {
            return Err(invalid("expected 5 comma separated endpoints"));
        }
        if fields.iter().any(|f| f.is_empty()) {
            return Err(invalid("empty endpoint"));
        }

        Ok(Self::new(id, fields[0], fields[1], fields[2], fields[3], fields[4]))
    }

    pub(crate) fn reset(&mut self) {
        self.leadership_term_id = None;
        self.log_position = None;
        self.candidate_term_id = None;
        self.vote = Ballot::Unset;
        self.is_ballot_sent = false;
    }
}

impl fmt::Display for ClusterMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "member {} at {}", self.id, self.consensus_endpoint)
    }
}

/// The fixed membership of one election round.
///
/// Voting members live in a dense array with an auxiliary id-to-slot map so
/// the hot quorum predicates walk a contiguous slice. This member's own entry
/// is shared with the array when it votes; a passive member (absent from the
/// voting set) keeps its entry on the side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberTable {
    members: Vec<ClusterMember>,
    slot_by_id: BTreeMap<MemberId, usize>,
    self_id: MemberId,
    passive_self: Option<Box<ClusterMember>>,
}

impl MemberTable {
    pub fn new(members: Vec<ClusterMember>, this_member: ClusterMember) -> Result<Self, ConfigError> {
        let mut slot_by_id = BTreeMap::new();
        for (slot, member) in members.iter().enumerate() {
            if slot_by_id.insert(member.id, slot).is_some() {
                return Err(ConfigError::DuplicateMemberId { id: member.id });
            }
        }

        let self_id = this_member.id;
        let passive_self = if slot_by_id.contains_key(&self_id) {
            None
        } else {
            Some(Box::new(this_member))
        };

        Ok(Self {
            members,
            slot_by_id,
            self_id,
            passive_self,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let members = ClusterMember::parse_members(&config.cluster_members)?;
        let self_id = config.cluster_member_id;

        let this_member = match members.iter().find(|m| m.id == self_id) {
            Some(m) => m.clone(),
            None => ClusterMember::parse_endpoints(self_id, &config.member_endpoints)?,
        };

        Self::new(members, this_member)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn self_id(&self) -> MemberId {
        self.self_id
    }

    /// A passive member is configured outside the voting set: it follows the
    /// log but neither canvasses for leadership nor votes.
    pub fn is_passive(&self) -> bool {
        self.passive_self.is_some()
    }

    pub fn get(&self, id: MemberId) -> Option<&ClusterMember> {
        self.slot_by_id.get(&id).map(|slot| &self.members[*slot])
    }

    pub fn get_mut(&mut self, id: MemberId) -> Option<&mut ClusterMember> {
        self.slot_by_id.get(&id).map(|slot| &mut self.members[*slot])
    }

    pub fn this_member(&self) -> &ClusterMember {
        match &self.passive_self {
            Some(m) => m,
            None => &self.members[self.slot_by_id[&self.self_id]],
        }
    }

    pub fn this_member_mut(&mut self) -> &mut ClusterMember {
        match &mut self.passive_self {
            Some(m) => m,
            None => &mut self.members[self.slot_by_id[&self.self_id]],
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClusterMember> {
        self.members.iter()
    }

    /// The voting members other than this one.
    pub fn others(&self) -> impl Iterator<Item = &ClusterMember> {
        let self_id = self.self_id;
        self.members.iter().filter(move |m| m.id != self_id)
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [ClusterMember] {
        &mut self.members
    }

    /// Clear all election bookkeeping and re-seed this member's own canvass
    /// entry, done on every entry to canvass.
    pub(crate) fn reset(&mut self, leadership_term_id: u64, append_position: u64) {
        for member in &mut self.members {
            member.reset();
        }
        if let Some(m) = &mut self.passive_self {
            m.reset();
        }

        let this = self.this_member_mut();
        this.leadership_term_id = Some(leadership_term_id);
        this.log_position = Some(append_position);
    }

    /// Start a ballot for `candidate_term_id`: the candidate votes for itself,
    /// every other member's ballot is open and unsent.
    pub(crate) fn become_candidate(&mut self, candidate_term_id: u64, candidate_id: MemberId) {
        for member in &mut self.members {
            member.candidate_term_id = Some(candidate_term_id);
            if member.id == candidate_id {
                member.vote = Ballot::Granted;
                member.is_ballot_sent = true;
            } else {
                member.vote = Ballot::Unset;
                member.is_ballot_sent = false;
            }
        }
    }

    /// Forget peer positions when a new leader term begins, then re-seed this
    /// member's entry.
    pub(crate) fn reset_log_positions(&mut self, leadership_term_id: u64, append_position: u64) {
        for member in &mut self.members {
            member.leadership_term_id = None;
            member.log_position = None;
        }
        if let Some(m) = &mut self.passive_self {
            m.leadership_term_id = None;
            m.log_position = None;
        }

        let this = self.this_member_mut();
        this.leadership_term_id = Some(leadership_term_id);
        this.log_position = Some(append_position);
    }
}
