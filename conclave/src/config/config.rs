//! Election runtime configuration.

use std::fmt;

use anyerror::AnyError;
use clap::Parser;

use crate::config::ConfigError;

const NANOS_PER_MILLI: u64 = 1_000_000;

/// How hard to push a mark-file or recording-log mutation to disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[derive(clap::ValueEnum)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum FileSyncLevel {
    /// Leave flushing to the OS page cache.
    None,

    /// Sync file data on each force.
    Data,

    /// Sync file data and metadata on each force.
    Metadata,
}

impl fmt::Display for FileSyncLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileSyncLevel::None => write!(f, "none"),
            FileSyncLevel::Data => write!(f, "data"),
            FileSyncLevel::Metadata => write!(f, "metadata"),
        }
    }
}

/// Runtime configuration for one election participant.
///
/// Create a configuration, optionally customize fields, validate it, and pass
/// it to [`Election::new`](crate::Election::new):
///
/// ```ignore
/// use conclave::Config;
/// use std::sync::Arc;
///
/// let config = Config {
///     cluster_members: "0,e0:9000,e0:9001,e0:9002,e0:9003,e0:8010".to_string(),
///     election_timeout: 1_000,
///     ..Default::default()
/// };
/// let config = Arc::new(config.validate()?);
/// ```
///
/// All intervals are in milliseconds; the nanosecond accessors convert for
/// the monotonic clock the host supplies to `do_work`.
#[derive(Clone, Debug, Parser)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Config {
    /// The voting members of the cluster:
    /// `"<id>,<ingress>,<consensus>,<log>,<transfer>,<archive>|..."`.
    #[clap(long, default_value = "")]
    pub cluster_members: String,

    /// The id of this member.
    #[clap(long, default_value = "0")]
    pub cluster_member_id: u32,

    /// Endpoints of this member, `"<ingress>,<consensus>,<log>,<transfer>,<archive>"`,
    /// used when the member is passive and absent from `cluster_members`.
    #[clap(long, default_value = "")]
    pub member_endpoints: String,

    /// A member appointed to be leader; other members hold in canvass and
    /// never nominate themselves while this is set.
    #[clap(long)]
    pub appointed_leader_id: Option<u32>,

    /// Channel URI template for the replicated log.
    #[clap(long, default_value = "aeron:udp?term-length=64k")]
    pub log_channel: String,

    /// The timeout in milliseconds after which an election phase gives up and
    /// reverts to canvass.
    #[clap(long, default_value = "1000")]
    pub election_timeout: u64,

    /// The interval in milliseconds at which canvass positions are broadcast.
    #[clap(long, default_value = "20")]
    pub election_status_interval: u64,

    /// The extended canvass window in milliseconds used on node startup, so a
    /// restarting cluster can hear from all members before nominating.
    #[clap(long, default_value = "60000")]
    pub startup_canvass_timeout: u64,

    /// The interval in milliseconds at which an elected leader re-announces
    /// its leadership term.
    #[clap(long, default_value = "200")]
    pub leader_heartbeat_interval: u64,

    /// The time in milliseconds after which a follower that cannot reach its
    /// leader abandons it and reverts to canvass.
    #[clap(long, default_value = "10000")]
    pub leader_heartbeat_timeout: u64,

    /// How durably the mark file and recording log are forced to disk.
    #[clap(long, value_enum, default_value_t = FileSyncLevel::Data)]
    pub file_sync_level: FileSyncLevel,

    /// Seed for the nomination jitter; absent means seeded from entropy.
    /// Fixing it makes multi-node tests deterministic.
    #[clap(long)]
    pub random_seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        <Self as Parser>::parse_from(Vec::<&'static str>::new())
    }
}

impl Config {
    /// Build a `Config` instance from a series of command line arguments.
    ///
    /// The first element in `args` must be the application name.
    pub fn build(args: &[&str]) -> Result<Config, ConfigError> {
        let config = <Self as Parser>::try_parse_from(args.iter().copied()).map_err(|e| ConfigError::ParseError {
            source: AnyError::error(e),
            args: args.iter().map(|x| x.to_string()).collect(),
        })?;

        config.validate()
    }

    /// Validate the state of this config.
    pub fn validate(self) -> Result<Config, ConfigError> {
        if self.election_timeout == 0 {
            return Err(ConfigError::ElectionTimeoutIs0);
        }

        if self.election_status_interval == 0 || self.election_status_interval > self.election_timeout {
            return Err(ConfigError::StatusInterval {
                status_interval: self.election_status_interval,
                election_timeout: self.election_timeout,
            });
        }

        if self.startup_canvass_timeout < self.election_timeout {
            return Err(ConfigError::StartupCanvassTimeout {
                startup_canvass_timeout: self.startup_canvass_timeout,
                election_timeout: self.election_timeout,
            });
        }

        if self.leader_heartbeat_interval == 0 || self.leader_heartbeat_interval >= self.leader_heartbeat_timeout {
            return Err(ConfigError::HeartbeatInterval {
                heartbeat_interval: self.leader_heartbeat_interval,
                heartbeat_timeout: self.leader_heartbeat_timeout,
            });
        }

        Ok(self)
    }

    pub fn election_timeout_ns(&self) -> u64 {
        self.election_timeout * NANOS_PER_MILLI
    }

    pub fn election_status_interval_ns(&self) -> u64 {
        self.election_status_interval * NANOS_PER_MILLI
    }

    pub fn startup_canvass_timeout_ns(&self) -> u64 {
        self.startup_canvass_timeout * NANOS_PER_MILLI
    }

    pub fn leader_heartbeat_interval_ns(&self) -> u64 {
        self.leader_heartbeat_interval * NANOS_PER_MILLI
    }

    pub fn leader_heartbeat_timeout_ns(&self) -> u64 {
        self.leader_heartbeat_timeout * NANOS_PER_MILLI
    }
}
