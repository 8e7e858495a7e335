use anyerror::AnyError;

/// Error variants related to configuration.
#[derive(Debug, Clone, thiserror::Error)]
#[derive(PartialEq, Eq)]
pub enum ConfigError {
    /// Failed to parse configuration from command-line arguments.
    #[error("ParseError: {source} while parsing ({args:?})")]
    ParseError {
        source: AnyError,
        args: Vec<String>,
    },

    /// The election timeout must be greater than zero.
    #[error("election_timeout must be > 0")]
    ElectionTimeoutIs0,

    /// The canvass status interval must fit inside one election timeout.
    #[error("election_status_interval({status_interval}) must be > 0 and <= election_timeout({election_timeout})")]
    StatusInterval {
        status_interval: u64,
        election_timeout: u64,
    },

    /// The startup canvass window must be at least one election timeout.
    #[error("startup_canvass_timeout({startup_canvass_timeout}) must be >= election_timeout({election_timeout})")]
    StartupCanvassTimeout {
        startup_canvass_timeout: u64,
        election_timeout: u64,
    },

    /// A leader must heartbeat several times before followers give up on it.
    #[error("leader_heartbeat_interval({heartbeat_interval}) must be > 0 and < leader_heartbeat_timeout({heartbeat_timeout})")]
    HeartbeatInterval {
        heartbeat_interval: u64,
        heartbeat_timeout: u64,
    },

    /// A cluster member string could not be parsed.
    #[error("invalid cluster member {invalid:?}: {reason}")]
    InvalidMember {
        invalid: String,
        reason: String,
    },

    /// Two configured members share the same id.
    #[error("duplicate cluster member id: {id}")]
    DuplicateMemberId {
        id: u32,
    },
}
