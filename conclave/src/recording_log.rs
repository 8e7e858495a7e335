//! The durable per-term index mapping leadership terms to their base log
//! positions and timestamps.
//!
//! The on-disk layout is out of scope; the election only needs the
//! operations below. An in-memory implementation for tests lives in
//! [`testing`](crate::testing).

use anyerror::AnyError;

use crate::config::FileSyncLevel;
use crate::error::ElectionError;

/// One leadership term in the recording log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct TermEntry {
    /// Recording that holds the log of this term.
    pub recording_id: u64,

    pub term_id: u64,

    /// Log position at which the term begins.
    pub term_base_log_position: u64,

    /// Log position at which the term ended, once committed.
    pub log_position: Option<u64>,

    pub timestamp: u64,
}

pub trait RecordingLog {
    fn find_term_entry(&self, term_id: u64) -> Option<TermEntry>;

    /// Like [`find_term_entry`](RecordingLog::find_term_entry) but an absent
    /// term is an error.
    fn get_term_entry(&self, term_id: u64) -> Result<TermEntry, ElectionError> {
        self.find_term_entry(term_id).ok_or_else(|| {
            ElectionError::RecordingLog(AnyError::error(format!("unknown term: {}", term_id)))
        })
    }

    fn is_unknown(&self, term_id: u64) -> bool {
        self.find_term_entry(term_id).is_none()
    }

    fn get_term_timestamp(&self, term_id: u64) -> Result<u64, ElectionError> {
        Ok(self.get_term_entry(term_id)?.timestamp)
    }

    fn append_term(
        &mut self,
        recording_id: u64,
        term_id: u64,
        term_base_log_position: u64,
        timestamp: u64,
    ) -> Result<(), ElectionError>;

    /// Record the position at which `term_id` ended.
    fn commit_log_position(&mut self, term_id: u64, log_position: u64) -> Result<(), ElectionError>;

    fn force(&mut self, level: FileSyncLevel) -> Result<(), ElectionError>;
}
