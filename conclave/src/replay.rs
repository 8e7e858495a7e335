//! Replay of the locally recorded log between two positions.
//!
//! The replay is an embedded sub-task of the election: created when a replay
//! phase is entered, polled once per tick, dropped when the stream position
//! reaches the stop position. Where the replayed fragments come from and
//! where they are delivered is the host's business, behind [`ReplaySource`].

use crate::error::ElectionError;

/// Fragments consumed from the source per poll.
const FRAGMENT_LIMIT: usize = 10;

/// A host-provided stream of recorded log fragments.
pub trait ReplaySource {
    /// Begin replaying `[start_position, stop_position)`.
    fn start(&mut self, start_position: u64, stop_position: u64) -> Result<(), ElectionError>;

    /// Deliver up to `limit` pending fragments, returning how many were
    /// consumed.
    fn poll(&mut self, limit: usize) -> Result<usize, ElectionError>;

    /// The stream position reached so far.
    fn position(&self) -> u64;
}

/// The replay sub-task: non-blocking, polled each tick while present.
#[derive(Debug)]
pub struct LogReplay<S> {
    source: S,
    start_position: u64,
    stop_position: u64,
    is_started: bool,
}

impl<S: ReplaySource> LogReplay<S> {
    pub fn new(source: S, start_position: u64, stop_position: u64) -> Self {
        Self {
            source,
            start_position,
            stop_position,
            is_started: false,
        }
    }

    pub fn do_work(&mut self) -> Result<usize, ElectionError> {
        if !self.is_started {
            self.source.start(self.start_position, self.stop_position)?;
            self.is_started = true;
            return Ok(1);
        }

        if self.is_done() {
            return Ok(0);
        }

        self.source.poll(FRAGMENT_LIMIT)
    }

    pub fn is_done(&self) -> bool {
        self.is_started && self.source.position() >= self.stop_position
    }

    pub fn start_position(&self) -> u64 {
        self.start_position
    }

    pub fn stop_position(&self) -> u64 {
        self.stop_position
    }
}
