//! Traits connecting the election to the cluster control stream.

use crate::member::MemberId;
use crate::message::ElectionMessage;

/// Outbound side of the control stream, owning one publication per member.
///
/// Sends are non-blocking with try semantics: `false` means the message was
/// not accepted (e.g. back pressure or a disconnected peer) and the caller
/// retries on a later tick.
pub trait ConsensusPublisher {
    fn try_send(&mut self, to: MemberId, msg: ElectionMessage) -> bool;
}

/// Inbound side of the control stream.
///
/// The election drains a bounded batch per tick, so the state machine stays
/// purely input-driven and can be tested with scripted inputs.
pub trait ConsensusAdapter {
    fn poll_next(&mut self) -> Option<ElectionMessage>;
}
