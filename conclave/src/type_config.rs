//! Bundle of host-supplied types an election is built over.

use crate::agent::ConsensusAgent;
use crate::catchup::LogSubscription;
use crate::mark_file::ClusterMarkFile;
use crate::network::ConsensusAdapter;
use crate::network::ConsensusPublisher;
use crate::recording_log::RecordingLog;
use crate::replay::ReplaySource;

/// Configuration of types for one election deployment.
///
/// Collecting the host's implementations under a single marker type keeps
/// [`Election`](crate::Election) to one type parameter. A deployment defines
/// an empty struct and wires its implementations in:
///
/// ```ignore
/// struct Prod;
///
/// impl ElectionTypeConfig for Prod {
///     type Agent = ProdAgent;
///     type Publisher = ControlStreamPublisher;
///     type Adapter = ControlStreamAdapter;
///     type MarkFile = conclave::FileMarkFile;
///     type RecordingLog = ArchiveRecordingLog;
///     type Subscription = ArchiveSubscription;
///     type ReplaySource = ArchiveReplaySource;
/// }
/// ```
pub trait ElectionTypeConfig: Sized + 'static {
    /// The consensus agent owning the global run loop.
    type Agent: ConsensusAgent<Self>;

    /// Outbound control stream.
    type Publisher: ConsensusPublisher;

    /// Inbound control stream.
    type Adapter: ConsensusAdapter;

    /// Durable candidate term record.
    type MarkFile: ClusterMarkFile;

    /// Durable term index.
    type RecordingLog: RecordingLog;

    /// Follower log subscription handle.
    type Subscription: LogSubscription;

    /// Recorded log fragments for replay.
    type ReplaySource: ReplaySource;
}
