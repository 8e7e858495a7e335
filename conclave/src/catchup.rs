//! Follower-side log plumbing for the catch-up phase.
//!
//! A follower that must replay missed entries subscribes to the log in
//! manual destination control mode, attaches a replay destination fed from
//! the leader's archive, and later swaps in the live destination once the
//! catch-up draws near the live stream.

use crate::channel::ALIAS_PARAM;
use crate::channel::ChannelUri;
use crate::channel::ENDPOINT_PARAM;
use crate::channel::GROUP_PARAM;
use crate::channel::MDC_CONTROL_MODE_MANUAL;
use crate::channel::MDC_CONTROL_MODE_PARAM;
use crate::channel::MDC_CONTROL_PARAM;
use crate::channel::SESSION_ID_PARAM;
use crate::channel::TAGS_PARAM;
use crate::error::ElectionError;

/// A handle on the follower's log subscription, owned by the agent.
///
/// Destination changes are asynchronous on the transport; the trait only
/// requires that they are eventually applied.
pub trait LogSubscription {
    fn add_destination(&mut self, channel: &str);
    fn remove_destination(&mut self, channel: &str);
}

/// The channel for a follower's log subscription: multi-destination in
/// manual control mode, grouped, pinned to the leader's log session.
pub fn follower_subscription_channel(
    log_channel: &str,
    log_session_id: i32,
    tags: &str,
) -> Result<String, ElectionError> {
    let mut uri = ChannelUri::parse(log_channel)?;
    uri.remove(MDC_CONTROL_PARAM);
    uri.put(MDC_CONTROL_MODE_PARAM, MDC_CONTROL_MODE_MANUAL);
    uri.put(GROUP_PARAM, "true");
    uri.put(SESSION_ID_PARAM, &log_session_id.to_string());
    uri.put(TAGS_PARAM, tags);
    uri.put(ALIAS_PARAM, "log");

    Ok(uri.to_string())
}

/// The destination on which replayed entries arrive from the leader.
pub fn replay_destination(transfer_endpoint: &str) -> String {
    format!("aeron:udp?endpoint={}", transfer_endpoint)
}

/// The live log destination: the configured log channel pointed at this
/// member's own log endpoint.
pub fn live_destination(log_channel: &str, log_endpoint: &str) -> Result<String, ElectionError> {
    let mut uri = ChannelUri::parse(log_channel)?;
    uri.remove(MDC_CONTROL_PARAM);
    uri.put(ENDPOINT_PARAM, log_endpoint);

    Ok(uri.to_string())
}

/// The follower's transport resources, spanning the catch-up and transition
/// phases. Dropped before the election closes.
#[derive(Debug)]
pub(crate) struct FollowerLog<S> {
    pub(crate) subscription: Option<S>,
    pub(crate) live_destination: Option<String>,
}

impl<S: LogSubscription> FollowerLog<S> {
    pub(crate) fn new() -> Self {
        Self {
            subscription: None,
            live_destination: None,
        }
    }

    pub(crate) fn add_live_destination(&mut self, destination: String) {
        if let Some(subscription) = self.subscription.as_mut() {
            subscription.add_destination(&destination);
        }
        self.live_destination = Some(destination);
    }

    /// Detach the live destination if attached, returning whether it was.
    pub(crate) fn remove_live_destination(&mut self) -> bool {
        match self.live_destination.take() {
            Some(destination) => {
                if let Some(subscription) = self.subscription.as_mut() {
                    subscription.remove_destination(&destination);
                }
                true
            }
            None => false,
        }
    }

    pub(crate) fn close(&mut self) {
        self.live_destination = None;
        self.subscription = None;
    }
}
