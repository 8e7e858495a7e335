use pretty_assertions::assert_eq;

use crate::catchup::FollowerLog;
use crate::catchup::follower_subscription_channel;
use crate::catchup::live_destination;
use crate::catchup::replay_destination;
use crate::testing::TestSubscription;

#[test]
fn test_follower_subscription_channel() -> anyhow::Result<()> {
    let channel = follower_subscription_channel("aeron:udp?term-length=64k|control=l:40000", 7, "3,4")?;

    assert_eq!(
        "aeron:udp?term-length=64k|control-mode=manual|group=true|session-id=7|tags=3,4|alias=log",
        channel
    );
    Ok(())
}

#[test]
fn test_destinations() -> anyhow::Result<()> {
    assert_eq!("aeron:udp?endpoint=h2:9003", replay_destination("h2:9003"));

    let live = live_destination("aeron:udp?term-length=64k|control=l:40000", "h2:9002")?;
    assert_eq!("aeron:udp?term-length=64k|endpoint=h2:9002", live);
    Ok(())
}

#[test]
fn test_follower_log_destination_lifecycle() {
    let subscription = TestSubscription::default();
    let mut follower_log = FollowerLog::<TestSubscription>::new();

    // Without a subscription there is nothing to detach.
    assert!(!follower_log.remove_live_destination());

    follower_log.subscription = Some(subscription.clone());
    follower_log.add_live_destination("aeron:udp?endpoint=h:1".to_string());

    assert_eq!(vec!["aeron:udp?endpoint=h:1".to_string()], subscription.added());
    assert_eq!(Some("aeron:udp?endpoint=h:1".to_string()), follower_log.live_destination);

    assert!(follower_log.remove_live_destination());
    assert_eq!(vec!["aeron:udp?endpoint=h:1".to_string()], subscription.removed());
    assert_eq!(None, follower_log.live_destination);

    follower_log.close();
    assert!(follower_log.subscription.is_none());
}
