//! 通知广播测试
//!
//! 验证发布不阻塞、慢订阅者丢事件以及断开的订阅者被移除

use site_vitals::notification::{Notifier, PublishReport, SubscriberState};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_publish_with_zero_subscribers_returns_immediately() {
    let notifier = Notifier::default();

    let report = tokio::time::timeout(Duration::from_millis(100), async {
        notifier.publish(notifier.next_event(0))
    })
    .await
    .unwrap();

    assert_eq!(report, PublishReport::default());
}

#[tokio::test]
async fn test_full_subscriber_does_not_block_others() {
    let notifier = Notifier::new(2);
    let _stalled = notifier.subscribe();
    let mut active = notifier.subscribe();

    // 填满 stalled 的队列
    notifier.publish(notifier.next_event(1));
    notifier.publish(notifier.next_event(1));
    assert_eq!(active.recv().await.unwrap().sequence, 1);
    assert_eq!(active.recv().await.unwrap().sequence, 2);

    let report = tokio::time::timeout(Duration::from_millis(100), async {
        notifier.publish(notifier.next_event(1))
    })
    .await
    .unwrap();

    assert_eq!(report.delivered, 1);
    assert_eq!(report.dropped, 1);
    assert_eq!(active.recv().await.unwrap().sequence, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_subscribe_and_publish() {
    let notifier = Arc::new(Notifier::new(64));
    let mut handles = Vec::new();

    for _ in 0..8 {
        let notifier = Arc::clone(&notifier);
        handles.push(tokio::spawn(async move {
            let mut subscription = notifier.subscribe();
            let mut received = 0;
            while received < 5 {
                if subscription.recv().await.is_none() {
                    break;
                }
                received += 1;
            }
            notifier.unsubscribe(&subscription);
            received
        }));
    }

    // 等所有订阅者登记完成
    while notifier.subscriber_count() < 8 {
        tokio::task::yield_now().await;
    }
    for _ in 0..5 {
        notifier.publish(notifier.next_event(0));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap(), 5);
    }
    assert_eq!(notifier.subscriber_count(), 0);
}

#[tokio::test]
async fn test_subscription_lifecycle() {
    let notifier = Notifier::default();
    let subscription = notifier.subscribe();
    assert_eq!(subscription.state(), SubscriberState::Active);
    assert_eq!(notifier.subscriber_count(), 1);

    notifier.unsubscribe(&subscription);
    assert_eq!(subscription.state(), SubscriberState::Closed);
    assert_eq!(notifier.subscriber_count(), 0);

    // 退订后发布不会投递，也不会出错
    let report = notifier.publish(notifier.next_event(0));
    assert_eq!(report, PublishReport::default());
}
