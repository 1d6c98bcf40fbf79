//! 惰性推送连接测试：订阅兴趣与会话令牌双条件门控

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::{transport_client, MockApi, MockTransport};
use inbox_sync::{events, InitializeArgs};

#[tokio::test]
async fn test_connection_deferred_until_session_exists() {
    let api = MockApi::new();
    let transport = MockTransport::new();
    let client = transport_client(api, Arc::clone(&transport));

    let _sub = client.on(events::NOTIFICATION_RECEIVED, |_| {});
    tokio::time::sleep(Duration::from_millis(20)).await;
    // 有兴趣但还没有令牌 → 不连接
    assert_eq!(transport.connect_count(), 0);

    client.initialize(InitializeArgs::new("alice")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(transport.connect_count(), 1);
    let urls = transport.connect_urls.lock().unwrap();
    assert_eq!(urls[0].query(), Some("token=tok-1"));
}

#[tokio::test]
async fn test_non_socket_subscription_never_connects() {
    let api = MockApi::new();
    let transport = MockTransport::new();
    let client = transport_client(api, Arc::clone(&transport));

    client.initialize(InitializeArgs::new("alice")).await.unwrap();
    let _sub = client.on(&events::resolved(events::NOTIFICATION_READ), |_| {});
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(transport.connect_count(), 0);
}

#[tokio::test]
async fn test_single_connection_shared_across_subscribers() {
    let api = MockApi::new();
    let transport = MockTransport::new();
    let client = transport_client(api, Arc::clone(&transport));

    let _received = client.on(events::NOTIFICATION_RECEIVED, |_| {});
    client.initialize(InitializeArgs::new("alice")).await.unwrap();
    let _unseen = client.on(events::UNSEEN_COUNT_CHANGED, |_| {});
    let _unread = client.on(events::UNREAD_COUNT_CHANGED, |_| {});
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(transport.connect_count(), 1);
}

#[tokio::test]
async fn test_disconnect_then_resubscribe_reconnects() {
    let api = MockApi::new();
    let transport = MockTransport::new();
    let client = transport_client(api, Arc::clone(&transport));

    let _sub = client.on(events::NOTIFICATION_RECEIVED, |_| {});
    client.initialize(InitializeArgs::new("alice")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(transport.connect_count(), 1);

    client.disconnect_socket().await;
    assert_eq!(transport.disconnect_count.load(Ordering::SeqCst), 1);

    // 断开后再次订阅重新建立连接
    let _resub = client.on(events::UNSEEN_COUNT_CHANGED, |_| {});
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(transport.connect_count(), 2);
}
