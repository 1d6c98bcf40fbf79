//! 单条/批量通知动作的端到端流程测试
//!
//! 覆盖乐观更新协议：pending 先于网络、resolved 恰好一次、
//! 失败以 Err 返回且 resolved 携带错误。

mod common;

use chrono::{Duration, Utc};

use common::{capture_events, sample_dto, test_client, MockApi};
use inbox_sync::{events, EventData, InboxError, InitializeArgs, NotificationFilter};

async fn initialized_client(api: std::sync::Arc<MockApi>) -> inbox_sync::InboxClient {
    let client = test_client(api);
    client
        .initialize(InitializeArgs::new("alice"))
        .await
        .expect("session should initialize");
    client
}

#[tokio::test]
async fn test_read_marks_read_and_unarchives() {
    let api = MockApi::new();
    let mut dto = sample_dto("n-1");
    dto.is_archived = true;
    dto.archived_at = Some(Utc::now());
    api.seed_notification(dto);
    let client = initialized_client(api).await;

    let updated = client.read("n-1").await.unwrap();

    assert!(updated.is_read());
    assert!(updated.read_at().is_some());
    assert!(!updated.is_archived());
    assert!(updated.archived_at().is_none());
}

#[tokio::test]
async fn test_action_emits_pending_then_resolved() {
    let api = MockApi::new();
    api.seed_notification(sample_dto("n-1"));
    let client = initialized_client(std::sync::Arc::clone(&api)).await;

    let (pending_sub, pending) =
        capture_events(&client, &events::pending(events::NOTIFICATION_READ));
    let (resolved_sub, resolved) =
        capture_events(&client, &events::resolved(events::NOTIFICATION_READ));

    client.read("n-1").await.unwrap();

    let pending = pending.lock().unwrap();
    let resolved = resolved.lock().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(resolved.len(), 1);
    assert!(resolved[0].error.is_none());
    match &resolved[0].data {
        Some(EventData::Notification(n)) => assert!(n.is_read()),
        other => panic!("expected notification payload, got {other:?}"),
    }
    drop(pending);
    drop(resolved);
    pending_sub.unsubscribe();
    resolved_sub.unsubscribe();
}

#[tokio::test]
async fn test_pending_carries_optimistic_projection_for_instances() {
    let api = MockApi::new();
    api.seed_notification(sample_dto("n-1"));
    let client = initialized_client(std::sync::Arc::clone(&api)).await;
    let page = client
        .list_notifications(&NotificationFilter::new(), None, None)
        .await
        .unwrap();
    let notification = page.notifications[0].clone();

    let (sub, pending) = capture_events(&client, &events::pending(events::NOTIFICATION_READ));
    notification.read().await.unwrap();

    let pending = pending.lock().unwrap();
    assert_eq!(pending.len(), 1);
    // 实例在手 → pending 带本地可算的乐观投影
    match &pending[0].data {
        Some(EventData::Notification(n)) => {
            assert!(n.is_read());
            assert!(!n.is_archived());
        }
        other => panic!("expected optimistic notification, got {other:?}"),
    }
    drop(pending);
    sub.unsubscribe();

    // 原实例保持不变（不可变值对象）
    assert!(!notification.is_read());
}

#[tokio::test]
async fn test_unsnooze_always_issues_network_call() {
    let api = MockApi::new();
    let mut dto = sample_dto("n-1");
    dto.is_snoozed = false;
    api.seed_notification(dto);
    let client = initialized_client(std::sync::Arc::clone(&api)).await;

    // 已经是未暂缓状态，调用仍然照常走网络（幂等，不做本地短路）
    client.unsnooze("n-1").await.unwrap();
    client.unsnooze("n-1").await.unwrap();

    assert_eq!(api.call_count("update n-1 unsnooze"), 2);
}

#[tokio::test]
async fn test_snooze_round_trips_until() {
    let api = MockApi::new();
    api.seed_notification(sample_dto("n-1"));
    let client = initialized_client(api).await;

    let until = Utc::now() + Duration::hours(4);
    let updated = client.snooze("n-1", until).await.unwrap();

    assert!(updated.is_snoozed());
    assert_eq!(updated.snoozed_until(), Some(until));
}

#[tokio::test]
async fn test_failed_action_returns_error_and_resolved_carries_it() {
    let api = MockApi::new();
    api.seed_notification(sample_dto("n-1"));
    api.fail_update
        .store(true, std::sync::atomic::Ordering::SeqCst);
    let client = initialized_client(std::sync::Arc::clone(&api)).await;

    let (sub, resolved) = capture_events(&client, &events::resolved(events::NOTIFICATION_READ));
    let result = client.read("n-1").await;

    assert!(matches!(result, Err(InboxError::Network(_))));
    let resolved = resolved.lock().unwrap();
    assert_eq!(resolved.len(), 1);
    assert!(resolved[0].error.is_some());
    drop(resolved);
    sub.unsubscribe();
}

#[tokio::test]
async fn test_actions_require_session() {
    let api = MockApi::new();
    api.seed_notification(sample_dto("n-1"));
    let client = test_client(std::sync::Arc::clone(&api));

    let result = client.read("n-1").await;

    assert!(matches!(result, Err(InboxError::NoSession)));
    assert_eq!(api.call_count("update"), 0);
}

#[tokio::test]
async fn test_list_populates_filter_cache() {
    let api = MockApi::new();
    api.seed_notification(sample_dto("n-1"));
    api.seed_notification(sample_dto("n-2"));
    let client = initialized_client(api).await;

    let filter = NotificationFilter::new();
    assert!(client.cached(&filter).is_none());

    let page = client.list_notifications(&filter, None, None).await.unwrap();
    assert_eq!(page.notifications.len(), 2);

    let entry = client.cached(&filter).expect("cache entry after fetch");
    assert_eq!(entry.notifications.len(), 2);
    assert!(!entry.has_more);
}

#[tokio::test]
async fn test_archive_all_read_only_touches_read_items() {
    let api = MockApi::new();
    let mut read_dto = sample_dto("n-read");
    read_dto.is_read = true;
    read_dto.read_at = Some(Utc::now());
    api.seed_notification(read_dto);
    api.seed_notification(sample_dto("n-unread"));
    let client = initialized_client(std::sync::Arc::clone(&api)).await;

    let filter = NotificationFilter::new();
    client.list_notifications(&filter, None, None).await.unwrap();

    let batch = client.archive_all_read(&filter).await.unwrap();

    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].id(), "n-read");
    assert!(batch[0].is_archived());
    assert_eq!(api.call_count("bulk read-archive"), 1);
}

#[tokio::test]
async fn test_trigger_requires_keyless_session() {
    let api = MockApi::new();
    let client = test_client(std::sync::Arc::clone(&api));
    // 显式 identifier → 非 keyless
    client
        .initialize(InitializeArgs::new("alice").with_application_identifier("prod-app"))
        .await
        .unwrap();

    let result = client.trigger("welcome", None).await;

    assert!(matches!(result, Err(InboxError::InvalidArgument(_))));
    assert_eq!(api.call_count("trigger"), 0);
}

#[tokio::test]
async fn test_trigger_in_keyless_mode() {
    let api = MockApi::new();
    let client = test_client(std::sync::Arc::clone(&api));
    client.initialize(InitializeArgs::new("alice")).await.unwrap();
    assert!(client.session().unwrap().is_keyless());

    client.trigger("welcome", None).await.unwrap();

    assert_eq!(api.call_count("trigger welcome"), 1);
}
