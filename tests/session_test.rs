//! 会话生命周期测试：keyless 回退、持久化与身份切换

mod common;

use std::sync::Arc;

use common::{sample_dto, test_client, MockApi};
use inbox_sync::storage::KEYLESS_STORAGE_KEY;
use inbox_sync::{
    InboxClient, InboxConfig, InitializeArgs, KeyValueStorage, MemoryStorage, NotificationFilter,
};

#[tokio::test]
async fn test_keyless_identifier_issued_and_persisted() {
    let api = MockApi::new();
    let storage = Arc::new(MemoryStorage::new());
    let client = InboxClient::new_for_test(
        InboxConfig::new(),
        Arc::clone(&api) as Arc<dyn inbox_sync::api::InboxApi>,
        Arc::clone(&storage) as Arc<dyn KeyValueStorage>,
    );

    let session = client.initialize(InitializeArgs::new("alice")).await.unwrap();

    assert!(session.is_keyless());
    assert_eq!(
        storage.get(KEYLESS_STORAGE_KEY),
        Some("keyless_issued_1".to_string())
    );
}

#[tokio::test]
async fn test_stored_keyless_identifier_reused_across_clients() {
    let api = MockApi::new();
    let storage = Arc::new(MemoryStorage::new());
    let first = InboxClient::new_for_test(
        InboxConfig::new(),
        Arc::clone(&api) as Arc<dyn inbox_sync::api::InboxApi>,
        Arc::clone(&storage) as Arc<dyn KeyValueStorage>,
    );
    first.initialize(InitializeArgs::new("alice")).await.unwrap();

    // 第二个客户端共享同一存储 → 带着已签发的 keyless id 发请求
    let second = InboxClient::new_for_test(
        InboxConfig::new(),
        Arc::clone(&api) as Arc<dyn inbox_sync::api::InboxApi>,
        Arc::clone(&storage) as Arc<dyn KeyValueStorage>,
    );
    second.initialize(InitializeArgs::new("alice")).await.unwrap();

    let requests = api.session_requests.lock().unwrap();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].application_identifier, None);
    assert_eq!(
        requests[1].application_identifier,
        Some("keyless_issued_1".to_string())
    );
}

#[tokio::test]
async fn test_explicit_identifier_clears_stored_keyless() {
    let api = MockApi::new();
    let storage = Arc::new(MemoryStorage::new());
    storage
        .set(KEYLESS_STORAGE_KEY, "keyless_stale")
        .unwrap();
    let client = InboxClient::new_for_test(
        InboxConfig::new(),
        Arc::clone(&api) as Arc<dyn inbox_sync::api::InboxApi>,
        Arc::clone(&storage) as Arc<dyn KeyValueStorage>,
    );

    let session = client
        .initialize(InitializeArgs::new("alice").with_application_identifier("prod-app"))
        .await
        .unwrap();

    assert!(!session.is_keyless());
    assert_eq!(storage.get(KEYLESS_STORAGE_KEY), None);
    let requests = api.session_requests.lock().unwrap();
    assert_eq!(
        requests[0].application_identifier,
        Some("prod-app".to_string())
    );
}

#[tokio::test]
async fn test_initialize_is_noop_for_same_identity() {
    let api = MockApi::new();
    let client = test_client(Arc::clone(&api));

    client.initialize(InitializeArgs::new("alice")).await.unwrap();
    client.initialize(InitializeArgs::new("alice")).await.unwrap();

    assert_eq!(api.call_count("session"), 1);
}

#[tokio::test]
async fn test_subscriber_switch_invalidates_cache() {
    let api = MockApi::new();
    api.seed_notification(sample_dto("n-1"));
    let client = test_client(Arc::clone(&api));
    client.initialize(InitializeArgs::new("alice")).await.unwrap();

    let filter = NotificationFilter::new();
    client.list_notifications(&filter, None, None).await.unwrap();
    assert!(client.cached(&filter).is_some());

    client.initialize(InitializeArgs::new("bob")).await.unwrap();

    // 旧订阅者的缓存作废
    assert!(client.cached(&filter).is_none());
    assert_eq!(api.call_count("session"), 2);
}

#[tokio::test]
async fn test_failed_initialize_returns_none() {
    struct FailingApi;

    #[async_trait::async_trait]
    impl inbox_sync::api::InboxApi for FailingApi {
        async fn create_session(
            &self,
            _req: &inbox_sync::api::types::SessionRequest,
        ) -> inbox_sync::InboxResult<inbox_sync::api::types::SessionResponse> {
            Err(inbox_sync::InboxError::Network("unreachable".to_string()))
        }
        async fn list_notifications(
            &self,
            _query: &inbox_sync::api::types::ListNotificationsQuery,
        ) -> inbox_sync::InboxResult<inbox_sync::api::types::ListNotificationsResponse> {
            unimplemented!()
        }
        async fn fetch_counts(
            &self,
            _filters: &[NotificationFilter],
        ) -> inbox_sync::InboxResult<Vec<inbox_sync::api::types::FilterCount>> {
            unimplemented!()
        }
        async fn update_notification(
            &self,
            _id: &str,
            _action: &inbox_sync::api::types::UpdateAction,
        ) -> inbox_sync::InboxResult<inbox_sync::notification::NotificationDto> {
            unimplemented!()
        }
        async fn bulk_update(
            &self,
            _action: inbox_sync::api::types::BulkAction,
            _scope: &inbox_sync::api::types::BulkScope,
        ) -> inbox_sync::InboxResult<()> {
            unimplemented!()
        }
        async fn list_preferences(
            &self,
        ) -> inbox_sync::InboxResult<Vec<inbox_sync::preference::PreferenceDto>> {
            unimplemented!()
        }
        async fn update_global_preference(
            &self,
            _channels: &inbox_sync::ChannelMap,
        ) -> inbox_sync::InboxResult<inbox_sync::preference::PreferenceDto> {
            unimplemented!()
        }
        async fn update_workflow_preference(
            &self,
            _workflow_id: &str,
            _channels: &inbox_sync::ChannelMap,
        ) -> inbox_sync::InboxResult<inbox_sync::preference::PreferenceDto> {
            unimplemented!()
        }
        async fn bulk_update_preferences(
            &self,
            _items: &[inbox_sync::api::types::BulkPreferenceItem],
        ) -> inbox_sync::InboxResult<Vec<inbox_sync::preference::PreferenceDto>> {
            unimplemented!()
        }
        async fn trigger_event(
            &self,
            _req: &inbox_sync::api::types::TriggerEventRequest,
        ) -> inbox_sync::InboxResult<()> {
            unimplemented!()
        }
    }

    let client = InboxClient::new_for_test(
        InboxConfig::new(),
        Arc::new(FailingApi),
        Arc::new(MemoryStorage::new()),
    );

    // 初始化失败不 panic，返回 None，错误已被记录
    assert!(client.initialize(InitializeArgs::new("alice")).await.is_none());
    assert!(client.session().is_none());
}
