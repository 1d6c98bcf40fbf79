//! 偏好解析与扇出测试

mod common;

use std::sync::Arc;

use common::{capture_events, preference_dto, test_client, MockApi};
use inbox_sync::preference::{PreferenceLevel, PreferenceUpdate};
use inbox_sync::{events, ChannelMap, ChannelType, InboxError, InitializeArgs};

fn global_and_three_templates() -> Vec<inbox_sync::preference::PreferenceDto> {
    vec![
        preference_dto(
            PreferenceLevel::Global,
            None,
            &[(ChannelType::Email, true), (ChannelType::Sms, true)],
            &[],
        ),
        preference_dto(
            PreferenceLevel::Template,
            Some("wf-a"),
            &[(ChannelType::Email, true)],
            &[],
        ),
        // email 被订阅者显式关过 → 全局扇出跳过
        preference_dto(
            PreferenceLevel::Template,
            Some("wf-b"),
            &[(ChannelType::Email, false)],
            &[ChannelType::Email],
        ),
        // 模板上没有 email 键 → 扇出不添加
        preference_dto(
            PreferenceLevel::Template,
            Some("wf-c"),
            &[(ChannelType::Sms, true)],
            &[],
        ),
    ]
}

async fn initialized_client(api: Arc<MockApi>) -> inbox_sync::InboxClient {
    let client = test_client(api);
    client
        .initialize(InitializeArgs::new("alice"))
        .await
        .expect("session should initialize");
    client
}

#[tokio::test]
async fn test_global_update_fans_out_to_templates() {
    let api = MockApi::new();
    api.seed_preferences(global_and_three_templates());
    let client = initialized_client(Arc::clone(&api)).await;
    client.list_preferences().await.unwrap();

    let change: ChannelMap = [(ChannelType::Email, false)].into_iter().collect();
    client.update_preference(None, change).await.unwrap();

    let cached = client.cached_preferences();
    let find = |id: &str| {
        cached
            .iter()
            .find(|p| p.workflow().and_then(|w| w.id.as_deref()) == Some(id))
            .unwrap()
    };
    let global = cached
        .iter()
        .find(|p| p.level() == PreferenceLevel::Global)
        .unwrap();

    assert_eq!(global.channels()[&ChannelType::Email], false);
    // wf-a：未显式设置 → 扇出生效
    assert_eq!(find("wf-a").channels()[&ChannelType::Email], false);
    // wf-b：显式设置过 → 保持原值
    assert_eq!(find("wf-b").channels()[&ChannelType::Email], false);
    assert!(find("wf-b").is_overridden(ChannelType::Email));
    // wf-c：模板上没有该渠道键 → 不添加
    assert!(!find("wf-c").channels().contains_key(&ChannelType::Email));
    // 只发了一次全局请求，扇出纯本地
    assert_eq!(api.call_count("prefs_global"), 1);
    assert_eq!(api.call_count("prefs_workflow"), 0);
}

#[tokio::test]
async fn test_fanout_does_not_mark_templates_overridden() {
    let api = MockApi::new();
    api.seed_preferences(global_and_three_templates());
    let client = initialized_client(api).await;
    client.list_preferences().await.unwrap();

    let change: ChannelMap = [(ChannelType::Sms, false)].into_iter().collect();
    client.update_preference(None, change).await.unwrap();

    let cached = client.cached_preferences();
    let wf_c = cached
        .iter()
        .find(|p| p.workflow().and_then(|w| w.id.as_deref()) == Some("wf-c"))
        .unwrap();
    assert_eq!(wf_c.channels()[&ChannelType::Sms], false);
    // 扇出合并不等于订阅者显式设置
    assert!(!wf_c.is_overridden(ChannelType::Sms));
}

#[tokio::test]
async fn test_workflow_update_replaces_single_row() {
    let api = MockApi::new();
    api.seed_preferences(global_and_three_templates());
    let client = initialized_client(Arc::clone(&api)).await;
    client.list_preferences().await.unwrap();

    let change: ChannelMap = [(ChannelType::Email, false)].into_iter().collect();
    let updated = client.update_preference(Some("wf-a"), change).await.unwrap();

    assert_eq!(updated.channels()[&ChannelType::Email], false);
    assert!(updated.is_overridden(ChannelType::Email));
    assert_eq!(api.call_count("prefs_workflow wf-a"), 1);

    // 其他行不受影响
    let cached = client.cached_preferences();
    let global = cached
        .iter()
        .find(|p| p.level() == PreferenceLevel::Global)
        .unwrap();
    assert_eq!(global.channels()[&ChannelType::Email], true);
}

#[tokio::test]
async fn test_bulk_update_rejects_global_targets_locally() {
    let api = MockApi::new();
    api.seed_preferences(global_and_three_templates());
    let client = initialized_client(Arc::clone(&api)).await;
    client.list_preferences().await.unwrap();
    let calls_before = api.calls.lock().unwrap().len();

    let cached = client.cached_preferences();
    let global = cached
        .iter()
        .find(|p| p.level() == PreferenceLevel::Global)
        .unwrap()
        .clone();
    let updates = vec![PreferenceUpdate {
        preference: global,
        channels: [(ChannelType::Email, false)].into_iter().collect(),
    }];

    let result = client.bulk_update_preferences(updates).await;

    assert!(matches!(result, Err(InboxError::InvalidArgument(_))));
    // 本地拒绝：没有发出任何网络请求
    assert_eq!(api.calls.lock().unwrap().len(), calls_before);
}

#[tokio::test]
async fn test_bulk_update_workflow_targets() {
    let api = MockApi::new();
    api.seed_preferences(global_and_three_templates());
    let client = initialized_client(Arc::clone(&api)).await;
    client.list_preferences().await.unwrap();

    let (sub, resolved) = capture_events(
        &client,
        &events::resolved(events::PREFERENCES_BULK_UPDATE),
    );

    let cached = client.cached_preferences();
    let template = |id: &str| {
        cached
            .iter()
            .find(|p| p.workflow().and_then(|w| w.id.as_deref()) == Some(id))
            .unwrap()
            .clone()
    };
    let updates = vec![
        PreferenceUpdate {
            preference: template("wf-a"),
            channels: [(ChannelType::Email, false)].into_iter().collect(),
        },
        PreferenceUpdate {
            preference: template("wf-c"),
            channels: [(ChannelType::Sms, false)].into_iter().collect(),
        },
    ];

    let canonical = client.bulk_update_preferences(updates).await.unwrap();

    assert_eq!(canonical.len(), 2);
    assert_eq!(api.call_count("prefs_bulk 2"), 1);
    assert_eq!(resolved.lock().unwrap().len(), 1);
    sub.unsubscribe();
}
