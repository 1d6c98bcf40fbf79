//! 集成测试共用设施：记录型 mock 传输与测试数据构造
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use url::Url;

use inbox_sync::api::types::{
    BulkAction, BulkPreferenceItem, BulkScope, FilterCount, ListNotificationsQuery,
    ListNotificationsResponse, SessionRequest, SessionResponse, TriggerEventRequest, UpdateAction,
};
use inbox_sync::api::InboxApi;
use inbox_sync::preference::{PreferenceDto, PreferenceLevel};
use inbox_sync::{
    ActionSlot, ChannelMap, ChannelType, EventPayload, InboxClient, InboxConfig, InboxError,
    InboxResult, MemoryStorage, NotificationFilter, Subscription, UnreadCounts,
};
use inbox_sync::notification::{NotificationDto, Subscriber, Workflow};
use inbox_sync::socket::PushTransport;

/// 记录型 mock 传输
///
/// 按内存中的权威存储回答请求，并记录每一次调用，测试据此断言
/// 网络行为（调用次数、分块、是否到达网络）。
#[derive(Default)]
pub struct MockApi {
    pub calls: Mutex<Vec<String>>,
    pub session_requests: Mutex<Vec<SessionRequest>>,
    pub bulk_scopes: Mutex<Vec<(String, BulkScope)>>,
    pub fail_update: AtomicBool,
    pub fail_bulk: AtomicBool,
    store: Mutex<HashMap<String, NotificationDto>>,
    prefs: Mutex<Vec<PreferenceDto>>,
}

impl MockApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn seed_notification(&self, dto: NotificationDto) {
        self.store
            .lock()
            .unwrap()
            .insert(dto.id.clone(), dto);
    }

    pub fn seed_preferences(&self, prefs: Vec<PreferenceDto>) {
        *self.prefs.lock().unwrap() = prefs;
    }

    pub fn call_count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl InboxApi for MockApi {
    async fn create_session(&self, req: &SessionRequest) -> InboxResult<SessionResponse> {
        self.record("session".to_string());
        self.session_requests.lock().unwrap().push(req.clone());
        // 服务端行为：没有 identifier 时签发 keyless 凭证
        let application_identifier = Some(
            req.application_identifier
                .clone()
                .unwrap_or_else(|| "keyless_issued_1".to_string()),
        );
        Ok(SessionResponse {
            token: "tok-1".to_string(),
            application_identifier,
            unread_count: UnreadCounts::default(),
            remove_branding: false,
            is_dev_mode: false,
            max_snooze_duration_hours: Some(72),
        })
    }

    async fn list_notifications(
        &self,
        _query: &ListNotificationsQuery,
    ) -> InboxResult<ListNotificationsResponse> {
        self.record("list".to_string());
        let mut data: Vec<NotificationDto> = self.store.lock().unwrap().values().cloned().collect();
        data.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(ListNotificationsResponse {
            data,
            has_more: false,
        })
    }

    async fn fetch_counts(
        &self,
        filters: &[NotificationFilter],
    ) -> InboxResult<Vec<FilterCount>> {
        self.record("counts".to_string());
        let total = self.store.lock().unwrap().len() as u64;
        Ok(filters
            .iter()
            .map(|f| FilterCount {
                filter: f.clone(),
                count: total,
            })
            .collect())
    }

    async fn update_notification(
        &self,
        id: &str,
        action: &UpdateAction,
    ) -> InboxResult<NotificationDto> {
        self.record(format!("update {} {}", id, action.verb()));
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(InboxError::Network("connection reset".to_string()));
        }
        let mut store = self.store.lock().unwrap();
        let dto = store.get_mut(id).ok_or(InboxError::Api {
            status: 404,
            message: "notification not found".to_string(),
        })?;
        let now = Utc::now();
        let is_complete = matches!(action, UpdateAction::Complete { .. });
        match action {
            UpdateAction::Read => {
                dto.is_read = true;
                dto.read_at = Some(now);
                dto.is_archived = false;
                dto.archived_at = None;
            }
            UpdateAction::Unread => {
                dto.is_read = false;
                dto.read_at = None;
                dto.is_archived = false;
                dto.archived_at = None;
            }
            UpdateAction::Archive => {
                dto.is_archived = true;
                dto.archived_at = Some(now);
                dto.is_read = true;
                dto.read_at = Some(now);
            }
            UpdateAction::Unarchive => {
                dto.is_archived = false;
                dto.archived_at = None;
            }
            UpdateAction::Snooze { snooze_until } => {
                dto.is_snoozed = true;
                dto.snoozed_until = Some(*snooze_until);
            }
            UpdateAction::Unsnooze => {
                dto.is_snoozed = false;
                dto.snoozed_until = None;
            }
            UpdateAction::Complete { action } | UpdateAction::Revert { action } => {
                let button = match action {
                    ActionSlot::Primary => dto.primary_action.as_mut(),
                    ActionSlot::Secondary => dto.secondary_action.as_mut(),
                };
                if let Some(button) = button {
                    button.is_completed = is_complete;
                }
            }
        }
        Ok(dto.clone())
    }

    async fn bulk_update(&self, action: BulkAction, scope: &BulkScope) -> InboxResult<()> {
        self.record(format!("bulk {}", action.verb()));
        if self.fail_bulk.load(Ordering::SeqCst) {
            return Err(InboxError::Network("connection reset".to_string()));
        }
        self.bulk_scopes
            .lock()
            .unwrap()
            .push((action.verb().to_string(), scope.clone()));
        Ok(())
    }

    async fn list_preferences(&self) -> InboxResult<Vec<PreferenceDto>> {
        self.record("prefs".to_string());
        Ok(self.prefs.lock().unwrap().clone())
    }

    async fn update_global_preference(&self, channels: &ChannelMap) -> InboxResult<PreferenceDto> {
        self.record("prefs_global".to_string());
        let mut prefs = self.prefs.lock().unwrap();
        let global = prefs
            .iter_mut()
            .find(|p| p.level == PreferenceLevel::Global)
            .ok_or(InboxError::Api {
                status: 404,
                message: "global preference not found".to_string(),
            })?;
        for (channel, enabled) in channels {
            global.channels.insert(*channel, *enabled);
        }
        Ok(global.clone())
    }

    async fn update_workflow_preference(
        &self,
        workflow_id: &str,
        channels: &ChannelMap,
    ) -> InboxResult<PreferenceDto> {
        self.record(format!("prefs_workflow {workflow_id}"));
        let mut prefs = self.prefs.lock().unwrap();
        let pref = prefs
            .iter_mut()
            .find(|p| {
                p.workflow
                    .as_ref()
                    .map(|w| {
                        w.id.as_deref() == Some(workflow_id) || w.identifier == workflow_id
                    })
                    .unwrap_or(false)
            })
            .ok_or(InboxError::Api {
                status: 404,
                message: "workflow preference not found".to_string(),
            })?;
        for (channel, enabled) in channels {
            pref.channels.insert(*channel, *enabled);
            if !pref.overridden_channels.contains(channel) {
                pref.overridden_channels.push(*channel);
            }
        }
        Ok(pref.clone())
    }

    async fn bulk_update_preferences(
        &self,
        items: &[BulkPreferenceItem],
    ) -> InboxResult<Vec<PreferenceDto>> {
        self.record(format!("prefs_bulk {}", items.len()));
        let mut updated = Vec::with_capacity(items.len());
        for item in items {
            updated.push(
                self.update_workflow_preference(&item.workflow_id, &item.channels)
                    .await?,
            );
        }
        Ok(updated)
    }

    async fn trigger_event(&self, req: &TriggerEventRequest) -> InboxResult<()> {
        self.record(format!("trigger {}", req.workflow_id));
        Ok(())
    }
}

/// 组装一个带 mock 传输与内存存储的客户端
pub fn test_client(api: Arc<MockApi>) -> InboxClient {
    InboxClient::new_for_test(
        InboxConfig::new(),
        api,
        Arc::new(MemoryStorage::new()),
    )
}

/// 记录连接参数的推送传输桩
#[derive(Default)]
pub struct MockTransport {
    pub connect_urls: Mutex<Vec<Url>>,
    pub disconnect_count: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn connect_count(&self) -> usize {
        self.connect_urls.lock().unwrap().len()
    }
}

#[async_trait]
impl PushTransport for MockTransport {
    async fn connect(&self, url: Url) -> InboxResult<()> {
        self.connect_urls.lock().unwrap().push(url);
        Ok(())
    }

    async fn disconnect(&self) {
        self.disconnect_count.fetch_add(1, Ordering::SeqCst);
    }
}

/// 注入推送传输桩的客户端
pub fn transport_client(api: Arc<MockApi>, transport: Arc<MockTransport>) -> InboxClient {
    InboxClient::new_for_test_with_transport(
        InboxConfig::new(),
        api,
        Arc::new(MemoryStorage::new()),
        transport,
    )
}

/// 测试通知构造
pub fn sample_dto(id: &str) -> NotificationDto {
    NotificationDto {
        id: id.to_string(),
        transaction_id: format!("tx-{id}"),
        subject: Some("Build failed".to_string()),
        body: "Pipeline #42 failed on main".to_string(),
        to: Subscriber {
            id: "sub-1".to_string(),
            subscriber_id: Some("alice".to_string()),
            first_name: None,
            last_name: None,
            avatar: None,
        },
        is_read: false,
        is_seen: false,
        is_archived: false,
        is_snoozed: false,
        snoozed_until: None,
        created_at: Utc::now(),
        read_at: None,
        archived_at: None,
        delivered_at: vec![],
        primary_action: None,
        secondary_action: None,
        channel_type: ChannelType::InApp,
        tags: vec![],
        data: None,
        workflow: None,
        severity: inbox_sync::Severity::None,
    }
}

/// 测试偏好构造
pub fn preference_dto(
    level: PreferenceLevel,
    workflow_id: Option<&str>,
    channels: &[(ChannelType, bool)],
    overridden: &[ChannelType],
) -> PreferenceDto {
    PreferenceDto {
        level,
        enabled: true,
        channels: channels.iter().copied().collect(),
        overridden_channels: overridden.to_vec(),
        workflow: workflow_id.map(|id| Workflow {
            id: Some(id.to_string()),
            identifier: format!("{id}-identifier"),
            name: None,
            critical: false,
            tags: vec![],
            severity: None,
        }),
    }
}

/// 订阅事件并记录收到的载荷
pub fn capture_events(
    client: &InboxClient,
    event: &str,
) -> (Subscription, Arc<Mutex<Vec<EventPayload>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let sub = client.on(event, move |payload| {
        sink.lock().unwrap().push(payload.clone());
    });
    (sub, seen)
}
