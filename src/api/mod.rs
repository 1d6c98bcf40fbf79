//! 传输层 - 一次性 REST 调用
//!
//! `InboxApi` 是传输接缝：生产实现为 reqwest 的 `HttpInboxApi`，
//! 测试注入记录型 mock。所有方法返回 `InboxResult`，失败不 panic。

pub mod client;
pub mod types;

use async_trait::async_trait;

use crate::error::InboxResult;
use crate::notification::{ChannelMap, NotificationDto, NotificationFilter};
use crate::preference::PreferenceDto;
use types::{
    BulkAction, BulkPreferenceItem, BulkScope, FilterCount, ListNotificationsQuery,
    ListNotificationsResponse, SessionRequest, SessionResponse, TriggerEventRequest, UpdateAction,
};

/// REST 表面（base path `/inbox`）
#[async_trait]
pub trait InboxApi: Send + Sync {
    /// 注入/替换会话令牌（bootstrap 后由 Session Manager 调用）
    fn set_token(&self, _token: Option<String>) {}

    /// POST /session
    async fn create_session(&self, req: &SessionRequest) -> InboxResult<SessionResponse>;

    /// GET /notifications
    async fn list_notifications(
        &self,
        query: &ListNotificationsQuery,
    ) -> InboxResult<ListNotificationsResponse>;

    /// GET /notifications/count
    async fn fetch_counts(
        &self,
        filters: &[NotificationFilter],
    ) -> InboxResult<Vec<FilterCount>>;

    /// PATCH /notifications/{id}/{verb}
    async fn update_notification(
        &self,
        id: &str,
        action: &UpdateAction,
    ) -> InboxResult<NotificationDto>;

    /// POST /notifications/{verb}（批量，服务端不返回逐项载荷）
    async fn bulk_update(&self, action: BulkAction, scope: &BulkScope) -> InboxResult<()>;

    /// GET /preferences
    async fn list_preferences(&self) -> InboxResult<Vec<PreferenceDto>>;

    /// PATCH /preferences（全局）
    async fn update_global_preference(
        &self,
        channels: &ChannelMap,
    ) -> InboxResult<PreferenceDto>;

    /// PATCH /preferences/{workflowId}
    async fn update_workflow_preference(
        &self,
        workflow_id: &str,
        channels: &ChannelMap,
    ) -> InboxResult<PreferenceDto>;

    /// PATCH /preferences/bulk
    async fn bulk_update_preferences(
        &self,
        items: &[BulkPreferenceItem],
    ) -> InboxResult<Vec<PreferenceDto>>;

    /// POST /events（keyless 演示触发）
    async fn trigger_event(&self, req: &TriggerEventRequest) -> InboxResult<()>;
}

pub use client::HttpInboxApi;
