//! REST 请求/响应线格式

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::notification::{ActionSlot, ChannelMap, NotificationDto, NotificationFilter};
use crate::session::UnreadCounts;

/// POST /inbox/session 请求体
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_identifier: Option<String>,
    pub subscriber_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscriber_hash: Option<String>,
}

/// POST /inbox/session 响应体
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub token: String,
    /// 服务端解析后的 application identifier；keyless 模式下带
    /// `keyless_` 前缀
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_identifier: Option<String>,
    #[serde(default)]
    pub unread_count: UnreadCounts,
    #[serde(default)]
    pub remove_branding: bool,
    #[serde(default)]
    pub is_dev_mode: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_snooze_duration_hours: Option<u32>,
}

/// GET /inbox/notifications 查询参数
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListNotificationsQuery {
    #[serde(flatten)]
    pub filter: NotificationFilter,
    /// 游标：返回该 id 之后的页
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

/// GET /inbox/notifications 响应体
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListNotificationsResponse {
    pub data: Vec<NotificationDto>,
    #[serde(default)]
    pub has_more: bool,
}

/// GET /inbox/notifications/count 请求（批量 过滤器→计数）
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CountsQuery {
    pub filters: Vec<NotificationFilter>,
}

/// 单个过滤器的计数结果
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterCount {
    pub filter: NotificationFilter,
    pub count: u64,
}

/// GET /inbox/notifications/count 响应体
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountsResponse {
    pub counts: Vec<FilterCount>,
}

/// PATCH /inbox/notifications/{id}/{verb} 的动作
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateAction {
    Read,
    Unread,
    Archive,
    Unarchive,
    Snooze { snooze_until: DateTime<Utc> },
    Unsnooze,
    Complete { action: ActionSlot },
    Revert { action: ActionSlot },
}

impl UpdateAction {
    /// URL 路径段
    pub fn verb(&self) -> &'static str {
        match self {
            UpdateAction::Read => "read",
            UpdateAction::Unread => "unread",
            UpdateAction::Archive => "archive",
            UpdateAction::Unarchive => "unarchive",
            UpdateAction::Snooze { .. } => "snooze",
            UpdateAction::Unsnooze => "unsnooze",
            UpdateAction::Complete { .. } => "complete",
            UpdateAction::Revert { .. } => "revert",
        }
    }

    /// 请求体（多数动作无 body）
    pub fn body(&self) -> Option<Value> {
        match self {
            UpdateAction::Snooze { snooze_until } => Some(serde_json::json!({
                "snoozeUntil": snooze_until,
            })),
            UpdateAction::Complete { action } | UpdateAction::Revert { action } => {
                Some(serde_json::json!({ "actionType": action }))
            }
            _ => None,
        }
    }
}

/// POST /inbox/notifications/{verb} 的批量动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkAction {
    Read,
    Archive,
    ReadArchive,
    Seen,
}

impl BulkAction {
    pub fn verb(&self) -> &'static str {
        match self {
            BulkAction::Read => "read",
            BulkAction::Archive => "archive",
            BulkAction::ReadArchive => "read-archive",
            BulkAction::Seen => "seen",
        }
    }
}

/// 批量动作的作用域：tags/data 过滤或显式 id 列表
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkScope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_ids: Option<Vec<String>>,
}

impl BulkScope {
    pub fn from_filter(filter: &NotificationFilter) -> Self {
        Self {
            tags: filter.tags.clone(),
            data: filter.data.clone(),
            notification_ids: None,
        }
    }

    pub fn from_ids(ids: Vec<String>) -> Self {
        Self {
            tags: None,
            data: None,
            notification_ids: Some(ids),
        }
    }
}

/// PATCH /inbox/preferences{,/workflowId} 请求体
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePreferenceRequest {
    pub channels: ChannelMap,
}

/// PATCH /inbox/preferences/bulk 的单项
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkPreferenceItem {
    /// 工作流 id（缺 id 时退回 identifier）
    pub workflow_id: String,
    pub channels: ChannelMap,
}

/// POST /inbox/events 请求体（keyless 演示触发）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerEventRequest {
    pub workflow_id: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_action_verbs() {
        assert_eq!(UpdateAction::Read.verb(), "read");
        assert_eq!(
            UpdateAction::Snooze {
                snooze_until: Utc::now()
            }
            .verb(),
            "snooze"
        );
        assert_eq!(BulkAction::ReadArchive.verb(), "read-archive");
    }

    #[test]
    fn test_snooze_body_carries_until() {
        let until = Utc::now();
        let body = UpdateAction::Snooze {
            snooze_until: until,
        }
        .body()
        .unwrap();
        assert!(body.get("snoozeUntil").is_some());
        // 无 body 的动作
        assert!(UpdateAction::Read.body().is_none());
        assert!(UpdateAction::Unsnooze.body().is_none());
    }

    #[test]
    fn test_complete_body_carries_slot() {
        let body = UpdateAction::Complete {
            action: ActionSlot::Primary,
        }
        .body()
        .unwrap();
        assert_eq!(body.get("actionType").unwrap(), "primary");
    }
}
