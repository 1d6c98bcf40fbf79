//! 通知值对象
//!
//! `Notification` 是不可变快照：任何变更都产生新实例，绝不原地修改。
//! 实例通过 `ContextHandle` 绑定事件总线与请求客户端，因此可以直接
//! 调用自变更动作方法（见 `actions.rs`）。

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::client::ContextHandle;

/// 严重级别（用于视觉强调与计数分段）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Medium,
    Low,
    None,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::None => "none",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 投递渠道类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelType {
    InApp,
    Email,
    Sms,
    Push,
    Chat,
}

impl ChannelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelType::InApp => "in_app",
            ChannelType::Email => "email",
            ChannelType::Sms => "sms",
            ChannelType::Push => "push",
            ChannelType::Chat => "chat",
        }
    }
}

/// 渠道开关映射（BTreeMap 保证序列化顺序稳定）
pub type ChannelMap = BTreeMap<ChannelType, bool>;

/// 动作跳转目标
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Redirect {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

/// 通知上的主/次动作按钮
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationButton {
    pub label: String,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect: Option<Redirect>,
}

/// 动作槽位（主/次）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionSlot {
    Primary,
    Secondary,
}

/// 接收者快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscriber {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscriber_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

/// 工作流（服务端模板/定义）引用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub critical: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
}

/// 通知线格式（REST 与推送共用同一形状）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationDto {
    pub id: String,
    pub transaction_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub body: String,
    pub to: Subscriber,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub is_seen: bool,
    #[serde(default)]
    pub is_archived: bool,
    #[serde(default)]
    pub is_snoozed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snoozed_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub delivered_at: Vec<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_action: Option<NotificationButton>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_action: Option<NotificationButton>,
    pub channel_type: ChannelType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow: Option<Workflow>,
    #[serde(default = "default_severity")]
    pub severity: Severity,
}

fn default_severity() -> Severity {
    Severity::None
}

/// 通知值对象（不可变）
///
/// 相等性只看数据字段，不看绑定的上下文句柄。
#[derive(Debug, Clone)]
pub struct Notification {
    dto: NotificationDto,
    ctx: ContextHandle,
}

impl PartialEq for Notification {
    fn eq(&self, other: &Self) -> bool {
        self.dto == other.dto
    }
}

impl Notification {
    /// 从线格式构造并绑定上下文
    pub(crate) fn from_dto(dto: NotificationDto, ctx: ContextHandle) -> Self {
        Self { dto, ctx }
    }

    pub(crate) fn ctx(&self) -> &ContextHandle {
        &self.ctx
    }

    /// 底层线格式快照
    pub fn as_dto(&self) -> &NotificationDto {
        &self.dto
    }

    pub fn id(&self) -> &str {
        &self.dto.id
    }

    pub fn transaction_id(&self) -> &str {
        &self.dto.transaction_id
    }

    pub fn subject(&self) -> Option<&str> {
        self.dto.subject.as_deref()
    }

    pub fn body(&self) -> &str {
        &self.dto.body
    }

    pub fn to(&self) -> &Subscriber {
        &self.dto.to
    }

    pub fn is_read(&self) -> bool {
        self.dto.is_read
    }

    pub fn is_seen(&self) -> bool {
        self.dto.is_seen
    }

    pub fn is_archived(&self) -> bool {
        self.dto.is_archived
    }

    pub fn is_snoozed(&self) -> bool {
        self.dto.is_snoozed
    }

    pub fn snoozed_until(&self) -> Option<DateTime<Utc>> {
        self.dto.snoozed_until
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.dto.created_at
    }

    pub fn read_at(&self) -> Option<DateTime<Utc>> {
        self.dto.read_at
    }

    pub fn archived_at(&self) -> Option<DateTime<Utc>> {
        self.dto.archived_at
    }

    pub fn primary_action(&self) -> Option<&NotificationButton> {
        self.dto.primary_action.as_ref()
    }

    pub fn secondary_action(&self) -> Option<&NotificationButton> {
        self.dto.secondary_action.as_ref()
    }

    pub fn channel_type(&self) -> ChannelType {
        self.dto.channel_type
    }

    pub fn tags(&self) -> &[String] {
        &self.dto.tags
    }

    pub fn data(&self) -> Option<&Map<String, Value>> {
        self.dto.data.as_ref()
    }

    pub fn workflow(&self) -> Option<&Workflow> {
        self.dto.workflow.as_ref()
    }

    pub fn severity(&self) -> Severity {
        self.dto.severity
    }

    /// 应用字段差量，产生新实例（乐观后继）
    pub(crate) fn apply_patch(&self, patch: &NotificationPatch) -> Notification {
        let mut dto = self.dto.clone();
        if let Some(v) = patch.is_read {
            dto.is_read = v;
        }
        if let Some(v) = &patch.read_at {
            dto.read_at = *v;
        }
        if let Some(v) = patch.is_seen {
            dto.is_seen = v;
        }
        if let Some(v) = patch.is_archived {
            dto.is_archived = v;
        }
        if let Some(v) = &patch.archived_at {
            dto.archived_at = *v;
        }
        if let Some(v) = patch.is_snoozed {
            dto.is_snoozed = v;
        }
        if let Some(v) = &patch.snoozed_until {
            dto.snoozed_until = *v;
        }
        if let Some(v) = patch.primary_completed {
            if let Some(action) = dto.primary_action.as_mut() {
                action.is_completed = v;
            }
        }
        if let Some(v) = patch.secondary_completed {
            if let Some(action) = dto.secondary_action.as_mut() {
                action.is_completed = v;
            }
        }
        Notification {
            dto,
            ctx: self.ctx.clone(),
        }
    }
}

/// 乐观更新用的字段差量
///
/// 外层 `Option` 表示是否触碰该字段，内层 `Option` 表示设置/清除。
#[derive(Debug, Clone, Default)]
pub struct NotificationPatch {
    pub is_read: Option<bool>,
    pub read_at: Option<Option<DateTime<Utc>>>,
    pub is_seen: Option<bool>,
    pub is_archived: Option<bool>,
    pub archived_at: Option<Option<DateTime<Utc>>>,
    pub is_snoozed: Option<bool>,
    pub snoozed_until: Option<Option<DateTime<Utc>>>,
    pub primary_completed: Option<bool>,
    pub secondary_completed: Option<bool>,
}
