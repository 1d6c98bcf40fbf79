//! 动作编排 - 乐观更新/确认/回滚协议
//!
//! 每个变更操作的统一流程：
//! 1. 给到完整实例时计算乐观后继（字段差量），先应用到缓存；
//! 2. 在任何网络 I/O 之前发出 `pending` 事件（携带乐观投影）；
//! 3. 调用 REST；
//! 4. 成功时用服务端响应构造权威实例、写入缓存并发出 `resolved`；
//!    失败时 `resolved` 携带错误。失败不 panic，以 `Err` 返回；
//!    已应用的乐观状态不自动回滚，留待下一次拉取纠正。
//!
//! 批量操作的服务端不返回逐项载荷，`resolved` 直接携带乐观批次
//! （宽松契约，下游可能依赖）。

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::debug;

use super::filter::NotificationFilter;
use super::model::{ActionSlot, Notification, NotificationPatch};
use crate::api::types::{BulkAction, BulkScope, UpdateAction};
use crate::bus::{events, EventData};
use crate::client::{ContextHandle, InboxContext};
use crate::error::InboxResult;

/// 动作目标：裸 id 或完整实例
///
/// 只有给到实例时才能计算乐观后继。
#[derive(Debug, Clone)]
pub enum NotificationTarget {
    Id(String),
    Instance(Notification),
}

impl NotificationTarget {
    pub fn id(&self) -> &str {
        match self {
            NotificationTarget::Id(id) => id,
            NotificationTarget::Instance(n) => n.id(),
        }
    }

    fn instance(&self) -> Option<&Notification> {
        match self {
            NotificationTarget::Id(_) => None,
            NotificationTarget::Instance(n) => Some(n),
        }
    }
}

impl From<String> for NotificationTarget {
    fn from(id: String) -> Self {
        NotificationTarget::Id(id)
    }
}

impl From<&str> for NotificationTarget {
    fn from(id: &str) -> Self {
        NotificationTarget::Id(id.to_string())
    }
}

impl From<Notification> for NotificationTarget {
    fn from(n: Notification) -> Self {
        NotificationTarget::Instance(n)
    }
}

impl From<&Notification> for NotificationTarget {
    fn from(n: &Notification) -> Self {
        NotificationTarget::Instance(n.clone())
    }
}

/// 各动作对应的字段差量
fn patch_for(action: &UpdateAction) -> NotificationPatch {
    let now = Utc::now();
    match action {
        UpdateAction::Read => NotificationPatch {
            is_read: Some(true),
            read_at: Some(Some(now)),
            is_archived: Some(false),
            archived_at: Some(None),
            ..Default::default()
        },
        UpdateAction::Unread => NotificationPatch {
            is_read: Some(false),
            read_at: Some(None),
            is_archived: Some(false),
            archived_at: Some(None),
            ..Default::default()
        },
        // 归档隐含已读
        UpdateAction::Archive => NotificationPatch {
            is_archived: Some(true),
            archived_at: Some(Some(now)),
            is_read: Some(true),
            read_at: Some(Some(now)),
            ..Default::default()
        },
        UpdateAction::Unarchive => NotificationPatch {
            is_archived: Some(false),
            archived_at: Some(None),
            ..Default::default()
        },
        UpdateAction::Snooze { snooze_until } => NotificationPatch {
            is_snoozed: Some(true),
            snoozed_until: Some(Some(*snooze_until)),
            ..Default::default()
        },
        UpdateAction::Unsnooze => NotificationPatch {
            is_snoozed: Some(false),
            snoozed_until: Some(None),
            ..Default::default()
        },
        UpdateAction::Complete { action } => match action {
            ActionSlot::Primary => NotificationPatch {
                primary_completed: Some(true),
                ..Default::default()
            },
            ActionSlot::Secondary => NotificationPatch {
                secondary_completed: Some(true),
                ..Default::default()
            },
        },
        UpdateAction::Revert { action } => match action {
            ActionSlot::Primary => NotificationPatch {
                primary_completed: Some(false),
                ..Default::default()
            },
            ActionSlot::Secondary => NotificationPatch {
                secondary_completed: Some(false),
                ..Default::default()
            },
        },
    }
}

fn seen_patch() -> NotificationPatch {
    NotificationPatch {
        is_seen: Some(true),
        ..Default::default()
    }
}

/// 事件基名映射
fn event_base(action: &UpdateAction) -> &'static str {
    match action {
        UpdateAction::Read => events::NOTIFICATION_READ,
        UpdateAction::Unread => events::NOTIFICATION_UNREAD,
        UpdateAction::Archive => events::NOTIFICATION_ARCHIVE,
        UpdateAction::Unarchive => events::NOTIFICATION_UNARCHIVE,
        UpdateAction::Snooze { .. } => events::NOTIFICATION_SNOOZE,
        UpdateAction::Unsnooze => events::NOTIFICATION_UNSNOOZE,
        UpdateAction::Complete { .. } => events::NOTIFICATION_COMPLETE_ACTION,
        UpdateAction::Revert { .. } => events::NOTIFICATION_REVERT_ACTION,
    }
}

impl InboxContext {
    /// 单条通知动作的统一执行路径
    pub(crate) async fn run_notification_action(
        self: &Arc<Self>,
        target: NotificationTarget,
        action: UpdateAction,
    ) -> InboxResult<Notification> {
        if let UpdateAction::Complete { action: slot } | UpdateAction::Revert { action: slot } =
            &action
        {
            if let Some(n) = target.instance() {
                n.assert_action_exists(*slot, action.verb());
            }
        }
        let base = event_base(&action);
        let id = target.id().to_string();
        let args = json!({ "notificationId": id });

        let optimistic = target.instance().map(|n| n.apply_patch(&patch_for(&action)));
        if let Some(op) = &optimistic {
            self.cache.apply(op);
        }
        self.bus.emit_pending(
            base,
            args.clone(),
            optimistic.map(EventData::Notification),
        );

        match self.api.update_notification(&id, &action).await {
            Ok(dto) => {
                let canonical = Notification::from_dto(dto, ContextHandle::new(self));
                self.cache.apply(&canonical);
                self.bus.emit_resolved(
                    base,
                    args,
                    Ok(EventData::Notification(canonical.clone())),
                );
                Ok(canonical)
            }
            Err(error) => {
                debug!(id = %id, verb = action.verb(), error = %error, "Notification action failed");
                self.bus.emit_resolved(base, args, Err(error.clone()));
                Err(error)
            }
        }
    }

    /// 单条 seen 确认
    ///
    /// REST 表面没有单条 seen 动词，走批量 seen 端点（单 id）。
    /// 批量端点不返回载荷，给到裸 id 时无法构造权威实例，返回
    /// `Ok(None)`。
    pub(crate) async fn run_seen_action(
        self: &Arc<Self>,
        target: NotificationTarget,
    ) -> InboxResult<Option<Notification>> {
        let id = target.id().to_string();
        let args = json!({ "notificationId": id });

        let optimistic = target.instance().map(|n| n.apply_patch(&seen_patch()));
        if let Some(op) = &optimistic {
            self.cache.apply(op);
        }
        self.bus.emit_pending(
            events::NOTIFICATION_SEEN,
            args.clone(),
            optimistic.clone().map(EventData::Notification),
        );

        match self
            .api
            .bulk_update(BulkAction::Seen, &BulkScope::from_ids(vec![id.clone()]))
            .await
        {
            Ok(()) => {
                // 裸 id 时无实例可广播，resolved 仅携带 args
                let payload = crate::bus::EventPayload {
                    args,
                    data: optimistic.clone().map(EventData::Notification),
                    error: None,
                };
                self.bus
                    .emit(&events::resolved(events::NOTIFICATION_SEEN), &payload);
                Ok(optimistic)
            }
            Err(error) => {
                self.bus
                    .emit_resolved(events::NOTIFICATION_SEEN, args, Err(error.clone()));
                Err(error)
            }
        }
    }

    /// 批量动作的统一执行路径
    ///
    /// 从缓存中读取匹配子集的全部条目、按 id 去重构建乐观批次，
    /// 网络成功即视为乐观状态成为最终状态。
    pub(crate) async fn run_bulk_action(
        self: &Arc<Self>,
        base: &'static str,
        action: BulkAction,
        filter: &NotificationFilter,
    ) -> InboxResult<Vec<Notification>> {
        let candidates = self.cache.get_unique_notifications(filter);
        let patch = match action {
            BulkAction::Read => patch_for(&UpdateAction::Read),
            BulkAction::Archive | BulkAction::ReadArchive => patch_for(&UpdateAction::Archive),
            BulkAction::Seen => seen_patch(),
        };
        let batch: Vec<Notification> = candidates
            .iter()
            // read-archive 只归档已读项
            .filter(|n| action != BulkAction::ReadArchive || n.is_read())
            .map(|n| n.apply_patch(&patch))
            .collect();

        let args = json!({
            "filter": filter,
            "count": batch.len(),
        });

        self.cache.apply_all(&batch);
        self.bus.emit_pending(
            base,
            args.clone(),
            Some(EventData::NotificationBatch(batch.clone())),
        );

        match self
            .api
            .bulk_update(action, &BulkScope::from_filter(filter))
            .await
        {
            Ok(()) => {
                self.bus.emit_resolved(
                    base,
                    args,
                    Ok(EventData::NotificationBatch(batch.clone())),
                );
                Ok(batch)
            }
            Err(error) => {
                debug!(verb = action.verb(), error = %error, "Bulk notification action failed");
                self.bus.emit_resolved(base, args, Err(error.clone()));
                Err(error)
            }
        }
    }
}

impl Notification {
    /// 标记已读（同时取消归档）
    pub async fn read(&self) -> InboxResult<Notification> {
        let ctx = self.ctx().upgrade()?;
        ctx.run_notification_action(self.into(), UpdateAction::Read)
            .await
    }

    /// 标记未读
    pub async fn unread(&self) -> InboxResult<Notification> {
        let ctx = self.ctx().upgrade()?;
        ctx.run_notification_action(self.into(), UpdateAction::Unread)
            .await
    }

    /// 标记已见（seen）
    pub async fn seen(&self) -> InboxResult<Option<Notification>> {
        let ctx = self.ctx().upgrade()?;
        ctx.run_seen_action(self.into()).await
    }

    /// 归档（隐含已读）
    pub async fn archive(&self) -> InboxResult<Notification> {
        let ctx = self.ctx().upgrade()?;
        ctx.run_notification_action(self.into(), UpdateAction::Archive)
            .await
    }

    /// 取消归档
    pub async fn unarchive(&self) -> InboxResult<Notification> {
        let ctx = self.ctx().upgrade()?;
        ctx.run_notification_action(self.into(), UpdateAction::Unarchive)
            .await
    }

    /// 暂缓到指定时间
    pub async fn snooze(&self, until: chrono::DateTime<Utc>) -> InboxResult<Notification> {
        let ctx = self.ctx().upgrade()?;
        ctx.run_notification_action(self.into(), UpdateAction::Snooze { snooze_until: until })
            .await
    }

    /// 取消暂缓（幂等：已取消时照常发请求，不做本地短路）
    pub async fn unsnooze(&self) -> InboxResult<Notification> {
        let ctx = self.ctx().upgrade()?;
        ctx.run_notification_action(self.into(), UpdateAction::Unsnooze)
            .await
    }

    /// 完成指定槽位的动作按钮
    ///
    /// # Panics
    ///
    /// 通知上不存在该槽位动作时 panic（调用方 bug，非运行时失败）。
    pub async fn complete_action(&self, slot: ActionSlot) -> InboxResult<Notification> {
        let ctx = self.ctx().upgrade()?;
        ctx.run_notification_action(self.into(), UpdateAction::Complete { action: slot })
            .await
    }

    /// 撤销指定槽位的动作按钮
    ///
    /// # Panics
    ///
    /// 通知上不存在该槽位动作时 panic（调用方 bug，非运行时失败）。
    pub async fn revert_action(&self, slot: ActionSlot) -> InboxResult<Notification> {
        let ctx = self.ctx().upgrade()?;
        ctx.run_notification_action(self.into(), UpdateAction::Revert { action: slot })
            .await
    }

    fn assert_action_exists(&self, slot: ActionSlot, op: &str) {
        let exists = match slot {
            ActionSlot::Primary => self.primary_action().is_some(),
            ActionSlot::Secondary => self.secondary_action().is_some(),
        };
        assert!(
            exists,
            "{op} called for {slot:?} action but notification {} has none",
            self.id()
        );
    }
}
