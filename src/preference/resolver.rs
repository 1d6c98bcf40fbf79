//! 偏好解析 - 全局/工作流优先级与乐观扇出
//!
//! 全局变更伴随一次扇出：所有已缓存的 TEMPLATE 级偏好按
//! "模板上存在且未显式设置的渠道键" 规则乐观合并，让所有可见的
//! 工作流行立即呈现一致状态，免去 N 次额外往返。合并纯属乐观，
//! 下次列表拉取前不保证与服务端一致。

use std::sync::Arc;

use serde_json::json;
use tracing::debug;

use super::model::{Preference, PreferenceLevel};
use crate::api::types::BulkPreferenceItem;
use crate::bus::{events, EventData};
use crate::client::{ContextHandle, InboxContext};
use crate::error::{InboxError, InboxResult};
use crate::notification::ChannelMap;

/// 批量偏好更新的单项输入
#[derive(Debug, Clone)]
pub struct PreferenceUpdate {
    pub preference: Preference,
    pub channels: ChannelMap,
}

impl InboxContext {
    /// 拉取偏好列表并整体替换缓存
    pub(crate) async fn list_preferences(self: &Arc<Self>) -> InboxResult<Vec<Preference>> {
        let args = json!({});
        self.bus.emit_pending(events::PREFERENCES_LIST, args.clone(), None);

        match self.api.list_preferences().await {
            Ok(dtos) => {
                let prefs: Vec<Preference> = dtos
                    .into_iter()
                    .map(|dto| Preference::from_dto(dto, ContextHandle::new(self)))
                    .collect();
                *self.preferences.lock().expect("preference lock poisoned") = prefs.clone();
                self.bus.emit_resolved(
                    events::PREFERENCES_LIST,
                    args,
                    Ok(EventData::PreferenceBatch(prefs.clone())),
                );
                Ok(prefs)
            }
            Err(error) => {
                self.bus
                    .emit_resolved(events::PREFERENCES_LIST, args, Err(error.clone()));
                Err(error)
            }
        }
    }

    /// 当前缓存的偏好快照
    pub(crate) fn cached_preferences(&self) -> Vec<Preference> {
        self.preferences
            .lock()
            .expect("preference lock poisoned")
            .clone()
    }

    /// 更新偏好
    ///
    /// `workflow_id` 给定时直接 patch 该工作流；缺省为全局更新，
    /// 伴随跨缓存 TEMPLATE 行的乐观扇出。
    pub(crate) async fn update_preference(
        self: &Arc<Self>,
        workflow_id: Option<&str>,
        channels: &ChannelMap,
    ) -> InboxResult<Preference> {
        let args = json!({
            "workflowId": workflow_id,
            "channels": channels,
        });

        // 乐观投影
        let optimistic_batch = self.apply_optimistic_preferences(workflow_id, channels);
        self.bus.emit_pending(
            events::PREFERENCE_UPDATE,
            args.clone(),
            Some(EventData::PreferenceBatch(optimistic_batch)),
        );

        let result = match workflow_id {
            Some(id) => self.api.update_workflow_preference(id, channels).await,
            None => self.api.update_global_preference(channels).await,
        };

        match result {
            Ok(dto) => {
                let canonical = Preference::from_dto(dto, ContextHandle::new(self));
                self.replace_cached_preference(&canonical);
                self.bus.emit_resolved(
                    events::PREFERENCE_UPDATE,
                    args,
                    Ok(EventData::Preference(canonical.clone())),
                );
                Ok(canonical)
            }
            Err(error) => {
                debug!(workflow_id = ?workflow_id, error = %error, "Preference update failed");
                self.bus
                    .emit_resolved(events::PREFERENCE_UPDATE, args, Err(error.clone()));
                Err(error)
            }
        }
    }

    /// 批量更新偏好（仅 per-workflow 目标）
    ///
    /// 列表中含 GLOBAL 级目标时本地直接拒绝，不发任何网络请求。
    pub(crate) async fn bulk_update_preferences(
        self: &Arc<Self>,
        updates: Vec<PreferenceUpdate>,
    ) -> InboxResult<Vec<Preference>> {
        if updates
            .iter()
            .any(|u| u.preference.level() == PreferenceLevel::Global)
        {
            return Err(InboxError::InvalidArgument(
                "bulk preference update is defined only for workflow-level targets".to_string(),
            ));
        }

        // 请求按工作流 id 键控，缺 id 时退回 identifier
        let mut items = Vec::with_capacity(updates.len());
        for update in &updates {
            let workflow = update.preference.workflow().ok_or_else(|| {
                InboxError::InvalidArgument(
                    "workflow-level preference is missing its workflow reference".to_string(),
                )
            })?;
            let key = workflow
                .id
                .clone()
                .unwrap_or_else(|| workflow.identifier.clone());
            items.push(BulkPreferenceItem {
                workflow_id: key,
                channels: update.channels.clone(),
            });
        }

        let args = json!({ "count": items.len() });
        let optimistic: Vec<Preference> = updates
            .iter()
            .map(|u| u.preference.with_channels(&u.channels))
            .collect();
        for pref in &optimistic {
            self.replace_cached_preference(pref);
        }
        self.bus.emit_pending(
            events::PREFERENCES_BULK_UPDATE,
            args.clone(),
            Some(EventData::PreferenceBatch(optimistic.clone())),
        );

        match self.api.bulk_update_preferences(&items).await {
            Ok(dtos) => {
                let canonical: Vec<Preference> = dtos
                    .into_iter()
                    .map(|dto| Preference::from_dto(dto, ContextHandle::new(self)))
                    .collect();
                for pref in &canonical {
                    self.replace_cached_preference(pref);
                }
                self.bus.emit_resolved(
                    events::PREFERENCES_BULK_UPDATE,
                    args,
                    Ok(EventData::PreferenceBatch(canonical.clone())),
                );
                Ok(canonical)
            }
            Err(error) => {
                self.bus
                    .emit_resolved(events::PREFERENCES_BULK_UPDATE, args, Err(error.clone()));
                Err(error)
            }
        }
    }

    /// 计算并应用乐观投影，返回受影响的行（更新目标在前）
    fn apply_optimistic_preferences(
        &self,
        workflow_id: Option<&str>,
        channels: &ChannelMap,
    ) -> Vec<Preference> {
        let mut cached = self.preferences.lock().expect("preference lock poisoned");
        let mut touched = Vec::new();

        match workflow_id {
            Some(id) => {
                for pref in cached.iter_mut() {
                    if pref.level() != PreferenceLevel::Template {
                        continue;
                    }
                    let matches = pref
                        .workflow()
                        .map(|w| w.id.as_deref() == Some(id) || w.identifier == id)
                        .unwrap_or(false);
                    if matches {
                        *pref = pref.with_channels(channels);
                        touched.push(pref.clone());
                    }
                }
            }
            None => {
                // 全局行本身
                for pref in cached.iter_mut() {
                    if pref.level() == PreferenceLevel::Global {
                        *pref = pref.with_channels(channels);
                        touched.push(pref.clone());
                    }
                }
                // 跨 TEMPLATE 行扇出
                for pref in cached.iter_mut() {
                    if pref.level() == PreferenceLevel::Template {
                        *pref = pref.with_global_fanout(channels);
                        touched.push(pref.clone());
                    }
                }
            }
        }
        touched
    }

    /// 以权威实例替换缓存中的同目标行
    fn replace_cached_preference(&self, canonical: &Preference) {
        let mut cached = self.preferences.lock().expect("preference lock poisoned");
        let target_key = preference_key(canonical);
        for pref in cached.iter_mut() {
            if preference_key(pref) == target_key {
                *pref = canonical.clone();
                return;
            }
        }
        cached.push(canonical.clone());
    }
}

/// 缓存行的身份键：级别 + 工作流标识
fn preference_key(pref: &Preference) -> (PreferenceLevel, Option<String>) {
    (
        pref.level(),
        pref.workflow().map(|w| {
            w.id.clone().unwrap_or_else(|| w.identifier.clone())
        }),
    )
}

impl Preference {
    /// 自变更：更新本行的渠道开关
    ///
    /// GLOBAL 行触发全局更新（含扇出），TEMPLATE 行更新对应工作流。
    pub async fn update(&self, channels: ChannelMap) -> InboxResult<Preference> {
        let ctx = self.ctx().upgrade()?;
        let workflow_id = match self.level() {
            PreferenceLevel::Global => None,
            PreferenceLevel::Template => Some(
                self.workflow()
                    .map(|w| w.id.clone().unwrap_or_else(|| w.identifier.clone()))
                    .ok_or_else(|| {
                        InboxError::InvalidArgument(
                            "workflow-level preference is missing its workflow reference"
                                .to_string(),
                        )
                    })?,
            ),
        };
        ctx.update_preference(workflow_id.as_deref(), &channels).await
    }
}
