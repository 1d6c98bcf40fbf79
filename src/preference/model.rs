//! 偏好值对象
//!
//! 与 `Notification` 一样是不可变快照：任何变更产生新实例。
//! GLOBAL 级别一条，TEMPLATE 级别每个工作流一条。

use serde::{Deserialize, Serialize};

use crate::client::ContextHandle;
use crate::notification::{ChannelMap, ChannelType, Workflow};

/// 偏好级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreferenceLevel {
    Global,
    Template,
}

/// 偏好线格式
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferenceDto {
    pub level: PreferenceLevel,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub channels: ChannelMap,
    /// 订阅者在模板级别显式设置过的渠道；全局变更的扇出会跳过它们
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub overridden_channels: Vec<ChannelType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow: Option<Workflow>,
}

fn default_enabled() -> bool {
    true
}

/// 偏好值对象（不可变）
#[derive(Debug, Clone)]
pub struct Preference {
    dto: PreferenceDto,
    ctx: ContextHandle,
}

impl PartialEq for Preference {
    fn eq(&self, other: &Self) -> bool {
        self.dto == other.dto
    }
}

impl Preference {
    pub(crate) fn from_dto(dto: PreferenceDto, ctx: ContextHandle) -> Self {
        Self { dto, ctx }
    }

    pub(crate) fn ctx(&self) -> &ContextHandle {
        &self.ctx
    }

    pub fn as_dto(&self) -> &PreferenceDto {
        &self.dto
    }

    pub fn level(&self) -> PreferenceLevel {
        self.dto.level
    }

    pub fn enabled(&self) -> bool {
        self.dto.enabled
    }

    pub fn channels(&self) -> &ChannelMap {
        &self.dto.channels
    }

    pub fn workflow(&self) -> Option<&Workflow> {
        self.dto.workflow.as_ref()
    }

    /// 渠道是否被订阅者在模板级别显式设置过
    pub fn is_overridden(&self, channel: ChannelType) -> bool {
        self.dto.overridden_channels.contains(&channel)
    }

    /// 关键工作流的渠道在 UI 层只读，订阅者不可停用
    pub fn is_read_only(&self) -> bool {
        self.dto
            .workflow
            .as_ref()
            .map(|w| w.critical)
            .unwrap_or(false)
    }

    /// 应用一组渠道变更，产生新实例；变更的渠道记为显式设置
    pub(crate) fn with_channels(&self, channels: &ChannelMap) -> Preference {
        let mut dto = self.dto.clone();
        for (channel, enabled) in channels {
            dto.channels.insert(*channel, *enabled);
            if dto.level == PreferenceLevel::Template
                && !dto.overridden_channels.contains(channel)
            {
                dto.overridden_channels.push(*channel);
            }
        }
        Preference {
            dto,
            ctx: self.ctx.clone(),
        }
    }

    /// 全局变更的扇出合并：仅更新模板上已存在且未显式设置的渠道键，
    /// 模板上不存在的渠道保持不动
    pub(crate) fn with_global_fanout(&self, channels: &ChannelMap) -> Preference {
        let mut dto = self.dto.clone();
        for (channel, enabled) in channels {
            if dto.channels.contains_key(channel)
                && !dto.overridden_channels.contains(channel)
            {
                dto.channels.insert(*channel, *enabled);
            }
        }
        Preference {
            dto,
            ctx: self.ctx.clone(),
        }
    }
}
