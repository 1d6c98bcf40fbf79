//! 通知过滤器与缓存指纹
//!
//! 指纹是过滤器的规范化序列化，作为缓存键使用。逻辑相等的过滤器
//! （如空数组与缺省 tags）必须产生相同指纹。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::model::{Notification, Severity};

/// 通知列表过滤器
///
/// 所有字段可缺省；缺省表示该维度不过滤。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Vec<Severity>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snoozed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seen: Option<bool>,
}

impl NotificationFilter {
    /// 空过滤器（默认收件箱视图）
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = Some(tags);
        self
    }

    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_severity(mut self, severity: Vec<Severity>) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn with_read(mut self, read: bool) -> Self {
        self.read = Some(read);
        self
    }

    pub fn with_archived(mut self, archived: bool) -> Self {
        self.archived = Some(archived);
        self
    }

    pub fn with_snoozed(mut self, snoozed: bool) -> Self {
        self.snoozed = Some(snoozed);
        self
    }

    pub fn with_seen(mut self, seen: bool) -> Self {
        self.seen = Some(seen);
        self
    }

    /// 规范化 tags：空数组与缺省等价，排序去重
    fn canonical_tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.tags.clone().unwrap_or_default();
        tags.sort();
        tags.dedup();
        tags
    }

    /// 规范化 severity：排序去重
    fn canonical_severity(&self) -> Vec<Severity> {
        let mut severity: Vec<Severity> = self.severity.clone().unwrap_or_default();
        severity.sort();
        severity.dedup();
        severity
    }

    /// 规范化 data：键按字典序
    fn canonical_data(&self) -> BTreeMap<String, Value> {
        self.data
            .as_ref()
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default()
    }

    /// 计算缓存指纹
    ///
    /// 空集合一律省略，布尔维度只在显式设置时出现，
    /// 因此 `tags: Some(vec![])` 与 `tags: None` 指纹相同。
    pub fn fingerprint(&self) -> String {
        let mut parts: Vec<String> = Vec::new();

        let tags = self.canonical_tags();
        if !tags.is_empty() {
            parts.push(format!("tags={}", tags.join(",")));
        }
        let data = self.canonical_data();
        if !data.is_empty() {
            let entries: Vec<String> = data
                .iter()
                .map(|(k, v)| format!("{k}:{v}"))
                .collect();
            parts.push(format!("data={{{}}}", entries.join(",")));
        }
        let severity = self.canonical_severity();
        if !severity.is_empty() {
            let names: Vec<&str> = severity.iter().map(|s| s.as_str()).collect();
            parts.push(format!("severity={}", names.join(",")));
        }
        if let Some(read) = self.read {
            parts.push(format!("read={read}"));
        }
        if let Some(archived) = self.archived {
            parts.push(format!("archived={archived}"));
        }
        if let Some(snoozed) = self.snoozed {
            parts.push(format!("snoozed={snoozed}"));
        }
        if let Some(seen) = self.seen {
            parts.push(format!("seen={seen}"));
        }

        if parts.is_empty() {
            "{}".to_string()
        } else {
            format!("{{{}}}", parts.join("|"))
        }
    }

    /// 判断一条通知是否落入本过滤器
    pub fn matches_notification(&self, n: &Notification) -> bool {
        if let Some(tags) = &self.tags {
            if !tags.is_empty() && !tags.iter().any(|t| n.tags().contains(t)) {
                return false;
            }
        }
        if let Some(data) = &self.data {
            let n_data = n.data();
            for (key, expected) in data {
                match n_data.and_then(|d| d.get(key)) {
                    Some(actual) if actual == expected => {}
                    _ => return false,
                }
            }
        }
        if let Some(severity) = &self.severity {
            if !severity.is_empty() && !severity.contains(&n.severity()) {
                return false;
            }
        }
        if let Some(read) = self.read {
            if n.is_read() != read {
                return false;
            }
        }
        if let Some(archived) = self.archived {
            if n.is_archived() != archived {
                return false;
            }
        }
        if let Some(snoozed) = self.snoozed {
            if n.is_snoozed() != snoozed {
                return false;
            }
        }
        if let Some(seen) = self.seen {
            if n.is_seen() != seen {
                return false;
            }
        }
        true
    }

    /// 判断本过滤器是否覆盖子集 `subset` 的所有约束
    ///
    /// 用于批量操作与 `clear(filterSubset)`：subset 中设置的每个维度
    /// 都必须与本过滤器一致（subset 缺省的维度不限制）。
    pub fn satisfies(&self, subset: &NotificationFilter) -> bool {
        let subset_tags = subset.canonical_tags();
        if !subset_tags.is_empty() && self.canonical_tags() != subset_tags {
            return false;
        }
        let subset_data = subset.canonical_data();
        if !subset_data.is_empty() && self.canonical_data() != subset_data {
            return false;
        }
        let subset_severity = subset.canonical_severity();
        if !subset_severity.is_empty() && self.canonical_severity() != subset_severity {
            return false;
        }
        if subset.read.is_some() && self.read != subset.read {
            return false;
        }
        if subset.archived.is_some() && self.archived != subset.archived {
            return false;
        }
        if subset.snoozed.is_some() && self.snoozed != subset.snoozed {
            return false;
        }
        if subset.seen.is_some() && self.seen != subset.seen {
            return false;
        }
        true
    }
}
