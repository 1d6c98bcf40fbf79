//! 过滤视图缓存 - 缓存一致性的最小单元
//!
//! 指纹 → 分页通知列表的内存映射。确认的列表拉取整体覆盖对应条目
//! （不做合并）；推送到达的新通知按指纹逐一评估 tag/data/severity
//! 匹配：条目接近空或未在浏览时直接前插，否则只累加 "有新内容"
//! 计数，交由消费方以横幅提示，避免在订阅者滚动时悄悄重排列表。

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use tracing::debug;

use super::filter::NotificationFilter;
use super::model::Notification;

/// 低于此长度的条目视为接近空，推送新通知时直接前插
pub const NEAR_EMPTY_LEN: usize = 3;

/// 单个过滤视图的缓存条目
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// 按时间倒序（最新在前）的通知列表
    pub notifications: Vec<Notification>,
    /// 服务端是否还有更多分页
    pub has_more: bool,
    /// 本条目对应的过滤器
    pub filter: NotificationFilter,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    /// 每个指纹的 "新内容待刷新" 计数（横幅）
    pending_counts: HashMap<String, u64>,
    /// 正在被浏览的指纹
    active: HashSet<String>,
}

/// 过滤视图缓存
///
/// 不变量：每个指纹至多一个条目。非当前浏览的条目允许陈旧，
/// 下次拉取时整体覆盖。
#[derive(Default)]
pub struct NotificationCache {
    state: Mutex<CacheState>,
}

impl NotificationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 读取某过滤器的条目
    pub fn get_all(&self, filter: &NotificationFilter) -> Option<CacheEntry> {
        let state = self.state.lock().expect("cache lock poisoned");
        state.entries.get(&filter.fingerprint()).cloned()
    }

    /// 创建/整体覆盖条目，并清零该指纹的横幅计数
    pub fn set(&self, filter: &NotificationFilter, notifications: Vec<Notification>, has_more: bool) {
        let fingerprint = filter.fingerprint();
        let mut state = self.state.lock().expect("cache lock poisoned");
        state.pending_counts.remove(&fingerprint);
        state.entries.insert(
            fingerprint,
            CacheEntry {
                notifications,
                has_more,
                filter: filter.clone(),
            },
        );
    }

    /// 整体替换条目内容，但保留该指纹的横幅计数
    ///
    /// 追加分页时使用：合并后的列表不是 "刷新"，横幅不清零。
    /// 条目不存在时退化为新建。
    pub fn update(&self, filter: &NotificationFilter, notifications: Vec<Notification>, has_more: bool) {
        let fingerprint = filter.fingerprint();
        let mut state = self.state.lock().expect("cache lock poisoned");
        match state.entries.get_mut(&fingerprint) {
            Some(entry) => {
                entry.notifications = notifications;
                entry.has_more = has_more;
            }
            None => {
                state.entries.insert(
                    fingerprint,
                    CacheEntry {
                        notifications,
                        has_more,
                        filter: filter.clone(),
                    },
                );
            }
        }
    }

    /// 跨所有匹配 `subset` 的条目按 id 去重收集通知，按时间倒序
    ///
    /// 批量操作据此构建乐观批次。
    pub fn get_unique_notifications(&self, subset: &NotificationFilter) -> Vec<Notification> {
        let state = self.state.lock().expect("cache lock poisoned");
        let mut seen_ids = HashSet::new();
        let mut result: Vec<Notification> = Vec::new();
        for entry in state.entries.values() {
            if !entry.filter.satisfies(subset) {
                continue;
            }
            for n in &entry.notifications {
                if seen_ids.insert(n.id().to_string()) {
                    result.push(n.clone());
                }
            }
        }
        result.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        result
    }

    /// 清除匹配 `subset` 的条目
    pub fn clear(&self, subset: &NotificationFilter) {
        let mut state = self.state.lock().expect("cache lock poisoned");
        let doomed: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, e)| e.filter.satisfies(subset))
            .map(|(k, _)| k.clone())
            .collect();
        for key in doomed {
            state.entries.remove(&key);
            state.pending_counts.remove(&key);
        }
    }

    /// 清空缓存
    pub fn clear_all(&self) {
        let mut state = self.state.lock().expect("cache lock poisoned");
        state.entries.clear();
        state.pending_counts.clear();
        state.active.clear();
    }

    /// 标记/取消某过滤器为当前浏览中
    pub fn set_active(&self, filter: &NotificationFilter, active: bool) {
        let fingerprint = filter.fingerprint();
        let mut state = self.state.lock().expect("cache lock poisoned");
        if active {
            state.active.insert(fingerprint);
        } else {
            state.active.remove(&fingerprint);
        }
    }

    /// 某过滤器的 "新内容待刷新" 计数
    pub fn pending_count(&self, filter: &NotificationFilter) -> u64 {
        let state = self.state.lock().expect("cache lock poisoned");
        state
            .pending_counts
            .get(&filter.fingerprint())
            .copied()
            .unwrap_or(0)
    }

    /// 处理推送到达的新通知
    ///
    /// 对每个已跟踪指纹评估匹配；接近空或未浏览的条目直接前插
    /// （同 id 已存在则替换而非重复），否则累加横幅计数。
    pub fn handle_received(&self, n: &Notification) {
        let mut state = self.state.lock().expect("cache lock poisoned");
        let CacheState {
            entries,
            pending_counts,
            active,
        } = &mut *state;

        for (fingerprint, entry) in entries.iter_mut() {
            if !entry.filter.matches_notification(n) {
                continue;
            }
            let is_active = active.contains(fingerprint);
            if entry.notifications.len() < NEAR_EMPTY_LEN || !is_active {
                entry.notifications.retain(|existing| existing.id() != n.id());
                entry.notifications.insert(0, n.clone());
                debug!(fingerprint = %fingerprint, id = %n.id(), "Prepended push notification into cache entry");
            } else {
                *pending_counts.entry(fingerprint.clone()).or_insert(0) += 1;
                debug!(fingerprint = %fingerprint, id = %n.id(), "Deferred push notification behind pending banner");
            }
        }
    }

    /// 以权威实例替换各条目中的同 id 通知（last-write-wins）
    ///
    /// REST 响应与推送帧没有版本号，后到的处理器直接覆盖。
    /// 实例不再匹配某条目过滤器时从该条目移除。
    pub fn apply(&self, n: &Notification) {
        let mut state = self.state.lock().expect("cache lock poisoned");
        for entry in state.entries.values_mut() {
            let matches = entry.filter.matches_notification(n);
            if let Some(pos) = entry.notifications.iter().position(|e| e.id() == n.id()) {
                if matches {
                    entry.notifications[pos] = n.clone();
                } else {
                    entry.notifications.remove(pos);
                }
            }
        }
    }

    /// 批量应用权威实例
    pub fn apply_all(&self, batch: &[Notification]) {
        for n in batch {
            self.apply(n);
        }
    }

    /// 当前跟踪的指纹数量
    pub fn len(&self) -> usize {
        self.state.lock().expect("cache lock poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
