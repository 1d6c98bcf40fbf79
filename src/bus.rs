//! 事件总线 - 组件间通信枢纽
//!
//! 所有组件之间通过事件总线通信，不做直接调用。事件名遵循
//! `<domain>.<action>.<phase>` 约定，phase 为 `pending` 或 `resolved`：
//! 每个变更操作先发出恰好一个 `pending` 事件（网络 I/O 之前），
//! 结束后发出恰好一个 `resolved` 事件（成功或失败），不多不少。
//!
//! 订阅者必须把 `pending` 的 data 视为乐观投影，把 `resolved` 的 data
//! 视为权威结果；失败的 `resolved` 不会自动回滚已应用的乐观状态，
//! 回滚发生在下一次读取/拉取。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use serde_json::Value;
use tracing::debug;

use crate::error::InboxError;
use crate::notification::Notification;
use crate::preference::Preference;
use crate::session::{Session, UnreadCounts};

/// 事件名常量与拼接工具
pub mod events {
    /// 推送：收到新通知
    pub const NOTIFICATION_RECEIVED: &str = "notifications.notification_received";
    /// 推送：未读（seen）计数变化
    pub const UNSEEN_COUNT_CHANGED: &str = "notifications.unseen_count_changed";
    /// 推送：未读（read）计数变化
    pub const UNREAD_COUNT_CHANGED: &str = "notifications.unread_count_changed";

    pub const NOTIFICATION_READ: &str = "notification.read";
    pub const NOTIFICATION_UNREAD: &str = "notification.unread";
    pub const NOTIFICATION_SEEN: &str = "notification.seen";
    pub const NOTIFICATION_ARCHIVE: &str = "notification.archive";
    pub const NOTIFICATION_UNARCHIVE: &str = "notification.unarchive";
    pub const NOTIFICATION_SNOOZE: &str = "notification.snooze";
    pub const NOTIFICATION_UNSNOOZE: &str = "notification.unsnooze";
    pub const NOTIFICATION_COMPLETE_ACTION: &str = "notification.complete_action";
    pub const NOTIFICATION_REVERT_ACTION: &str = "notification.revert_action";

    pub const NOTIFICATIONS_LIST: &str = "notifications.list";
    pub const NOTIFICATIONS_READ_ALL: &str = "notifications.read_all";
    pub const NOTIFICATIONS_SEEN_ALL: &str = "notifications.seen_all";
    pub const NOTIFICATIONS_ARCHIVE_ALL: &str = "notifications.archive_all";
    pub const NOTIFICATIONS_ARCHIVE_ALL_READ: &str = "notifications.archive_all_read";

    pub const PREFERENCES_LIST: &str = "preferences.list";
    pub const PREFERENCE_UPDATE: &str = "preference.update";
    pub const PREFERENCES_BULK_UPDATE: &str = "preferences.bulk_update";

    pub const SESSION_INITIALIZE: &str = "session.initialize";

    /// 拼接 pending 阶段事件名
    pub fn pending(base: &str) -> String {
        format!("{base}.pending")
    }

    /// 拼接 resolved 阶段事件名
    pub fn resolved(base: &str) -> String {
        format!("{base}.resolved")
    }
}

/// 事件数据载荷（类型化）
#[derive(Debug, Clone)]
pub enum EventData {
    Notification(Notification),
    NotificationBatch(Vec<Notification>),
    Preference(Preference),
    PreferenceBatch(Vec<Preference>),
    Session(Session),
    UnseenCount(u64),
    UnreadCount(UnreadCounts),
}

/// 事件载荷
///
/// `pending` 载荷携带 `{args, data?}`，data 为可本地计算的乐观投影；
/// `resolved` 载荷携带 `{args, data?, error?}`。
#[derive(Debug, Clone, Default)]
pub struct EventPayload {
    /// 触发操作时的原始参数（序列化为 JSON）
    pub args: Value,
    /// 类型化数据（乐观投影或权威结果）
    pub data: Option<EventData>,
    /// 失败时的错误（仅 resolved）
    pub error: Option<InboxError>,
}

impl EventPayload {
    /// 构造 pending 载荷
    pub fn pending(args: Value, data: Option<EventData>) -> Self {
        Self {
            args,
            data,
            error: None,
        }
    }

    /// 构造成功的 resolved 载荷
    pub fn resolved(args: Value, data: EventData) -> Self {
        Self {
            args,
            data: Some(data),
            error: None,
        }
    }

    /// 构造失败的 resolved 载荷
    pub fn failed(args: Value, error: InboxError) -> Self {
        Self {
            args,
            data: None,
            error: Some(error),
        }
    }
}

/// 事件处理器
pub type Handler = Arc<dyn Fn(&EventPayload) + Send + Sync>;

/// 订阅句柄
///
/// 调用 `unsubscribe()` 取消订阅。仅丢弃句柄不会取消（与总线的
/// "返回取消函数" 约定一致，句柄可忽略）。
#[must_use = "dropping the handle without unsubscribe() keeps the listener registered"]
pub struct Subscription {
    bus: Weak<EventBus>,
    event: String,
    id: u64,
}

impl Subscription {
    /// 取消本次订阅
    pub fn unsubscribe(self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.off(&self.event, self.id);
        }
    }

    /// 订阅的事件名
    pub fn event(&self) -> &str {
        &self.event
    }
}

/// 类型化发布/订阅总线
pub struct EventBus {
    handlers: Mutex<HashMap<String, Vec<(u64, Handler)>>>,
    next_id: AtomicU64,
}

impl EventBus {
    /// 创建空总线
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            handlers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        })
    }

    /// 注册事件处理器，返回订阅句柄
    pub fn on<F>(self: &Arc<Self>, event: &str, handler: F) -> Subscription
    where
        F: Fn(&EventPayload) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut handlers = self.handlers.lock().expect("bus lock poisoned");
        handlers
            .entry(event.to_string())
            .or_default()
            .push((id, Arc::new(handler)));
        Subscription {
            bus: Arc::downgrade(self),
            event: event.to_string(),
            id,
        }
    }

    /// 按 id 移除处理器
    pub fn off(&self, event: &str, id: u64) {
        let mut handlers = self.handlers.lock().expect("bus lock poisoned");
        if let Some(list) = handlers.get_mut(event) {
            list.retain(|(hid, _)| *hid != id);
            if list.is_empty() {
                handlers.remove(event);
            }
        }
    }

    /// 发布事件
    ///
    /// 没有订阅者时是无害 no-op。处理器列表在锁外调用，
    /// 处理器内部可以安全地再次订阅/发布。
    pub fn emit(&self, event: &str, payload: &EventPayload) {
        let snapshot: Vec<Handler> = {
            let handlers = self.handlers.lock().expect("bus lock poisoned");
            match handlers.get(event) {
                Some(list) => list.iter().map(|(_, h)| Arc::clone(h)).collect(),
                None => return,
            }
        };
        debug!(event = %event, listeners = snapshot.len(), "Emitting event");
        for handler in snapshot {
            handler(payload);
        }
    }

    /// 发布 `<base>.pending` 事件
    pub fn emit_pending(&self, base: &str, args: Value, data: Option<EventData>) {
        self.emit(&events::pending(base), &EventPayload::pending(args, data));
    }

    /// 发布 `<base>.resolved` 事件
    pub fn emit_resolved(&self, base: &str, args: Value, result: Result<EventData, InboxError>) {
        let payload = match result {
            Ok(data) => EventPayload::resolved(args, data),
            Err(error) => EventPayload::failed(args, error),
        };
        self.emit(&events::resolved(base), &payload);
    }

    /// 当前事件的订阅者数量
    pub fn listener_count(&self, event: &str) -> usize {
        let handlers = self.handlers.lock().expect("bus lock poisoned");
        handlers.get(event).map(|l| l.len()).unwrap_or(0)
    }
}
