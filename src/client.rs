//! InboxClient - SDK 入口
//!
//! 把事件总线、传输层、过滤缓存、动作编排、偏好解析与会话管理
//! 装配到一起。值对象通过 `ContextHandle`（弱引用）绑定回这里，
//! 客户端被 drop 后其动作方法返回 `Detached`，事件落在已分离的
//! 总线上是无害 no-op。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::api::types::{BulkAction, ListNotificationsQuery, TriggerEventRequest, UpdateAction};
use crate::api::{HttpInboxApi, InboxApi};
use crate::bus::{events, EventBus, EventData, EventPayload, Subscription};
use crate::config::InboxConfig;
use crate::error::{InboxError, InboxResult};
use crate::notification::actions::NotificationTarget;
use crate::notification::{
    ActionSlot, CacheEntry, ChannelMap, LayoutProbe, Notification, NotificationCache,
    NotificationFilter, VisibilityConfig, VisibilityTracker,
};
use crate::preference::{Preference, PreferenceUpdate};
use crate::session::{InitializeArgs, Session, SessionState};
use crate::socket::{is_socket_event, select_transport, socket_url_with_token, PushTransport};
use crate::storage::{FileStorage, KeyValueStorage};

/// 装配后的共享核心，所有组件经由它互相可达
pub(crate) struct InboxContext {
    pub(crate) config: InboxConfig,
    pub(crate) bus: Arc<EventBus>,
    pub(crate) api: Arc<dyn InboxApi>,
    pub(crate) cache: NotificationCache,
    pub(crate) preferences: Mutex<Vec<Preference>>,
    pub(crate) session: RwLock<Option<SessionState>>,
    pub(crate) storage: Arc<dyn KeyValueStorage>,
}

/// 值对象携带的上下文句柄（弱引用，不延长客户端生命周期）
#[derive(Debug, Clone)]
pub struct ContextHandle(Weak<InboxContext>);

impl ContextHandle {
    pub(crate) fn new(ctx: &Arc<InboxContext>) -> Self {
        Self(Arc::downgrade(ctx))
    }

    /// 永远分离的句柄（测试与反序列化用）
    pub(crate) fn detached() -> Self {
        Self(Weak::new())
    }

    pub(crate) fn upgrade(&self) -> InboxResult<Arc<InboxContext>> {
        self.0.upgrade().ok_or(InboxError::Detached)
    }
}

/// 分页列表结果
#[derive(Debug, Clone)]
pub struct NotificationListResult {
    pub notifications: Vec<Notification>,
    pub has_more: bool,
}

/// 通知收件箱客户端
pub struct InboxClient {
    ctx: Arc<InboxContext>,
    socket: Mutex<Option<Arc<dyn PushTransport>>>,
    socket_started: AtomicBool,
    /// 有消费者订阅过 socket 事件但当时还没有会话令牌
    socket_interest: AtomicBool,
}

impl InboxClient {
    /// 用默认传输与文件存储创建客户端
    pub fn new(config: InboxConfig) -> InboxResult<Self> {
        let api = Arc::new(HttpInboxApi::new(config.clone())?);
        Ok(Self::assemble(config, api, Arc::new(FileStorage::new())))
    }

    /// 注入自定义传输与存储（测试用）
    pub fn new_for_test(
        config: InboxConfig,
        api: Arc<dyn InboxApi>,
        storage: Arc<dyn KeyValueStorage>,
    ) -> Self {
        Self::assemble(config, api, storage)
    }

    /// 额外注入推送传输（测试用）；惰性连接门控不变
    pub fn new_for_test_with_transport(
        config: InboxConfig,
        api: Arc<dyn InboxApi>,
        storage: Arc<dyn KeyValueStorage>,
        transport: Arc<dyn PushTransport>,
    ) -> Self {
        let client = Self::assemble(config, api, storage);
        *client.socket.lock().expect("socket lock poisoned") = Some(transport);
        client
    }

    fn assemble(
        config: InboxConfig,
        api: Arc<dyn InboxApi>,
        storage: Arc<dyn KeyValueStorage>,
    ) -> Self {
        let ctx = Arc::new(InboxContext {
            config,
            bus: EventBus::new(),
            api,
            cache: NotificationCache::new(),
            preferences: Mutex::new(Vec::new()),
            session: RwLock::new(None),
            storage,
        });
        Self {
            ctx,
            socket: Mutex::new(None),
            socket_started: AtomicBool::new(false),
            socket_interest: AtomicBool::new(false),
        }
    }

    // ── 会话 ────────────────────────────────────────────────────

    /// 初始化会话（身份未变时 no-op）
    ///
    /// 失败被记录并随 `session.initialize.resolved` 广播，返回 `None`。
    pub async fn initialize(&self, args: InitializeArgs) -> Option<Session> {
        let session = self.ctx.initialize_session(args).await;
        if session.is_some() {
            // 之前有订阅者在等令牌，现在可以连了
            self.maybe_connect_socket();
        }
        session
    }

    pub fn session(&self) -> Option<Session> {
        self.ctx.current_session()
    }

    pub fn application_identifier(&self) -> Option<String> {
        self.ctx.application_identifier()
    }

    pub fn subscriber_id(&self) -> Option<String> {
        self.ctx.subscriber_id()
    }

    fn ensure_session(&self) -> InboxResult<()> {
        if self.ctx.current_session().is_none() {
            return Err(InboxError::NoSession);
        }
        Ok(())
    }

    // ── 事件订阅 ────────────────────────────────────────────────

    /// 订阅事件；首次订阅 socket 事件名时惰性建立推送连接
    pub fn on<F>(&self, event: &str, handler: F) -> Subscription
    where
        F: Fn(&EventPayload) + Send + Sync + 'static,
    {
        let subscription = self.ctx.bus.on(event, handler);
        if is_socket_event(event) {
            self.socket_interest.store(true, Ordering::SeqCst);
            self.maybe_connect_socket();
        }
        subscription
    }

    /// 有兴趣且有令牌时建立一次推送连接（进程内共享一条）
    fn maybe_connect_socket(&self) {
        if !self.socket_interest.load(Ordering::SeqCst) {
            return;
        }
        if self.socket_started.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(token) = self.ctx.session_token() else {
            // 还没有会话令牌，initialize 成功后再试
            self.socket_started.store(false, Ordering::SeqCst);
            debug!("Deferring socket connection until a session exists");
            return;
        };
        let url = match socket_url_with_token(&self.ctx.config.socket_url, &token) {
            Ok(url) => url,
            Err(e) => {
                // 回退启动标记，后续订阅仍可重试连接
                self.socket_started.store(false, Ordering::SeqCst);
                warn!(error = %e, "Invalid socket URL, push transport disabled");
                return;
            }
        };
        let transport: Arc<dyn PushTransport> = {
            let mut guard = self.socket.lock().expect("socket lock poisoned");
            guard
                .get_or_insert_with(|| {
                    Arc::from(select_transport(Arc::downgrade(&self.ctx), &url))
                })
                .clone()
        };
        tokio::spawn(async move {
            if let Err(e) = transport.connect(url).await {
                warn!(error = %e, "Push transport connection failed");
            }
        });
    }

    /// 断开推送连接
    pub async fn disconnect_socket(&self) {
        let transport = self
            .socket
            .lock()
            .expect("socket lock poisoned")
            .clone();
        if let Some(transport) = transport {
            transport.disconnect().await;
        }
        self.socket_started.store(false, Ordering::SeqCst);
    }

    // ── 通知读取 ────────────────────────────────────────────────

    /// 拉取一页通知并整体覆盖对应缓存条目
    ///
    /// 带 `after` 游标时把新页并入已有条目后整体替换（按 id 去重）。
    pub async fn list_notifications(
        &self,
        filter: &NotificationFilter,
        limit: Option<usize>,
        after: Option<String>,
    ) -> InboxResult<NotificationListResult> {
        self.ensure_session()?;
        let args = json!({ "filter": filter, "limit": limit, "after": after });
        self.ctx
            .bus
            .emit_pending(events::NOTIFICATIONS_LIST, args.clone(), None);

        let query = ListNotificationsQuery {
            filter: filter.clone(),
            after: after.clone(),
            limit,
        };
        match self.ctx.api.list_notifications(&query).await {
            Ok(response) => {
                let fetched: Vec<Notification> = response
                    .data
                    .into_iter()
                    .map(|dto| Notification::from_dto(dto, ContextHandle::new(&self.ctx)))
                    .collect();
                let existing = after
                    .as_ref()
                    .and_then(|_| self.ctx.cache.get_all(filter));
                let combined = match existing {
                    Some(entry) => {
                        let mut list = entry.notifications;
                        for n in fetched {
                            if !list.iter().any(|e| e.id() == n.id()) {
                                list.push(n);
                            }
                        }
                        // 追加分页不算刷新，保留横幅计数
                        self.ctx.cache.update(filter, list.clone(), response.has_more);
                        list
                    }
                    None => {
                        self.ctx.cache.set(filter, fetched.clone(), response.has_more);
                        fetched
                    }
                };
                self.ctx.bus.emit_resolved(
                    events::NOTIFICATIONS_LIST,
                    args,
                    Ok(EventData::NotificationBatch(combined.clone())),
                );
                Ok(NotificationListResult {
                    notifications: combined,
                    has_more: response.has_more,
                })
            }
            Err(error) => {
                self.ctx
                    .bus
                    .emit_resolved(events::NOTIFICATIONS_LIST, args, Err(error.clone()));
                Err(error)
            }
        }
    }

    /// 批量过滤器计数
    pub async fn counts(
        &self,
        filters: &[NotificationFilter],
    ) -> InboxResult<Vec<crate::api::types::FilterCount>> {
        self.ensure_session()?;
        self.ctx.api.fetch_counts(filters).await
    }

    /// 读取某过滤器的缓存条目（可能不存在或陈旧）
    pub fn cached(&self, filter: &NotificationFilter) -> Option<CacheEntry> {
        self.ctx.cache.get_all(filter)
    }

    /// 某过滤器的 "有新内容" 横幅计数
    pub fn pending_new_count(&self, filter: &NotificationFilter) -> u64 {
        self.ctx.cache.pending_count(filter)
    }

    /// 标记某过滤视图为浏览中/离开
    pub fn set_view_active(&self, filter: &NotificationFilter, active: bool) {
        self.ctx.cache.set_active(filter, active);
    }

    /// 清除匹配子集的缓存条目
    pub fn clear_cache(&self, subset: &NotificationFilter) {
        self.ctx.cache.clear(subset);
    }

    pub fn clear_all_cache(&self) {
        self.ctx.cache.clear_all();
    }

    // ── 单条动作 ────────────────────────────────────────────────

    pub async fn read(
        &self,
        target: impl Into<NotificationTarget>,
    ) -> InboxResult<Notification> {
        self.ensure_session()?;
        self.ctx
            .run_notification_action(target.into(), UpdateAction::Read)
            .await
    }

    pub async fn unread(
        &self,
        target: impl Into<NotificationTarget>,
    ) -> InboxResult<Notification> {
        self.ensure_session()?;
        self.ctx
            .run_notification_action(target.into(), UpdateAction::Unread)
            .await
    }

    pub async fn seen(
        &self,
        target: impl Into<NotificationTarget>,
    ) -> InboxResult<Option<Notification>> {
        self.ensure_session()?;
        self.ctx.run_seen_action(target.into()).await
    }

    pub async fn archive(
        &self,
        target: impl Into<NotificationTarget>,
    ) -> InboxResult<Notification> {
        self.ensure_session()?;
        self.ctx
            .run_notification_action(target.into(), UpdateAction::Archive)
            .await
    }

    pub async fn unarchive(
        &self,
        target: impl Into<NotificationTarget>,
    ) -> InboxResult<Notification> {
        self.ensure_session()?;
        self.ctx
            .run_notification_action(target.into(), UpdateAction::Unarchive)
            .await
    }

    pub async fn snooze(
        &self,
        target: impl Into<NotificationTarget>,
        until: chrono::DateTime<chrono::Utc>,
    ) -> InboxResult<Notification> {
        self.ensure_session()?;
        self.ctx
            .run_notification_action(target.into(), UpdateAction::Snooze { snooze_until: until })
            .await
    }

    pub async fn unsnooze(
        &self,
        target: impl Into<NotificationTarget>,
    ) -> InboxResult<Notification> {
        self.ensure_session()?;
        self.ctx
            .run_notification_action(target.into(), UpdateAction::Unsnooze)
            .await
    }

    /// # Panics
    ///
    /// 给到完整实例且该槽位动作不存在时 panic（调用方 bug）。
    pub async fn complete_action(
        &self,
        target: impl Into<NotificationTarget>,
        slot: ActionSlot,
    ) -> InboxResult<Notification> {
        self.ensure_session()?;
        self.ctx
            .run_notification_action(target.into(), UpdateAction::Complete { action: slot })
            .await
    }

    /// # Panics
    ///
    /// 给到完整实例且该槽位动作不存在时 panic（调用方 bug）。
    pub async fn revert_action(
        &self,
        target: impl Into<NotificationTarget>,
        slot: ActionSlot,
    ) -> InboxResult<Notification> {
        self.ensure_session()?;
        self.ctx
            .run_notification_action(target.into(), UpdateAction::Revert { action: slot })
            .await
    }

    // ── 批量动作 ────────────────────────────────────────────────

    pub async fn read_all(&self, filter: &NotificationFilter) -> InboxResult<Vec<Notification>> {
        self.ensure_session()?;
        self.ctx
            .run_bulk_action(events::NOTIFICATIONS_READ_ALL, BulkAction::Read, filter)
            .await
    }

    pub async fn seen_all(&self, filter: &NotificationFilter) -> InboxResult<Vec<Notification>> {
        self.ensure_session()?;
        self.ctx
            .run_bulk_action(events::NOTIFICATIONS_SEEN_ALL, BulkAction::Seen, filter)
            .await
    }

    pub async fn archive_all(
        &self,
        filter: &NotificationFilter,
    ) -> InboxResult<Vec<Notification>> {
        self.ensure_session()?;
        self.ctx
            .run_bulk_action(
                events::NOTIFICATIONS_ARCHIVE_ALL,
                BulkAction::Archive,
                filter,
            )
            .await
    }

    pub async fn archive_all_read(
        &self,
        filter: &NotificationFilter,
    ) -> InboxResult<Vec<Notification>> {
        self.ensure_session()?;
        self.ctx
            .run_bulk_action(
                events::NOTIFICATIONS_ARCHIVE_ALL_READ,
                BulkAction::ReadArchive,
                filter,
            )
            .await
    }

    // ── 偏好 ────────────────────────────────────────────────────

    pub async fn list_preferences(&self) -> InboxResult<Vec<Preference>> {
        self.ensure_session()?;
        self.ctx.list_preferences().await
    }

    /// 缓存的偏好快照（上次 list 以来，含乐观更新）
    pub fn cached_preferences(&self) -> Vec<Preference> {
        self.ctx.cached_preferences()
    }

    /// 更新偏好；`workflow_id` 缺省时为全局更新并跨缓存行扇出
    pub async fn update_preference(
        &self,
        workflow_id: Option<&str>,
        channels: ChannelMap,
    ) -> InboxResult<Preference> {
        self.ensure_session()?;
        self.ctx.update_preference(workflow_id, &channels).await
    }

    /// 批量偏好更新；含 GLOBAL 目标时本地拒绝，不发请求
    pub async fn bulk_update_preferences(
        &self,
        updates: Vec<PreferenceUpdate>,
    ) -> InboxResult<Vec<Preference>> {
        self.ensure_session()?;
        self.ctx.bulk_update_preferences(updates).await
    }

    // ── 可见性跟踪 ──────────────────────────────────────────────

    /// 创建 seen 确认批处理跟踪器（交叉观察回调模式）
    pub fn visibility_tracker(&self, config: VisibilityConfig) -> VisibilityTracker {
        VisibilityTracker::new(Arc::downgrade(&self.ctx), config, None)
    }

    /// 创建带轮询回退的跟踪器（环境缺少交叉观察设施时）
    pub fn visibility_tracker_with_probe(
        &self,
        config: VisibilityConfig,
        probe: Box<dyn LayoutProbe>,
    ) -> VisibilityTracker {
        VisibilityTracker::new(Arc::downgrade(&self.ctx), config, Some(probe))
    }

    // ── keyless 演示触发 ────────────────────────────────────────

    /// 触发演示事件（仅 keyless 会话可用）
    pub async fn trigger(
        &self,
        workflow_id: &str,
        payload: Option<Value>,
    ) -> InboxResult<()> {
        let session = self.ctx.current_session().ok_or(InboxError::NoSession)?;
        if !session.is_keyless() {
            return Err(InboxError::InvalidArgument(
                "demo trigger is available only in keyless mode".to_string(),
            ));
        }
        let to = self.ctx.subscriber_id().ok_or(InboxError::NoSession)?;
        self.ctx
            .api
            .trigger_event(&TriggerEventRequest {
                workflow_id: workflow_id.to_string(),
                to,
                payload,
            })
            .await
    }
}
