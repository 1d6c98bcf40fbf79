//! 推送传输抽象 - 两套互不兼容的线协议统一到一个事件面
//!
//! 按配置的推送网关主机选择后端：已知主机（或无主机）走轻量
//! 自重连的原始帧客户端（JSON 载荷内 `event` 字段判别）；其余主机
//! 走房间/命名空间多路复用客户端（按命名线事件分发）。两者都把
//! 恰好三种服务端事件翻译成事件总线发布，并构造与 REST 来源形状
//! 一致的 `Notification`，下游对传输无感。
//!
//! 连接是惰性的：首次订阅三个 socket 事件名之一才建立，连接 URL
//! 以查询参数携带会话令牌。帧解析失败记录日志后吞掉，对应事件
//! 不发出，缓存保持原状。

pub mod multiplexed;
pub mod raw;

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::warn;
use url::Url;

use crate::bus::{events, EventData, EventPayload};
use crate::client::{ContextHandle, InboxContext};
use crate::error::{InboxError, InboxResult};
use crate::notification::{Notification, NotificationDto};
use crate::session::UnreadCounts;

/// 线事件判别名（服务端帧内）
pub const WIRE_NOTIFICATION_RECEIVED: &str = "notification_received";
pub const WIRE_UNSEEN_COUNT_CHANGED: &str = "unseen_count_changed";
pub const WIRE_UNREAD_COUNT_CHANGED: &str = "unread_count_changed";

/// 走原始帧客户端的已知主机
pub const DEFAULT_SOCKET_HOSTS: [&str; 3] = [
    "ws.inbox.khulnasoft.com",
    "socket.inbox.khulnasoft.com",
    "localhost",
];

/// 判断事件名是否是 socket 事件（触发惰性连接）
pub fn is_socket_event(name: &str) -> bool {
    matches!(
        name,
        events::NOTIFICATION_RECEIVED
            | events::UNSEEN_COUNT_CHANGED
            | events::UNREAD_COUNT_CHANGED
    )
}

/// 推送传输接口
///
/// 重连/退避由底层传输负责；这一层只做翻译与令牌注入。
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// 建立连接（生成后台读取任务后即返回）
    async fn connect(&self, url: Url) -> InboxResult<()>;
    /// 断开并停止后台任务
    async fn disconnect(&self);
}

/// 解析后的服务端事件
#[derive(Debug, Clone)]
pub enum ServerEvent {
    NotificationReceived(Box<NotificationDto>),
    UnseenCountChanged(u64),
    UnreadCountChanged(UnreadCounts),
}

/// 把线事件名 + 载荷解析成服务端事件
///
/// 未知事件名返回 `None`；已知事件名但载荷不合形时记录并吞掉。
pub fn parse_server_event(name: &str, data: Value) -> Option<ServerEvent> {
    match name {
        WIRE_NOTIFICATION_RECEIVED => match serde_json::from_value::<NotificationDto>(data) {
            Ok(dto) => Some(ServerEvent::NotificationReceived(Box::new(dto))),
            Err(e) => {
                warn!(error = %e, "Malformed notification_received frame, dropping");
                None
            }
        },
        WIRE_UNSEEN_COUNT_CHANGED => match data.get("count").and_then(Value::as_u64) {
            Some(count) => Some(ServerEvent::UnseenCountChanged(count)),
            None => {
                warn!("Malformed unseen_count_changed frame, dropping");
                None
            }
        },
        WIRE_UNREAD_COUNT_CHANGED => match serde_json::from_value::<UnreadCounts>(data) {
            Ok(counts) => Some(ServerEvent::UnreadCountChanged(counts)),
            Err(e) => {
                warn!(error = %e, "Malformed unread_count_changed frame, dropping");
                None
            }
        },
        _ => None,
    }
}

impl InboxContext {
    /// 把服务端事件送入总线与缓存
    pub(crate) fn dispatch_server_event(self: &Arc<Self>, event: ServerEvent) {
        match event {
            ServerEvent::NotificationReceived(dto) => {
                let n = Notification::from_dto(*dto, ContextHandle::new(self));
                self.cache.handle_received(&n);
                self.bus.emit(
                    events::NOTIFICATION_RECEIVED,
                    &EventPayload {
                        args: json!({ "notificationId": n.id() }),
                        data: Some(EventData::Notification(n)),
                        error: None,
                    },
                );
            }
            ServerEvent::UnseenCountChanged(count) => {
                self.bus.emit(
                    events::UNSEEN_COUNT_CHANGED,
                    &EventPayload {
                        args: json!({ "count": count }),
                        data: Some(EventData::UnseenCount(count)),
                        error: None,
                    },
                );
            }
            ServerEvent::UnreadCountChanged(counts) => {
                self.update_unread_counts(counts.clone());
                self.bus.emit(
                    events::UNREAD_COUNT_CHANGED,
                    &EventPayload {
                        args: json!({ "total": counts.total }),
                        data: Some(EventData::UnreadCount(counts)),
                        error: None,
                    },
                );
            }
        }
    }
}

/// 该 URL 是否走原始帧客户端（已知主机或无主机）
fn routes_to_raw(socket_url: &Url) -> bool {
    match socket_url.host_str() {
        None => true,
        Some(host) => DEFAULT_SOCKET_HOSTS.contains(&host),
    }
}

/// 按主机选择传输后端
pub(crate) fn select_transport(
    ctx: Weak<InboxContext>,
    socket_url: &Url,
) -> Box<dyn PushTransport> {
    if routes_to_raw(socket_url) {
        Box::new(raw::RawFrameSocket::new(ctx))
    } else {
        Box::new(multiplexed::MultiplexedSocket::new(ctx))
    }
}

/// 给连接 URL 注入会话令牌查询参数
pub(crate) fn socket_url_with_token(socket_url: &str, token: &str) -> InboxResult<Url> {
    let mut url = Url::parse(socket_url)
        .map_err(|e| InboxError::Socket(format!("invalid socket url: {e}")))?;
    url.query_pairs_mut().append_pair("token", token);
    Ok(url)
}
