//! Inbox Sync - 实时通知收件箱同步 SDK
//!
//! 客户端侧的通知收件箱：REST 拉取 + 双推送传输实时同步、按过滤器
//! 指纹分片的通知缓存、乐观更新/确认/回滚的动作编排、偏好扇出解析
//! 与可见性 seen 批量确认。所有状态变化经由事件总线以
//! `<域>.<动作>.<阶段>` 两段式事件广播。

pub mod api;
pub mod bus;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod notification;
pub mod preference;
pub mod session;
pub mod socket;
pub mod storage;

pub use bus::{events, EventBus, EventData, EventPayload, Subscription};
pub use client::{InboxClient, NotificationListResult};
pub use config::InboxConfig;
pub use error::{InboxError, InboxResult};
pub use notification::{
    ActionSlot, ChannelMap, ChannelType, LayoutProbe, Notification, NotificationFilter,
    NotificationTarget, Severity, VisibilityConfig, VisibilityTracker,
};
pub use preference::{Preference, PreferenceLevel, PreferenceUpdate};
pub use session::{InitializeArgs, Session, UnreadCounts};
pub use storage::{FileStorage, KeyValueStorage, MemoryStorage};
