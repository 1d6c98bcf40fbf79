//! 通知域 - 值对象、过滤缓存、动作编排、可见性跟踪

pub mod actions;
pub mod cache;
pub mod filter;
pub mod model;
pub mod visibility;

pub use actions::NotificationTarget;
pub use cache::{CacheEntry, NotificationCache, NEAR_EMPTY_LEN};
pub use filter::NotificationFilter;
pub use model::{
    ActionSlot, ChannelMap, ChannelType, Notification, NotificationButton, NotificationDto,
    NotificationPatch, Redirect, Severity, Subscriber, Workflow,
};
pub use visibility::{LayoutProbe, VisibilityConfig, VisibilityTracker};
