//! SDK 错误类型定义
//!
//! 所有公开的变更操作都以 `InboxResult<T>` 返回结果，网络或校验失败
//! 永远不会跨越公开边界 panic。错误类型实现 `Clone`，因此可以随
//! resolved 事件载荷一起广播给所有订阅者。

use thiserror::Error;

/// Inbox SDK 统一错误类型
#[derive(Debug, Clone, Error, PartialEq)]
pub enum InboxError {
    /// 会话尚未初始化（调用 `initialize` 之前执行了需要会话的操作）
    #[error("session has not been initialized, call initialize() first")]
    NoSession,

    /// 网络请求失败（连接、超时、DNS 等）
    #[error("network request failed: {0}")]
    Network(String),

    /// 服务端返回非 2xx 状态码
    #[error("server returned status {status}: {message}")]
    Api { status: u16, message: String },

    /// 本地参数校验失败（请求未发出）
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// 推送通道错误（连接、握手、帧解析）
    #[error("push transport error: {0}")]
    Socket(String),

    /// 本地存储读写失败
    #[error("storage error: {0}")]
    Storage(String),

    /// 值对象已与客户端分离（客户端被 drop 后调用其动作方法）
    #[error("notification is detached from its client")]
    Detached,
}

impl From<reqwest::Error> for InboxError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            InboxError::Api {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            InboxError::Network(err.to_string())
        }
    }
}

/// SDK 统一结果类型
pub type InboxResult<T> = Result<T, InboxError>;
