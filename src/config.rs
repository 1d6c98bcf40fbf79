//! SDK 配置
//!
//! 与后端和推送网关的连接参数。所有字段都有合理默认值，
//! 通过 `with_*` 方法链式覆盖。

/// 默认 REST 后端地址
pub const DEFAULT_BACKEND_URL: &str = "https://api.inbox.khulnasoft.com";

/// 默认推送网关地址
pub const DEFAULT_SOCKET_URL: &str = "wss://ws.inbox.khulnasoft.com";

/// 默认请求超时（秒）
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// REST 基础路径
pub const INBOX_BASE_PATH: &str = "/inbox";

/// SDK 配置
#[derive(Debug, Clone)]
pub struct InboxConfig {
    /// REST 后端地址（不含 `/inbox` 路径）
    pub backend_url: String,
    /// 推送网关地址（ws:// 或 wss://）
    pub socket_url: String,
    /// 请求超时（秒）
    pub timeout_secs: u64,
    /// 显式 application identifier（缺省时走 keyless 流程）
    pub application_identifier: Option<String>,
}

impl Default for InboxConfig {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            socket_url: DEFAULT_SOCKET_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            application_identifier: None,
        }
    }
}

impl InboxConfig {
    /// 创建默认配置
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置后端地址
    pub fn with_backend_url(mut self, url: impl Into<String>) -> Self {
        self.backend_url = url.into();
        self
    }

    /// 设置推送网关地址
    pub fn with_socket_url(mut self, url: impl Into<String>) -> Self {
        self.socket_url = url.into();
        self
    }

    /// 设置请求超时
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// 设置 application identifier
    pub fn with_application_identifier(mut self, id: impl Into<String>) -> Self {
        self.application_identifier = Some(id.into());
        self
    }

    /// 拼接 REST 完整地址（base + /inbox + path）
    pub fn api_url(&self, path: &str) -> String {
        format!(
            "{}{}{}",
            self.backend_url.trim_end_matches('/'),
            INBOX_BASE_PATH,
            path
        )
    }
}
