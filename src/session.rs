//! 会话管理 - 订阅者身份 bootstrap 与 keyless 回退
//!
//! `initialize` 用订阅者身份换取会话令牌。目标身份与当前会话一致时
//! no-op。keyless 模式下服务端自动签发带 `keyless_` 前缀的
//! application identifier，持久化到本地存储，显式 identifier 出现时
//! 删除。网络失败被记录并吞掉（resolved 事件携带错误），不向调用方
//! 抛出。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::api::types::SessionRequest;
use crate::bus::{events, EventData};
use crate::client::InboxContext;
use crate::notification::Severity;
use crate::storage::{KEYLESS_PREFIX, KEYLESS_STORAGE_KEY};

/// 未读计数（总数 + 按严重级别分段）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadCounts {
    pub total: u64,
    #[serde(default)]
    pub by_severity: BTreeMap<Severity, u64>,
}

/// 会话快照
///
/// 初始化时创建，订阅者变更时整体替换，从不部分修改。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub token: String,
    pub unread: UnreadCounts,
    pub remove_branding: bool,
    pub is_dev_mode: bool,
    pub max_snooze_duration_hours: Option<u32>,
    pub application_identifier: Option<String>,
}

impl Session {
    /// 是否为 keyless 会话（服务端签发的临时 identifier）
    pub fn is_keyless(&self) -> bool {
        self.application_identifier
            .as_deref()
            .map(|id| id.starts_with(KEYLESS_PREFIX))
            .unwrap_or(false)
    }
}

/// `initialize` 参数
#[derive(Debug, Clone, Default)]
pub struct InitializeArgs {
    pub subscriber_id: String,
    /// 显式 application identifier，优先于配置与存储的 keyless id
    pub application_identifier: Option<String>,
    pub subscriber_hash: Option<String>,
}

impl InitializeArgs {
    pub fn new(subscriber_id: impl Into<String>) -> Self {
        Self {
            subscriber_id: subscriber_id.into(),
            application_identifier: None,
            subscriber_hash: None,
        }
    }

    pub fn with_application_identifier(mut self, id: impl Into<String>) -> Self {
        self.application_identifier = Some(id.into());
        self
    }

    pub fn with_subscriber_hash(mut self, hash: impl Into<String>) -> Self {
        self.subscriber_hash = Some(hash.into());
        self
    }
}

/// 当前会话状态（整体替换，不部分修改）
#[derive(Debug, Clone)]
pub(crate) struct SessionState {
    pub session: Session,
    pub subscriber_id: String,
}

impl InboxContext {
    /// 初始化会话（会话管理的唯一入口）
    ///
    /// 成功返回会话快照；失败返回 `None`（错误已记录并随 resolved
    /// 事件广播）。
    pub(crate) async fn initialize_session(&self, args: InitializeArgs) -> Option<Session> {
        // 目标身份未变 → no-op
        {
            let state = self.session.read().expect("session lock poisoned");
            if let Some(current) = state.as_ref() {
                let same_subscriber = current.subscriber_id == args.subscriber_id;
                let same_app = args.application_identifier.is_none()
                    || args.application_identifier.as_deref()
                        == current.session.application_identifier.as_deref();
                if same_subscriber && same_app {
                    debug!(subscriber_id = %args.subscriber_id, "Session already initialized, skipping");
                    return Some(current.session.clone());
                }
            }
        }

        // 解析最终 application identifier：
        // 显式 > 配置 > 存储的 keyless id
        let explicit = args
            .application_identifier
            .clone()
            .or_else(|| self.config.application_identifier.clone());
        let resolved = match &explicit {
            Some(id) => {
                // 显式 identifier 出现，清掉存储的 keyless id
                if let Err(e) = self.storage.remove(KEYLESS_STORAGE_KEY) {
                    warn!(error = %e, "Failed to clear stored keyless identifier");
                }
                Some(id.clone())
            }
            None => self.storage.get(KEYLESS_STORAGE_KEY),
        };

        let request = SessionRequest {
            application_identifier: resolved.clone(),
            subscriber_id: args.subscriber_id.clone(),
            subscriber_hash: args.subscriber_hash.clone(),
        };
        let event_args = json!({
            "subscriberId": args.subscriber_id,
            "applicationIdentifier": resolved,
        });

        self.bus
            .emit_pending(events::SESSION_INITIALIZE, event_args.clone(), None);

        match self.api.create_session(&request).await {
            Ok(response) => {
                // 只有服务端签发的 keyless 凭证才持久化
                if let Some(issued) = response.application_identifier.as_deref() {
                    if issued.starts_with(KEYLESS_PREFIX) {
                        if let Err(e) = self.storage.set(KEYLESS_STORAGE_KEY, issued) {
                            warn!(error = %e, "Failed to persist keyless identifier");
                        }
                    }
                }

                let session = Session {
                    token: response.token.clone(),
                    unread: response.unread_count,
                    remove_branding: response.remove_branding,
                    is_dev_mode: response.is_dev_mode,
                    max_snooze_duration_hours: response.max_snooze_duration_hours,
                    application_identifier: response.application_identifier,
                };

                self.api.set_token(Some(response.token));

                // 订阅者变更：会话整体替换，旧订阅者的缓存作废
                let replaced_subscriber = {
                    let mut state = self.session.write().expect("session lock poisoned");
                    let replaced = state
                        .as_ref()
                        .map(|s| s.subscriber_id != args.subscriber_id)
                        .unwrap_or(false);
                    *state = Some(SessionState {
                        session: session.clone(),
                        subscriber_id: args.subscriber_id.clone(),
                    });
                    replaced
                };
                if replaced_subscriber {
                    self.cache.clear_all();
                    self.preferences.lock().expect("preference lock poisoned").clear();
                }

                info!(subscriber_id = %args.subscriber_id, keyless = session.is_keyless(), "Session initialized");
                self.bus.emit_resolved(
                    events::SESSION_INITIALIZE,
                    event_args,
                    Ok(EventData::Session(session.clone())),
                );
                Some(session)
            }
            Err(error) => {
                warn!(error = %error, "Session initialization failed");
                self.bus
                    .emit_resolved(events::SESSION_INITIALIZE, event_args, Err(error));
                None
            }
        }
    }

    /// 当前会话快照
    pub(crate) fn current_session(&self) -> Option<Session> {
        self.session
            .read()
            .expect("session lock poisoned")
            .as_ref()
            .map(|s| s.session.clone())
    }

    /// 当前会话令牌
    pub(crate) fn session_token(&self) -> Option<String> {
        self.current_session().map(|s| s.token)
    }

    /// 当前 application identifier
    pub(crate) fn application_identifier(&self) -> Option<String> {
        self.current_session()
            .and_then(|s| s.application_identifier)
    }

    /// 当前订阅者 id
    pub(crate) fn subscriber_id(&self) -> Option<String> {
        self.session
            .read()
            .expect("session lock poisoned")
            .as_ref()
            .map(|s| s.subscriber_id.clone())
    }

    /// 推送计数帧到达时更新会话内的未读计数（整体替换快照）
    pub(crate) fn update_unread_counts(&self, unread: UnreadCounts) {
        let mut state = self.session.write().expect("session lock poisoned");
        if let Some(current) = state.as_mut() {
            let mut session = current.session.clone();
            session.unread = unread;
            current.session = session;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyless_detection() {
        let session = Session {
            token: "t".to_string(),
            unread: UnreadCounts::default(),
            remove_branding: false,
            is_dev_mode: true,
            max_snooze_duration_hours: None,
            application_identifier: Some("keyless_abc123".to_string()),
        };
        assert!(session.is_keyless());

        let real = Session {
            application_identifier: Some("app-prod".to_string()),
            ..session
        };
        assert!(!real.is_keyless());
    }

    #[test]
    fn test_initialize_args_builder() {
        let args = InitializeArgs::new("alice")
            .with_application_identifier("app-1")
            .with_subscriber_hash("hmac");
        assert_eq!(args.subscriber_id, "alice");
        assert_eq!(args.application_identifier.as_deref(), Some("app-1"));
        assert_eq!(args.subscriber_hash.as_deref(), Some("hmac"));
    }
}
