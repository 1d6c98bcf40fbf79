//! reqwest 实现的 REST 客户端
//!
//! 会话令牌由 Session Manager 在 bootstrap 后注入，之后所有请求
//! 携带 `Authorization: Bearer` 头。本层不做重试。

use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde_json::Value;
use tracing::debug;

use super::types::{
    BulkAction, BulkPreferenceItem, BulkScope, CountsResponse, FilterCount,
    ListNotificationsQuery, ListNotificationsResponse, SessionRequest, SessionResponse,
    TriggerEventRequest, UpdateAction,
};
use super::InboxApi;
use crate::config::InboxConfig;
use crate::error::{InboxError, InboxResult};
use crate::notification::{ChannelMap, NotificationDto, NotificationFilter};
use crate::preference::PreferenceDto;

/// reqwest 客户端
pub struct HttpInboxApi {
    client: Client,
    config: InboxConfig,
    token: RwLock<Option<String>>,
}

impl HttpInboxApi {
    /// 创建客户端（带超时）
    pub fn new(config: InboxConfig) -> InboxResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| InboxError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            config,
            token: RwLock::new(None),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = self.config.api_url(path);
        let mut builder = self.client.request(method, url);
        if let Some(token) = self.token.read().expect("token lock poisoned").as_deref() {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    /// 把过滤器铺平成查询参数
    fn filter_query(filter: &NotificationFilter, pairs: &mut Vec<(String, String)>) {
        if let Some(tags) = &filter.tags {
            if !tags.is_empty() {
                pairs.push(("tags".to_string(), tags.join(",")));
            }
        }
        if let Some(data) = &filter.data {
            if !data.is_empty() {
                pairs.push((
                    "data".to_string(),
                    Value::Object(data.clone()).to_string(),
                ));
            }
        }
        if let Some(severity) = &filter.severity {
            if !severity.is_empty() {
                let names: Vec<&str> = severity.iter().map(|s| s.as_str()).collect();
                pairs.push(("severity".to_string(), names.join(",")));
            }
        }
        if let Some(read) = filter.read {
            pairs.push(("read".to_string(), read.to_string()));
        }
        if let Some(archived) = filter.archived {
            pairs.push(("archived".to_string(), archived.to_string()));
        }
        if let Some(snoozed) = filter.snoozed {
            pairs.push(("snoozed".to_string(), snoozed.to_string()));
        }
        if let Some(seen) = filter.seen {
            pairs.push(("seen".to_string(), seen.to_string()));
        }
    }

    /// 非 2xx 映射为 `InboxError::Api`
    async fn check(response: Response) -> InboxResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(InboxError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl InboxApi for HttpInboxApi {
    fn set_token(&self, token: Option<String>) {
        *self.token.write().expect("token lock poisoned") = token;
    }

    async fn create_session(&self, req: &SessionRequest) -> InboxResult<SessionResponse> {
        debug!(subscriber_id = %req.subscriber_id, "POST /inbox/session");
        let response = self
            .request(Method::POST, "/session")
            .json(req)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn list_notifications(
        &self,
        query: &ListNotificationsQuery,
    ) -> InboxResult<ListNotificationsResponse> {
        let mut pairs = Vec::new();
        Self::filter_query(&query.filter, &mut pairs);
        if let Some(after) = &query.after {
            pairs.push(("after".to_string(), after.clone()));
        }
        if let Some(limit) = query.limit {
            pairs.push(("limit".to_string(), limit.to_string()));
        }
        let response = self
            .request(Method::GET, "/notifications")
            .query(&pairs)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn fetch_counts(
        &self,
        filters: &[NotificationFilter],
    ) -> InboxResult<Vec<FilterCount>> {
        let filters_json = serde_json::to_string(filters)
            .map_err(|e| InboxError::InvalidArgument(e.to_string()))?;
        let response = self
            .request(Method::GET, "/notifications/count")
            .query(&[("filters", filters_json)])
            .send()
            .await?;
        let body: CountsResponse = Self::check(response).await?.json().await?;
        Ok(body.counts)
    }

    async fn update_notification(
        &self,
        id: &str,
        action: &UpdateAction,
    ) -> InboxResult<NotificationDto> {
        debug!(id = %id, verb = action.verb(), "PATCH notification");
        let mut builder = self.request(
            Method::PATCH,
            &format!("/notifications/{id}/{}", action.verb()),
        );
        if let Some(body) = action.body() {
            builder = builder.json(&body);
        }
        let response = builder.send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn bulk_update(&self, action: BulkAction, scope: &BulkScope) -> InboxResult<()> {
        debug!(verb = action.verb(), "POST bulk notification update");
        let response = self
            .request(Method::POST, &format!("/notifications/{}", action.verb()))
            .json(scope)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn list_preferences(&self) -> InboxResult<Vec<PreferenceDto>> {
        let response = self.request(Method::GET, "/preferences").send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn update_global_preference(
        &self,
        channels: &ChannelMap,
    ) -> InboxResult<PreferenceDto> {
        let response = self
            .request(Method::PATCH, "/preferences")
            .json(&serde_json::json!({ "channels": channels }))
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn update_workflow_preference(
        &self,
        workflow_id: &str,
        channels: &ChannelMap,
    ) -> InboxResult<PreferenceDto> {
        let response = self
            .request(Method::PATCH, &format!("/preferences/{workflow_id}"))
            .json(&serde_json::json!({ "channels": channels }))
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn bulk_update_preferences(
        &self,
        items: &[BulkPreferenceItem],
    ) -> InboxResult<Vec<PreferenceDto>> {
        let response = self
            .request(Method::PATCH, "/preferences/bulk")
            .json(&serde_json::json!({ "preferences": items }))
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn trigger_event(&self, req: &TriggerEventRequest) -> InboxResult<()> {
        let response = self.request(Method::POST, "/events").json(req).send().await?;
        Self::check(response).await?;
        Ok(())
    }
}
