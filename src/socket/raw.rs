//! 原始帧客户端 - 轻量自重连 WebSocket
//!
//! 服务端把事件名放在 JSON 载荷的 `event` 字段里：
//! `{"event": "notification_received", "data": {...}}`。
//! 断线后按固定上限的指数退避重连；客户端上下文被 drop 后
//! 读取任务自行退出。

use std::sync::{Mutex, Weak};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};
use url::Url;

use super::{parse_server_event, PushTransport};
use crate::client::InboxContext;
use crate::error::InboxResult;

/// 初始重连退避
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
/// 退避上限
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// 原始帧格式
#[derive(Debug, Deserialize)]
struct WireFrame {
    event: String,
    #[serde(default)]
    data: Value,
}

/// 轻量自重连原始帧客户端
pub struct RawFrameSocket {
    ctx: Weak<InboxContext>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl RawFrameSocket {
    pub fn new(ctx: Weak<InboxContext>) -> Self {
        Self {
            ctx,
            reader: Mutex::new(None),
        }
    }

    /// 处理一个文本帧；解析失败记录后吞掉
    fn handle_frame(ctx: &Weak<InboxContext>, text: &str) {
        let frame: WireFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Unparseable raw frame, dropping");
                return;
            }
        };
        let Some(ctx) = ctx.upgrade() else {
            return;
        };
        if let Some(event) = parse_server_event(&frame.event, frame.data) {
            ctx.dispatch_server_event(event);
        }
    }

    async fn run(ctx: Weak<InboxContext>, url: Url) {
        let mut backoff = INITIAL_BACKOFF;
        loop {
            match connect_async(url.as_str()).await {
                Ok((stream, _)) => {
                    debug!(host = ?url.host_str(), "Raw frame socket connected");
                    backoff = INITIAL_BACKOFF;
                    let (mut write, mut read) = stream.split();
                    while let Some(message) = read.next().await {
                        match message {
                            Ok(Message::Text(text)) => Self::handle_frame(&ctx, &text),
                            Ok(Message::Ping(payload)) => {
                                let _ = write.send(Message::Pong(payload)).await;
                            }
                            Ok(Message::Close(_)) => break,
                            Ok(_) => {}
                            Err(e) => {
                                warn!(error = %e, "Raw frame socket read error");
                                break;
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Raw frame socket connect failed");
                }
            }
            // 客户端已销毁则不再重连
            if ctx.upgrade().is_none() {
                return;
            }
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }
}

#[async_trait]
impl PushTransport for RawFrameSocket {
    async fn connect(&self, url: Url) -> InboxResult<()> {
        let mut reader = self.reader.lock().expect("socket lock poisoned");
        if reader.is_some() {
            return Ok(());
        }
        let ctx = self.ctx.clone();
        *reader = Some(tokio::spawn(Self::run(ctx, url)));
        Ok(())
    }

    async fn disconnect(&self) {
        if let Some(handle) = self.reader.lock().expect("socket lock poisoned").take() {
            handle.abort();
        }
    }
}
