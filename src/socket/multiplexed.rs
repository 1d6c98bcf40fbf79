//! 多路复用客户端 - 按命名线事件分发
//!
//! 网关说的是房间/命名空间多路复用文本协议（engine.io 风格）：
//! `0{...}` 打开握手 → 回 `40` 加入默认命名空间；`2` 心跳 → 回 `3`；
//! `42["<event>",{...}]` 命名事件帧。这一层只做翻译与令牌注入，
//! 心跳与重连属于协议义务，同样由读取循环承担。

use std::sync::{Mutex, Weak};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};
use url::Url;

use super::{parse_server_event, PushTransport};
use crate::client::InboxContext;
use crate::error::InboxResult;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// 包帧类型前缀
const PACKET_OPEN: &str = "0";
const PACKET_PING: &str = "2";
const PACKET_PONG: &str = "3";
const PACKET_CONNECT: &str = "40";
const PACKET_EVENT: &str = "42";

/// 解析 `42["<event>",{...}]` 事件包
fn parse_event_packet(text: &str) -> Option<(String, Value)> {
    let body = text.strip_prefix(PACKET_EVENT)?;
    let parsed: Vec<Value> = serde_json::from_str(body).ok()?;
    let mut iter = parsed.into_iter();
    let name = iter.next()?.as_str()?.to_string();
    let payload = iter.next().unwrap_or(Value::Null);
    Some((name, payload))
}

/// 房间/命名空间多路复用客户端
pub struct MultiplexedSocket {
    ctx: Weak<InboxContext>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl MultiplexedSocket {
    pub fn new(ctx: Weak<InboxContext>) -> Self {
        Self {
            ctx,
            reader: Mutex::new(None),
        }
    }

    async fn run(ctx: Weak<InboxContext>, url: Url) {
        let mut backoff = INITIAL_BACKOFF;
        loop {
            match connect_async(url.as_str()).await {
                Ok((stream, _)) => {
                    debug!(host = ?url.host_str(), "Multiplexed socket connected");
                    backoff = INITIAL_BACKOFF;
                    let (mut write, mut read) = stream.split();
                    while let Some(message) = read.next().await {
                        match message {
                            Ok(Message::Text(text)) => {
                                if text.starts_with(PACKET_EVENT) {
                                    match parse_event_packet(&text) {
                                        Some((name, payload)) => {
                                            let Some(ctx) = ctx.upgrade() else { return };
                                            if let Some(event) =
                                                parse_server_event(&name, payload)
                                            {
                                                ctx.dispatch_server_event(event);
                                            }
                                        }
                                        None => {
                                            warn!("Unparseable event packet, dropping");
                                        }
                                    }
                                } else if text == PACKET_PING {
                                    let _ = write
                                        .send(Message::Text(PACKET_PONG.to_string()))
                                        .await;
                                } else if text.starts_with(PACKET_OPEN) {
                                    // 握手完成，加入默认命名空间
                                    let _ = write
                                        .send(Message::Text(PACKET_CONNECT.to_string()))
                                        .await;
                                }
                                // 其余包类型（ack 等）忽略
                            }
                            Ok(Message::Ping(payload)) => {
                                let _ = write.send(Message::Pong(payload)).await;
                            }
                            Ok(Message::Close(_)) => break,
                            Ok(_) => {}
                            Err(e) => {
                                warn!(error = %e, "Multiplexed socket read error");
                                break;
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Multiplexed socket connect failed");
                }
            }
            if ctx.upgrade().is_none() {
                return;
            }
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }
}

#[async_trait]
impl PushTransport for MultiplexedSocket {
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
