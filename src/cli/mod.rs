//! CLI 命令处理
//!
//! 每个子命令一个 handler，薄薄一层把参数翻译成 SDK 调用。

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::bus::{events, EventData};
use crate::client::InboxClient;
use crate::notification::{Notification, NotificationFilter, Severity};
use crate::session::{InitializeArgs, Session};

/// 序列化为 JSON；`pretty` 控制是否缩进（listen 流式输出用紧凑形式）
pub fn format_output<T: Serialize>(data: &T, pretty: bool) -> String {
    if pretty {
        serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string())
    } else {
        serde_json::to_string(data).unwrap_or_else(|_| "{}".to_string())
    }
}

/// 人类可读的一行通知摘要
fn notification_line(n: &Notification) -> String {
    let mut flags = String::new();
    flags.push(if n.is_read() { 'r' } else { '-' });
    flags.push(if n.is_seen() { 's' } else { '-' });
    flags.push(if n.is_archived() { 'a' } else { '-' });
    flags.push(if n.is_snoozed() { 'z' } else { '-' });
    format!(
        "{}  [{}] {:6}  {}",
        n.id(),
        flags,
        n.severity().as_str(),
        n.subject().unwrap_or_else(|| n.body()),
    )
}

fn print_notification(n: &Notification, json: bool) {
    if json {
        println!("{}", format_output(n.as_dto(), true));
    } else {
        println!("{}", notification_line(n));
    }
}

/// list 子命令的过滤参数
#[derive(Debug, Clone, clap::Args)]
pub struct ListArgs {
    /// 按标签过滤（可重复）
    #[arg(long)]
    pub tag: Vec<String>,
    /// 只看已归档
    #[arg(long)]
    pub archived: bool,
    /// 只看未读
    #[arg(long)]
    pub unread: bool,
    /// 按严重级别过滤（high/medium/low/none，可重复）
    #[arg(long)]
    pub severity: Vec<String>,
    /// 每页条数
    #[arg(long, default_value = "10")]
    pub limit: usize,
    /// 输出 JSON 格式
    #[arg(long)]
    pub json: bool,
}

fn parse_severity(value: &str) -> Result<Severity> {
    match value {
        "high" => Ok(Severity::High),
        "medium" => Ok(Severity::Medium),
        "low" => Ok(Severity::Low),
        "none" => Ok(Severity::None),
        other => Err(anyhow!("unknown severity: {other}")),
    }
}

impl ListArgs {
    fn filter(&self) -> Result<NotificationFilter> {
        let mut filter = NotificationFilter::new();
        if !self.tag.is_empty() {
            filter = filter.with_tags(self.tag.clone());
        }
        if self.archived {
            filter = filter.with_archived(true);
        }
        if self.unread {
            filter = filter.with_read(false);
        }
        if !self.severity.is_empty() {
            let severities = self
                .severity
                .iter()
                .map(|s| parse_severity(s))
                .collect::<Result<Vec<_>>>()?;
            filter = filter.with_severity(severities);
        }
        Ok(filter)
    }
}

/// 初始化会话并打印
pub async fn handle_session(client: &InboxClient, subscriber_id: &str, json: bool) -> Result<()> {
    let session = initialize(client, subscriber_id).await?;
    if json {
        println!("{}", format_output(&session, true));
    } else {
        let mode = if session.is_keyless() { " (keyless)" } else { "" };
        println!(
            "session established{mode}: {} unread, subscriber {}",
            session.unread.total,
            client.subscriber_id().unwrap_or_default(),
        );
    }
    Ok(())
}

/// 拉取并打印一页通知
pub async fn handle_list(client: &InboxClient, subscriber_id: &str, args: ListArgs) -> Result<()> {
    initialize(client, subscriber_id).await?;
    let filter = args.filter()?;
    let page = client
        .list_notifications(&filter, Some(args.limit), None)
        .await
        .context("failed to list notifications")?;
    if args.json {
        let dtos: Vec<_> = page.notifications.iter().map(|n| n.as_dto()).collect();
        println!("{}", format_output(&dtos, true));
    } else {
        for n in &page.notifications {
            println!("{}", notification_line(n));
        }
        if page.has_more {
            println!("... more available");
        }
    }
    Ok(())
}

pub async fn handle_read(
    client: &InboxClient,
    subscriber_id: &str,
    notification_id: &str,
    json: bool,
) -> Result<()> {
    initialize(client, subscriber_id).await?;
    let updated = client.read(notification_id).await?;
    print_notification(&updated, json);
    Ok(())
}

pub async fn handle_archive(
    client: &InboxClient,
    subscriber_id: &str,
    notification_id: &str,
    json: bool,
) -> Result<()> {
    initialize(client, subscriber_id).await?;
    let updated = client.archive(notification_id).await?;
    print_notification(&updated, json);
    Ok(())
}

pub async fn handle_snooze(
    client: &InboxClient,
    subscriber_id: &str,
    notification_id: &str,
    until: &str,
    json: bool,
) -> Result<()> {
    initialize(client, subscriber_id).await?;
    let until: DateTime<Utc> = until
        .parse()
        .with_context(|| format!("invalid RFC 3339 timestamp: {until}"))?;
    let updated = client.snooze(notification_id, until).await?;
    print_notification(&updated, json);
    Ok(())
}

/// 订阅推送事件并持续打印，Ctrl-C 退出
pub async fn handle_listen(client: &InboxClient, subscriber_id: &str, json: bool) -> Result<()> {
    initialize(client, subscriber_id).await?;

    let _received = client.on(events::NOTIFICATION_RECEIVED, move |payload| {
        if let Some(EventData::Notification(n)) = &payload.data {
            if json {
                println!("{}", format_output(n.as_dto(), false));
            } else {
                println!("new  {}", notification_line(n));
            }
        }
    });
    let _unseen = client.on(events::UNSEEN_COUNT_CHANGED, |payload| {
        if let Some(EventData::UnseenCount(count)) = &payload.data {
            println!("unseen count: {count}");
        }
    });
    let _unread = client.on(events::UNREAD_COUNT_CHANGED, |payload| {
        if let Some(EventData::UnreadCount(counts)) = &payload.data {
            println!("unread count: {}", counts.total);
        }
    });

    info!("Listening for push events, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    client.disconnect_socket().await;
    Ok(())
}

/// keyless 演示触发
pub async fn handle_trigger(
    client: &InboxClient,
    subscriber_id: &str,
    workflow_id: &str,
    payload: Option<String>,
) -> Result<()> {
    initialize(client, subscriber_id).await?;
    let payload = payload
        .map(|raw| serde_json::from_str(&raw).context("payload must be valid JSON"))
        .transpose()?;
    client.trigger(workflow_id, payload).await?;
    println!("triggered workflow {workflow_id}");
    Ok(())
}

async fn initialize(client: &InboxClient, subscriber_id: &str) -> Result<Session> {
    client
        .initialize(InitializeArgs::new(subscriber_id))
        .await
        .ok_or_else(|| anyhow!("session initialization failed"))
}
