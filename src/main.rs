//! Inbox Sync CLI
//!
//! 命令行收件箱：会话、列表、单条动作、实时推送监听与 keyless 演示触发

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use inbox_sync::cli::{self, ListArgs};
use inbox_sync::{InboxClient, InboxConfig};

#[derive(Parser)]
#[command(name = "inbox")]
#[command(about = "Inbox Sync - 实时通知收件箱客户端")]
#[command(version)]
struct Cli {
    /// REST 后端地址
    #[arg(long, global = true)]
    backend_url: Option<String>,
    /// 推送网关地址
    #[arg(long, global = true)]
    socket_url: Option<String>,
    /// application identifier（缺省时走 keyless 模式）
    #[arg(long, global = true)]
    app_id: Option<String>,
    /// 订阅者 id
    #[arg(long, global = true, default_value = "inbox-cli")]
    subscriber: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 初始化会话并打印快照
    Session {
        /// 输出 JSON 格式
        #[arg(long)]
        json: bool,
    },
    /// 拉取一页通知
    List(ListArgs),
    /// 标记通知已读
    Read {
        /// 通知 id
        notification_id: String,
        /// 输出 JSON 格式
        #[arg(long)]
        json: bool,
    },
    /// 归档通知（隐含已读）
    Archive {
        /// 通知 id
        notification_id: String,
        /// 输出 JSON 格式
        #[arg(long)]
        json: bool,
    },
    /// 暂缓通知到指定时间
    Snooze {
        /// 通知 id
        notification_id: String,
        /// 暂缓截止时间（RFC 3339，如 2026-09-01T08:00:00Z）
        #[arg(long)]
        until: String,
        /// 输出 JSON 格式
        #[arg(long)]
        json: bool,
    },
    /// 监听实时推送事件（Ctrl-C 退出）
    Listen {
        /// 输出 JSON 格式
        #[arg(long)]
        json: bool,
    },
    /// 触发演示工作流（仅 keyless 模式）
    Trigger {
        /// 工作流 id
        workflow_id: String,
        /// JSON 载荷
        #[arg(long)]
        payload: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // 通过 RUST_LOG 环境变量控制日志级别，默认为 info
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("inbox_sync=info,inbox=info"));

    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    let cli = Cli::parse();

    let mut config = InboxConfig::new();
    if let Some(url) = &cli.backend_url {
        config = config.with_backend_url(url);
    }
    if let Some(url) = &cli.socket_url {
        config = config.with_socket_url(url);
    }
    if let Some(id) = &cli.app_id {
        config = config.with_application_identifier(id);
    }
    let client = InboxClient::new(config)?;

    match cli.command {
        Commands::Session { json } => cli::handle_session(&client, &cli.subscriber, json).await,
        Commands::List(args) => cli::handle_list(&client, &cli.subscriber, args).await,
        Commands::Read {
            notification_id,
            json,
        } => cli::handle_read(&client, &cli.subscriber, &notification_id, json).await,
        Commands::Archive {
            notification_id,
            json,
        } => cli::handle_archive(&client, &cli.subscriber, &notification_id, json).await,
        Commands::Snooze {
            notification_id,
            until,
            json,
        } => cli::handle_snooze(&client, &cli.subscriber, &notification_id, &until, json).await,
        Commands::Listen { json } => cli::handle_listen(&client, &cli.subscriber, json).await,
        Commands::Trigger {
            workflow_id,
            payload,
        } => cli::handle_trigger(&client, &cli.subscriber, &workflow_id, payload).await,
    }
}
