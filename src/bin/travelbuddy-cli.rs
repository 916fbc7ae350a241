//! TravelBuddy CLI 客户端
//!
//! 交互式命令行：启动时恢复上次会话（没有则新建），普通输入作为消息发送，
//! 以 `/` 开头的输入作为命令。

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info};
use travelbuddy_sdk_core_rust::chat::conversation::{ChatMessage, MessageRole, SendOutcome};
use travelbuddy_sdk_core_rust::chat::persona::input_placeholder;
use travelbuddy_sdk_core_rust::chat::session::{EMPTY_LIST_LABEL, LOADING_LABEL};
use travelbuddy_sdk_core_rust::{
    ChatClient, ClientConfig, ClientListeners, ConversationListener, SessionDirectoryListener,
    SessionSummary,
};

/// TravelBuddy CLI 客户端
#[derive(Parser, Debug)]
#[command(name = "travelbuddy-cli")]
#[command(about = "TravelBuddy CLI 客户端 - 多会话聊天", long_about = None)]
struct Args {
    /// 后端地址
    #[arg(long, default_value = "http://127.0.0.1:8000")]
    api_base_url: String,

    /// 本地偏好数据库
    #[arg(long, default_value = "sqlite://travelbuddy_prefs.db?mode=rwc")]
    db_url: String,

    /// 会话列表轮询间隔（秒）
    #[arg(long, default_value = "20")]
    poll_interval: u64,

    /// 日志级别（默认: warn,travelbuddy_sdk_core_rust=info）
    #[arg(long, default_value = "warn,travelbuddy_sdk_core_rust=info")]
    log_level: String,

    /// 日志文件
    #[arg(long, default_value = "debug.log")]
    log_file: String,
}

/// 初始化日志（同时输出到 stdout 和文件）
fn init_logger(log_level: &str, log_file: &str) -> Result<()> {
    use std::fs::OpenOptions;
    use std::io;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    // 优先使用环境变量 RUST_LOG（如果设置了），否则使用命令行参数
    let filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("无法创建日志文件 {}", log_file))?;

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_ansi(true);

    // 文件不需要颜色
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    info!("[CLI] 📝 日志已同时输出到控制台和文件: {}", log_file);
    Ok(())
}

fn cli_listeners() -> ClientListeners {
    struct CliConversationListener;
    #[async_trait::async_trait]
    impl ConversationListener for CliConversationListener {
        async fn on_active_session_changed(&self, session_id: String, persona: String) {
            info!("[CLI/Conversation] 🔀 活跃会话: {} ({})", session_id, persona);
        }

        async fn on_messages_changed(&self, session_id: String, messages: Vec<ChatMessage>) {
            debug!(
                "[CLI/Conversation] 💬 消息列表变更: {}，条数: {}",
                session_id,
                messages.len()
            );
        }

        async fn on_busy_changed(&self, busy: bool) {
            debug!("[CLI/Conversation] ⏳ busy={}", busy);
        }
    }

    struct CliDirectoryListener;
    #[async_trait::async_trait]
    impl SessionDirectoryListener for CliDirectoryListener {
        async fn on_loading_changed(&self, loading: bool) {
            debug!("[CLI/Sessions] 🔄 loading={}", loading);
        }

        async fn on_session_list_changed(&self, sessions: Vec<SessionSummary>) {
            debug!("[CLI/Sessions] 📋 会话数: {}", sessions.len());
        }

        async fn on_refresh_failed(&self, error: String) {
            error!("[CLI/Sessions] ❌ 刷新失败: {}", error);
        }
    }

    ClientListeners {
        conversation: Arc::new(CliConversationListener),
        directory: Arc::new(CliDirectoryListener),
    }
}

fn print_message(message: &ChatMessage) {
    let who = match message.role {
        MessageRole::User => "you",
        MessageRole::Assistant => "bot",
    };
    let at = message
        .timestamp
        .map(|t| t.format("%H:%M").to_string())
        .unwrap_or_else(|| "--:--".to_string());
    println!("[{}] {}: {}", at, who, message.content);
}

fn print_sessions(client: &ChatClient) {
    let active = client.conversation().active_session_id();
    let items = client.directory().list_items(active.as_deref());
    if items.is_empty() {
        if client.directory().is_loading() {
            println!("{}", LOADING_LABEL);
        } else {
            println!("{}", EMPTY_LIST_LABEL);
        }
        return;
    }
    for item in items {
        let marker = if item.is_active { "*" } else { " " };
        let when = item
            .last_activity
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        println!(
            "{} {} {:<32} {}  {}",
            marker, item.icon, item.title, item.session_id, when
        );
    }
}

fn print_help() {
    println!("/new [title]            新建会话");
    println!("/sessions               会话列表");
    println!("/switch <id>            切换会话");
    println!("/rename <id> <title>    重命名会话");
    println!("/delete <id>            删除会话");
    println!("/clear                  清空当前会话");
    println!("/persona [id]           查看或切换人设");
    println!("/history                当前会话的消息");
    println!("/quit                   退出");
}

/// 处理一条命令，返回 false 表示退出
async fn handle_command(client: &ChatClient, line: &str) -> bool {
    let mut parts = line.splitn(3, ' ');
    let command = parts.next().unwrap_or_default();
    let first = parts.next().map(str::trim).filter(|s| !s.is_empty());
    let rest = parts.next().map(str::trim).filter(|s| !s.is_empty());

    match command {
        "/quit" | "/exit" => return false,
        "/help" => print_help(),
        "/new" => {
            let title = match (first, rest) {
                (Some(a), Some(b)) => Some(format!("{} {}", a, b)),
                (Some(a), None) => Some(a.to_string()),
                _ => None,
            };
            match client.new_session(title.as_deref()).await {
                Some(id) => println!("🆕 {}", id),
                None => println!("⚠️ 新建会话失败"),
            }
        }
        "/sessions" => print_sessions(client),
        "/switch" => match first {
            Some(id) => {
                client.switch_session(id).await;
                println!("🔀 {}", client.header_label().await);
            }
            None => println!("用法: /switch <id>"),
        },
        "/rename" => match (first, rest) {
            (Some(id), Some(title)) => {
                if !client.rename_session(id, title).await {
                    println!("⚠️ 重命名失败");
                }
            }
            _ => println!("用法: /rename <id> <title>"),
        },
        "/delete" => match first {
            Some(id) => {
                if !client.delete_session(id).await {
                    println!("⚠️ 删除失败");
                }
            }
            None => println!("用法: /delete <id>"),
        },
        "/clear" => {
            if !client.conversation().clear_chat().await {
                println!("⚠️ 清空失败");
            }
        }
        "/persona" => match first {
            Some(persona) => {
                client.change_persona(persona).await;
                println!("🎭 {}", client.header_label().await);
            }
            None => match client.list_personas().await {
                Ok(personas) => {
                    let current = client.conversation().persona();
                    for p in personas {
                        let marker = if p.id == current { "*" } else { " " };
                        println!("{} {} {} ({})", marker, p.emoji, p.name, p.id);
                    }
                }
                Err(e) => println!("⚠️ {:#}", e),
            },
        },
        "/history" => {
            let conversation = client.conversation();
            for message in conversation.messages() {
                print_message(&message);
            }
            println!("({} messages)", conversation.message_count());
        }
        other => println!("未知命令: {}，输入 /help 查看帮助", other),
    }
    true
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logger(&args.log_level, &args.log_file)?;

    info!("[CLI] 🚀 TravelBuddy CLI 客户端");
    info!("[CLI] 🔗 后端地址: {}", args.api_base_url);

    let config = ClientConfig {
        api_base_url: args.api_base_url.clone(),
        preference_db_url: args.db_url.clone(),
        session_poll_interval: Duration::from_secs(args.poll_interval),
        ..ClientConfig::new()
    };
    let client = ChatClient::connect(config, cli_listeners()).await?;

    match client.start().await {
        Some(id) => info!("[CLI] ✅ 活跃会话: {}", id),
        None => error!("[CLI] ⚠️ 无法创建会话，发送消息时会重试"),
    }
    println!("{}", client.header_label().await);
    println!("输入 /help 查看命令");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        println!("{}", input_placeholder(&client.conversation().persona()));
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with('/') {
            if !handle_command(&client, line).await {
                break;
            }
            continue;
        }

        match client.conversation().send_message(line, None).await {
            SendOutcome::Delivered { .. } | SendOutcome::Failed(_) => {
                if let Some(last) = client.conversation().messages().last() {
                    print_message(last);
                }
            }
            SendOutcome::Skipped => println!("⚠️ 没有可用会话"),
        }
    }

    client.shutdown();
    info!("[CLI] 👋 程序退出");
    Ok(())
}
