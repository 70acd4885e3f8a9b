use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Arg, Command};
use dtf_core::{config::AppConfig, PluginRegistry};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use dtf_scheduler::{parse_roles, wait_for_shutdown_signal, Application, ShutdownManager};

/// 关闭时等待例程退出的宽限期
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    // 解析命令行参数
    let matches = Command::new("dtf-scheduler")
        .version(env!("CARGO_PKG_VERSION"))
        .about("分布式任务处理框架调度核心")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径，未指定时依次尝试默认路径"),
        )
        .arg(
            Arg::new("roles")
                .short('r')
                .long("roles")
                .value_name("ROLES")
                .help("节点角色，逗号分隔: scheduler, generator, monitor, all")
                .default_value("all"),
        )
        .arg(
            Arg::new("node-id")
                .long("node-id")
                .value_name("ID")
                .help("节点标识，默认使用主机名"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别，覆盖配置文件")
                .value_parser(["trace", "debug", "info", "warn", "error"]),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式，覆盖配置文件")
                .value_parser(["json", "pretty"]),
        )
        .get_matches();

    let config_path = matches.get_one::<String>("config").map(String::as_str);
    let roles_str = matches
        .get_one::<String>("roles")
        .map(String::as_str)
        .unwrap_or("all");

    // 加载配置
    let mut config = AppConfig::load(config_path).with_context(|| match config_path {
        Some(path) => format!("加载配置文件失败: {path}"),
        None => "加载配置失败".to_string(),
    })?;
    if let Some(level) = matches.get_one::<String>("log-level") {
        config.observability.log_level = level.clone();
    }
    if let Some(format) = matches.get_one::<String>("log-format") {
        config.observability.log_format = format.clone();
    }

    // 初始化日志系统
    init_logging(&config.observability.log_level, &config.observability.log_format)?;

    let roles = parse_roles(roles_str)?;
    let node_id = match matches.get_one::<String>("node-id") {
        Some(id) => id.clone(),
        None => default_node_id(),
    };

    info!("启动分布式任务处理调度核心");
    info!("节点: {node_id}, 角色: {roles:?}");

    let shutdown_manager = ShutdownManager::new();
    // 任务类型插件由嵌入方注册，独立运行时注册表为空
    let plugins = Arc::new(PluginRegistry::new());

    let app = Application::new(config, roles, node_id, plugins, shutdown_manager.token())
        .await
        .context("初始化应用失败")?;
    app.start().await.context("启动应用失败")?;

    // 等待关闭信号
    wait_for_shutdown_signal().await;

    info!("收到关闭信号，开始优雅关闭...");
    if shutdown_manager.shutdown(app.runner(), SHUTDOWN_GRACE).await {
        info!("应用已优雅关闭");
    } else {
        warn!("应用关闭超时，强制退出");
    }

    info!("调度核心已退出");
    Ok(())
}

/// 初始化日志系统
fn init_logging(log_level: &str, log_format: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    match log_format {
        "json" => {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()
                .context("初始化JSON日志格式失败")?;
        }
        "pretty" => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty())
                .try_init()
                .context("初始化Pretty日志格式失败")?;
        }
        _ => {
            return Err(anyhow::anyhow!("不支持的日志格式: {log_format}"));
        }
    }

    Ok(())
}

fn default_node_id() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "dtf-node".to_string())
}
