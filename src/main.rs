use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use fleetbench::app::Application;
use fleetbench::cli::{build_cli, parse_command};
use fleetbench::shutdown::{wait_for_signal, ShutdownManager};
use fleetbench_core::logging::{init_logging, LogFormat};
use fleetbench_core::AppConfig;
use tracing::{error, info, warn};

/// 收到关闭信号后等待操作退出的最长时间
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    let matches = build_cli().get_matches();
    let command = parse_command(&matches)?;
    let config_path = matches.get_one::<String>("config").map(String::as_str);

    // 加载配置
    let config = AppConfig::load(config_path).with_context(|| match config_path {
        Some(path) => format!("加载配置文件失败: {path}"),
        None => "加载配置失败".to_string(),
    })?;

    // 命令行参数优先于配置文件
    let log_level = matches
        .get_one::<String>("log-level")
        .unwrap_or(&config.observability.log_level)
        .clone();
    let log_format: LogFormat = matches
        .get_one::<String>("log-format")
        .unwrap_or(&config.observability.log_format)
        .parse()?;
    init_logging(&log_level, log_format)?;

    info!("启动fleetbench");
    if let Some(path) = config_path {
        info!("配置文件: {path}");
    }

    let app = Arc::new(Application::new(config, command.name()));
    let shutdown_manager = ShutdownManager::new();

    let mut app_handle = {
        let app = Arc::clone(&app);
        let shutdown = shutdown_manager.clone();
        tokio::spawn(async move { app.run(command, shutdown).await })
    };

    let outcome = tokio::select! {
        joined = &mut app_handle => joined,
        signal = wait_for_signal() => {
            signal?;
            info!("收到关闭信号，开始优雅关闭...");
            shutdown_manager.shutdown();

            match tokio::time::timeout(SHUTDOWN_TIMEOUT, app_handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!("操作关闭超时，强制退出");
                    return Ok(());
                }
            }
        }
    };

    match outcome.context("操作任务异常退出")? {
        Ok(()) => {
            info!("fleetbench已退出");
            Ok(())
        }
        Err(e) => {
            error!("操作失败: {e:#}");
            Err(e)
        }
    }
}
