// SSHDeck - 多会话 SSH 终端管理器
// 无界面入口：stdin 读 JSON 命令，stdout 写 JSON 事件，日志输出到 stderr

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::time::{sleep, timeout};
use tracing::{info, warn};

use sshdeck::bridge::stdio::{serve_stdio, EventOutput};
use sshdeck::bridge::EventBridge;
use sshdeck::models::{AppSettings, ProfilesConfig};
use sshdeck::services::storage;
use sshdeck::ssh::{SessionOptions, SessionRegistry, SshClient};

fn main() -> Result<()> {
    // 初始化日志系统
    // 可以通过 RUST_LOG 环境变量控制日志级别，例如：RUST_LOG=debug sshdeck
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_target(false) // 不显示 target（模块路径）
        .with_writer(std::io::stderr) // stdout 留给协议
        .init();

    let settings = storage::load_settings().unwrap_or_else(|e| {
        warn!("[Main] Failed to load settings, using defaults: {:#}", e);
        AppSettings::default()
    });
    let profiles = storage::load_profiles().unwrap_or_else(|e| {
        warn!("[Main] Failed to load profiles: {:#}", e);
        ProfilesConfig::default()
    });

    // 创建多线程 Tokio 运行时
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("ssh-worker")
        .build()
        .context("Failed to create SSH Tokio runtime")?;

    let bridge = Arc::new(EventBridge::new());
    let registry = Arc::new(SessionRegistry::new(
        Arc::new(SshClient::new(settings.connection.clone())),
        bridge.clone(),
        SessionOptions::from_settings(&settings),
        runtime.handle().clone(),
    ));

    info!(
        "[Main] SSHDeck ready ({} saved profiles)",
        profiles.profiles.len()
    );
    let close_timeout = Duration::from_secs(settings.connection.close_timeout_secs as u64 + 1);
    runtime.block_on(async {
        // 事件输出一直保持到所有会话关闭，最后的 disconnected 也要写出
        let events = EventOutput::stdout(bridge);
        let served = serve_stdio(registry.clone(), profiles).await;

        info!(
            "[Main] Input closed, disconnecting {} sessions",
            registry.session_count()
        );
        for session_id in registry.session_ids() {
            registry.disconnect(&session_id);
        }
        let drained = timeout(close_timeout, async {
            while registry.session_count() > 0 {
                sleep(Duration::from_millis(50)).await;
            }
        })
        .await;
        if drained.is_err() {
            warn!("[Main] Some sessions did not close in time");
        }

        events.finish().await?;
        served
    })
}
