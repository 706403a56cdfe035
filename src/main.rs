// ShellRelay - 浏览器终端 SSH 中继
// 应用入口

mod bridge;
mod constants;
mod models;
mod server;
mod services;
mod ssh;

use anyhow::Result;
use services::storage;

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志系统
    // 可以通过 RUST_LOG 环境变量控制日志级别，例如：RUST_LOG=debug cargo run
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_target(false) // 不显示 target（模块路径）
        .init();

    let settings = storage::load_settings()?;
    let defaults = &settings.defaults;
    tracing::info!(
        "[Config] Default target {}@{}:{} (password {})",
        defaults.username,
        defaults.host,
        defaults.port,
        if defaults.password.is_empty() { "empty" } else { "set" }
    );

    server::serve(settings).await
}
