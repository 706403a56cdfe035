// HTTP 服务
//
// - /ws      浏览器终端的 WebSocket（每个连接即一个 Client Link）
// - /upload  上传文件到暂存区
// - /config  登录表单默认值
// - /health  健康检查
// 其余路径由静态目录提供

mod routes;
mod upload;
mod ws;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::bridge::{BridgeContext, SessionRegistry};
use crate::models::settings::{DefaultProfileSettings, ServerSettings};
use crate::models::AppSettings;
use crate::services::staging::{spawn_sweeper, StagingArea};
use crate::ssh::SshConnector;

/// 路由共享状态
#[derive(Clone)]
pub struct AppState {
    pub bridge: BridgeContext,
    pub registry: SessionRegistry,
    pub defaults: Arc<DefaultProfileSettings>,
}

impl AppState {
    pub fn new(bridge: BridgeContext, defaults: DefaultProfileSettings) -> Self {
        Self {
            bridge,
            registry: SessionRegistry::new(),
            defaults: Arc::new(defaults),
        }
    }

    pub fn staging(&self) -> &StagingArea {
        &self.bridge.staging
    }
}

/// 构建路由
pub fn router(state: AppState, settings: &ServerSettings) -> Router {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/upload", post(upload::upload_handler))
        .route("/config", get(routes::config_handler))
        .route("/health", get(routes::health_handler))
        .fallback_service(ServeDir::new(&settings.static_dir))
        .layer(DefaultBodyLimit::max(settings.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// 启动服务，Ctrl-C 时断开所有会话并退出
pub async fn serve(settings: AppSettings) -> Result<()> {
    let staging = Arc::new(StagingArea::open(&settings.server.upload_dir).await?);
    info!("[Staging] Upload directory {:?}", staging.root());
    spawn_sweeper(
        staging.clone(),
        Duration::from_secs(settings.staging.sweep_interval_secs),
        Duration::from_secs(settings.staging.max_age_secs),
    );

    let bridge = BridgeContext {
        connector: Arc::new(SshConnector::new(settings.connection.clone())),
        staging,
        reconnect_interval: Duration::from_secs(settings.connection.reconnect_interval_secs),
    };
    let state = AppState::new(bridge, settings.defaults.clone());
    let app = router(state.clone(), &settings.server);

    let addr = settings.server.listen_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("[HTTP] Listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(state.registry.clone()))
    .await
    .context("server shutdown with error")?;

    info!("[HTTP] Server stopped");
    Ok(())
}

async fn shutdown_signal(registry: SessionRegistry) {
    let _ = signal::ctrl_c().await;
    info!("[HTTP] Shutdown signal received");
    registry.disconnect_all().await;
}
