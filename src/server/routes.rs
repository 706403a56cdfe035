// 配置与健康检查接口

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use super::AppState;

/// 登录表单默认值
#[derive(Debug, Serialize)]
pub struct ProfileDefaults {
    pub host: String,
    pub port: u16,
    pub username: String,
    /// 仅在 expose_password 开启时下发
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

pub async fn config_handler(State(state): State<AppState>) -> impl IntoResponse {
    let defaults = &state.defaults;
    Json(ProfileDefaults {
        host: defaults.host.clone(),
        port: defaults.port,
        username: defaults.username.clone(),
        password: defaults
            .expose_password
            .then(|| defaults.password.clone()),
    })
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub timestamp: String,
    pub sessions: usize,
    pub ready_sessions: usize,
}

pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthStatus {
        status: "ok",
        timestamp: chrono::Utc::now().to_rfc3339(),
        sessions: state.registry.len().await,
        ready_sessions: state.registry.ready_count().await,
    })
}

#[cfg(test)]
mod tests {
    use super::super::test_support;
    use crate::models::settings::DefaultProfileSettings;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    async fn get_json(app: axum::Router, uri: &str) -> serde_json::Value {
        let response = app
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn defaults(expose_password: bool) -> DefaultProfileSettings {
        DefaultProfileSettings {
            host: "10.0.0.5".into(),
            port: 2222,
            username: "ops".into(),
            password: "x".into(),
            expose_password,
        }
    }

    #[tokio::test]
    async fn test_config_hides_password_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_support::state(dir.path(), defaults(false)).await;
        let json = get_json(test_support::app(state, dir.path()), "/config").await;
        assert_eq!(json["host"], "10.0.0.5");
        assert_eq!(json["port"], 2222);
        assert_eq!(json["username"], "ops");
        assert!(json.get("password").is_none());
    }

    #[tokio::test]
    async fn test_config_exposes_password_when_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_support::state(dir.path(), defaults(true)).await;
        let json = get_json(test_support::app(state, dir.path()), "/config").await;
        assert_eq!(json["password"], "x");
    }

    #[tokio::test]
    async fn test_health() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_support::state(dir.path(), Default::default()).await;
        let json = get_json(test_support::app(state, dir.path()), "/health").await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["sessions"], 0);
        assert!(json["timestamp"].as_str().unwrap().contains('T'));
    }
}
