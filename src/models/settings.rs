// Settings 配置数据结构

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_HANDSHAKE_TIMEOUT_SECS, DEFAULT_KEEPALIVE_INTERVAL_SECS, DEFAULT_KEEPALIVE_MAX,
    DEFAULT_RECONNECT_INTERVAL_SECS, DEFAULT_TERM,
};

// ======================== 主配置结构 ========================

/// 应用设置（持久化用）
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub server: ServerSettings,
    pub connection: ConnectionSettings,
    pub staging: StagingSettings,
    pub defaults: DefaultProfileSettings,
}

// ======================== HTTP 服务设置 ========================

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind_address: String,
    pub port: u16,
    /// 静态页面目录
    pub static_dir: String,
    /// 上传暂存目录
    pub upload_dir: String,
    pub max_upload_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 3000,
            static_dir: "public".to_string(),
            upload_dir: "uploads".to_string(),
            max_upload_bytes: 512 * 1024 * 1024,
        }
    }
}

impl ServerSettings {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

// ======================== 连接设置 ========================

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// 握手 + 认证总超时
    pub handshake_timeout_secs: u64,
    pub keepalive_interval_secs: u64,
    /// 连续丢失多少次心跳后判定连接断开
    pub keepalive_max: usize,
    /// 连接失败后的重连间隔（固定间隔，无上限）
    pub reconnect_interval_secs: u64,
    pub term: String,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            handshake_timeout_secs: DEFAULT_HANDSHAKE_TIMEOUT_SECS,
            keepalive_interval_secs: DEFAULT_KEEPALIVE_INTERVAL_SECS,
            keepalive_max: DEFAULT_KEEPALIVE_MAX,
            reconnect_interval_secs: DEFAULT_RECONNECT_INTERVAL_SECS,
            term: DEFAULT_TERM.to_string(),
        }
    }
}

// ======================== 暂存区设置 ========================

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StagingSettings {
    /// 超过该时长仍未传输的暂存文件会被回收
    pub max_age_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for StagingSettings {
    fn default() -> Self {
        Self {
            max_age_secs: 24 * 60 * 60,
            sweep_interval_secs: 10 * 60,
        }
    }
}

// ======================== 登录表单默认值 ========================

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultProfileSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// 是否把默认密码下发给浏览器（kiosk 场景）
    pub expose_password: bool,
}

impl Default for DefaultProfileSettings {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 22,
            username: "root".to_string(),
            password: String::new(),
            expose_password: false,
        }
    }
}
