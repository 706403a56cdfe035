// 连接参数（每次 connect 请求携带）

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_SSH_PORT;
use crate::ssh::SshError;

fn default_port() -> u16 {
    DEFAULT_SSH_PORT
}

/// 连接参数
/// 一次连接尝试开始后不再修改；只保存在进程内存中
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionProfile {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl ConnectionProfile {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            password: password.into(),
        }
    }

    /// 校验参数（端口范围 1-65535，主机与用户名非空）
    pub fn validate(&self) -> Result<(), SshError> {
        if self.host.trim().is_empty() {
            return Err(SshError::Config("Host is required".to_string()));
        }
        if self.username.trim().is_empty() {
            return Err(SshError::Config("Username is required".to_string()));
        }
        if self.port == 0 {
            return Err(SshError::Config("Port must be between 1 and 65535".to_string()));
        }
        Ok(())
    }

    /// 日志用标签，不包含密码
    pub fn label(&self) -> String {
        format!("{}@{}:{}", self.username, self.host, self.port)
    }
}

// 手写 Debug，避免密码进入日志
impl std::fmt::Debug for ConnectionProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionProfile")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}
