// SSH 错误类型定义

use thiserror::Error;

/// SSH 错误类型
///
/// `Display` 输出会原样推送给浏览器，因此各变体只携带底层原因，不再二次包装。
#[derive(Debug, Error)]
pub enum SshError {
    /// 配置错误（连接参数不合法）
    #[error("{0}")]
    Config(String),

    /// IO 错误（网络连接等）
    #[error("{0}")]
    Io(#[from] std::io::Error),

    /// 认证失败
    #[error("{0}")]
    Auth(String),

    /// SSH 协议错误
    #[error("{0}")]
    Protocol(String),

    /// 握手超时
    #[error("Timed out while waiting for handshake after {0}s")]
    Timeout(u64),

    /// 通道错误（Shell / SFTP 通道打开失败）
    #[error("{0}")]
    Channel(String),

    /// SFTP 操作失败
    #[error("{0}")]
    Sftp(String),

    /// 本地暂存文件错误
    #[error("{0}")]
    LocalFile(String),

    /// 会话已断开
    #[error("{0}")]
    Disconnected(String),
}

/// 失败类别，只用于日志中区分故障来源
///
/// 重连与否由失败发生的阶段决定：建立阶段的任何错误都会重连，传输错误只上报。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    /// 握手 / 认证 / 网络失败
    Connection,
    /// 通道无法打开
    Channel,
    /// 文件传输失败
    Transfer,
}

impl SshError {
    pub fn kind(&self) -> FailureKind {
        match self {
            SshError::Channel(_) => FailureKind::Channel,
            SshError::Sftp(_) | SshError::LocalFile(_) => FailureKind::Transfer,
            _ => FailureKind::Connection,
        }
    }
}

impl From<russh::Error> for SshError {
    fn from(e: russh::Error) -> Self {
        SshError::Protocol(e.to_string())
    }
}

impl From<russh_sftp::client::error::Error> for SshError {
    fn from(e: russh_sftp::client::error::Error) -> Self {
        SshError::Sftp(e.to_string())
    }
}
