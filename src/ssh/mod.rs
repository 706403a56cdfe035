// SSH 连接模块
//
// 模块结构:
// - config: 连接配置 (SshConfig, KeepaliveConfig, 算法协商列表)
// - error: 错误类型 (SshError, FailureKind)
// - handler: russh Handler 实现
// - client: SSH 客户端核心（握手 + 认证）
// - session: SSH 会话 (SshSession, 终端通道驱动)
// - transport: 会话桥使用的抽象 (Connector, Transport, InteractiveShell)

pub mod client;
pub mod config;
pub mod error;
pub mod handler;
pub mod session;
pub mod transport;

// 公开导出
pub use client::SshClient;
pub use config::{KeepaliveConfig, SshConfig};
pub use error::{FailureKind, SshError};
pub use session::{PtyRequest, SshSession};
pub use transport::{
    Connector, InteractiveShell, ShellCloseReason, ShellCommand, ShellEvent, ShellHandle,
    SshConnector, Transport,
};
