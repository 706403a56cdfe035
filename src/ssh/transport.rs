// 会话桥依赖的传输抽象
//
// - Connector: 单次建立传输连接（握手 + 认证）
// - Transport: 已认证连接，可打开交互式 Shell 通道和一次性的文件传输通道
// - InteractiveShell: Shell 通道的命令端 + 事件端

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use super::client::SshClient;
use super::config::SshConfig;
use super::error::SshError;
use crate::models::settings::ConnectionSettings;
use crate::models::{ConnectionProfile, TerminalGeometry};

/// 建立传输连接，每次调用只尝试一次
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn open(&self, profile: &ConnectionProfile) -> Result<Arc<dyn Transport>, SshError>;
}

/// 已认证、可多路复用的连接
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// 打开带 PTY 的交互式 Shell
    async fn open_shell(&self, geometry: TerminalGeometry) -> Result<InteractiveShell, SshError>;

    /// 在同一连接上打开独立通道，把本地文件写到远端路径，返回写入字节数
    async fn send_file(&self, local_path: &Path, remote_path: &str) -> Result<u64, SshError>;

    /// 断开连接；重复调用无副作用
    async fn close(&self) -> Result<(), SshError>;
}

/// 发往 Shell 通道的命令，按入队顺序执行
#[derive(Debug)]
pub enum ShellCommand {
    Write(Vec<u8>),
    Resize(TerminalGeometry),
    Close,
}

/// Shell 通道关闭原因；远端退出不重连，连接中断会重连
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ShellCloseReason {
    /// 本地主动关闭
    Local,
    /// 远端进程退出
    Remote { exit_status: Option<u32> },
    /// 底层连接中断
    Lost(String),
}

/// Shell 通道事件
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ShellEvent {
    /// stdout 与 stderr 按到达顺序合并后的输出
    Output(Vec<u8>),
    Closed(ShellCloseReason),
}

/// Shell 命令端
#[derive(Clone, Debug)]
pub struct ShellHandle {
    commands: mpsc::UnboundedSender<ShellCommand>,
}

impl ShellHandle {
    pub fn new(commands: mpsc::UnboundedSender<ShellCommand>) -> Self {
        Self { commands }
    }

    /// 写入输入字节；通道已结束时静默丢弃
    pub fn write(&self, data: Vec<u8>) {
        if self.commands.send(ShellCommand::Write(data)).is_err() {
            debug!("[Shell] Write dropped: channel already finished");
        }
    }

    /// 调整窗口大小，无应答
    pub fn resize(&self, geometry: TerminalGeometry) {
        let _ = self.commands.send(ShellCommand::Resize(geometry));
    }

    pub fn close(&self) {
        let _ = self.commands.send(ShellCommand::Close);
    }
}

/// 已打开的交互式 Shell
pub struct InteractiveShell {
    pub handle: ShellHandle,
    pub events: mpsc::UnboundedReceiver<ShellEvent>,
}

impl InteractiveShell {
    /// 创建一对命令 / 事件通道，返回 Shell 以及通道驱动方使用的另一端
    pub fn channel_pair() -> (
        Self,
        mpsc::UnboundedReceiver<ShellCommand>,
        mpsc::UnboundedSender<ShellEvent>,
    ) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        (
            Self {
                handle: ShellHandle::new(command_tx),
                events: event_rx,
            },
            command_rx,
            event_tx,
        )
    }
}

/// 基于 russh 的 Connector
pub struct SshConnector {
    settings: ConnectionSettings,
}

impl SshConnector {
    pub fn new(settings: ConnectionSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl Connector for SshConnector {
    async fn open(&self, profile: &ConnectionProfile) -> Result<Arc<dyn Transport>, SshError> {
        profile.validate()?;
        let client = SshClient::new(SshConfig::from_profile(profile, &self.settings));
        let session = client.connect().await?;
        Ok(Arc::new(session))
    }
}
