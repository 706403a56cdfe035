// SSH 会话管理
// 连接成功后的会话对象，在同一连接上打开 Shell 通道与 SFTP 通道

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use russh::client::{Handle, Msg};
use russh::{ChannelMsg, Disconnect};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use super::error::SshError;
use super::handler::SshClientHandler;
use super::transport::{InteractiveShell, ShellCloseReason, ShellCommand, ShellEvent, Transport};
use crate::constants::NO_SSH_CONNECTION;
use crate::models::TerminalGeometry;
use crate::services::sftp::SftpService;

// 使用 russh::client::Msg 作为消息类型
type RusshChannel = russh::Channel<Msg>;

/// PTY 请求参数
#[derive(Clone, Debug)]
pub struct PtyRequest {
    /// 终端类型
    pub term: String,
    /// 终端尺寸
    pub geometry: TerminalGeometry,
    /// 终端模式
    pub modes: Vec<(russh::Pty, u32)>,
}

impl PtyRequest {
    pub fn new(term: impl Into<String>, geometry: TerminalGeometry) -> Self {
        Self {
            term: term.into(),
            geometry: geometry.clamped(),
            modes: vec![],
        }
    }
}

/// SSH 会话（连接成功后）
/// 内部持有 Handle，支持在同一连接上并发打开多个通道
pub struct SshSession {
    /// 共享的 russh Handle（Arc 包装）
    handle: Arc<Handle<SshClientHandler>>,
    /// user@host:port，用于日志
    label: String,
    /// 终端类型
    term: String,
    /// 连接状态
    is_connected: AtomicBool,
}

impl SshSession {
    /// 创建新的会话
    pub fn new(handle: Arc<Handle<SshClientHandler>>, label: String, term: String) -> Self {
        Self {
            handle,
            label,
            term,
            is_connected: AtomicBool::new(true),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// 检查会话是否活跃
    pub fn is_alive(&self) -> bool {
        self.is_connected.load(Ordering::Relaxed) && !self.handle.is_closed()
    }

    /// 获取 Handle 引用
    pub fn handle(&self) -> Arc<Handle<SshClientHandler>> {
        self.handle.clone()
    }

    fn ensure_alive(&self) -> Result<(), SshError> {
        if self.is_alive() {
            Ok(())
        } else {
            Err(SshError::Disconnected(NO_SSH_CONNECTION.to_string()))
        }
    }

    /// 打开终端 Shell 通道，并启动通道驱动任务
    pub async fn open_terminal(&self, pty: PtyRequest) -> Result<InteractiveShell, SshError> {
        self.ensure_alive()?;

        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| SshError::Channel(e.to_string()))?;

        channel
            .request_pty(
                true,
                &pty.term,
                pty.geometry.columns,
                pty.geometry.rows,
                pty.geometry.pixel_width,
                pty.geometry.pixel_height,
                &pty.modes,
            )
            .await
            .map_err(|e| SshError::Channel(e.to_string()))?;

        channel
            .request_shell(true)
            .await
            .map_err(|e| SshError::Channel(e.to_string()))?;

        debug!(
            "[SSH] [{}] Shell opened ({}x{})",
            self.label, pty.geometry.columns, pty.geometry.rows
        );

        let (shell, commands, events) = InteractiveShell::channel_pair();
        let terminal = TerminalChannel::new(channel, self.label.clone());
        tokio::spawn(terminal.run(commands, events));
        Ok(shell)
    }

    /// 标记断开并通知服务器
    pub async fn disconnect(&self) -> Result<(), SshError> {
        if !self.is_connected.swap(false, Ordering::Relaxed) {
            return Ok(());
        }
        info!("[SSH] [{}] Disconnecting", self.label);
        self.handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
            .map_err(SshError::from)
    }
}

#[async_trait]
impl Transport for SshSession {
    async fn open_shell(&self, geometry: TerminalGeometry) -> Result<InteractiveShell, SshError> {
        self.open_terminal(PtyRequest::new(self.term.clone(), geometry))
            .await
    }

    async fn send_file(&self, local_path: &Path, remote_path: &str) -> Result<u64, SshError> {
        self.ensure_alive()?;
        let sftp = SftpService::new(self).await?;
        sftp.upload_file(local_path, remote_path).await
    }

    async fn close(&self) -> Result<(), SshError> {
        self.disconnect().await
    }
}

/// 终端通道
/// 驱动任务持续读取远端消息；输入交给独立的写任务，
/// 远端窗口耗尽时只有写任务挂起，输出照常读出
struct TerminalChannel {
    channel: RusshChannel,
    label: String,
    end: ChannelEnd,
}

impl TerminalChannel {
    fn new(channel: RusshChannel, label: String) -> Self {
        Self {
            channel,
            label,
            end: ChannelEnd::default(),
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<ShellCommand>,
        events: mpsc::UnboundedSender<ShellEvent>,
    ) {
        debug!("[PTY] [{}] Driver started", self.label);

        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let mut writer = tokio::spawn(pump_input(self.channel.make_writer(), input_rx));
        let mut writer_running = true;

        let reason = loop {
            tokio::select! {
                msg = self.channel.wait() => {
                    if let Some(reason) = self.on_channel_msg(msg, &events) {
                        break reason;
                    }
                }
                result = &mut writer, if writer_running => {
                    writer_running = false;
                    let message = match result {
                        Ok(Ok(())) => continue,
                        Ok(Err(e)) => e.to_string(),
                        Err(e) => e.to_string(),
                    };
                    break ShellCloseReason::Lost(message);
                }
                command = commands.recv() => {
                    if let Some(reason) = self.on_command(command, &input_tx).await {
                        break reason;
                    }
                }
            }
        };

        drop(input_tx);
        if writer_running {
            writer.abort();
        }

        match &reason {
            ShellCloseReason::Local => debug!("[PTY] [{}] Closed locally", self.label),
            ShellCloseReason::Remote { exit_status } => {
                info!(
                    "[PTY] [{}] Remote shell exited (status: {:?})",
                    self.label, exit_status
                )
            }
            ShellCloseReason::Lost(e) => warn!("[PTY] [{}] Channel lost: {}", self.label, e),
        }
        let _ = events.send(ShellEvent::Closed(reason));
    }

    /// 处理远端消息，返回 Some 表示通道结束
    fn on_channel_msg(
        &mut self,
        msg: Option<ChannelMsg>,
        events: &mpsc::UnboundedSender<ShellEvent>,
    ) -> Option<ShellCloseReason> {
        match msg {
            Some(ChannelMsg::Data { data }) | Some(ChannelMsg::ExtendedData { data, .. }) => {
                trace!("[PTY] [{}] Received {} bytes", self.label, data.len());
                let _ = events.send(ShellEvent::Output(data.to_vec()));
                None
            }
            other => self.end.observe(other.as_ref()),
        }
    }

    /// 执行本地命令，返回 Some 表示通道结束
    async fn on_command(
        &mut self,
        command: Option<ShellCommand>,
        input: &mpsc::UnboundedSender<Vec<u8>>,
    ) -> Option<ShellCloseReason> {
        match command {
            Some(ShellCommand::Write(data)) => {
                if !data.is_empty() {
                    // 写任务已退出时由 writer 分支上报
                    let _ = input.send(data);
                }
                None
            }
            Some(ShellCommand::Resize(geometry)) => {
                let geometry = geometry.clamped();
                if let Err(e) = self
                    .channel
                    .window_change(
                        geometry.columns,
                        geometry.rows,
                        geometry.pixel_width,
                        geometry.pixel_height,
                    )
                    .await
                {
                    warn!("[PTY] [{}] Failed to resize: {}", self.label, e);
                }
                None
            }
            Some(ShellCommand::Close) | None => {
                let _ = self.channel.eof().await;
                let _ = self.channel.close().await;
                Some(ShellCloseReason::Local)
            }
        }
    }
}

/// 按到达顺序把输入写入通道，直到队列关闭或写入失败
async fn pump_input<W>(writer: W, mut input: mpsc::UnboundedReceiver<Vec<u8>>) -> std::io::Result<()>
where
    W: AsyncWrite + Send + 'static,
{
    let mut writer = Box::pin(writer);
    while let Some(data) = input.recv().await {
        writer.write_all(&data).await?;
        writer.flush().await?;
    }
    Ok(())
}

/// 远端收尾消息的记录
///
/// 流结束前收到过 EOF 或退出码视为远端正常退出，否则视为连接丢失。
#[derive(Debug, Default)]
struct ChannelEnd {
    exit_status: Option<u32>,
    saw_eof: bool,
}

impl ChannelEnd {
    /// 返回 Some 表示通道结束；`None` 消息表示消息流已终止
    fn observe(&mut self, msg: Option<&ChannelMsg>) -> Option<ShellCloseReason> {
        match msg {
            Some(ChannelMsg::ExitStatus { exit_status }) => {
                self.exit_status = Some(*exit_status);
                None
            }
            Some(ChannelMsg::Eof) => {
                self.saw_eof = true;
                None
            }
            Some(ChannelMsg::Close) => Some(ShellCloseReason::Remote {
                exit_status: self.exit_status,
            }),
            Some(_) => None,
            None if self.saw_eof || self.exit_status.is_some() => {
                Some(ShellCloseReason::Remote {
                    exit_status: self.exit_status,
                })
            }
            None => Some(ShellCloseReason::Lost("Connection lost".to_string())),
        }
    }
}
