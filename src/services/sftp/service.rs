// SFTP 服务 - 封装 russh-sftp 客户端

use std::path::Path;
use std::sync::Arc;

use russh_sftp::client::SftpSession;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::constants::LOCAL_FILE_NOT_FOUND;
use crate::ssh::session::SshSession;
use crate::ssh::SshError;

/// SFTP 服务
/// 每次传输在现有连接上单独打开一个 SFTP 子系统通道，传输结束即释放，不需要重新认证
pub struct SftpService {
    /// 会话标签（日志用）
    label: String,
    /// russh-sftp 客户端会话
    sftp: Arc<SftpSession>,
}

impl SftpService {
    /// 创建 SFTP 服务
    pub async fn new(ssh_session: &SshSession) -> Result<Self, SshError> {
        let label = ssh_session.label().to_string();
        debug!("[SFTP] [{}] Opening SFTP channel", label);

        // 打开 SFTP 子系统通道
        let channel = ssh_session
            .handle()
            .channel_open_session()
            .await
            .map_err(|e| SshError::Channel(e.to_string()))?;

        // 请求 SFTP 子系统
        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| SshError::Channel(e.to_string()))?;

        // 使用 russh-sftp 包装通道
        let sftp = SftpSession::new(channel.into_stream())
            .await
            .map_err(SshError::from)?;

        Ok(Self {
            label,
            sftp: Arc::new(sftp),
        })
    }

    /// 上传本地文件到远端路径，返回写入字节数
    pub async fn upload_file(&self, local_path: &Path, remote_path: &str) -> Result<u64, SshError> {
        let mut local = tokio::fs::File::open(local_path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SshError::LocalFile(LOCAL_FILE_NOT_FOUND.to_string())
            } else {
                SshError::LocalFile(e.to_string())
            }
        })?;

        info!(
            "[SFTP] [{}] Uploading {:?} -> {}",
            self.label, local_path, remote_path
        );

        let mut remote = self.sftp.create(remote_path).await.map_err(SshError::from)?;

        let written = tokio::io::copy(&mut local, &mut remote)
            .await
            .map_err(|e| SshError::Sftp(e.to_string()))?;
        remote
            .shutdown()
            .await
            .map_err(|e| SshError::Sftp(e.to_string()))?;

        info!(
            "[SFTP] [{}] Uploaded {} bytes to {}",
            self.label, written, remote_path
        );
        Ok(written)
    }
}

impl Drop for SftpService {
    fn drop(&mut self) {
        debug!("[SFTP] [{}] Dropping SFTP service", self.label);
    }
}
