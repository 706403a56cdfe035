// SSH 客户端 Handler 实现
// 实现 russh::client::Handler trait

use russh::keys::PublicKey;
use std::future::Future;
use tracing::{debug, info};

/// SSH 客户端 Handler
/// 处理 SSH 连接过程中的各种回调
pub struct SshClientHandler {
    /// 服务器标签（用于日志）
    host: String,
}

impl SshClientHandler {
    /// 创建新的 Handler
    pub fn new(host: String) -> Self {
        Self { host }
    }
}

impl russh::client::Handler for SshClientHandler {
    type Error = russh::Error;

    /// 检查服务器公钥
    /// 中继不维护 known_hosts，记录指纹后接受
    fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> impl Future<Output = Result<bool, Self::Error>> + Send {
        let fingerprint = server_public_key.fingerprint(russh::keys::ssh_key::HashAlg::Sha256);

        info!("[SSH] [{}] Server key fingerprint: {}", self.host, fingerprint);
        debug!(
            "[SSH] [{}] Server key type: {}",
            self.host,
            server_public_key.algorithm()
        );

        async { Ok(true) }
    }
}
